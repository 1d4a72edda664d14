// src/server/handler.rs
use crate::config::{EndpointConfig, MetricsConfig};
use crate::health::{Aggregation, CheckClass, Registry};
use crate::metrics::MetricsRegistry;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Serves the liveness and readiness endpoints (and optionally the
/// prometheus exposition) for a shared [`Registry`].
#[derive(Clone)]
pub struct HealthService {
    registry: Arc<Registry>,
    endpoints: Arc<EndpointConfig>,
    metrics: Option<(Arc<MetricsRegistry>, Arc<str>)>,
}

impl HealthService {
    pub fn new(registry: Arc<Registry>, endpoints: EndpointConfig) -> Self {
        Self {
            registry,
            endpoints: Arc::new(endpoints),
            metrics: None,
        }
    }

    /// Records a `healthcheck` gauge per check on every aggregation and
    /// serves the exposition on `config.path`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>, config: &MetricsConfig) -> Self {
        self.metrics = Some((metrics, Arc::from(config.path.as_str())));
        self
    }

    /// Runs every check of `class` and renders the result.
    pub async fn respond(&self, class: CheckClass) -> Response<Body> {
        let aggregation = self.registry.aggregate(class).await;

        if let Some((metrics, _)) = &self.metrics {
            metrics.collector().record_aggregation(class, &aggregation);
        }

        render(&aggregation)
    }

    async fn route(&self, method: Method, path: String) -> Response<Body> {
        let path = path.as_str();

        let class = if path == self.endpoints.live_path {
            Some(CheckClass::Live)
        } else if path == self.endpoints.ready_path {
            Some(CheckClass::Ready)
        } else {
            None
        };

        if let Some(class) = class {
            if method != Method::GET {
                return method_not_allowed();
            }
            return self.respond(class).await;
        }

        match &self.metrics {
            Some((metrics, metrics_path)) if path == &**metrics_path => {
                if method != Method::GET {
                    return method_not_allowed();
                }
                exposition(metrics)
            }
            _ => plain(StatusCode::NOT_FOUND, "Not Found"),
        }
    }
}

impl Service<Request<Body>> for HealthService {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let service = self.clone();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let span = info_span!(
            "health_request",
            request_id = %Uuid::new_v4(),
            method = %method,
            path = %path,
        );
        Box::pin(async move { Ok(service.route(method, path).await) }.instrument(span))
    }
}

/// 200 with the status map when every check passed, 503 otherwise.
pub fn render(aggregation: &Aggregation) -> Response<Body> {
    let status = if aggregation.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    match encode_statuses(aggregation.statuses()) {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            response
        }
        Err(e) => {
            error!("Failed to encode check statuses: {}", e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Sorted keys, four-space indentation, trailing newline.
pub fn encode_statuses(statuses: &BTreeMap<String, String>) -> serde_json::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    statuses.serialize(&mut serializer)?;
    buffer.push(b'\n');
    Ok(buffer)
}

fn exposition(metrics: &MetricsRegistry) -> Response<Body> {
    match metrics.gather() {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            if let Ok(value) = HeaderValue::from_str(&metrics.content_type()) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn method_not_allowed() -> Response<Body> {
    let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("GET"));
    response
}

fn plain(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{CheckError, CheckResult};
    use tower::ServiceExt;

    async fn passing() -> CheckResult {
        Ok(())
    }

    async fn refused() -> CheckResult {
        Err(CheckError::failed("connection refused"))
    }

    async fn get(service: &HealthService, path: &str) -> (StatusCode, String) {
        let req = Request::get(path).body(Body::empty()).unwrap();
        let response = service.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_encoding_is_sorted_and_indented() {
        let statuses = BTreeMap::from([
            ("upstream-dependency-dns".to_string(), "OK".to_string()),
            ("goroutine-threshold".to_string(), "OK".to_string()),
        ]);
        let body = String::from_utf8(encode_statuses(&statuses).unwrap()).unwrap();
        assert_eq!(
            body,
            "{\n    \"goroutine-threshold\": \"OK\",\n    \"upstream-dependency-dns\": \"OK\"\n}\n"
        );
        assert_eq!(encode_statuses(&BTreeMap::new()).unwrap(), b"{}\n");
    }

    #[tokio::test]
    async fn test_failing_readiness_check() {
        let registry = Arc::new(Registry::new());
        registry.add_readiness_check("db", refused);
        let service = HealthService::new(registry, EndpointConfig::default());

        let req = Request::get("/ready").body(Body::empty()).unwrap();
        let response = service.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);

        let (_, body) = get(&service, "/ready").await;
        assert_eq!(body, "{\n    \"db\": \"connection refused\"\n}\n");
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let service = HealthService::new(Arc::new(Registry::new()), EndpointConfig::default());

        assert_eq!(get(&service, "/live").await, (StatusCode::OK, "{}\n".to_string()));
        assert_eq!(get(&service, "/ready").await, (StatusCode::OK, "{}\n".to_string()));
    }

    #[tokio::test]
    async fn test_custom_paths_and_unknown_routes() {
        let registry = Arc::new(Registry::new());
        registry.add_liveness_check("ok", passing);
        let endpoints = EndpointConfig {
            live_path: "/healthz".to_string(),
            ready_path: "/readyz".to_string(),
        };
        let service = HealthService::new(registry, endpoints);

        assert_eq!(get(&service, "/healthz").await.0, StatusCode::OK);
        assert_eq!(get(&service, "/live").await.0, StatusCode::NOT_FOUND);
        assert_eq!(get(&service, "/metrics").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_get_is_rejected() {
        let service = HealthService::new(Arc::new(Registry::new()), EndpointConfig::default());

        let req = Request::post("/live").body(Body::empty()).unwrap();
        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET");
    }

    #[tokio::test]
    async fn test_metrics_are_recorded_per_request() {
        let registry = Arc::new(Registry::new());
        registry.add_readiness_check("failing-check", refused);
        registry.add_liveness_check("successful-check", passing);

        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let service = HealthService::new(registry, EndpointConfig::default())
            .with_metrics(metrics, &MetricsConfig::default());

        let (_, before) = get(&service, "/metrics").await;
        assert!(!before.contains("successful-check"));

        get(&service, "/live").await;
        get(&service, "/ready").await;

        let (status, text) = get(&service, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains(r#"healthcheck{check="live",name="successful-check"} 1"#));
        assert!(text.contains(r#"healthcheck{check="ready",name="failing-check"} 0"#));
    }
}
