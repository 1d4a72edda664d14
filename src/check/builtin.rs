// src/check/builtin.rs
//
// Ready-made checks for the usual external dependencies. Each network check
// is bounded by `timeout` so a hung dependency cannot stall the caller.
use super::{timeout, Check, CheckError, CheckResult};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use url::Url;

/// Passes when `host` resolves to at least one address.
pub fn dns_resolve_check(host: impl Into<String>, limit: Duration) -> impl Check {
    let host = host.into();
    timeout(move || resolve(host.clone()), limit)
}

/// Passes when a TCP connection to `addr` (`host:port`) can be opened.
pub fn tcp_dial_check(addr: impl Into<String>, limit: Duration) -> impl Check {
    let addr = addr.into();
    timeout(move || dial(addr.clone()), limit)
}

/// Passes when a GET against `url` answers `200 OK`.
pub fn http_get_check(url: Url, limit: Duration) -> impl Check {
    let client = Client::new();
    timeout(
        move || get_ok(client.get(url.clone()).timeout(limit)),
        limit,
    )
}

/// Fails once the current tokio runtime has more than `threshold` live tasks,
/// a cheap signal for task leaks.
pub fn task_count_check(threshold: usize) -> impl Check {
    move || count_tasks(threshold)
}

async fn resolve(host: String) -> CheckResult {
    let mut addrs = lookup_host((host.as_str(), 0)).await?;
    match addrs.next() {
        Some(_) => Ok(()),
        None => Err(CheckError::failed("could not resolve host")),
    }
}

async fn dial(addr: String) -> CheckResult {
    let stream = TcpStream::connect(addr.as_str()).await?;
    drop(stream);
    Ok(())
}

async fn get_ok(request: RequestBuilder) -> CheckResult {
    let response = request.send().await?;
    if response.status() != StatusCode::OK {
        return Err(CheckError::failed(format!(
            "returned status {}",
            response.status().as_u16()
        )));
    }
    Ok(())
}

async fn count_tasks(threshold: usize) -> CheckResult {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| CheckError::failed(format!("no tokio runtime: {}", e)))?;
    let count = handle.metrics().num_alive_tasks();
    if count > threshold {
        return Err(CheckError::failed(format!(
            "too many tasks ({} > {})",
            count, threshold
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dns_resolve_localhost() {
        let check = dns_resolve_check("localhost", Duration::from_secs(2));
        assert!(check.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_dns_resolve_invalid_host() {
        let check = dns_resolve_check("nonexistent.invalid", Duration::from_secs(2));
        assert!(check.check().await.is_err());
    }

    #[tokio::test]
    async fn test_tcp_dial() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let check = tcp_dial_check(addr.to_string(), Duration::from_secs(1));
        assert!(check.check().await.is_ok());

        drop(listener);
        let check = tcp_dial_check(addr.to_string(), Duration::from_secs(1));
        assert!(check.check().await.is_err());
    }

    #[tokio::test]
    async fn test_http_get_check() {
        let mut server = mockito::Server::new_async().await;
        let healthy = server
            .mock("GET", "/healthy")
            .with_status(200)
            .create_async()
            .await;
        let broken = server
            .mock("GET", "/broken")
            .with_status(500)
            .create_async()
            .await;

        let base = Url::parse(&server.url()).unwrap();

        let check = http_get_check(base.join("/healthy").unwrap(), Duration::from_secs(2));
        assert!(check.check().await.is_ok());

        let check = http_get_check(base.join("/broken").unwrap(), Duration::from_secs(2));
        assert_eq!(
            check.check().await,
            Err(CheckError::failed("returned status 500"))
        );

        healthy.assert_async().await;
        broken.assert_async().await;
    }

    #[tokio::test]
    async fn test_task_count_threshold() {
        assert!(task_count_check(10_000).check().await.is_ok());

        let sleepers: Vec<_> = (0..5)
            .map(|_| tokio::spawn(tokio::time::sleep(Duration::from_secs(5))))
            .collect();
        let err = task_count_check(2).check().await.unwrap_err();
        assert!(err.to_string().starts_with("too many tasks ("), "{}", err);

        for sleeper in sleepers {
            sleeper.abort();
        }
    }
}
