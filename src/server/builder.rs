// src/server/builder.rs
use crate::server::listener::bind_tcp;
use anyhow::{Context, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::Service;

/// Accept loop for a health [`Service`](tower::Service), usually
/// `HealthService`.
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: Option<H>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, handler: None }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Binds and serves until the process exits.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Binds and serves until `signal` resolves. Connections already accepted
    /// are left to finish on their own tasks.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = bind_tcp(self.addr).await?;
        self.serve_listener(listener, signal).await
    }

    /// Serves on an already bound listener, e.g. one bound to port 0.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handler = self
            .handler
            .context("handler must be set via with_handler()")?;
        tokio::pin!(signal);

        tracing::info!("Health server listening on {}", listener.local_addr()?);

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = &mut signal => {
                    tracing::info!("Health server stopped accepting connections");
                    return Ok(());
                }
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    accept_failed(&err).await;
                    continue;
                }
            };
            let svc = handler.clone();

            tokio::spawn(async move {
                if let Err(err) = Http::new().serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "connection error");
                }
            });
        }
    }
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// Errors such as EMFILE are transient; pause so the loop does not spin on them.
async fn accept_failed(err: &std::io::Error) {
    tracing::error!(%err, "failed to accept connection");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}
