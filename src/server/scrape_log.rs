//! Per-scrape log line (tower Layer + Service).
//!
//! The metrics handler attaches a `ScrapeReport` to its response; this layer
//! turns it into one structured line alongside the client and HTTP outcome.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request};
use axum::response::Response;
use tracing::{info, warn};

/// What one pipeline run produced, as seen by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScrapeReport {
    /// Devices in the sample, `None` when the pipeline failed.
    pub devices: Option<usize>,
    /// Time in the inventory command, when it succeeded.
    pub inventory: Option<Duration>,
    /// Time from handler entry to the sample (or error), including queueing
    /// for a blocking thread.
    pub collect: Duration,
}

#[derive(Clone)]
pub(crate) struct ScrapeLogLayer;

impl<S> tower::Layer<S> for ScrapeLogLayer {
    type Service = ScrapeLogService<S>;
    fn layer(&self, inner: S) -> Self::Service {
        ScrapeLogService { inner }
    }
}

#[derive(Clone)]
pub(crate) struct ScrapeLogService<S> {
    inner: S,
}

impl<S> tower::Service<Request> for ScrapeLogService<S>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let client = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .unwrap_or_else(|| "-".to_owned());
        let path = req.uri().path().to_owned();
        let start = Instant::now();

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let response = inner.call(req).await?;
            let latency_ms = start.elapsed().as_millis() as u64;
            let status = response.status().as_u16();

            match response.extensions().get::<ScrapeReport>().copied() {
                Some(ScrapeReport {
                    devices: Some(devices),
                    inventory,
                    collect,
                }) => info!(
                    client = %client,
                    status,
                    devices,
                    inventory_ms = inventory.map(|d| d.as_millis() as u64),
                    collect_ms = collect.as_millis() as u64,
                    latency_ms,
                    "scrape ok"
                ),
                Some(ScrapeReport { collect, .. }) => warn!(
                    client = %client,
                    status,
                    collect_ms = collect.as_millis() as u64,
                    latency_ms,
                    "scrape failed"
                ),
                None => info!(
                    client = %client,
                    status,
                    latency_ms,
                    path = %path,
                    "not a metrics request"
                ),
            }
            Ok(response)
        })
    }
}
