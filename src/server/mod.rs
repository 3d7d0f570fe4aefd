//! Pull delivery: HTTP endpoint serving a fresh sample per request.
//!
//! Lifecycle: `bind` (Stopped → Listening), `serve` until the shutdown token fires,
//! then drain in-flight requests (Draining) bounded by the shutdown timeout (Stopped).

mod handlers;
mod scrape_log;

use std::future::IntoFuture;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::any;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tracing::{info, warn};

use crate::collector::{Collector, InventorySource};
use crate::error::ExporterError;
use crate::shutdown::ShutdownToken;

use scrape_log::ScrapeLogLayer;
pub use handlers::EXPOSITION_CONTENT_TYPE;

/// Builds the router: the metrics path (with and without trailing slash), any method.
pub fn router<S: InventorySource>(collector: Arc<Collector<S>>, metrics_path: &str) -> Router {
    let base = metrics_path.trim_end_matches('/');

    Router::new()
        .route(base, any(handlers::handle_metrics::<S>))
        .route(&format!("{}/", base), any(handlers::handle_metrics::<S>))
        .with_state(collector)
        .layer(ScrapeLogLayer)
        .layer(CompressionLayer::new())
}

fn is_address_conflict(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
    )
}

/// HTTP server bound to its listen address, not yet accepting.
pub struct PullServer {
    listener: TcpListener,
    app: Router,
    local_addr: SocketAddr,
    shutdown_timeout: Duration,
}

impl PullServer {
    /// Binds the listen address.
    ///
    /// `[::]` is dual-stack where the OS allows it. On hosts without IPv6 it falls
    /// back to `0.0.0.0` on the same port.
    ///
    /// # Arguments
    /// * `addr` - Address to listen on (port 0 picks a free port)
    /// * `collector` - Pipeline shared by all requests
    /// * `metrics_path` - Path serving the exposition text
    /// * `shutdown_timeout` - Drain deadline once shutdown is requested
    pub async fn bind<S: InventorySource>(
        addr: SocketAddr,
        collector: Arc<Collector<S>>,
        metrics_path: &str,
        shutdown_timeout: Duration,
    ) -> Result<Self, ExporterError> {
        let bind_err = |source| ExporterError::Bind { addr, source };

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) if addr.ip() == Ipv6Addr::UNSPECIFIED && !is_address_conflict(&e) => {
                let fallback = SocketAddr::from((Ipv4Addr::UNSPECIFIED, addr.port()));
                warn!(
                    %addr,
                    %fallback,
                    error = %e,
                    "IPv6 unavailable, listening on IPv4 only"
                );
                TcpListener::bind(fallback).await.map_err(bind_err)?
            }
            Err(e) => return Err(bind_err(e)),
        };
        let local_addr = listener.local_addr().map_err(bind_err)?;

        Ok(Self {
            listener,
            app: router(collector, metrics_path),
            local_addr,
            shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` fires, then drains.
    ///
    /// Returns `ShutdownTimeout` if in-flight requests outlive the drain deadline;
    /// they are dropped at that point.
    pub async fn serve(self, shutdown: ShutdownToken) -> Result<(), ExporterError> {
        info!(addr = %self.local_addr, "listening");

        let signal = shutdown.clone();
        let server = axum::serve(
            self.listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.triggered().await })
        .into_future();
        let mut server = std::pin::pin!(server);

        tokio::select! {
            result = &mut server => return result.map_err(ExporterError::Server),
            _ = shutdown.triggered() => {}
        }

        info!(
            timeout_ms = self.shutdown_timeout.as_millis() as u64,
            "draining in-flight requests"
        );

        match tokio::time::timeout(self.shutdown_timeout, server).await {
            Ok(result) => {
                result.map_err(ExporterError::Server)?;
                info!("server stopped");
                Ok(())
            }
            Err(_) => Err(ExporterError::ShutdownTimeout(self.shutdown_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockInventory;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, String, Option<String>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
    }

    async fn http_get(addr: SocketAddr, path: &str) -> std::io::Result<String> {
        let mut stream = tokio::net::TcpStream::connect(addr).await?;
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok(response)
    }

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn test_metrics_ok() {
        let app = router(Arc::new(Collector::new(MockInventory::single_gpu())), "/metrics");
        let (status, body, content_type) = call(app, Method::GET, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(EXPOSITION_CONTENT_TYPE));
        assert_eq!(body.lines().count(), 6);
        assert!(body.starts_with("temperature_gpu{gpu=\"GeForce RTX 3090[0]\"} 65\n"));
    }

    #[tokio::test]
    async fn test_metrics_any_method_and_trailing_slash() {
        let collector = Arc::new(Collector::new(MockInventory::dual_gpu()));

        let app = router(collector.clone(), "/metrics");
        let (status, body, _) = call(app, Method::POST, "/metrics/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.lines().count(), 12);

        let app = router(collector.clone(), "/metrics");
        let (status, _, _) = call(app, Method::HEAD, "/metrics").await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(collector.source().calls(), 2);
    }

    #[tokio::test]
    async fn test_metrics_no_gpus_is_empty_success() {
        let app = router(Arc::new(Collector::new(MockInventory::no_gpus())), "/metrics");
        let (status, body, _) = call(app, Method::GET, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_inventory_failure_returns_500_then_recovers() {
        let mock = MockInventory::failing(
            "NVIDIA-SMI has failed because it couldn't communicate with the NVIDIA driver",
        );
        mock.push_output("GeForce RTX 3090, 0, 65, 10, 5, 24576, 20000, 4576\n");
        let collector = Arc::new(Collector::new(mock));

        let app = router(collector.clone(), "/metrics");
        let (status, body, _) = call(app, Method::GET, "/metrics").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("couldn't communicate with the NVIDIA driver"));

        let (status, body, _) = call(router(collector, "/metrics"), Method::GET, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.lines().count(), 6);
    }

    #[tokio::test]
    async fn test_malformed_row_returns_500() {
        let app = router(Arc::new(Collector::new(MockInventory::truncated_row())), "/metrics");
        let (status, body, _) = call(app, Method::GET, "/metrics").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("malformed inventory row at line 1"));
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let collector = Arc::new(Collector::new(MockInventory::single_gpu()));
        let app = router(collector.clone(), "/metrics");
        let (status, _, _) = call(app, Method::GET, "/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(collector.source().calls(), 0);
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let collector = Arc::new(Collector::new(MockInventory::single_gpu()));
        let app = router(collector, "/gpu/metrics/");
        let (status, _, _) = call(app, Method::GET, "/gpu/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_serve_and_graceful_shutdown() {
        let collector = Arc::new(Collector::new(MockInventory::single_gpu()));
        let server = PullServer::bind(loopback(), collector, "/metrics", Duration::from_secs(5))
            .await
            .unwrap();
        let addr = server.local_addr();
        assert_ne!(addr.port(), 0);

        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(server.serve(shutdown.clone()));

        let response = http_get(addr, "/metrics").await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("memory_used{gpu=\"GeForce RTX 3090[0]\"} 4576"));

        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_scrapes_do_not_wait_on_each_other() {
        let delay = Duration::from_millis(300);
        let collector = Arc::new(Collector::new(MockInventory::single_gpu().with_delay(delay)));
        let server = PullServer::bind(loopback(), collector.clone(), "/metrics", delay)
            .await
            .unwrap();
        let addr = server.local_addr();

        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(server.serve(shutdown.clone()));

        let start = std::time::Instant::now();
        let first = tokio::spawn(http_get(addr, "/metrics"));
        let second = tokio::spawn(http_get(addr, "/metrics"));
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        let elapsed = start.elapsed();

        assert!(first.starts_with("HTTP/1.1 200 OK"));
        assert!(second.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(collector.source().calls(), 2);
        assert!(elapsed < delay * 2 - Duration::from_millis(100), "took {:?}", elapsed);

        shutdown.trigger();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_all_interfaces() {
        let addr = crate::config::parse_listen_addr(":0").unwrap();
        let collector = Arc::new(Collector::new(MockInventory::single_gpu()));
        let server = PullServer::bind(addr, collector, "/metrics", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(server.local_addr().ip().is_unspecified());
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = std::net::TcpListener::bind(loopback()).unwrap();
        let addr = taken.local_addr().unwrap();

        let collector = Arc::new(Collector::new(MockInventory::single_gpu()));
        let err = PullServer::bind(addr, collector, "/metrics", Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ExporterError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_drain_deadline_exceeded() {
        let collector = Arc::new(Collector::new(
            MockInventory::single_gpu().with_delay(Duration::from_millis(500)),
        ));
        let server = PullServer::bind(
            loopback(),
            collector.clone(),
            "/metrics",
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        let addr = server.local_addr();

        let shutdown = ShutdownToken::new();
        let handle = tokio::spawn(server.serve(shutdown.clone()));
        let _client = tokio::spawn(async move { http_get(addr, "/metrics").await });

        tokio::time::timeout(Duration::from_secs(5), async {
            while collector.source().calls() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("request never reached the handler");

        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not give up draining")
            .unwrap();
        assert!(matches!(result, Err(ExporterError::ShutdownTimeout(_))));
    }
}
