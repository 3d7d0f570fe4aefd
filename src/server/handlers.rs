//! HTTP request handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

use super::scrape_log::ScrapeReport;
use crate::collector::{Collector, InventorySource};

/// Content type of the text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Runs the pipeline for one scrape.
///
/// Every request spawns its own inventory query; nothing is cached or shared.
pub(crate) async fn handle_metrics<S: InventorySource>(
    State(collector): State<Arc<Collector<S>>>,
) -> Response {
    let start = Instant::now();
    // The inventory command blocks, so keep it off the async workers.
    let result = tokio::task::spawn_blocking(move || collector.collect_timed()).await;

    let mut report = ScrapeReport {
        devices: None,
        inventory: None,
        collect: start.elapsed(),
    };

    let mut response = match result {
        Ok(Ok((sample, timing))) => {
            report.devices = Some(sample.devices());
            report.inventory = Some(timing.query);
            (
                [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
                sample.render(),
            )
                .into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "failed to collect metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "metrics collection panicked in spawn_blocking");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "metrics collection failed".to_string(),
            )
                .into_response()
        }
    };

    response.extensions_mut().insert(report);
    response
}
