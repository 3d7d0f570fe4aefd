//! Lifecycle controller: picks the delivery strategy and drives it to an orderly stop.

use std::sync::Arc;

use tracing::{error, info};

use crate::collector::{Collector, InventorySource};
use crate::config::{DeliveryMode, ExporterConfig};
use crate::error::ExporterError;
use crate::server::PullServer;
use crate::shutdown::ShutdownToken;
use crate::writer::PushWriter;

/// Runs the configured delivery strategy until `shutdown` fires.
///
/// Startup failures (`Bind`, `SinkUnavailable`) and server failures are returned.
/// A drain that exceeds its deadline is logged and treated as a completed shutdown.
pub async fn run<S: InventorySource>(
    config: &ExporterConfig,
    source: S,
    shutdown: ShutdownToken,
) -> Result<(), ExporterError> {
    let collector = Arc::new(Collector::new(source));

    let result = match config.mode() {
        DeliveryMode::Pull => {
            let server = PullServer::bind(
                config.listen,
                collector,
                &config.metrics_path,
                config.shutdown_timeout,
            )
            .await?;
            server.serve(shutdown).await
        }
        DeliveryMode::Push(target) => {
            info!(output = %target, "push mode");
            PushWriter::new(collector, &target, config.interval)?
                .run(shutdown)
                .await
        }
    };

    match result {
        Err(e @ ExporterError::ShutdownTimeout(_)) => {
            error!(error = %e, "forcing shutdown");
            Ok(())
        }
        other => other,
    }
}
