//! nvsmi-exporter - GPU telemetry exporter.
//!
//! Serves `nvidia-smi` readings over HTTP for scraping, or writes them to a
//! file (or stdout) on a fixed interval when `--text-path` is set.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use nvsmi_exporter::collector::SmiCommand;
use nvsmi_exporter::config::{
    ExporterConfig, OutputTarget, parse_duration, parse_listen_addr, parse_metrics_path,
};
use nvsmi_exporter::exposition::MetricSpec;
use nvsmi_exporter::lifecycle;
use nvsmi_exporter::shutdown::ShutdownToken;

/// GPU telemetry exporter.
#[derive(Parser, Debug)]
#[command(name = "nvsmi-exporter", about = "GPU telemetry exporter", version)]
struct Args {
    /// Address to listen on for HTTP (":port" binds all interfaces, IPv6 and IPv4).
    #[arg(
        long,
        default_value = ExporterConfig::DEFAULT_LISTEN,
        env = "NVSMI_EXPORTER_ADDR",
        value_parser = parse_listen_addr
    )]
    addr: SocketAddr,

    /// Path to write metrics text to ("-" for stdout).
    /// Setting this disables the HTTP endpoint.
    #[arg(long, alias = "textPath", default_value = "", env = "NVSMI_EXPORTER_TEXT_PATH")]
    text_path: String,

    /// Time between text updates (e.g., "5s", "1.5s", "1m30s"; bare integers are milliseconds).
    #[arg(
        long,
        alias = "textUpdate",
        default_value = "5s",
        env = "NVSMI_EXPORTER_TEXT_UPDATE",
        value_parser = parse_duration
    )]
    text_update: Duration,

    /// Maximum time to wait for in-flight requests on shutdown.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    shutdown_timeout: Duration,

    /// HTTP path serving the metrics.
    #[arg(
        long,
        default_value = ExporterConfig::DEFAULT_METRICS_PATH,
        value_parser = parse_metrics_path
    )]
    metrics_path: String,

    /// Inventory binary to run.
    #[arg(long, default_value = SmiCommand::DEFAULT_PROGRAM, env = "NVSMI_EXPORTER_SMI_PATH")]
    smi_path: PathBuf,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn into_config(self) -> ExporterConfig {
        ExporterConfig {
            listen: self.addr,
            output: OutputTarget::from_arg(&self.text_path),
            interval: self.text_update,
            shutdown_timeout: self.shutdown_timeout,
            metrics_path: self.metrics_path,
            smi_path: self.smi_path,
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Logs go to stderr so stdout stays free for metrics text.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("nvsmi_exporter={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let config = args.into_config();

    info!("nvsmi-exporter {} starting", nvsmi_exporter::VERSION);
    match &config.output {
        None => info!(
            "Config: pull mode, addr={}, path={}, smi={}",
            config.listen,
            config.metrics_path,
            config.smi_path.display()
        ),
        Some(target) => info!(
            "Config: push mode, output={}, interval={:?}, smi={}",
            target,
            config.interval,
            config.smi_path.display()
        ),
    }

    let shutdown = ShutdownToken::new();
    if let Err(e) = shutdown.install_ctrlc_handler() {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build tokio runtime: {}", e);
            process::exit(1);
        }
    };

    let source = SmiCommand::new(&config.smi_path, &MetricSpec::gpu());
    let result = runtime.block_on(lifecycle::run(&config, source, shutdown));

    // Blocking inventory calls still running are abandoned after the deadline.
    runtime.shutdown_timeout(config.shutdown_timeout);

    match result {
        Ok(()) => info!("Shutdown complete"),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
