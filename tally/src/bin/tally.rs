use std::path::Path;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tally::config::{self, Config, Telemetry};
use tally::server::Api;
use tally::signals::Shutdown;
use tally_window::{SharedWindow, Window};
use tokio::{runtime::Builder, signal};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("Failed to load tally config: {0}")]
    Config(#[from] config::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("API server returned an error: {0}")]
    Server(#[from] tally::server::Error),
    #[error("API server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn default_config_path() -> String {
    "/etc/tally/tally.yaml".to_string()
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// path on disk to the configuration file
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
}

async fn inner_main(mut config: Config) -> Result<(), Error> {
    // Set up the telemetry sub-system before anything records a metric.
    if let Some(Telemetry::Prometheus {
        addr,
        global_labels,
    }) = config.telemetry.take()
    {
        let mut builder = PrometheusBuilder::new().with_http_listener(addr);
        for (k, v) in global_labels {
            builder = builder.add_global_label(k, v);
        }
        tokio::spawn(async move {
            builder
                .install()
                .expect("failed to install prometheus recorder");
        });
    }

    // The one window this process will ever own, handed to the API by
    // explicit reference.
    let window = SharedWindow::new(Window::new());
    let shutdown = Shutdown::new();

    let api = Api::new(&config, window, shutdown.clone());
    let mut server = tokio::spawn(api.run());

    tokio::select! {
        res = &mut server => {
            error!("server shutdown unexpectedly");
            res??;
        }
        _ = signal::ctrl_c() => {
            info!("received ctrl-c, signalling shutdown");
            if let Err(e) = shutdown.signal() {
                error!("failed to signal shutdown: {e}");
            }
            server.await??;
        }
    }

    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting tally {version}.");

    let cli = Cli::parse();
    let config = config::load_config_from_path(Path::new(&cli.config_path))?;

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(config));
    info!("Shutdown complete.");
    res
}
