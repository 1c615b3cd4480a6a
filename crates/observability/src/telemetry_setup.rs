use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

use crate::structured_logger::{LogFormat, LoggingConfig};

/// Initialise the global tracing subscriber. `RUST_LOG` overrides the configured level.
pub fn init_structured_logging(config: LoggingConfig) -> Result<()> {
    let level = config.level.clone();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.level.clone().into());

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id)
                .with_thread_names(config.include_thread_name)
                .with_span_events(FmtSpan::CLOSE);

            registry.with(fmt_layer).try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id)
                .with_thread_names(config.include_thread_name);

            registry.with(fmt_layer).try_init()?;
        }
        LogFormat::Compact => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_id)
                .with_thread_names(config.include_thread_name);

            registry.with(fmt_layer).try_init()?;
        }
    }

    info!(
        logging.format = ?config.format,
        logging.level = level,
        logging.location = config.include_location,
        "Structured logging initialized"
    );

    Ok(())
}

/// Install the Prometheus recorder with an HTTP scrape endpoint.
pub fn init_metrics_exporter(listen: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    info!(metrics.listen = %listen, "Prometheus metrics exporter installed");
    Ok(())
}
