//! influx-bridge: streams one customer's sensor readings from the bus into InfluxDB.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: tcp://127.0.0.1:5556, http://localhost:8086, database "hamilton"
//! influx-bridge acme
//!
//! # Override the bus endpoint and pool size
//! influx-bridge acme --bus-host 10.0.0.5 --bus-port 5556 --workers 50
//!
//! # Profiled environment (reads PROD_INFLUX_URL before INFLUX_URL, etc.)
//! BRIDGE_PROFILE=prod influx-bridge acme
//!
//! # Per-record write latency is logged at debug level
//! RUST_LOG=info,bridge_ingest::pool=debug influx-bridge acme
//! ```
//!
//! Logging defaults to `info`; `RUST_LOG` takes any `EnvFilter` directive.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bridge_bus::{EventSubscriber, Transport, ZmqSubscriber};
use bridge_core::config::load_dotenv;
use bridge_core::BridgeConfig;
use bridge_influx::InfluxSink;
use bridge_ingest::Pipeline;

/// Bus-to-InfluxDB ingestion bridge.
///
/// Every setting is read from the environment (and `.env`); flags override it.
#[derive(Parser, Debug)]
#[command(name = "influx-bridge", version, about)]
struct Cli {
    /// Customer whose sensor topics are ingested.
    customer_id: String,

    /// Configuration profile; keys are looked up as `{PROFILE}_{KEY}` first.
    #[arg(long, env = "BRIDGE_PROFILE")]
    profile: Option<String>,

    /// Bus transport: "tcp" or "ipc".
    #[arg(long)]
    transport: Option<String>,

    /// Bus publisher host (tcp).
    #[arg(long)]
    bus_host: Option<String>,

    /// Bus publisher port (tcp).
    #[arg(long)]
    bus_port: Option<u16>,

    /// IPC socket name (ipc).
    #[arg(long)]
    ipc_name: Option<String>,

    /// InfluxDB base URL.
    #[arg(long)]
    influx_url: Option<String>,

    /// InfluxDB database.
    #[arg(long)]
    database: Option<String>,

    /// Number of writer tasks.
    #[arg(long)]
    workers: Option<usize>,

    /// Queue capacity before records are dropped.
    #[arg(long)]
    capacity: Option<usize>,
}

impl Cli {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(v) = &self.transport {
            config.bus.transport = v.clone();
        }
        if let Some(v) = &self.bus_host {
            config.bus.host = v.clone();
        }
        if let Some(v) = self.bus_port {
            config.bus.port = v;
        }
        if let Some(v) = &self.ipc_name {
            config.bus.ipc_name = v.clone();
        }
        if let Some(v) = &self.influx_url {
            config.influx.url = v.clone();
        }
        if let Some(v) = &self.database {
            config.influx.database = v.clone();
        }
        if let Some(v) = self.workers {
            config.pipeline.worker_count = v;
        }
        if let Some(v) = self.capacity {
            config.pipeline.queue_capacity = v;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    anyhow::ensure!(!cli.customer_id.trim().is_empty(), "customer id must not be empty");

    let mut config = BridgeConfig::for_profile(cli.profile.as_deref().unwrap_or(""))
        .context("invalid configuration")?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;
    config.log_summary();

    let sink = InfluxSink::new(&config.influx)?;
    sink.ping()
        .await
        .with_context(|| format!("InfluxDB at {} is not reachable", config.influx.url))?;

    let bus = &config.bus;
    let transport = Transport::from_parts(&bus.transport, &bus.host, bus.port, &bus.ipc_name);
    let subscriber = ZmqSubscriber::connect(&transport)
        .await
        .with_context(|| format!("connecting to bus at {transport}"))?;
    let prefix = bus.subscription_prefix(&cli.customer_id);
    subscriber.subscribe(&prefix).await?;

    info!(customer = %cli.customer_id, topic_prefix = %prefix, "starting influx-bridge");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    let report = Pipeline::from_config(&config)
        .run(&subscriber, Arc::new(sink), shutdown)
        .await?;

    info!(
        written = report.written,
        failed = report.failed,
        dropped = report.adapter.dropped,
        "influx-bridge exited cleanly"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM, waiting for ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn customer_id_is_required() {
        assert!(Cli::try_parse_from(["influx-bridge"]).is_err());
        let cli = Cli::try_parse_from(["influx-bridge", "acme", "--workers", "4"]).unwrap();
        assert_eq!(cli.customer_id, "acme");
        assert_eq!(cli.workers, Some(4));
    }

    #[test]
    fn documented_latency_filter_parses() {
        let filter = tracing_subscriber::EnvFilter::try_new("info,bridge_ingest::pool=debug")
            .unwrap();
        assert!(filter.to_string().contains("bridge_ingest::pool=debug"));
    }
}
