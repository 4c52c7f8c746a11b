use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use eyre::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use govwatch::health::{self, HealthState};
use govwatch::{
    ClientPool, LogSink, MemStore, MonitorConfig, ProposalPoller, RegistryRefresher,
    UpgradeTracker,
};

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the monitor config file
    #[arg(short, long)]
    config: PathBuf,
}

impl RunArgs {
    pub async fn run(self) -> Result<()> {
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .init();

        let config = Arc::new(MonitorConfig::load(&self.config)?);
        info!(
            mode = ?config.mode,
            supported_chains = config.supported_chains.len(),
            seeded_chains = config.chains.len(),
            "starting govwatchd"
        );

        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install metrics recorder")?;
        govwatch::telemetry::describe();

        let store: Arc<MemStore> = Arc::new(MemStore::from_config(&config));
        let pool = Arc::new(ClientPool::new(config.http.request_timeout()));
        let sink = Arc::new(LogSink);

        let token = CancellationToken::new();

        let poller = ProposalPoller::new(store.clone(), sink.clone(), pool.clone(), config.clone());
        let poller_token = token.clone();
        let poller_handle = tokio::spawn(async move { poller.run(poller_token).await });

        let tracker = UpgradeTracker::new(store.clone(), sink, pool, config.clone());
        let tracker_token = token.clone();
        let tracker_handle = tokio::spawn(async move { tracker.run(tracker_token).await });

        let refresher = RegistryRefresher::new(store.clone(), config.clone())?;
        let refresher_token = token.clone();
        let refresher_handle = tokio::spawn(async move { refresher.run(refresher_token).await });

        let health_handle = config.health_port.map(|port| {
            let state = HealthState {
                store: store.clone(),
                metrics: metrics_handle,
                start_time: Instant::now(),
            };
            let health_token = token.clone();
            tokio::spawn(async move {
                if let Err(err) = health::serve(port, state, health_token).await {
                    error!(%err, "health server exited with error");
                }
            })
        });

        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => info!("received SIGINT, shutting down gracefully"),
        }

        token.cancel();

        // Runners exit at their next cancellation point; in-flight requests
        // finish or hit their own timeout.
        let _ = poller_handle.await;
        let _ = tracker_handle.await;
        let _ = refresher_handle.await;
        if let Some(handle) = health_handle {
            let _ = handle.await;
        }

        info!("shutdown complete");
        Ok(())
    }
}
