use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use availability_operator::client::ClusterClient;
use availability_operator::health::{HealthState, Metrics, run_health_server};
use availability_operator::{
    AdaptiveClient, Clock, Context, KubeClient, KubeEventPublisher, OperatorConfig, PolicyCache,
    SystemClock, WorkloadQueue, run_policy_controller, run_workload_controller,
};

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

/// How often cache statistics are published to the metrics plane
const CACHE_STATS_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install the TLS crypto provider before any TLS operations
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("availability_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .init();

    info!("Starting availability-operator");

    let config = OperatorConfig::from_env()?;
    info!(?config, "Loaded configuration");

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let shutdown = CancellationToken::new();
    let metrics = Arc::new(Metrics::new());
    let health_state = Arc::new(HealthState::new(metrics.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Start health server immediately so probes work during startup
    let health_handle = {
        let health_state = health_state.clone();
        let addr = config.health_addr;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, addr).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let adaptive = Arc::new(
        AdaptiveClient::new(
            KubeClient::new(client.clone()),
            config.adaptive_config(),
            clock.clone(),
        )
        .with_metrics(metrics.clone()),
    );

    // The AvailabilityPolicy CRD must be served before anything else runs
    if let Err(e) = adaptive.list_policies(None, Some(1)).await {
        if e.is_not_found() {
            error!("AvailabilityPolicy CRD is not installed");
            return Err(e.into());
        }
        warn!("Could not verify the AvailabilityPolicy CRD: {}", e);
    }

    adaptive.probe().await;
    let mut background = adaptive.spawn_background(shutdown.clone());

    let cache = Arc::new(PolicyCache::new(config.cache_config(), clock.clone()));
    background.push(tokio::spawn(cache.clone().run_sweeper(shutdown.clone())));
    background.push({
        let cache = cache.clone();
        let metrics = metrics.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CACHE_STATS_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => metrics.set_cache_stats(&cache.stats().await),
                }
            }
        })
    });

    let (queue, queue_rx) = WorkloadQueue::channel();
    let cluster_client: Arc<dyn ClusterClient> = adaptive.clone();
    let ctx = Arc::new(Context::new(
        cluster_client,
        cache,
        Arc::new(KubeEventPublisher::new(client.clone())),
        clock,
        config.clone(),
        metrics,
        queue,
    ));

    let mut controllers = Vec::new();
    controllers.push(tokio::spawn(run_policy_controller(
        client.clone(),
        ctx.clone(),
        shutdown.clone(),
    )));
    if config.pdb_controller_enabled {
        controllers.push(tokio::spawn(run_workload_controller(
            client,
            ctx,
            queue_rx,
            shutdown.clone(),
        )));
    } else {
        warn!("PDB controller disabled, policies are evaluated but no PDBs are written");
    }

    health_state.set_ready(true).await;
    info!(
        "Watching AvailabilityPolicy resources (apiVersion: availability.example.com/v1alpha1)"
    );

    tokio::select! {
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
        }
    }

    // Mark as not ready to stop receiving new work
    health_state.set_ready(false).await;
    shutdown.cancel();

    // Give in-flight reconciliations time to complete
    let grace = Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS);
    let drain = futures::future::join_all(controllers.into_iter().chain(background));
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!("Grace period elapsed before all tasks stopped");
    }

    info!("Operator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
