//! Runner Pool Kubernetes Operator
//!
//! Main entry point for the operator. Reads configuration, sets up the
//! Kubernetes client and registry client, and runs the reconcile loop.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use runner_pool_operator::{
    adapters::{cluster::KubeCluster, registry::GitHubRegistry},
    config::OperatorConfig,
    controllers::{runner_pool_controller, Context},
    metrics,
    mirror::LocalMirror,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting Runner Pool Operator");

    let config = OperatorConfig::from_env()?;
    info!(
        registry_url = %config.registry_url,
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        queue_capacity = config.queue_capacity,
        "Loaded configuration"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let registry = GitHubRegistry::new(config.registry_url.clone(), config.registry_timeout)?;
    let (mirror, feeds) = LocalMirror::new();

    // Create shared context
    let context = Context::new(
        Arc::new(KubeCluster::new(client.clone())),
        Arc::new(registry),
        mirror.clone(),
        &config,
    );

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port, mirror));
    info!("Metrics server starting on port {}", config.metrics_port);

    // Run the runner pool controller
    let controller_handle = tokio::spawn(runner_pool_controller::run(
        context,
        client,
        feeds,
        config,
    ));

    // Handle graceful shutdown
    tokio::select! {
        _ = controller_handle => {
            error!("RunnerPool controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    info!("Runner Pool Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,runner_pool_operator=debug,kube=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
