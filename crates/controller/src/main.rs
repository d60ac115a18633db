//! auto-cluster - fleet controller
//!
//! Periodically reconciles every configured archetype: reads the running
//! instances from the cloud inventory, plans creations and deletions, and
//! drives the installer to carry them out.

use anyhow::Result;
use auto_cluster::{api, config::ControllerArgs};
use clap::Parser;
use controller_lib::{
    executor::Executor,
    health::HealthRegistry,
    inventory::AwsCliInventory,
    notify::WebhookNotifier,
    observability::{ControllerMetrics, StructuredLogger},
    reconcile::{Controller, ControllerState},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with RUST_LOG filtering
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = ControllerArgs::parse();
    let settings = args.load_settings()?;
    info!(
        archetypes = settings.archetypes.len(),
        state_dir = %settings.state_dir.display(),
        "Controller configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = ControllerMetrics::new()?;
    let logger = StructuredLogger::default();
    logger.log_startup(CONTROLLER_VERSION, settings.archetypes.len(), settings.dry_run);

    let mut executor = Executor::from_settings(&settings).with_logger(logger.clone());
    if let Some(url) = &settings.notifications.webhook_url {
        executor = executor.with_notifier(Arc::new(WebhookNotifier::new(url.clone())?));
    }

    let state = ControllerState::new();
    let controller = Controller::builder()
        .settings(&settings)
        .inventory(Arc::new(AwsCliInventory::new(&settings.inventory)))
        .executor(executor)
        .state(state.clone())
        .health(health_registry.clone())
        .metrics(metrics.clone())
        .logger(logger.clone())
        .build()?;

    if args.once {
        let result = controller.run_once().await;
        logger.log_shutdown("single cycle finished");
        return result.map_err(Into::into);
    }

    let (shutdown_tx, _) = broadcast::channel(1);

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        state,
    ));
    let api_handle = tokio::spawn(api::serve(
        settings.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    let mut controller_handle = tokio::spawn(controller.run(shutdown_tx.subscribe()));

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            logger.log_shutdown("SIGINT received");
            let _ = shutdown_tx.send(());
            // An in-flight cycle finishes before the loop observes shutdown
            controller_handle.await?
        }
        joined = &mut controller_handle => {
            let _ = shutdown_tx.send(());
            joined?
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "Reconcile loop stopped");
        logger.log_shutdown("cycle failure");
    }

    if let Err(e) = api_handle.await? {
        error!(error = %e, "API server failed");
    }

    result.map_err(Into::into)
}
