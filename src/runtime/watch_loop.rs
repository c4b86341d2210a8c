//! # Watch Loop
//!
//! Controller watch loop that monitors AccountIAM resources and triggers
//! reconciliation when changes are detected.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::AccountIAM;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{controller::Action, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Run the controller watch loop
///
/// Watches AccountIAM instances and reconciles each change. On SIGINT/SIGTERM the server
/// is marked not ready and in-flight cycles are cancelled at their next checkpoint.
/// The watch is restarted when its stream ends unexpectedly.
pub async fn run_watch_loop(
    instances: Api<AccountIAM>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: ControllerConfig,
) -> Result<(), anyhow::Error> {
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.watch_backoff_start_ms));

    let shutdown_server_state = server_state.clone();
    let shutdown = reconciler.shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
        shutdown.cancel();
        info!("Marked server as not ready, cancelling in-flight reconciliations...");
    });

    loop {
        if reconciler.shutdown.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff = backoff_duration_ms.clone();
        let backoff_start_ms = config.watch_backoff_start_ms;
        let max_backoff_ms = config.watch_backoff_max_ms;
        let watch_restart_delay_secs = config.watch_restart_delay_secs;
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!("Starting controller watch loop...");
        Controller::new(instances.clone(), watcher::Config::default().any_semantic())
            .shutdown_on_signal()
            .run(
                create_reconcile_fn,
                |obj, error, ctx| handle_reconciliation_error(obj, error, ctx),
                reconciler.clone(),
            )
            .filter_map(move |x| {
                let backoff = backoff.clone();
                async move {
                    match &x {
                        Ok(_) => {
                            backoff.store(backoff_start_ms, Ordering::Relaxed);
                            debug!("watch.event.success");
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                max_backoff_ms,
                                watch_restart_delay_secs,
                            )
                            .await
                            .map(|()| x)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if reconciler.shutdown.is_cancelled() || !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            config.watch_restart_delay_secs
        );
        tokio::time::sleep(config.watch_restart_delay_duration()).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Create the reconciliation function for the controller
fn create_reconcile_fn(
    obj: Arc<AccountIAM>,
    ctx: Arc<Reconciler>,
) -> impl std::future::Future<Output = Result<Action, ReconcilerError>> + Send {
    let name = obj.metadata.name.clone().unwrap_or_else(|| "unknown".to_string());
    let namespace = obj
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());

    async move {
        debug!(
            resource.name = name.as_str(),
            resource.namespace = namespace.as_str(),
            resource.version = obj.metadata.resource_version.as_deref().unwrap_or("unknown"),
            suspended = obj.spec.suspend,
            "watch.event.received"
        );

        let result = reconcile(obj, ctx).await;

        match &result {
            Ok(action) => {
                debug!(resource.name = name.as_str(), action = ?action, "watch.event.reconciled");
            }
            Err(e) => {
                debug!(resource.name = name.as_str(), error = %e, "watch.event.reconciliation_failed");
            }
        }

        result
    }
}
