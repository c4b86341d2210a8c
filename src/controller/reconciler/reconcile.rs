//! # Reconcile
//!
//! Entry point handed to the kube-runtime controller: runs one cycle for the instance,
//! records metrics, patches status and hands the failure to the error policy.

use crate::controller::reconciler::status::update_status;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::AccountIAM;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub async fn reconcile(
    instance: Arc<AccountIAM>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let name = instance.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = instance.metadata.namespace.as_deref().unwrap_or("default");

    observability::metrics::increment_reconciliations();
    debug!(
        resource.name = name,
        resource.namespace = namespace,
        resource.generation = instance.metadata.generation.unwrap_or(0),
        "reconcile.start"
    );

    // Cancelled with the process; an interrupted cycle is picked up again on restart
    let cancel = ctx.shutdown.child_token();
    let report = ctx.orchestrator.run(namespace, name, &cancel).await;
    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    if let Err(e) = update_status(&ctx, &instance, &report).await {
        warn!(
            resource.name = name,
            resource.namespace = namespace,
            "Failed to update status: {}",
            e
        );
    }

    match report.error {
        None => {
            ctx.reset_backoff(&format!("{namespace}/{name}"));
            if report.completed() {
                info!(
                    resource.name = name,
                    resource.namespace = namespace,
                    duration_ms = start.elapsed().as_millis(),
                    "Reconciliation successful"
                );
            }
            Ok(Action::await_change())
        }
        Some(error) => Err(ReconcilerError::Cycle(error)),
    }
}
