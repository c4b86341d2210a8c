//! # Status Updates
//!
//! Writes the outcome of a cycle to the instance status.

use crate::constants::FIELD_MANAGER;
use crate::controller::reconciler::orchestrator::CycleReport;
use crate::controller::reconciler::types::{CycleError, Reconciler};
use crate::crd::{AccountIAM, AccountIAMStatus, Condition, Phase};
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use tracing::debug;

const READY_CONDITION: &str = "Ready";

/// Status describing `report`, or `None` when nothing visible changed
///
/// Only a change of phase or description produces a new status, so patching it does not
/// feed another cycle with an identical outcome.
pub fn desired_status(instance: &AccountIAM, report: &CycleReport) -> Option<AccountIAMStatus> {
    if !report.instance_found {
        return None;
    }

    let (phase, description, reason) = if report.suspended {
        (
            Phase::Pending,
            "Reconciliation suspended".to_string(),
            "Suspended".to_string(),
        )
    } else {
        match &report.error {
            Some(CycleError::Cancelled { stage }) => (
                Phase::Reconciling,
                format!("Cycle interrupted during {stage}"),
                "Cancelled".to_string(),
            ),
            Some(error) => (
                Phase::Failed,
                error.to_string(),
                error.class().as_str().to_string(),
            ),
            None => (
                Phase::Ready,
                "All resources reconciled".to_string(),
                "ReconciliationSucceeded".to_string(),
            ),
        }
    };

    let current = instance.status.as_ref();
    if current.and_then(|s| s.phase.as_deref()) == Some(phase.as_str())
        && current.and_then(|s| s.description.as_deref()) == Some(description.as_str())
    {
        return None;
    }

    let now = chrono::Utc::now().to_rfc3339();
    let condition_status = if phase == Phase::Ready { "True" } else { "False" };
    let last_transition_time = current
        .and_then(|s| s.conditions.iter().find(|c| c.r#type == READY_CONDITION))
        .filter(|c| c.status == condition_status)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| now.clone());

    Some(AccountIAMStatus {
        phase: Some(phase.as_str().to_string()),
        description: Some(description.clone()),
        conditions: vec![Condition {
            r#type: READY_CONDITION.to_string(),
            status: condition_status.to_string(),
            last_transition_time: Some(last_transition_time),
            reason: Some(reason),
            message: Some(description),
        }],
        observed_generation: instance.metadata.generation,
        last_reconcile_time: Some(now),
        last_failure_class: report
            .error
            .as_ref()
            .map(|e| e.class().as_str().to_string()),
    })
}

/// Patch the status subresource when the cycle outcome changed it
pub async fn update_status(
    reconciler: &Reconciler,
    instance: &AccountIAM,
    report: &CycleReport,
) -> Result<()> {
    let Some(status) = desired_status(instance, report) else {
        debug!("Skipping status update - phase and description unchanged");
        return Ok(());
    };

    let api: kube::Api<AccountIAM> = kube::Api::namespaced(
        reconciler.client.clone(),
        instance.metadata.namespace.as_deref().unwrap_or("default"),
    );

    let patch = serde_json::json!({
        "status": status
    });

    api.patch_status(
        instance.metadata.name.as_deref().unwrap_or("unknown"),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(patch),
    )
    .await?;

    Ok(())
}
