//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.
//!
//! Retry delay depends on the class of the failure:
//! - `PrerequisiteMissing`, `DataIntegrity`: Fibonacci backoff per instance, these need an operator
//! - `TransientStore`, `Cancelled`: short fixed requeue
//! - `Timeout`: short fixed requeue, escalated once an instance keeps timing out

use crate::config::ControllerConfig;
use crate::controller::reconciler::{BackoffState, ErrorClass, Reconciler, ReconcilerError};
use crate::crd::AccountIAM;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How a failed cycle is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub delay: Duration,
    /// Label for the requeue metric
    pub reason: &'static str,
    /// The instance has timed out often enough to need attention
    pub escalate: bool,
}

/// Advance `state` for a failure of `class` and decide the retry delay
pub fn retry_delay(
    class: ErrorClass,
    state: &mut BackoffState,
    config: &ControllerConfig,
) -> RetryDecision {
    state.increment_error();
    let transient = config.transient_requeue_duration();
    match class {
        ErrorClass::PrerequisiteMissing | ErrorClass::DataIntegrity => {
            state.consecutive_timeouts = 0;
            RetryDecision {
                delay: state.backoff.next_backoff(),
                reason: "error-backoff",
                escalate: false,
            }
        }
        ErrorClass::TransientStore => {
            state.consecutive_timeouts = 0;
            RetryDecision {
                delay: transient,
                reason: "transient",
                escalate: false,
            }
        }
        ErrorClass::Cancelled => RetryDecision {
            delay: transient,
            reason: "cancelled",
            escalate: false,
        },
        ErrorClass::Timeout => {
            state.consecutive_timeouts += 1;
            RetryDecision {
                delay: transient,
                reason: "restart-timeout",
                escalate: state.consecutive_timeouts >= config.timeout_escalation_threshold,
            }
        }
    }
}

/// Handle reconciliation errors with class-dependent backoff
///
/// Backoff state is tracked per instance to avoid cross-resource interference.
pub fn handle_reconciliation_error(
    obj: Arc<AccountIAM>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");
    let class = error.class();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        class = class.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    observability::metrics::increment_reconciliation_errors(class.as_str());

    let resource_key = format!("{namespace}/{name}");
    let (decision, error_count, consecutive_timeouts) = {
        let mut states = match ctx.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => {
                warn!("Backoff state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let state = states.entry(resource_key.clone()).or_insert_with(|| {
            BackoffState::new(ctx.config.backoff_min_minutes, ctx.config.backoff_max_minutes)
        });
        let decision = retry_delay(class, state, &ctx.config);
        (decision, state.error_count, state.consecutive_timeouts)
    };

    if decision.escalate {
        error!(
            consecutive_timeouts,
            "🚨 {} keeps timing out waiting for restarted components: {}",
            resource_key,
            error
        );
    } else {
        error!("Reconciliation error for {}: {}", name, error);
    }

    info!(
        "🔄 Retrying in {}s (error count: {}, reason: {})",
        decision.delay.as_secs(),
        error_count,
        decision.reason
    );

    observability::metrics::increment_requeues_total(decision.reason);
    Action::requeue(decision.delay)
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay_secs: u64,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    // 404 first: a plain-text 404 surfaces as a serde error mentioning WatchFailed
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");

    if is_401 {
        error!("❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
        error!("   Verify the operator ServiceAccount can still list accountiams.operator.ibm.com");
        warn!(
            "⏳ Waiting {}s before retrying watch...",
            watch_restart_delay_secs
        );
        tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
        None
    } else if is_410 {
        warn!(error_type = "410", "Watch resource version expired, watch will restart");
        None
    } else if is_429 {
        let current_backoff = backoff.load(Ordering::Relaxed);
        warn!(
            "API server storage reinitializing (429), backing off for {}ms before restart...",
            current_backoff
        );
        tokio::time::sleep(Duration::from_millis(current_backoff)).await;
        backoff.store(
            current_backoff.saturating_mul(2).min(max_backoff_ms),
            Ordering::Relaxed,
        );
        None
    } else if is_not_found {
        warn!(
            "AccountIAM CRD or resource not found (404) - the CRD may not be installed. Error: {}",
            error_string
        );
        Some(())
    } else {
        error!("Controller stream error: {}", error_string);
        tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
        None
    }
}
