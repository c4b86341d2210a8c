//! # AccountIAM Status
//!
//! Status types for tracking reconciliation state and conditions.

use serde::{Deserialize, Serialize};

/// Reconciliation phase reported on the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Suspended, or not yet reconciled
    Pending,
    /// A cycle was interrupted before it finished
    Reconciling,
    /// The last cycle converged
    Ready,
    /// The last cycle aborted
    Failed,
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Reconciling => "Reconciling",
            Phase::Ready => "Ready",
            Phase::Failed => "Failed",
        }
    }
}

/// Status of the AccountIAM resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountIAMStatus {
    /// Current phase of reconciliation
    /// Values: Pending, Reconciling, Ready, Failed
    #[serde(default)]
    pub phase: Option<String>,
    /// Human-readable description of current state
    #[serde(default)]
    pub description: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last reconciliation time (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
    /// Error class that aborted the last cycle
    /// Values: PrerequisiteMissing, TransientStore, DataIntegrity, Timeout, Cancelled
    #[serde(default)]
    pub last_failure_class: Option<String>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
