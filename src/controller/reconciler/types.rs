//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::orchestrator::ReconcileOrchestrator;
use crate::store::StoreError;
use kube::Client;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Stages of one reconciliation cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchInstance,
    VerifyPrerequisites,
    EstablishBootstrap,
    ApplyCoreResources,
    ConfigureDependentIntegration,
    RestartAffectedComponents,
    Done,
}

impl Stage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchInstance => "fetch-instance",
            Stage::VerifyPrerequisites => "verify-prerequisites",
            Stage::EstablishBootstrap => "establish-bootstrap",
            Stage::ApplyCoreResources => "apply-core-resources",
            Stage::ConfigureDependentIntegration => "configure-dependent-integration",
            Stage::RestartAffectedComponents => "restart-affected-components",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of a failed cycle; drives the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    PrerequisiteMissing,
    TransientStore,
    DataIntegrity,
    Timeout,
    Cancelled,
}

impl ErrorClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::PrerequisiteMissing => "PrerequisiteMissing",
            ErrorClass::TransientStore => "TransientStore",
            ErrorClass::DataIntegrity => "DataIntegrity",
            ErrorClass::Timeout => "Timeout",
            ErrorClass::Cancelled => "Cancelled",
        }
    }
}

/// Why a cycle was aborted
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("required capability {api_group_version} {kind} is not installed (provided by {provider})")]
    PrerequisiteMissing {
        api_group_version: String,
        kind: String,
        provider: String,
    },
    #[error("store failure during {stage}: {source}")]
    TransientStore {
        stage: Stage,
        #[source]
        source: StoreError,
    },
    #[error("data integrity failure during {stage}: {reason}")]
    DataIntegrity { stage: Stage, reason: String },
    #[error("{target} did not become ready within {timeout_secs}s")]
    Timeout { target: String, timeout_secs: u64 },
    #[error("cycle cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl CycleError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            CycleError::PrerequisiteMissing { .. } => ErrorClass::PrerequisiteMissing,
            CycleError::TransientStore { .. } => ErrorClass::TransientStore,
            CycleError::DataIntegrity { .. } => ErrorClass::DataIntegrity,
            CycleError::Timeout { .. } => ErrorClass::Timeout,
            CycleError::Cancelled { .. } => ErrorClass::Cancelled,
        }
    }

    /// Store errors that retrying cannot fix (rejected or unparseable objects) are data
    /// integrity failures; everything else is transient
    pub fn from_store(stage: Stage, error: StoreError) -> Self {
        if error.is_permanent() {
            CycleError::DataIntegrity {
                stage,
                reason: error.to_string(),
            }
        } else {
            CycleError::TransientStore {
                stage,
                source: error,
            }
        }
    }

    pub fn data_integrity(stage: Stage, reason: impl fmt::Display) -> Self {
        CycleError::DataIntegrity {
            stage,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    /// Error class for retry policy and metrics; failures outside a cycle count as transient
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcilerError::Cycle(e) => e.class(),
            ReconcilerError::ReconciliationFailed(_) => ErrorClass::TransientStore,
        }
    }
}

/// Backoff state for a specific instance
/// Tracks error count, backoff calculator and consecutive restart timeouts
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
    pub consecutive_timeouts: u32,
}

impl BackoffState {
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
            consecutive_timeouts: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.consecutive_timeouts = 0;
        self.backoff.reset();
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    pub orchestrator: Arc<ReconcileOrchestrator>,
    pub config: ControllerConfig,
    // Parent of every cycle's cancellation token; cancelled on process shutdown
    pub shutdown: CancellationToken,
    // Backoff state per instance (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        client: Client,
        orchestrator: Arc<ReconcileOrchestrator>,
        config: ControllerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            orchestrator,
            config,
            shutdown,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Clear backoff state after a successful cycle
    pub fn reset_backoff(&self, resource_key: &str) {
        let mut states = match self.backoff_states.lock() {
            Ok(states) => states,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(state) = states.get_mut(resource_key) {
            state.reset();
        }
    }
}
