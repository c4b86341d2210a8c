//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use user_management_operator::prelude::*;
//! ```
//!
//! This brings into scope:
//! - CRD types (AccountIAM, AccountIAMStatus, etc.)
//! - The resource store trait and its implementations
//! - Reconciler types (Reconciler, ReconcileOrchestrator, CycleError, etc.)
//! - Config types (ControllerConfig)

// CRD types - most commonly used
pub use crate::crd::*;

// Resource store - needed to drive a cycle
pub use crate::store::{
    KubeStore, MemoryStore, Propagation, ResourceKind, ResourceStore, StoreError,
};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile, BackoffState, CycleError, CycleReport, ErrorClass, ReconcileOrchestrator,
    Reconciler, ReconcilerError, RestartSettings, Stage,
};

// Config types - for configuration management
pub use crate::config::ControllerConfig;
