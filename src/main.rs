//! # User Management Operator
//!
//! A Kubernetes operator that installs and converges the account IAM operand for every
//! `AccountIAM` instance.
//!
//! ## Overview
//!
//! Each reconciliation cycle:
//!
//! 1. **Verifies prerequisites** - the EDB Postgres and WebSphere Liberty operators must be installed
//! 2. **Establishes the bootstrap secret** - generated credentials are created once and then reused
//! 3. **Applies the operand** - rendered manifests are created or updated, owned by the instance
//! 4. **Integrates with the platform** - IM configuration job and UI resources
//! 5. **Restarts identity components** - when the issuer URL changed, waiting for readiness
//!
//! ## Features
//!
//! - **Idempotent cycles**: every step is safe to re-run from any partial state
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks

use anyhow::Result;
use user_management_operator::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialization::initialize().await?;

    watch_loop::run_watch_loop(init.instances, init.reconciler, init.server_state, init.config)
        .await
}
