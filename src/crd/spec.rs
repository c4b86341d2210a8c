//! # AccountIAM Spec
//!
//! The managed instance: one `AccountIAM` per namespace drives the whole operand.

use serde::{Deserialize, Serialize};

/// AccountIAM Custom Resource Definition
///
/// Creating an instance installs the account IAM operand into the instance namespace.
/// Every object the operator renders is owned by the instance and garbage-collected with it,
/// except the bootstrap secret which survives so generated credentials are never lost.
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "AccountIAM",
    group = "operator.ibm.com",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::AccountIAMStatus",
    shortname = "aiam",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Description", "type":"string", "jsonPath":".status.description"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AccountIAMSpec {
    /// Suspend reconciliation
    /// When true, the operator leaves the instance and its operand untouched
    #[serde(default)]
    pub suspend: bool,
}
