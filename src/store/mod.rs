//! # Resource Store
//!
//! Every read and write the reconciler performs goes through [`ResourceStore`].
//! [`KubeStore`] talks to the API server; [`MemoryStore`] keeps objects in process
//! so whole reconciliation cycles can be exercised without a cluster.
//!
//! Objects are handled as [`DynamicObject`]s: the operand spans core kinds, RBAC,
//! networking, cert-manager and OpenShift routes, so a typed client per kind would not pay off.

mod cluster;
mod memory;

pub use cluster::KubeStore;
pub use memory::{MemoryStore, Mutation, Operation};

use async_trait::async_trait;
use kube::core::{DynamicObject, GroupVersionKind};
use std::fmt;
use thiserror::Error;

/// Group, version and kind of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceKind {
    /// Build from an `apiVersion` string (`v1` or `group/version`) and a kind
    pub fn new(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }

    /// Kind of an object, taken from its `apiVersion`/`kind`
    pub fn of(object: &DynamicObject) -> Result<Self, StoreError> {
        let types = object.types.as_ref().ok_or_else(|| {
            StoreError::InvalidObject("object has no apiVersion/kind".to_string())
        })?;
        if types.api_version.is_empty() || types.kind.is_empty() {
            return Err(StoreError::InvalidObject(
                "object has an empty apiVersion or kind".to_string(),
            ));
        }
        Ok(Self::new(&types.api_version, &types.kind))
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    pub fn secret() -> Self {
        Self::new("v1", "Secret")
    }

    pub fn config_map() -> Self {
        Self::new("v1", "ConfigMap")
    }

    pub fn pod() -> Self {
        Self::new("v1", "Pod")
    }

    pub fn deployment() -> Self {
        Self::new("apps/v1", "Deployment")
    }

    pub fn job() -> Self {
        Self::new("batch/v1", "Job")
    }

    pub fn route() -> Self {
        Self::new("route.openshift.io/v1", "Route")
    }

    pub fn account_iam() -> Self {
        Self::new("operator.ibm.com/v1alpha1", "AccountIAM")
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.api_version(), self.kind)
    }
}

/// One `(apiGroupVersion, kind)` pair served by the API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub api_group_version: String,
    pub kind: String,
}

impl Capability {
    pub fn new(api_group_version: &str, kind: &str) -> Self {
        Self {
            api_group_version: api_group_version.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// Cascade policy for deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Background,
    Foreground,
    Orphan,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} was modified concurrently")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &ResourceKind, namespace: &str, name: &str) -> Self {
        StoreError::NotFound {
            kind: kind.kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn already_exists(kind: &ResourceKind, namespace: &str, name: &str) -> Self {
        StoreError::AlreadyExists {
            kind: kind.kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn conflict(kind: &ResourceKind, namespace: &str, name: &str) -> Self {
        StoreError::Conflict {
            kind: kind.kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    /// Whether the error describes the request itself rather than the store's health
    ///
    /// Malformed objects and rejected payloads will fail the same way on every retry.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            StoreError::Serialization(_) | StoreError::InvalidObject(_) => true,
            StoreError::Api { code, .. } => matches!(code, 400 | 422),
            _ => false,
        }
    }
}

/// Kind, namespace and name of an object about to be written
pub(crate) fn identity(object: &DynamicObject) -> Result<(ResourceKind, String, String), StoreError> {
    let kind = ResourceKind::of(object)?;
    let namespace = object
        .metadata
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .ok_or_else(|| StoreError::InvalidObject(format!("{kind} has no namespace")))?;
    let name = object
        .metadata
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StoreError::InvalidObject(format!("{kind} has no name")))?;
    Ok((kind, namespace, name))
}

/// Operations the reconciler needs from the cluster
///
/// `get` reports a missing object as `Ok(None)`; `create` reports an existing one as
/// [`StoreError::AlreadyExists`]; `update` requires the object's `resourceVersion` to match
/// the stored one and reports a mismatch as [`StoreError::Conflict`].
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError>;

    /// List objects matching an equality label selector (`k=v,k2=v2`, empty for all)
    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        propagation: Propagation,
    ) -> Result<(), StoreError>;

    /// The capability catalogue, queried fresh on every call
    async fn capabilities(&self) -> Result<Vec<Capability>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_core_group() {
        let kind = ResourceKind::new("v1", "Secret");
        assert_eq!(kind.group, "");
        assert_eq!(kind.version, "v1");
        assert_eq!(kind.api_version(), "v1");
        assert_eq!(kind.to_string(), "v1 Secret");
    }

    #[test]
    fn test_resource_kind_named_group() {
        let kind = ResourceKind::new("route.openshift.io/v1", "Route");
        assert_eq!(kind.group, "route.openshift.io");
        assert_eq!(kind.version, "v1");
        assert_eq!(kind.api_version(), "route.openshift.io/v1");
        assert_eq!(kind, ResourceKind::route());
    }

    #[test]
    fn test_resource_kind_of_requires_type_meta() {
        let object: DynamicObject = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "untyped" }
        }))
        .unwrap();
        assert!(matches!(
            ResourceKind::of(&object),
            Err(StoreError::InvalidObject(_))
        ));
    }

    #[test]
    fn test_identity_requires_namespace() {
        let object: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "no-namespace" }
        }))
        .unwrap();
        assert!(matches!(identity(&object), Err(StoreError::InvalidObject(_))));
    }

    #[test]
    fn test_permanent_errors() {
        assert!(StoreError::InvalidObject("bad".into()).is_permanent());
        assert!(StoreError::Api {
            code: 422,
            message: "invalid".into()
        }
        .is_permanent());
        assert!(!StoreError::Api {
            code: 503,
            message: "unavailable".into()
        }
        .is_permanent());
        assert!(!StoreError::Transport("reset".into()).is_permanent());
    }
}
