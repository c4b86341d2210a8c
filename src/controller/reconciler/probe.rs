//! # Resource Probe
//!
//! Answers whether the cluster serves a given `(apiGroupVersion, kind)`. The catalogue is
//! queried on every call: operators the operand depends on may be installed while the
//! operator is running.

use crate::constants::{EDB_CLUSTER_KIND, EDB_GROUP_VERSION, WEBSPHERE_GROUP_VERSION, WEBSPHERE_KIND};
use crate::store::{ResourceStore, StoreError};
use tracing::debug;

/// A capability the operand cannot run without
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prerequisite {
    pub api_group_version: &'static str,
    pub kind: &'static str,
    /// Who provides it, for operator-facing messages
    pub provider: &'static str,
}

pub const PREREQUISITES: [Prerequisite; 2] = [
    Prerequisite {
        api_group_version: EDB_GROUP_VERSION,
        kind: EDB_CLUSTER_KIND,
        provider: "EDB Postgres operator",
    },
    Prerequisite {
        api_group_version: WEBSPHERE_GROUP_VERSION,
        kind: WEBSPHERE_KIND,
        provider: "WebSphere Liberty operator",
    },
];

/// Whether the exact pair is listed; a failed query is an error, never `false`
pub async fn exists(
    store: &dyn ResourceStore,
    api_group_version: &str,
    kind: &str,
) -> Result<bool, StoreError> {
    let catalogue = store.capabilities().await?;
    let found = catalogue
        .iter()
        .any(|c| c.api_group_version == api_group_version && c.kind == kind);
    debug!(api_group_version, kind, found, "probe.exists");
    Ok(found)
}

/// First prerequisite the cluster does not serve
pub async fn first_missing(
    store: &dyn ResourceStore,
    prerequisites: &[Prerequisite],
) -> Result<Option<Prerequisite>, StoreError> {
    for prerequisite in prerequisites {
        if !exists(store, prerequisite.api_group_version, prerequisite.kind).await? {
            return Ok(Some(*prerequisite));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Operation};

    #[tokio::test]
    async fn test_exists_requires_exact_pair() {
        let store = MemoryStore::with_capabilities([("postgresql.k8s.enterprisedb.io/v1", "Cluster")]);

        assert!(exists(&store, "postgresql.k8s.enterprisedb.io/v1", "Cluster").await.unwrap());
        assert!(!exists(&store, "postgresql.k8s.enterprisedb.io/v1beta1", "Cluster").await.unwrap());
        assert!(!exists(&store, "postgresql.k8s.enterprisedb.io/v1", "Backup").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_failure_is_not_absence() {
        let store = MemoryStore::new();
        store.fail_next(Operation::Capabilities, 503, "discovery unavailable");
        assert!(exists(&store, "v1", "Pod").await.is_err());
    }

    #[tokio::test]
    async fn test_every_check_requeries() {
        let store = MemoryStore::new();
        exists(&store, "v1", "Pod").await.unwrap();
        store.add_capability("v1", "Pod");
        assert!(exists(&store, "v1", "Pod").await.unwrap());
        assert_eq!(store.capability_queries(), 2);
    }

    #[tokio::test]
    async fn test_first_missing_reports_in_order() {
        let store = MemoryStore::with_capabilities([(WEBSPHERE_GROUP_VERSION, WEBSPHERE_KIND)]);
        let missing = first_missing(&store, &PREREQUISITES).await.unwrap();
        assert_eq!(missing.map(|p| p.kind), Some(EDB_CLUSTER_KIND));

        store.add_capability(EDB_GROUP_VERSION, EDB_CLUSTER_KIND);
        assert_eq!(first_missing(&store, &PREREQUISITES).await.unwrap(), None);
    }
}
