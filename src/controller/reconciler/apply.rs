//! # Apply Engine
//!
//! Create-or-update of rendered objects. Every object is stamped with the instance
//! namespace and a controller owner reference before it is written. Creation is tried
//! first; when the object already exists the live `resourceVersion` is copied onto the
//! desired object and it is replaced, so fields the server owns (such as `status`) are
//! never clobbered by a blind overwrite.

use crate::controller::reconciler::template::RenderedResource;
use crate::observability;
use crate::store::{ResourceKind, ResourceStore, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::DynamicObject;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
}

impl ApplyOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
        }
    }
}

/// The instance every applied object is owned by
#[derive(Debug, Clone, PartialEq)]
pub struct Owner {
    pub namespace: String,
    pub reference: OwnerReference,
}

impl Owner {
    /// Controller reference to the given instance object
    pub fn of(instance: &DynamicObject) -> Result<Self, StoreError> {
        let kind = ResourceKind::of(instance)?;
        let missing = |what: &str| StoreError::InvalidObject(format!("owner has no {what}"));
        let name = instance.metadata.name.clone().ok_or_else(|| missing("name"))?;
        let namespace = instance
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| missing("namespace"))?;
        let uid = instance.metadata.uid.clone().ok_or_else(|| missing("uid"))?;
        Ok(Self {
            namespace,
            reference: OwnerReference {
                api_version: kind.api_version(),
                kind: kind.kind,
                name,
                uid,
                controller: Some(true),
                block_owner_deletion: Some(true),
            },
        })
    }

    /// Set namespace and owner reference on `object`
    ///
    /// A reference with the same uid is replaced; references to other owners are kept.
    pub fn stamp(&self, object: &mut DynamicObject) {
        object.metadata.namespace = Some(self.namespace.clone());
        let references = object.metadata.owner_references.get_or_insert_with(Vec::new);
        references.retain(|r| r.uid != self.reference.uid);
        references.push(self.reference.clone());
    }
}

pub struct ApplyEngine<'a> {
    store: &'a dyn ResourceStore,
    owner: &'a Owner,
}

impl std::fmt::Debug for ApplyEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyEngine")
            .field("owner", &self.owner.reference.name)
            .finish_non_exhaustive()
    }
}

impl<'a> ApplyEngine<'a> {
    pub fn new(store: &'a dyn ResourceStore, owner: &'a Owner) -> Self {
        Self { store, owner }
    }

    /// Create the object, or update it in place when it already exists
    pub async fn upsert(&self, resource: &RenderedResource) -> Result<ApplyOutcome, StoreError> {
        let mut desired = resource.object.clone();
        self.owner.stamp(&mut desired);
        let namespace = self.owner.namespace.as_str();

        let outcome = match self.store.create(&desired).await {
            Ok(_) => ApplyOutcome::Created,
            Err(StoreError::AlreadyExists { .. }) => {
                let live = self
                    .store
                    .get(&resource.kind, namespace, &resource.name)
                    .await?
                    .ok_or_else(|| StoreError::not_found(&resource.kind, namespace, &resource.name))?;
                desired
                    .metadata
                    .resource_version
                    .clone_from(&live.metadata.resource_version);
                self.store.update(&desired).await?;
                ApplyOutcome::Updated
            }
            Err(e) => return Err(e),
        };

        debug!(
            kind = %resource.kind,
            namespace,
            name = resource.name.as_str(),
            outcome = outcome.as_str(),
            "apply.upsert"
        );
        observability::metrics::increment_resources_applied(outcome.as_str());
        Ok(outcome)
    }

    /// Upsert each resource in order, stopping at the first failure
    pub async fn apply_all(
        &self,
        resources: &[RenderedResource],
    ) -> Result<Vec<ApplyOutcome>, StoreError> {
        let mut outcomes = Vec::with_capacity(resources.len());
        for resource in resources {
            outcomes.push(self.upsert(resource).await?);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Mutation, Operation};
    use serde_json::json;

    fn instance() -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "operator.ibm.com/v1alpha1",
            "kind": "AccountIAM",
            "metadata": { "name": "example", "namespace": "ns1", "uid": "instance-uid" }
        }))
        .unwrap()
    }

    fn config_map(value: &str) -> RenderedResource {
        RenderedResource {
            kind: ResourceKind::config_map(),
            name: "settings".to_string(),
            object: serde_json::from_value(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": { "name": "settings" },
                "data": { "value": value }
            }))
            .unwrap(),
        }
    }

    #[test]
    fn test_owner_requires_uid() {
        let mut object = instance();
        object.metadata.uid = None;
        assert!(Owner::of(&object).is_err());
    }

    #[test]
    fn test_stamp_replaces_own_reference_only() {
        let owner = Owner::of(&instance()).unwrap();
        let mut object = config_map("a").object;
        object.metadata.owner_references = Some(vec![
            OwnerReference {
                uid: "instance-uid".into(),
                name: "stale".into(),
                ..OwnerReference::default()
            },
            OwnerReference {
                uid: "someone-else".into(),
                ..OwnerReference::default()
            },
        ]);

        owner.stamp(&mut object);
        let references = object.metadata.owner_references.unwrap();
        assert_eq!(references.len(), 2);
        assert!(references.iter().any(|r| r.uid == "someone-else"));
        assert!(references
            .iter()
            .any(|r| r.uid == "instance-uid" && r.controller == Some(true) && r.name == "example"));
        assert_eq!(object.metadata.namespace.as_deref(), Some("ns1"));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let owner = Owner::of(&instance()).unwrap();
        let engine = ApplyEngine::new(&store, &owner);

        assert_eq!(engine.upsert(&config_map("1")).await.unwrap(), ApplyOutcome::Created);
        for n in 2..=4 {
            assert_eq!(
                engine.upsert(&config_map(&n.to_string())).await.unwrap(),
                ApplyOutcome::Updated
            );
        }

        assert_eq!(store.object_count(), 1);
        let stored = store
            .object(&ResourceKind::config_map(), "ns1", "settings")
            .unwrap();
        assert_eq!(stored.data["data"]["value"], "4");
        assert_eq!(stored.metadata.owner_references.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_server_status() {
        let store = MemoryStore::new();
        let owner = Owner::of(&instance()).unwrap();
        let engine = ApplyEngine::new(&store, &owner);

        engine.upsert(&config_map("1")).await.unwrap();
        store
            .set_status(&ResourceKind::config_map(), "ns1", "settings", json!({"observed": 1}))
            .unwrap();
        engine.upsert(&config_map("2")).await.unwrap();

        let stored = store
            .object(&ResourceKind::config_map(), "ns1", "settings")
            .unwrap();
        assert_eq!(stored.data["status"], json!({"observed": 1}));
    }

    #[tokio::test]
    async fn test_other_create_errors_fail_without_update() {
        let store = MemoryStore::new();
        let owner = Owner::of(&instance()).unwrap();
        store.fail_next(Operation::Create, 403, "forbidden");

        let err = ApplyEngine::new(&store, &owner)
            .upsert(&config_map("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { code: 403, .. }));
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_apply_all_stops_at_first_failure() {
        let store = MemoryStore::new();
        let owner = Owner::of(&instance()).unwrap();
        let engine = ApplyEngine::new(&store, &owner);
        let mut second = config_map("x");
        second.name = "other".into();
        second.object.metadata.name = Some("other".into());

        engine.upsert(&config_map("0")).await.unwrap();
        store.fail_next(Operation::Get, 500, "boom");
        let err = engine
            .apply_all(&[config_map("1"), second])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Api { code: 500, .. }));
        assert!(!store
            .mutations()
            .iter()
            .any(|m| matches!(m, Mutation::Create { name, .. } if name == "other")));
    }
}
