//! # Kubernetes Store
//!
//! [`ResourceStore`] backed by the API server through `kube::Api<DynamicObject>`.

use super::{identity, Capability, Propagation, ResourceKind, ResourceStore, StoreError};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams, PropagationPolicy};
use kube::core::{ApiResource, DynamicObject};
use kube::discovery::Discovery;
use kube::Client;
use tracing::debug;

/// Which write produced a 409, so it maps onto the right [`StoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Read,
    Create,
    Update,
    Delete,
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &ResourceKind, namespace: &str) -> Api<DynamicObject> {
        let resource = ApiResource::from_gvk(&kind.gvk());
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }
}

impl From<Propagation> for PropagationPolicy {
    fn from(propagation: Propagation) -> Self {
        match propagation {
            Propagation::Background => PropagationPolicy::Background,
            Propagation::Foreground => PropagationPolicy::Foreground,
            Propagation::Orphan => PropagationPolicy::Orphan,
        }
    }
}

/// Map a kube client error onto the store taxonomy
fn classify(
    error: kube::Error,
    verb: Verb,
    kind: &ResourceKind,
    namespace: &str,
    name: &str,
) -> StoreError {
    match error {
        kube::Error::Api(response) if response.code == 404 => {
            StoreError::not_found(kind, namespace, name)
        }
        kube::Error::Api(response) if response.code == 409 && verb == Verb::Create => {
            StoreError::already_exists(kind, namespace, name)
        }
        kube::Error::Api(response) if response.code == 409 && verb == Verb::Update => {
            StoreError::conflict(kind, namespace, name)
        }
        kube::Error::Api(response) => StoreError::Api {
            code: response.code,
            message: response.message.clone(),
        },
        other => StoreError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        self.api(kind, namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify(e, Verb::Read, kind, namespace, name))
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let params = if label_selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(label_selector)
        };
        let list = self
            .api(kind, namespace)
            .list(&params)
            .await
            .map_err(|e| classify(e, Verb::Read, kind, namespace, label_selector))?;
        Ok(list.items)
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let (kind, namespace, name) = identity(object)?;
        debug!(kind = %kind, namespace = %namespace, name = %name, "store.create");
        self.api(&kind, &namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| classify(e, Verb::Create, &kind, &namespace, &name))
    }

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let (kind, namespace, name) = identity(object)?;
        debug!(kind = %kind, namespace = %namespace, name = %name, "store.update");
        self.api(&kind, &namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| classify(e, Verb::Update, &kind, &namespace, &name))
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        propagation: Propagation,
    ) -> Result<(), StoreError> {
        debug!(kind = %kind, namespace = %namespace, name = %name, "store.delete");
        let params = DeleteParams {
            propagation_policy: Some(propagation.into()),
            ..DeleteParams::default()
        };
        self.api(kind, namespace)
            .delete(name, &params)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, Verb::Delete, kind, namespace, name))
    }

    async fn capabilities(&self) -> Result<Vec<Capability>, StoreError> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| StoreError::Transport(format!("discovery failed: {e}")))?;

        let mut catalogue = Vec::new();
        for group in discovery.groups() {
            for version in group.versions() {
                for (resource, _capabilities) in group.versioned_resources(version) {
                    catalogue.push(Capability {
                        api_group_version: resource.api_version.clone(),
                        kind: resource.kind.clone(),
                    });
                }
            }
        }
        debug!(entries = catalogue.len(), "store.capabilities");
        Ok(catalogue)
    }
}
