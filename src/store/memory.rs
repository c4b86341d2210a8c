//! # In-Memory Store
//!
//! A [`ResourceStore`] that keeps objects in process. It behaves like the API server
//! where the reconciler relies on it: resource versions are assigned on every write,
//! updates must carry the current version, `status` survives spec updates and
//! deletes of missing objects report not found. Every mutating call is recorded so
//! tests can assert exactly what a cycle wrote.

use super::{identity, Capability, Propagation, ResourceKind, ResourceStore, StoreError};
use async_trait::async_trait;
use kube::core::DynamicObject;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

type ObjectKey = (ResourceKind, String, String);

/// Store operation, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
    Capabilities,
}

/// A recorded mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
    Update {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
    Delete {
        kind: ResourceKind,
        namespace: String,
        name: String,
        propagation: Propagation,
    },
}

impl Mutation {
    pub fn kind(&self) -> &ResourceKind {
        match self {
            Mutation::Create { kind, .. }
            | Mutation::Update { kind, .. }
            | Mutation::Delete { kind, .. } => kind,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Mutation::Create { name, .. }
            | Mutation::Update { name, .. }
            | Mutation::Delete { name, .. } => name,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    capabilities: Vec<Capability>,
    mutations: Vec<Mutation>,
    failures: HashMap<Operation, (u16, String)>,
    next_version: u64,
    capability_queries: usize,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn take_failure(&mut self, operation: Operation) -> Result<(), StoreError> {
        match self.failures.remove(&operation) {
            Some((code, message)) => Err(StoreError::Api { code, message }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a capability catalogue
    pub fn with_capabilities<I, S>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let store = Self::new();
        for (api_group_version, kind) in capabilities {
            store.add_capability(api_group_version.as_ref(), kind.as_ref());
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the assertions that follow
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn add_capability(&self, api_group_version: &str, kind: &str) {
        let mut state = self.lock();
        let capability = Capability::new(api_group_version, kind);
        if !state.capabilities.contains(&capability) {
            state.capabilities.push(capability);
        }
    }

    pub fn remove_capability(&self, api_group_version: &str, kind: &str) {
        self.lock()
            .capabilities
            .retain(|c| !(c.api_group_version == api_group_version && c.kind == kind));
    }

    /// Insert or replace an object without recording a mutation
    pub fn seed(&self, mut object: DynamicObject) -> Result<(), StoreError> {
        let (kind, namespace, name) = identity(&object)?;
        let mut state = self.lock();
        object.metadata.resource_version = Some(state.bump());
        if object.metadata.uid.is_none() {
            object.metadata.uid = Some(format!("uid-{name}"));
        }
        state.objects.insert((kind, namespace, name), object);
        Ok(())
    }

    /// Replace the `status` of a stored object, as a controller would
    pub fn set_status(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let version = state.bump();
        let object = state
            .objects
            .get_mut(&(kind.clone(), namespace.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::not_found(kind, namespace, name))?;
        object.data["status"] = status;
        object.metadata.resource_version = Some(version);
        Ok(())
    }

    /// Fail the next call of `operation` with an API error
    pub fn fail_next(&self, operation: Operation, code: u16, message: &str) {
        self.lock()
            .failures
            .insert(operation, (code, message.to_string()));
    }

    pub fn object(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.lock()
            .objects
            .get(&(kind.clone(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn objects_of(&self, kind: &ResourceKind) -> Vec<DynamicObject> {
        self.lock()
            .objects
            .iter()
            .filter(|((k, _, _), _)| k == kind)
            .map(|(_, object)| object.clone())
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.lock().mutations.clear();
    }

    pub fn capability_queries(&self) -> usize {
        self.lock().capability_queries
    }
}

/// Equality-only selector matching (`k=v,k2=v2`); empty matches everything
fn matches_selector(object: &DynamicObject, selector: &str) -> bool {
    let labels = object.metadata.labels.as_ref();
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            let (key, value) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
                .unwrap_or((term, ""));
            labels
                .and_then(|l| l.get(key.trim()))
                .is_some_and(|v| v == value.trim())
        })
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        let mut state = self.lock();
        state.take_failure(Operation::Get)?;
        Ok(state
            .objects
            .get(&(kind.clone(), namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let mut state = self.lock();
        state.take_failure(Operation::List)?;
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), object)| {
                k == kind && ns == namespace && matches_selector(object, label_selector)
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let (kind, namespace, name) = identity(object)?;
        let mut state = self.lock();
        state.take_failure(Operation::Create)?;

        let key = (kind.clone(), namespace.clone(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(StoreError::already_exists(&kind, &namespace, &name));
        }

        let mut stored = object.clone();
        stored.metadata.resource_version = Some(state.bump());
        stored.metadata.uid = Some(format!("uid-{}", state.next_version));
        state.objects.insert(key, stored.clone());
        state.mutations.push(Mutation::Create {
            kind,
            namespace,
            name,
        });
        Ok(stored)
    }

    async fn update(&self, object: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let (kind, namespace, name) = identity(object)?;
        let mut state = self.lock();
        state.take_failure(Operation::Update)?;

        let key = (kind.clone(), namespace.clone(), name.clone());
        let Some(live) = state.objects.get(&key) else {
            return Err(StoreError::not_found(&kind, &namespace, &name));
        };
        if object.metadata.resource_version.is_none()
            || object.metadata.resource_version != live.metadata.resource_version
        {
            return Err(StoreError::conflict(&kind, &namespace, &name));
        }

        let mut stored = object.clone();
        stored.metadata.uid.clone_from(&live.metadata.uid);
        match live.data.get("status") {
            Some(status) => stored.data["status"] = status.clone(),
            None => {
                if let Some(map) = stored.data.as_object_mut() {
                    map.remove("status");
                }
            }
        }
        stored.metadata.resource_version = Some(state.bump());
        state.objects.insert(key, stored.clone());
        state.mutations.push(Mutation::Update {
            kind,
            namespace,
            name,
        });
        Ok(stored)
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        propagation: Propagation,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.take_failure(Operation::Delete)?;

        let key = (kind.clone(), namespace.to_string(), name.to_string());
        if state.objects.remove(&key).is_none() {
            return Err(StoreError::not_found(kind, namespace, name));
        }
        state.mutations.push(Mutation::Delete {
            kind: kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            propagation,
        });
        Ok(())
    }

    async fn capabilities(&self) -> Result<Vec<Capability>, StoreError> {
        let mut state = self.lock();
        state.take_failure(Operation::Capabilities)?;
        state.capability_queries += 1;
        Ok(state.capabilities.clone())
    }
}
