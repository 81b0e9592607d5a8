//! In-memory stand-in for the API server, used to exercise the engine
//! without a cluster.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::client::{ClientResult, ObjectClient};
use crate::error::ClientError;
use crate::object::{ObjectKey, SyncObject};

type Modifier<K> = Box<dyn FnOnce(&mut K) + Send>;

/// Another writer acting between a reader's fetch and its write.
enum Race<K> {
    Insert(K),
    Delete(ObjectKey),
}

struct Inner<K> {
    objects: HashMap<ObjectKey, K>,
    after_get: VecDeque<Modifier<K>>,
    races: VecDeque<Race<K>>,
    write_failures: VecDeque<ClientError>,
    creates: u64,
    updates: u64,
    gets: u64,
}

/// Versioned object store with API-server-like write semantics:
/// creates assign uid / resourceVersion / generation, updates are rejected
/// when the carried resourceVersion is stale, and `status` is not writable
/// through an update.
#[derive(Clone)]
pub struct MemoryObjectClient<K> {
    inner: Arc<Mutex<Inner<K>>>,
    version: Arc<AtomicU64>,
    latency: Duration,
}

impl<K: SyncObject> Default for MemoryObjectClient<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: SyncObject> MemoryObjectClient<K> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                objects: HashMap::new(),
                after_get: VecDeque::new(),
                races: VecDeque::new(),
                write_failures: VecDeque::new(),
                creates: 0,
                updates: 0,
                gets: 0,
            })),
            version: Arc::new(AtomicU64::new(0)),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call, so callers can cancel mid-flight.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn seed(&self, obj: &mut K) -> ObjectKey {
        let key = obj.object_key();
        let meta = obj.meta_mut();
        meta.resource_version = Some(self.next_version());
        meta.uid.get_or_insert_with(|| format!("uid-{}", key.name));
        meta.generation.get_or_insert(1);
        key
    }

    /// Seed an object directly, bypassing write counters. Returns the stored copy.
    pub async fn insert(&self, mut obj: K) -> K {
        let key = self.seed(&mut obj);
        self.inner.lock().await.objects.insert(key, obj.clone());
        obj
    }

    pub async fn stored(&self, namespace: &str, name: &str) -> Option<K> {
        let key = ObjectKey::new(namespace, name);
        self.inner.lock().await.objects.get(&key).cloned()
    }

    /// Apply `f` to the stored object as an external writer would, bumping
    /// its resourceVersion.
    pub async fn modify(&self, namespace: &str, name: &str, f: impl FnOnce(&mut K)) {
        let key = ObjectKey::new(namespace, name);
        let rv = self.next_version();
        let mut inner = self.inner.lock().await;
        if let Some(obj) = inner.objects.get_mut(&key) {
            f(obj);
            obj.meta_mut().resource_version = Some(rv);
        }
    }

    /// Queue an external modification that lands right after the next
    /// successful `get` of an existing object, i.e. between a reader's fetch
    /// and its write.
    pub async fn modify_after_next_get(&self, f: impl FnOnce(&mut K) + Send + 'static) {
        self.inner.lock().await.after_get.push_back(Box::new(f));
    }

    /// Have another writer create `obj` right after the next `get`, whether
    /// or not that read found anything.
    pub async fn insert_after_next_get(&self, mut obj: K) {
        self.seed(&mut obj);
        self.inner.lock().await.races.push_back(Race::Insert(obj));
    }

    /// Have another writer delete the object right after the next `get`.
    pub async fn delete_after_next_get(&self, namespace: &str, name: &str) {
        let key = ObjectKey::new(namespace, name);
        self.inner.lock().await.races.push_back(Race::Delete(key));
    }

    /// Make the next write fail with `err`.
    pub async fn fail_next_write(&self, err: ClientError) {
        self.inner.lock().await.write_failures.push_back(err);
    }

    pub async fn create_count(&self) -> u64 {
        self.inner.lock().await.creates
    }

    pub async fn update_count(&self) -> u64 {
        self.inner.lock().await.updates
    }

    pub async fn write_count(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.creates + inner.updates
    }

    pub async fn get_count(&self) -> u64 {
        self.inner.lock().await.gets
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

/// Carry the stored `status` over into `incoming`, ignoring whatever status
/// the writer sent.
fn keep_status<K: SyncObject>(stored: &K, incoming: &K) -> ClientResult<K> {
    let to_value = |o: &K| {
        serde_json::to_value(o).map_err(|e| ClientError::Transport(e.to_string()))
    };
    let stored_v = to_value(stored)?;
    let mut incoming_v = to_value(incoming)?;
    if let Value::Object(ref mut map) = incoming_v {
        match stored_v.get("status") {
            Some(s) => map.insert("status".into(), s.clone()),
            None => map.remove("status"),
        };
    }
    serde_json::from_value(incoming_v).map_err(|e| ClientError::Transport(e.to_string()))
}

#[async_trait]
impl<K: SyncObject> ObjectClient<K> for MemoryObjectClient<K> {
    async fn get(&self, namespace: &str, name: &str) -> ClientResult<Option<K>> {
        self.pause().await;
        let key = ObjectKey::new(namespace, name);
        let rv = self.next_version();
        let mut inner = self.inner.lock().await;
        inner.gets += 1;
        let found = inner.objects.get(&key).cloned();
        if found.is_some() {
            if let Some(modifier) = inner.after_get.pop_front() {
                if let Some(obj) = inner.objects.get_mut(&key) {
                    modifier(obj);
                    obj.meta_mut().resource_version = Some(rv);
                }
            }
        }
        match inner.races.pop_front() {
            Some(Race::Insert(obj)) => {
                inner.objects.insert(obj.object_key(), obj);
            }
            Some(Race::Delete(key)) => {
                inner.objects.remove(&key);
            }
            None => {}
        }
        Ok(found)
    }

    async fn create(&self, obj: &K) -> ClientResult<K> {
        self.pause().await;
        let key = obj.object_key();
        let rv = self.next_version();
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.write_failures.pop_front() {
            return Err(err);
        }
        if inner.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists(key.to_string()));
        }
        let mut stored = obj.clone();
        let meta = stored.meta_mut();
        meta.resource_version = Some(rv);
        meta.uid = Some(format!("uid-{}", key.name));
        meta.generation = Some(1);
        inner.creates += 1;
        inner.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, obj: &K) -> ClientResult<K> {
        self.pause().await;
        let key = obj.object_key();
        let rv = self.next_version();
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.write_failures.pop_front() {
            return Err(err);
        }
        let current = inner
            .objects
            .get(&key)
            .ok_or_else(|| ClientError::NotFound(key.to_string()))?;
        if current.resource_version() != obj.resource_version() {
            return Err(ClientError::Conflict(format!(
                "{key}: resourceVersion {:?} is stale (current {:?})",
                obj.resource_version(),
                current.resource_version()
            )));
        }
        let mut stored = keep_status(current, obj)?;
        let generation = current.meta().generation.unwrap_or(0) + 1;
        let uid = current.meta().uid.clone();
        let meta = stored.meta_mut();
        meta.resource_version = Some(rv);
        meta.generation = Some(generation);
        meta.uid = uid;
        inner.updates += 1;
        inner.objects.insert(key, stored.clone());
        Ok(stored)
    }
}
