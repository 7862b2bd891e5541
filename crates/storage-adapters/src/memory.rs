//! # In-memory document store
//!
//! `DocumentStore` implementation backed by process memory, with push
//! subscriptions, collaborator-assigned ids and server timestamps.
//! The whole state can be saved to and restored from a JSON snapshot file.
//!
//! Tests can queue write faults and hold writes in flight to exercise the
//! rollback and re-entrancy paths of the core.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use dashmap::DashMap;
use domains::{
    CollectionPath, DocRef, Document, DocumentStore, FieldWrite, Query, StoreError, Subscription,
    WriteSet,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

struct StoredDoc {
    /// Arrival sequence; listings are stable over it before any ordering is applied.
    seq: u64,
    fields: Map<String, Value>,
}

#[derive(Default)]
struct State {
    collections: BTreeMap<CollectionPath, BTreeMap<String, StoredDoc>>,
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl State {
    fn documents(&self, collection: &CollectionPath) -> Vec<Document> {
        let Some(docs) = self.collections.get(collection) else {
            return Vec::new();
        };
        let mut ordered: Vec<(&String, &StoredDoc)> = docs.iter().collect();
        ordered.sort_by_key(|(_, d)| d.seq);
        ordered
            .into_iter()
            .map(|(id, d)| Document {
                id: id.clone(),
                fields: d.fields.clone(),
            })
            .collect()
    }

    fn document(&self, doc: &DocRef) -> Option<Document> {
        self.collections
            .get(&doc.collection)
            .and_then(|docs| docs.get(&doc.id))
            .map(|d| Document {
                id: doc.id.clone(),
                fields: d.fields.clone(),
            })
    }

    fn contains(&self, doc: &DocRef) -> bool {
        self.collections
            .get(&doc.collection)
            .is_some_and(|docs| docs.contains_key(&doc.id))
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Strictly increasing clock so ordering by timestamp matches write order.
    fn server_timestamp(&mut self) -> Value {
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

fn apply_writes(fields: &mut Map<String, Value>, writes: WriteSet, timestamp: &Value) {
    for (name, write) in writes {
        match write {
            FieldWrite::Set(value) => {
                fields.insert(name, value);
            }
            FieldWrite::ServerTimestamp => {
                fields.insert(name, timestamp.clone());
            }
            FieldWrite::Delete => {
                fields.remove(&name);
            }
        }
    }
}

enum Listener {
    Query {
        query: Query,
        tx: mpsc::UnboundedSender<Vec<Document>>,
    },
    Doc {
        doc: DocRef,
        tx: mpsc::UnboundedSender<Option<Document>>,
    },
}

struct Fault {
    successes_before: usize,
    error: StoreError,
}

/// Keeps writes parked until released or dropped.
pub struct WriteHold {
    gate: Arc<watch::Sender<bool>>,
}

impl WriteHold {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WriteHold {
    fn drop(&mut self) {
        self.gate.send_replace(false);
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    listeners: Arc<DashMap<u64, Listener>>,
    next_listener: AtomicU64,
    faults: Mutex<VecDeque<Fault>>,
    write_attempts: AtomicUsize,
    gate: Arc<watch::Sender<bool>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            state: Mutex::new(State::default()),
            listeners: Arc::new(DashMap::new()),
            next_listener: AtomicU64::new(1),
            faults: Mutex::new(VecDeque::new()),
            write_attempts: AtomicUsize::new(0),
            gate: Arc::new(gate),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes a future write fail: the first `successes_before` writes still succeed.
    /// Queued faults fire in order.
    pub fn fail_write_after(&self, successes_before: usize, error: StoreError) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Fault {
                successes_before,
                error,
            });
    }

    pub fn fail_next_write(&self, error: StoreError) {
        self.fail_write_after(0, error);
    }

    /// Parks every write until the returned hold is released.
    pub fn hold_writes(&self) -> WriteHold {
        self.gate.send_replace(true);
        WriteHold {
            gate: self.gate.clone(),
        }
    }

    /// Number of create/set/update/delete/commit calls received so far.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Live subscriptions, for checking that every subscribe was released.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    async fn begin_write(&self, op: &'static str, target: &str) -> Result<(), StoreError> {
        let mut gate = self.gate.subscribe();
        // The sender lives as long as the store, so waiting cannot fail.
        let _ = gate.wait_for(|held| !*held).await;

        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(front) = faults.front_mut() {
            if front.successes_before == 0 {
                if let Some(fault) = faults.pop_front() {
                    warn!(op, target, error = %fault.error, "injected write failure");
                    return Err(fault.error);
                }
            } else {
                front.successes_before -= 1;
            }
        }
        Ok(())
    }

    /// Pushes fresh snapshots to listeners watching any of the touched documents.
    fn notify(&self, state: &State, touched: &BTreeSet<DocRef>) {
        let collections: BTreeSet<&CollectionPath> = touched.iter().map(|d| &d.collection).collect();
        let mut dead = Vec::new();
        for entry in self.listeners.iter() {
            let delivered = match entry.value() {
                Listener::Query { query, tx } if collections.contains(&query.collection) => {
                    tx.send(query.apply(state.documents(&query.collection))).is_ok()
                }
                Listener::Doc { doc, tx } if touched.contains(doc) => {
                    tx.send(state.document(doc)).is_ok()
                }
                _ => true,
            };
            if !delivered {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.listeners.remove(&id);
        }
    }

    fn register(&self, listener: Listener) -> (u64, Arc<DashMap<u64, Listener>>) {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(id, listener);
        (id, self.listeners.clone())
    }

    /// Restores a store previously written by [`MemoryStore::save_snapshot`].
    pub async fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
        let file: SnapshotFile =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let store = Self::new();
        {
            let mut state = store.state();
            for (collection, docs) in file.collections {
                let path = CollectionPath::root(&collection);
                for doc in docs {
                    let seq = state.bump_seq();
                    state
                        .collections
                        .entry(path.clone())
                        .or_default()
                        .insert(doc.id, StoredDoc { seq, fields: doc.fields });
                }
            }
        }
        debug!(path = %path.display(), "snapshot loaded");
        Ok(store)
    }

    pub async fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let file = {
            let state = self.state();
            SnapshotFile {
                collections: state
                    .collections
                    .keys()
                    .map(|c| (c.as_str().to_owned(), state.documents(c)))
                    .collect(),
            }
        };
        let raw = serde_json::to_vec_pretty(&file)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "snapshot saved");
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct SnapshotFile {
    collections: BTreeMap<String, Vec<Document>>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, doc: &DocRef) -> Result<Option<Document>, StoreError> {
        Ok(self.state().document(doc))
    }

    async fn list(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let state = self.state();
        Ok(query.apply(state.documents(&query.collection)))
    }

    async fn create(&self, collection: &CollectionPath, data: WriteSet) -> Result<String, StoreError> {
        self.begin_write("create", collection.as_str()).await?;
        let mut state = self.state();
        let id = loop {
            let candidate = Uuid::new_v4().simple().to_string()[..20].to_owned();
            if !state.contains(&collection.doc(candidate.clone())) {
                break candidate;
            }
        };
        let seq = state.bump_seq();
        let ts = state.server_timestamp();
        let mut fields = Map::new();
        apply_writes(&mut fields, data, &ts);
        state
            .collections
            .entry(collection.clone())
            .or_default()
            .insert(id.clone(), StoredDoc { seq, fields });

        self.notify(&state, &BTreeSet::from([collection.doc(id.clone())]));
        Ok(id)
    }

    async fn set(&self, doc: &DocRef, data: WriteSet) -> Result<(), StoreError> {
        self.begin_write("set", &doc.to_string()).await?;
        let mut state = self.state();
        let existing = state
            .collections
            .get(&doc.collection)
            .and_then(|docs| docs.get(&doc.id))
            .map(|d| d.seq);
        let seq = match existing {
            Some(seq) => seq,
            None => state.bump_seq(),
        };
        let ts = state.server_timestamp();
        let mut fields = Map::new();
        apply_writes(&mut fields, data, &ts);
        state
            .collections
            .entry(doc.collection.clone())
            .or_default()
            .insert(doc.id.clone(), StoredDoc { seq, fields });

        self.notify(&state, &BTreeSet::from([doc.clone()]));
        Ok(())
    }

    async fn update(&self, doc: &DocRef, patch: WriteSet) -> Result<(), StoreError> {
        self.begin_write("update", &doc.to_string()).await?;
        let mut state = self.state();
        let ts = state.server_timestamp();
        let stored = state
            .collections
            .get_mut(&doc.collection)
            .and_then(|docs| docs.get_mut(&doc.id))
            .ok_or_else(|| StoreError::NotFound(doc.to_string()))?;
        apply_writes(&mut stored.fields, patch, &ts);

        self.notify(&state, &BTreeSet::from([doc.clone()]));
        Ok(())
    }

    async fn delete(&self, doc: &DocRef) -> Result<(), StoreError> {
        self.begin_write("delete", &doc.to_string()).await?;
        let mut state = self.state();
        let removed = state
            .collections
            .get_mut(&doc.collection)
            .and_then(|docs| docs.remove(&doc.id))
            .is_some();
        if removed {
            self.notify(&state, &BTreeSet::from([doc.clone()]));
        }
        Ok(())
    }

    async fn commit(&self, updates: Vec<(DocRef, WriteSet)>) -> Result<(), StoreError> {
        self.begin_write("commit", &format!("{} documents", updates.len())).await?;
        let mut state = self.state();
        if let Some((missing, _)) = updates.iter().find(|(doc, _)| !state.contains(doc)) {
            return Err(StoreError::NotFound(missing.to_string()));
        }
        let ts = state.server_timestamp();
        let mut touched = BTreeSet::new();
        for (doc, patch) in updates {
            if let Some(stored) = state
                .collections
                .get_mut(&doc.collection)
                .and_then(|docs| docs.get_mut(&doc.id))
            {
                apply_writes(&mut stored.fields, patch, &ts);
            }
            touched.insert(doc);
        }

        self.notify(&state, &touched);
        Ok(())
    }

    fn subscribe(&self, query: &Query) -> Result<Subscription<Vec<Document>>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Registered under the state lock so no change slips between snapshot and listener.
        let state = self.state();
        let _ = tx.send(query.apply(state.documents(&query.collection)));
        let (id, listeners) = self.register(Listener::Query {
            query: query.clone(),
            tx,
        });
        drop(state);
        debug!(collection = %query.collection, listener = id, "subscribed");

        Ok(Subscription::from_receiver(rx, move || {
            listeners.remove(&id);
        }))
    }

    fn watch(&self, doc: &DocRef) -> Result<Subscription<Option<Document>>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = self.state();
        let _ = tx.send(state.document(doc));
        let (id, listeners) = self.register(Listener::Doc {
            doc: doc.clone(),
            tx,
        });
        drop(state);
        debug!(doc = %doc, listener = id, "watching");

        Ok(Subscription::from_receiver(rx, move || {
            listeners.remove(&id);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{Direction, Writes};
    use serde_json::json;

    fn points() -> CollectionPath {
        CollectionPath::root("routes").child("r1", "points")
    }

    #[tokio::test]
    async fn create_assigns_ids_and_server_timestamps() {
        let store = MemoryStore::new();
        let id = store
            .create(
                &points(),
                Writes::new()
                    .set("title", "Hermitage")
                    .server_timestamp("createdAt")
                    .delete("ignored")
                    .build(),
            )
            .await
            .unwrap();
        assert!(!id.is_empty());

        let doc = store.get(&points().doc(id)).await.unwrap().unwrap();
        assert_eq!(doc.fields["title"], json!("Hermitage"));
        assert!(doc.fields["createdAt"].as_str().unwrap().ends_with('Z'));
        assert!(!doc.fields.contains_key("ignored"));
    }

    #[tokio::test]
    async fn update_is_partial_and_requires_the_document() {
        let store = MemoryStore::new();
        let id = store
            .create(&points(), Writes::new().set("title", "A").set("order", 1).build())
            .await
            .unwrap();
        store
            .update(&points().doc(id.clone()), Writes::new().set("order", 5).build())
            .await
            .unwrap();
        let doc = store.get(&points().doc(id)).await.unwrap().unwrap();
        assert_eq!(doc.fields["title"], json!("A"));
        assert_eq!(doc.fields["order"], json!(5));

        let err = store
            .update(&points().doc("nope"), Writes::new().set("order", 1).build())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        let a = store.create(&points(), Writes::new().set("order", 1).build()).await.unwrap();

        let err = store
            .commit(vec![
                (points().doc(a.clone()), Writes::new().set("order", 2).build()),
                (points().doc("ghost"), Writes::new().set("order", 1).build()),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let doc = store.get(&points().doc(a)).await.unwrap().unwrap();
        assert_eq!(doc.fields["order"], json!(1));
    }

    #[tokio::test]
    async fn subscriptions_push_initial_and_changed_results() {
        let store = MemoryStore::new();
        let query = Query::new(points()).order_by("order", Direction::Asc);
        let mut sub = store.subscribe(&query).unwrap();
        assert_eq!(sub.next().await.unwrap().len(), 0);

        store.create(&points(), Writes::new().set("order", 1).build()).await.unwrap();
        assert_eq!(sub.next().await.unwrap().len(), 1);
        assert_eq!(store.listener_count(), 1);

        drop(sub);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn watch_reports_absence_after_delete() {
        let store = MemoryStore::new();
        let like = CollectionPath::root("routes").doc("r1").collection("likes").doc("u1");
        let mut sub = store.watch(&like).unwrap();
        assert_eq!(sub.next().await.unwrap(), None);

        store.set(&like, Writes::new().server_timestamp("createdAt").build()).await.unwrap();
        assert!(sub.next().await.unwrap().is_some());
        store.delete(&like).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_faults_fire_after_the_requested_successes() {
        let store = MemoryStore::new();
        store.fail_write_after(1, StoreError::Unavailable("offline".into()));
        assert!(store.create(&points(), WriteSet::new()).await.is_ok());
        assert!(store.create(&points(), WriteSet::new()).await.is_err());
        assert!(store.create(&points(), WriteSet::new()).await.is_ok());
        assert_eq!(store.write_attempts(), 3);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("wayfarer-snap-{}", Uuid::new_v4()));
        let path = dir.join("store.json");
        let store = MemoryStore::new();
        let id = store
            .create(&points(), Writes::new().set("title", "Hermitage").build())
            .await
            .unwrap();
        store.save_snapshot(&path).await.unwrap();

        let restored = MemoryStore::load_snapshot(&path).await.unwrap();
        let doc = restored.get(&points().doc(id)).await.unwrap().unwrap();
        assert_eq!(doc.fields["title"], json!("Hermitage"));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
