use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    DocumentStore, SnapshotEvent, SnapshotHandler, StoreError, Subscription, merge_at,
    paths_overlap, set_at, value_at,
};

/// A write as it reached the store, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRecord {
    Set { path: String, value: Value },
    Update { path: String, fields: Map<String, Value> },
}

impl WriteRecord {
    pub fn path(&self) -> &str {
        match self {
            WriteRecord::Set { path, .. } | WriteRecord::Update { path, .. } => path,
        }
    }
}

#[derive(Default)]
struct Inner {
    root: Value,
    writes: Vec<WriteRecord>,
    fail_writes: Option<String>,
    next_listener: u64,
    listeners: BTreeMap<u64, (String, SnapshotHandler)>,
}

/// In-process document store with push notifications.
///
/// Used for local development and as the fake emitter in tests: it records
/// every write and can be told to reject writes.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: Value) -> Self {
        let store = Self::default();
        store.lock().root = root;
        store
    }

    pub fn root(&self) -> Value {
        self.lock().root.clone()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Makes every following write fail with `message`; `None` restores normal behavior.
    pub fn fail_writes(&self, message: Option<&str>) {
        self.lock().fail_writes = message.map(str::to_string);
    }

    /// Sends an error to every subscriber, as a revoked or broken stream would.
    pub fn emit_error(&self, message: &str) {
        let handlers: Vec<SnapshotHandler> = self
            .lock()
            .listeners
            .values()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(SnapshotEvent::Error(message.to_string()));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a write and notifies overlapping listeners once the lock is released.
    fn write(&self, record: WriteRecord) -> Result<(), StoreError> {
        let notifications = {
            let mut inner = self.lock();
            if let Some(message) = &inner.fail_writes {
                return Err(StoreError::Unavailable(message.clone()));
            }
            match record.clone() {
                WriteRecord::Set { path, value } => set_at(&mut inner.root, &path, value),
                WriteRecord::Update { path, fields } => merge_at(&mut inner.root, &path, fields),
            }
            let written = record.path().to_string();
            debug!(path = %written, "memory store write");
            inner.writes.push(record);

            inner
                .listeners
                .values()
                .filter(|(path, _)| paths_overlap(path, &written))
                .map(|(path, handler)| (handler.clone(), value_at(&inner.root, path).cloned()))
                .collect::<Vec<_>>()
        };

        for (handler, value) in notifications {
            handler(SnapshotEvent::Value(value));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(value_at(&self.lock().root, path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.write(WriteRecord::Set {
            path: path.to_string(),
            value,
        })
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.write(WriteRecord::Update {
            path: path.to_string(),
            fields,
        })
    }

    fn subscribe(&self, path: &str, handler: SnapshotHandler) -> Result<Subscription, StoreError> {
        let (id, current) = {
            let mut inner = self.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner
                .listeners
                .insert(id, (path.to_string(), handler.clone()));
            (id, value_at(&inner.root, path).cloned())
        };

        handler(SnapshotEvent::Value(current));

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .listeners
                    .remove(&id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn recorder() -> (SnapshotHandler, Arc<Mutex<Vec<SnapshotEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let handler: SnapshotHandler = Arc::new(move |event| sink.lock().unwrap().push(event));
        (handler, events)
    }

    #[tokio::test]
    async fn test_subscribe_delivers_current_value_first() {
        let store = MemoryDocumentStore::with_root(json!({ "content": { "eventDetails": { "date": "X" } } }));
        let (handler, events) = recorder();
        let _subscription = store.subscribe("content", handler).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            events[0],
            SnapshotEvent::Value(Some(json!({ "eventDetails": { "date": "X" } })))
        );
    }

    #[tokio::test]
    async fn test_writes_notify_overlapping_listeners_only() {
        let store = MemoryDocumentStore::new();
        let (content_handler, content_events) = recorder();
        let (other_handler, other_events) = recorder();
        let _a = store.subscribe("content", content_handler).unwrap();
        let _b = store.subscribe("registrations", other_handler).unwrap();

        store
            .set("content/coaches/0", json!({ "name": "A" }))
            .await
            .unwrap();

        assert_eq!(content_events.lock().unwrap().len(), 2);
        assert_eq!(other_events.lock().unwrap().len(), 1);
        assert_eq!(
            store.get("content/coaches/0/name").await.unwrap(),
            Some(json!("A"))
        );
    }

    #[tokio::test]
    async fn test_dropping_subscription_removes_listener() {
        let store = MemoryDocumentStore::new();
        let (handler, events) = recorder();
        let subscription = store.subscribe("content", handler).unwrap();
        assert_eq!(store.listener_count(), 1);

        subscription.unsubscribe();
        assert_eq!(store.listener_count(), 0);

        store.set("content", json!({ "a": 1 })).await.unwrap();
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_writes_are_not_recorded() {
        let store = MemoryDocumentStore::new();
        store.fail_writes(Some("offline"));
        let err = store.set("content", json!({ "a": 1 })).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(msg) if msg == "offline"));
        assert!(store.writes().is_empty());
        assert_eq!(store.root(), Value::Null);
    }
}
