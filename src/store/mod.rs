//! Remote document store seam.
//!
//! The content layer only ever talks to a [`DocumentStore`]: a hierarchical
//! JSON document addressed by slash-separated paths, with get-once reads,
//! whole-subtree `set`, field-level `update` and push subscriptions.

pub mod memory;
pub mod rtdb;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryDocumentStore;
pub use rtdb::RtdbDocumentStore;

pub const CONTENT_ROOT: &str = "content";
pub const EVENT_DETAILS_PATH: &str = "content/eventDetails";
pub const COACHES_PATH: &str = "content/coaches";

pub fn coach_path(index: usize) -> String {
    format!("{COACHES_PATH}/{index}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid document path: {0}")]
    InvalidPath(#[from] url::ParseError),
    #[error("Store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// What a subscription handler receives.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    /// Full value of the subscribed subtree; `None` when nothing exists there.
    Value(Option<Value>),
    /// The subscription failed and will deliver nothing further.
    Error(String),
}

pub type SnapshotHandler = Arc<dyn Fn(SnapshotEvent) + Send + Sync>;

/// Handle of a live subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the whole subtree at `path`.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Writes only the given children of `path`, leaving the others untouched.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// Delivers the current value of `path` and then every change to it.
    /// Handlers may be invoked synchronously from inside `set`/`update`.
    fn subscribe(&self, path: &str, handler: SnapshotHandler) -> Result<Subscription, StoreError>;
}

pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// True when one path is an ancestor of (or equal to) the other.
pub(crate) fn paths_overlap(a: &str, b: &str) -> bool {
    let (a, b) = (segments(a), segments(b));
    let shared = a.len().min(b.len());
    a[..shared] == b[..shared]
}

pub(crate) fn value_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments(path) {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!node.is_null()).then_some(node)
}

/// Writes `value` at `path`, creating intermediate objects. `Null` deletes.
pub(crate) fn set_at(root: &mut Value, path: &str, value: Value) {
    let parts = segments(path);
    let Some((last, parents)) = parts.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        node = child_mut(node, segment);
    }
    objectify_for_key(node, last);

    match node {
        Value::Array(items) => {
            let Ok(index) = last.parse::<usize>() else {
                return;
            };
            if index >= items.len() {
                if value.is_null() {
                    return;
                }
                items.resize(index + 1, Value::Null);
            }
            items[index] = value;
            while items.last().is_some_and(Value::is_null) {
                items.pop();
            }
        }
        Value::Object(map) => insert_or_remove(map, last, value),
        other => {
            let mut map = Map::new();
            insert_or_remove(&mut map, last, value);
            *other = Value::Object(map);
        }
    }
}

/// Applies each field as an individual `set_at` beneath `path`.
pub(crate) fn merge_at(root: &mut Value, path: &str, fields: Map<String, Value>) {
    let base = segments(path).join("/");
    for (key, value) in fields {
        let child = if base.is_empty() {
            key
        } else {
            format!("{base}/{key}")
        };
        set_at(root, &child, value);
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    objectify_for_key(node, segment);
    if !node.is_object() && !node.is_array() {
        *node = Value::Object(Map::new());
    }
    let slot = match node {
        Value::Array(items) => {
            let index = segment.parse::<usize>().unwrap_or_default();
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
        other => other,
    };
    if slot.is_null() {
        *slot = Value::Object(Map::new());
    }
    slot
}

/// Arrays can only be indexed numerically; any other key turns the array
/// into an object keyed by index.
fn objectify_for_key(node: &mut Value, key: &str) {
    if node.is_array() && key.parse::<usize>().is_err() {
        if let Value::Array(items) = std::mem::take(node) {
            *node = Value::Object(array_to_object(items));
        }
    }
}

fn array_to_object(items: Vec<Value>) -> Map<String, Value> {
    items
        .into_iter()
        .enumerate()
        .filter(|(_, v)| !v.is_null())
        .map(|(i, v)| (i.to_string(), v))
        .collect()
}

fn insert_or_remove(map: &mut Map<String, Value>, key: &str, value: Value) {
    if value.is_null() {
        map.remove(key);
    } else {
        map.insert(key.to_string(), value);
    }
}
