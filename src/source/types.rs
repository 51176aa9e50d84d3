//! Types shared between the service and a backing store.

use crate::error::{FeedError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Equality filter on a document field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

/// Sort clause for a query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Description of a live query against one collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub collection: String,
    /// Watch a single document instead of a query.
    pub document_id: Option<String>,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl CollectionSpec {
    /// Watch the whole collection.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            document_id: None,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Watch a single document.
    pub fn document(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            document_id: Some(id.into()),
            ..Self::collection(collection)
        }
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One document in a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// The complete result set of a query at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub documents: Vec<Document>,
    /// Served from the store's local cache rather than the server.
    pub from_cache: bool,
}

impl RawSnapshot {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            from_cache: false,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(vec![Document::new(id, data)])
    }
}

/// What a live query pushes to its sink.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    Snapshot(RawSnapshot),
    /// The live query failed after attaching. No further snapshots follow.
    Error(FeedError),
}

/// Callback a live query pushes its events into.
#[derive(Clone)]
pub struct SnapshotSink {
    deliver: Arc<dyn Fn(SourceEvent) + Send + Sync>,
}

impl SnapshotSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(SourceEvent) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn deliver(&self, event: SourceEvent) {
        (self.deliver)(event)
    }

    pub fn snapshot(&self, snapshot: RawSnapshot) {
        self.deliver(SourceEvent::Snapshot(snapshot))
    }

    pub fn error(&self, error: FeedError) {
        self.deliver(SourceEvent::Error(error))
    }
}

impl fmt::Debug for SnapshotSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SnapshotSink")
    }
}

/// Opaque handle to an attached live query, issued by the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceHandle(pub u64);

/// A document store that supports live queries.
///
/// Implementations may deliver events from any thread, including
/// synchronously from inside [`attach`](LiveSource::attach). Events for a
/// single attachment must be delivered one at a time, in order. The first
/// event after a successful attach is expected to be the full current
/// result set.
pub trait LiveSource: Send + Sync {
    /// Start a live query. Every change is pushed into `sink` until detached.
    fn attach(&self, spec: &CollectionSpec, sink: SnapshotSink) -> Result<SourceHandle>;

    /// Stop a live query. Unknown handles are ignored.
    fn detach(&self, handle: SourceHandle);

    /// Read the current result set once, without subscribing.
    fn fetch_once(&self, spec: &CollectionSpec) -> Result<RawSnapshot>;
}
