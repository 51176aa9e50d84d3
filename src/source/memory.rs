//! In-memory live source.
//!
//! Result sets are stored per [`CollectionSpec`] rather than evaluated from
//! documents: whoever drives the source decides what each query returns
//! and when it changes.

use crate::error::{FeedError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{CollectionSpec, LiveSource, RawSnapshot, SnapshotSink, SourceEvent, SourceHandle};

struct Attachment {
    spec: CollectionSpec,
    sink: SnapshotSink,
}

#[derive(Default)]
struct MemoryState {
    attachments: HashMap<SourceHandle, Attachment>,
    /// Current result set per query.
    results: HashMap<CollectionSpec, RawSnapshot>,
    /// Collections whose attach calls fail.
    failures: HashMap<String, FeedError>,
    /// Most recent sink per query, kept after detach.
    last_sinks: HashMap<CollectionSpec, SnapshotSink>,
    attach_count: u64,
    detach_count: u64,
}

/// A [`LiveSource`] backed by in-process maps.
pub struct MemorySource {
    state: Mutex<MemoryState>,
    next_handle: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Replace a query's result set without notifying listeners.
    pub fn set_results(&self, spec: &CollectionSpec, snapshot: RawSnapshot) {
        self.state.lock().results.insert(spec.clone(), snapshot);
    }

    /// Replace a query's result set and push it to every attached listener.
    ///
    /// Returns how many live queries received it.
    pub fn emit(&self, spec: &CollectionSpec, snapshot: RawSnapshot) -> usize {
        let sinks = {
            let mut state = self.state.lock();
            state.results.insert(spec.clone(), snapshot.clone());
            Self::sinks_for(&state, spec)
        };

        for sink in &sinks {
            sink.snapshot(snapshot.clone());
        }
        sinks.len()
    }

    /// Fail every live query attached for `spec`.
    pub fn emit_error(&self, spec: &CollectionSpec, error: FeedError) -> usize {
        let sinks = Self::sinks_for(&self.state.lock(), spec);
        for sink in &sinks {
            sink.error(error.clone());
        }
        sinks.len()
    }

    /// Make attach calls on `collection` fail until cleared.
    pub fn fail_attach(&self, collection: impl Into<String>, error: FeedError) {
        self.state.lock().failures.insert(collection.into(), error);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Number of attach calls that succeeded.
    pub fn attach_count(&self) -> u64 {
        self.state.lock().attach_count
    }

    pub fn detach_count(&self) -> u64 {
        self.state.lock().detach_count
    }

    /// Number of live queries currently attached.
    pub fn active_attachments(&self) -> usize {
        self.state.lock().attachments.len()
    }

    /// Number of live queries currently attached for `spec`.
    pub fn attachments_for(&self, spec: &CollectionSpec) -> usize {
        Self::sinks_for(&self.state.lock(), spec).len()
    }

    /// The sink most recently handed to `attach` for `spec`, even if that
    /// attachment has since been detached.
    pub fn last_sink(&self, spec: &CollectionSpec) -> Option<SnapshotSink> {
        self.state.lock().last_sinks.get(spec).cloned()
    }

    fn sinks_for(state: &MemoryState, spec: &CollectionSpec) -> Vec<SnapshotSink> {
        let mut matching: Vec<(&SourceHandle, &Attachment)> = state
            .attachments
            .iter()
            .filter(|(_, attachment)| &attachment.spec == spec)
            .collect();
        matching.sort_by_key(|(handle, _)| handle.0);
        matching
            .into_iter()
            .map(|(_, attachment)| attachment.sink.clone())
            .collect()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveSource for MemorySource {
    fn attach(&self, spec: &CollectionSpec, sink: SnapshotSink) -> Result<SourceHandle> {
        let initial = {
            let mut state = self.state.lock();
            if let Some(error) = state.failures.get(&spec.collection) {
                return Err(error.clone());
            }

            let handle = SourceHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
            state.attachments.insert(
                handle,
                Attachment {
                    spec: spec.clone(),
                    sink: sink.clone(),
                },
            );
            state.last_sinks.insert(spec.clone(), sink.clone());
            state.attach_count += 1;
            (handle, state.results.get(spec).cloned())
        };

        let (handle, results) = initial;
        // Live queries open with the current result set.
        if let Some(snapshot) = results {
            sink.deliver(SourceEvent::Snapshot(snapshot));
        }
        Ok(handle)
    }

    fn detach(&self, handle: SourceHandle) {
        let mut state = self.state.lock();
        if state.attachments.remove(&handle).is_some() {
            state.detach_count += 1;
        }
    }

    fn fetch_once(&self, spec: &CollectionSpec) -> Result<RawSnapshot> {
        let state = self.state.lock();
        if let Some(error) = state.failures.get(&spec.collection) {
            return Err(error.clone());
        }
        Ok(state.results.get(spec).cloned().unwrap_or_default())
    }
}
