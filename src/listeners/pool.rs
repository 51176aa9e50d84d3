//! Reference-counted pool of live-query attachments.

use crate::channels::ChannelSpec;
use crate::config::CollectionNames;
use crate::dispatch::{Counters, Dispatcher};
use crate::error::{FeedError, Result};
use crate::source::{LiveSource, SnapshotSink, SourceEvent, SourceHandle};
use crate::types::ChannelKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::handle::ListenerHandle;
use super::types::{ListenerEntry, ListenerState, ListenerStatus};

pub(crate) struct PoolInner {
    entries: Mutex<HashMap<ChannelKey, ListenerEntry>>,
    source: Arc<dyn LiveSource>,
    dispatcher: Arc<Dispatcher>,
    counters: Arc<Counters>,
    collections: CollectionNames,
    next_generation: AtomicU64,
}

impl PoolInner {
    /// Sink handed to the source for one attachment. It holds the pool
    /// weakly and carries the generation, so events from an attachment
    /// that has since been detached go nowhere.
    fn sink_for(self: &Arc<Self>, key: ChannelKey, generation: u64) -> SnapshotSink {
        let pool = Arc::downgrade(self);
        SnapshotSink::new(move |event| {
            if let Some(pool) = pool.upgrade() {
                pool.on_source_event(&key, generation, event);
            }
        })
    }

    fn on_source_event(&self, key: &ChannelKey, generation: u64, event: SourceEvent) {
        let spec = {
            let mut entries = self.entries.lock();
            let entry = match entries.get(key) {
                Some(entry) if entry.generation == generation => entry.clone(),
                _ => {
                    trace!(%key, generation, "dropping event from detached listener");
                    return;
                }
            };

            match &event {
                SourceEvent::Snapshot(_) => match entry.state {
                    ListenerState::Attaching => {
                        entries.insert(key.clone(), entry.activated());
                        debug!(%key, "listener active");
                    }
                    ListenerState::Active => {}
                    ListenerState::Erroring | ListenerState::Detached => {
                        trace!(%key, state = %entry.state, "dropping snapshot for failed listener");
                        return;
                    }
                },
                SourceEvent::Error(error) => {
                    entries.insert(key.clone(), entry.erroring(error.clone()));
                }
            }
            entry.spec
        };

        match event {
            SourceEvent::Snapshot(snapshot) => {
                self.dispatcher.publish(key, &spec, &snapshot);
            }
            SourceEvent::Error(error) => {
                warn!(%key, %error, "live query failed");
                self.counters.record_error();
            }
        }
    }

    /// Record the result of an attach call made outside the lock.
    fn finish_attach(&self, key: &ChannelKey, generation: u64, attached: Result<SourceHandle>) {
        let mut entries = self.entries.lock();
        let current = entries
            .get(key)
            .filter(|entry| entry.generation == generation)
            .cloned();
        let entry = match current {
            Some(entry) => entry,
            None => {
                // Released (or cleaned up) while the attach was in flight.
                drop(entries);
                if let Ok(handle) = attached {
                    debug!(%key, "listener released during attach, detaching");
                    self.source.detach(handle);
                }
                return;
            }
        };

        match attached {
            Ok(handle) => {
                entries.insert(key.clone(), entry.with_source_handle(handle));
            }
            Err(error) => {
                let error = match error {
                    FeedError::Attach { .. } => error,
                    other => FeedError::Attach {
                        key: key.to_string(),
                        reason: other.to_string(),
                    },
                };
                warn!(%key, %error, "listener attach failed");
                entries.insert(key.clone(), entry.erroring(error));
                drop(entries);
                self.counters.record_error();
            }
        }
    }

    /// Drop one reference; detach when it was the last.
    ///
    /// Unknown keys and stale generations are ignored.
    pub(crate) fn release(&self, key: &ChannelKey, generation: u64) {
        let detached = {
            let mut entries = self.entries.lock();
            let entry = match entries.get(key) {
                Some(entry) if entry.generation == generation => entry.clone(),
                _ => return,
            };

            if entry.refcount > 1 {
                trace!(%key, refcount = entry.refcount - 1, "listener released");
                entries.insert(key.clone(), entry.with_refcount(entry.refcount - 1));
                None
            } else {
                entries.remove(key)
            }
        };

        if let Some(entry) = detached {
            if let Some(handle) = entry.source_handle {
                self.source.detach(handle);
            }
            debug!(%key, "listener detached");
        }
    }

    pub(crate) fn status(&self, key: &ChannelKey) -> Option<ListenerStatus> {
        self.entries.lock().get(key).map(ListenerEntry::status)
    }

    pub(crate) fn status_of(&self, key: &ChannelKey, generation: u64) -> Option<ListenerStatus> {
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.generation == generation)
            .map(ListenerEntry::status)
    }
}

/// One underlying live query per channel key, shared by every caller that
/// starts the same channel.
#[derive(Clone)]
pub struct ListenerPool {
    inner: Arc<PoolInner>,
}

impl ListenerPool {
    pub(crate) fn new(
        source: Arc<dyn LiveSource>,
        dispatcher: Arc<Dispatcher>,
        counters: Arc<Counters>,
        collections: CollectionNames,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                entries: Mutex::new(HashMap::new()),
                source,
                dispatcher,
                counters,
                collections,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Take a reference on `spec`'s channel, attaching its live query if
    /// this is the first one.
    ///
    /// Attach failures do not fail the call: the returned handle reports
    /// `Erroring` with the cause, and must still be released.
    pub fn acquire(&self, spec: ChannelSpec) -> ListenerHandle {
        let key = spec.key();

        let generation = {
            let mut entries = self.inner.entries.lock();
            if let Some(existing) = entries.get(&key) {
                let shared = existing.with_refcount(existing.refcount + 1);
                let generation = shared.generation;
                trace!(%key, refcount = shared.refcount, "sharing listener");
                entries.insert(key.clone(), shared);
                return ListenerHandle::new(key, generation, Arc::downgrade(&self.inner));
            }

            let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
            entries.insert(
                key.clone(),
                ListenerEntry::attaching(key.clone(), spec.clone(), generation),
            );
            generation
        };

        debug!(%key, generation, "attaching listener");
        let query = spec.collection_spec(&self.inner.collections);
        let sink = self.inner.sink_for(key.clone(), generation);
        let attached = self.inner.source.attach(&query, sink);
        self.inner.finish_attach(&key, generation, attached);

        ListenerHandle::new(key, generation, Arc::downgrade(&self.inner))
    }

    pub fn status(&self, key: &ChannelKey) -> Option<ListenerStatus> {
        self.inner.status(key)
    }

    /// Status of every listener, ordered by key.
    pub fn statuses(&self) -> Vec<ListenerStatus> {
        let mut statuses: Vec<ListenerStatus> = self
            .inner
            .entries
            .lock()
            .values()
            .map(ListenerEntry::status)
            .collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }

    /// Keys of every attached listener, sorted.
    pub fn keys(&self) -> Vec<ChannelKey> {
        let mut keys: Vec<ChannelKey> = self.inner.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach every listener regardless of outstanding handles.
    ///
    /// Handles still held afterwards release nothing.
    pub fn detach_all(&self) -> usize {
        let drained: Vec<ListenerEntry> = self
            .inner
            .entries
            .lock()
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        for entry in &drained {
            if let Some(handle) = entry.source_handle {
                self.inner.source.detach(handle);
            }
            debug!(key = %entry.key, refcount = entry.refcount, "listener force-detached");
        }
        drained.len()
    }

    #[cfg(test)]
    pub(crate) fn release_key(&self, key: &ChannelKey, generation: u64) {
        self.inner.release(key, generation)
    }
}
