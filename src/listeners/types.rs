//! Listener entry types.

use crate::channels::ChannelSpec;
use crate::error::FeedError;
use crate::source::SourceHandle;
use crate::types::ChannelKey;
use serde::Serialize;
use std::fmt;

/// Lifecycle of a listener entry.
///
/// `Attaching -> Active | Erroring`, and either of those to `Detached`
/// once the last handle is released. There is no path back from
/// `Erroring`; a fresh start after `Detached` is the only retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Attaching,
    Active,
    Erroring,
    Detached,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ListenerState::Attaching => "attaching",
            ListenerState::Active => "active",
            ListenerState::Erroring => "erroring",
            ListenerState::Detached => "detached",
        })
    }
}

/// One live attachment in the pool.
///
/// Entries are replaced whole on every change; readers never observe a
/// half-updated entry.
#[derive(Clone, Debug)]
pub(crate) struct ListenerEntry {
    pub key: ChannelKey,
    pub spec: ChannelSpec,
    pub refcount: usize,
    pub state: ListenerState,
    pub source_handle: Option<SourceHandle>,
    pub last_error: Option<FeedError>,
    /// Distinguishes this attachment from earlier ones under the same key.
    pub generation: u64,
}

impl ListenerEntry {
    pub fn attaching(key: ChannelKey, spec: ChannelSpec, generation: u64) -> Self {
        Self {
            key,
            spec,
            refcount: 1,
            state: ListenerState::Attaching,
            source_handle: None,
            last_error: None,
            generation,
        }
    }

    pub fn with_refcount(&self, refcount: usize) -> Self {
        Self {
            refcount,
            ..self.clone()
        }
    }

    pub fn with_source_handle(&self, handle: SourceHandle) -> Self {
        Self {
            source_handle: Some(handle),
            ..self.clone()
        }
    }

    pub fn activated(&self) -> Self {
        Self {
            state: ListenerState::Active,
            ..self.clone()
        }
    }

    pub fn erroring(&self, error: FeedError) -> Self {
        Self {
            state: ListenerState::Erroring,
            last_error: Some(error),
            ..self.clone()
        }
    }

    pub fn status(&self) -> ListenerStatus {
        ListenerStatus {
            key: self.key.clone(),
            channel: self.spec.clone(),
            state: self.state,
            refcount: self.refcount,
            last_error: self.last_error.clone(),
        }
    }
}

/// Point-in-time view of a listener, for callers and diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct ListenerStatus {
    pub key: ChannelKey,
    pub channel: ChannelSpec,
    pub state: ListenerState,
    pub refcount: usize,
    /// Why the listener is erroring, if it is.
    pub last_error: Option<FeedError>,
}
