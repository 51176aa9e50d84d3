//! Caller-side reference to a shared listener.

use crate::error::FeedError;
use crate::types::ChannelKey;
use std::fmt;
use std::sync::Weak;

use super::pool::PoolInner;
use super::types::{ListenerState, ListenerStatus};

/// One reference on a channel's listener.
///
/// Returned by every `start_*` call. Releasing it (explicitly or by
/// dropping it) gives the reference back; the live query is detached when
/// the last handle for the channel goes. A handle only ever releases the
/// attachment it was issued for, so it cannot disturb a later listener on
/// the same key.
#[must_use = "dropping a ListenerHandle releases the listener immediately"]
pub struct ListenerHandle {
    key: ChannelKey,
    generation: u64,
    pool: Weak<PoolInner>,
    released: bool,
}

impl ListenerHandle {
    pub(crate) fn new(key: ChannelKey, generation: u64, pool: Weak<PoolInner>) -> Self {
        Self {
            key,
            generation,
            pool,
            released: false,
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Current status of the attachment this handle refers to.
    ///
    /// `None` once it has been detached (for example by a cleanup).
    pub fn status(&self) -> Option<ListenerStatus> {
        self.pool
            .upgrade()
            .and_then(|pool| pool.status_of(&self.key, self.generation))
    }

    pub fn state(&self) -> ListenerState {
        self.status()
            .map(|status| status.state)
            .unwrap_or(ListenerState::Detached)
    }

    /// The failure that put the listener into `Erroring`.
    pub fn last_error(&self) -> Option<FeedError> {
        self.status().and_then(|status| status.last_error)
    }

    /// Give the reference back.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(pool) = self.pool.upgrade() {
            pool.release(&self.key, self.generation);
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}
