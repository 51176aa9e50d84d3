//! Read-only diagnostics over the pool and registry.

use crate::dispatch::Counters;
use crate::listeners::{ListenerPool, ListenerStatus};
use crate::subscriptions::SubscriptionRegistry;
use crate::types::{ChannelKey, FanoutStats};
use std::sync::Arc;

/// Aggregates service state for diagnostics.
pub struct StatsReporter {
    registry: Arc<SubscriptionRegistry>,
    pool: ListenerPool,
    counters: Arc<Counters>,
}

impl StatsReporter {
    pub(crate) fn new(
        registry: Arc<SubscriptionRegistry>,
        pool: ListenerPool,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            registry,
            pool,
            counters,
        }
    }

    pub fn stats(&self) -> FanoutStats {
        FanoutStats {
            active_listeners: self.pool.len() as u64,
            active_subscribers: self.registry.active_count() as u64,
            dispatches_total: self.counters.dispatches(),
            deliveries_total: self.counters.deliveries(),
            errors_total: self.counters.errors(),
        }
    }

    pub fn active_listeners(&self) -> Vec<ChannelKey> {
        self.pool.keys()
    }

    pub fn listener_statuses(&self) -> Vec<ListenerStatus> {
        self.pool.statuses()
    }
}
