//! Envelope construction and fan-out accounting.

use crate::channels::{decode_snapshot, ChannelSpec};
use crate::source::RawSnapshot;
use crate::subscriptions::{DispatchOutcome, SubscriptionRegistry};
use crate::types::{ChannelKey, UpdateEnvelope};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Running totals shared by the dispatcher and the listener pool.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    dispatches: AtomicU64,
    deliveries: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dispatch(&self, outcome: &DispatchOutcome) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        self.errors.fetch_add(outcome.failed as u64, Ordering::Relaxed);
    }

    pub(crate) fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub(crate) fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub(crate) fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.dispatches.store(0, Ordering::Relaxed);
        self.deliveries.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

/// Turns raw change events into envelopes and pushes them through the
/// registry.
///
/// Every call dispatches synchronously, so envelopes from one channel
/// reach subscribers in the order the source emitted them. Identical
/// payloads are not collapsed.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<SubscriptionRegistry>, counters: Arc<Counters>) -> Self {
        Self { registry, counters }
    }

    /// Decode a snapshot for `spec` and dispatch it.
    ///
    /// Returns `None` when the snapshot could not be decoded.
    pub fn publish(
        &self,
        key: &ChannelKey,
        spec: &ChannelSpec,
        snapshot: &RawSnapshot,
    ) -> Option<DispatchOutcome> {
        match decode_snapshot(spec, snapshot) {
            Ok(payload) => Some(self.dispatch(&UpdateEnvelope::new(payload))),
            Err(error) => {
                warn!(%key, %error, "dropping undecodable snapshot");
                self.counters.record_error();
                None
            }
        }
    }

    /// Fan an envelope out to every matching subscriber.
    pub fn dispatch(&self, envelope: &UpdateEnvelope) -> DispatchOutcome {
        let outcome = self.registry.dispatch(envelope);
        self.counters.record_dispatch(&outcome);
        outcome
    }
}
