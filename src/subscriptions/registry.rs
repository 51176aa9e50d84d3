//! Subscription registry and fan-out.

use crate::types::UpdateEnvelope;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::types::{Callback, CallbackResult, DispatchOutcome, SubscriberId, SubscriptionFilter};

/// Internal subscriber state.
struct Subscriber {
    id: SubscriberId,
    filter: SubscriptionFilter,
    callback: Callback,
    /// Registration order; dispatch passes visit subscribers by it.
    seq: u64,
    /// Cleared when the entry is removed or replaced, so a dispatch pass
    /// that already holds this entry in its snapshot skips it.
    active: AtomicBool,
}

impl Subscriber {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn retire(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Run the callback, turning a panic into an error.
    fn invoke(&self, envelope: &UpdateEnvelope) -> CallbackResult {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(envelope))) {
            Ok(result) => result,
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

/// The set of logical subscribers.
pub struct SubscriptionRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Arc<Subscriber>>>,
    next_seq: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a subscriber, replacing any existing one with the same id.
    ///
    /// A replacement counts as a new registration and moves to the end of
    /// the dispatch order.
    pub fn subscribe<F>(&self, id: SubscriberId, filter: SubscriptionFilter, callback: F)
    where
        F: Fn(&UpdateEnvelope) + Send + Sync + 'static,
    {
        self.subscribe_fallible(id, filter, move |envelope| {
            callback(envelope);
            Ok(())
        });
    }

    /// Register a subscriber whose callback can report failure.
    pub fn subscribe_fallible<F>(&self, id: SubscriberId, filter: SubscriptionFilter, callback: F)
    where
        F: Fn(&UpdateEnvelope) -> CallbackResult + Send + Sync + 'static,
    {
        let subscriber = Arc::new(Subscriber {
            id: id.clone(),
            filter,
            callback: Arc::new(callback),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
        });

        let replaced = self.subscribers.write().insert(id.clone(), subscriber);
        if let Some(previous) = replaced {
            previous.retire();
            debug!(subscriber = %id, "replaced existing subscriber");
        } else {
            debug!(subscriber = %id, "subscribed");
        }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.write().remove(id);
        match removed {
            Some(subscriber) => {
                subscriber.retire();
                debug!(subscriber = %id, "unsubscribed");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.read().contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Remove every subscriber.
    pub fn clear(&self) -> usize {
        let drained: Vec<Arc<Subscriber>> =
            self.subscribers.write().drain().map(|(_, sub)| sub).collect();
        for subscriber in &drained {
            subscriber.retire();
        }
        drained.len()
    }

    /// Deliver an envelope to every matching subscriber.
    ///
    /// Works on the subscribers registered when the call starts, visited in
    /// registration order. Callbacks run without any lock held, so they may
    /// subscribe or unsubscribe; anyone removed mid-pass is skipped for the
    /// rest of it.
    pub fn dispatch(&self, envelope: &UpdateEnvelope) -> DispatchOutcome {
        let mut snapshot: Vec<Arc<Subscriber>> =
            self.subscribers.read().values().cloned().collect();
        snapshot.sort_by_key(|subscriber| subscriber.seq);
        let mut outcome = DispatchOutcome::default();

        for subscriber in snapshot {
            if !subscriber.is_active() {
                outcome.skipped += 1;
                continue;
            }
            if !subscriber.filter.matches(envelope) {
                continue;
            }

            outcome.matched += 1;
            match subscriber.invoke(envelope) {
                Ok(()) => {
                    trace!(subscriber = %subscriber.id, channel = %envelope.channel_type(), "delivered");
                    outcome.delivered += 1;
                }
                Err(reason) => {
                    warn!(
                        subscriber = %subscriber.id,
                        channel = %envelope.channel_type(),
                        %reason,
                        "subscriber callback failed"
                    );
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelType, FollowerCount, UpdatePayload, XpRecord};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn xp_envelope(user: &str, total: u64) -> UpdateEnvelope {
        UpdateEnvelope::new(UpdatePayload::XpUpdate(XpRecord {
            user_id: user.to_string(),
            total,
            ..Default::default()
        }))
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&UpdateEnvelope) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&count);
        (count, move |_: &UpdateEnvelope| {
            captured.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let (_, cb) = counter();

        registry.subscribe("s1".into(), SubscriptionFilter::all(), cb);
        assert_eq!(registry.active_count(), 1);

        assert!(registry.unsubscribe(&"s1".into()));
        assert!(!registry.unsubscribe(&"s1".into()));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_resubscribe_replaces() {
        let registry = SubscriptionRegistry::new();
        let (first, cb1) = counter();
        let (second, cb2) = counter();

        registry.subscribe("s1".into(), SubscriptionFilter::all(), cb1);
        registry.subscribe("s1".into(), SubscriptionFilter::all(), cb2);
        assert_eq!(registry.active_count(), 1);

        registry.dispatch(&xp_envelope("u1", 1));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scenario_filtered_delivery() {
        let registry = SubscriptionRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        registry.subscribe(
            "s1".into(),
            SubscriptionFilter::users(["u1"]).with_types([ChannelType::XpUpdate]),
            move |envelope| captured.lock().push(envelope.clone()),
        );

        let follow = UpdateEnvelope::new(UpdatePayload::Follow(FollowerCount {
            user_id: "u1".into(),
            count: 4,
        }));
        let outcome = registry.dispatch(&follow);
        assert_eq!(outcome.matched, 0);
        assert!(seen.lock().is_empty());

        let xp = xp_envelope("u1", 120);
        registry.dispatch(&xp);
        assert_eq!(*seen.lock(), vec![xp]);
    }

    #[test]
    fn test_identical_envelopes_both_delivered() {
        let registry = SubscriptionRegistry::new();
        let (count, cb) = counter();
        registry.subscribe("s1".into(), SubscriptionFilter::all(), cb);

        let envelope = xp_envelope("u1", 7);
        registry.dispatch(&envelope);
        registry.dispatch(&envelope.clone());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_callback_is_isolated() {
        let registry = SubscriptionRegistry::new();
        let (count, cb) = counter();

        registry.subscribe("panics".into(), SubscriptionFilter::all(), |_| {
            panic!("boom");
        });
        registry.subscribe_fallible("errors".into(), SubscriptionFilter::all(), |_| {
            Err("rejected".to_string())
        });
        registry.subscribe("healthy".into(), SubscriptionFilter::all(), cb);

        let outcome = registry.dispatch(&xp_envelope("u1", 1));
        assert_eq!(outcome.matched, 3);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Failing subscribers stay registered.
        assert_eq!(registry.active_count(), 3);
        let outcome = registry.dispatch(&xp_envelope("u1", 2));
        assert_eq!(outcome.failed, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    /// Registers a subscriber that removes `victim` from inside its callback.
    fn subscribe_remover(
        registry: &Arc<SubscriptionRegistry>,
        id: &str,
        victim: &str,
    ) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let weak = Arc::downgrade(registry);
        let victim = SubscriberId::from(victim);
        registry.subscribe(id.into(), SubscriptionFilter::all(), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(registry) = weak.upgrade() {
                registry.unsubscribe(&victim);
            }
        });
        calls
    }

    #[test]
    fn test_dispatch_visits_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["c", "a", "d", "b", "e"] {
            let captured = Arc::clone(&order);
            registry.subscribe(name.into(), SubscriptionFilter::all(), move |_| {
                captured.lock().push(name);
            });
        }

        registry.dispatch(&xp_envelope("u1", 1));
        assert_eq!(*order.lock(), vec!["c", "a", "d", "b", "e"]);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_skips_in_flight() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let remover_calls = subscribe_remover(&registry, "remover", "victim");
        let (victim_count, victim_cb) = counter();
        registry.subscribe("victim".into(), SubscriptionFilter::all(), victim_cb);

        let outcome = registry.dispatch(&xp_envelope("u1", 1));
        assert_eq!(remover_calls.load(Ordering::SeqCst), 1);
        assert_eq!(victim_count.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.delivered, 1);

        let outcome = registry.dispatch(&xp_envelope("u1", 2));
        assert_eq!(victim_count.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.matched, 1);
    }

    #[test]
    fn test_unsubscribe_after_delivery_in_same_pass() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (victim_count, victim_cb) = counter();
        registry.subscribe("victim".into(), SubscriptionFilter::all(), victim_cb);
        subscribe_remover(&registry, "remover", "victim");

        let outcome = registry.dispatch(&xp_envelope("u1", 1));
        assert_eq!(victim_count.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.skipped, 0);

        registry.dispatch(&xp_envelope("u1", 2));
        assert_eq!(victim_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_replaced_mid_pass_skips_old_entry() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (old_count, old_cb) = counter();
        let (new_count, new_cb) = counter();
        let new_cb = Arc::new(Mutex::new(Some(new_cb)));

        let weak = Arc::downgrade(&registry);
        registry.subscribe("replacer".into(), SubscriptionFilter::all(), move |_| {
            if let (Some(registry), Some(cb)) = (weak.upgrade(), new_cb.lock().take()) {
                registry.subscribe("target".into(), SubscriptionFilter::all(), cb);
            }
        });
        registry.subscribe("target".into(), SubscriptionFilter::all(), old_cb);

        let outcome = registry.dispatch(&xp_envelope("u1", 1));
        assert_eq!(old_count.load(Ordering::SeqCst), 0);
        assert_eq!(new_count.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.skipped, 1);

        registry.dispatch(&xp_envelope("u1", 2));
        assert_eq!(old_count.load(Ordering::SeqCst), 0);
        assert_eq!(new_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_self_unsubscribe_during_dispatch() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&registry);
        let captured = Arc::clone(&calls);
        registry.subscribe("once".into(), SubscriptionFilter::all(), move |_| {
            captured.fetch_add(1, Ordering::SeqCst);
            if let Some(registry) = weak.upgrade() {
                registry.unsubscribe(&"once".into());
            }
        });

        registry.dispatch(&xp_envelope("u1", 1));
        registry.dispatch(&xp_envelope("u1", 2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_subscribe_during_dispatch_waits_for_next_pass() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (late_count, late_cb) = counter();
        let late_cb = Arc::new(Mutex::new(Some(late_cb)));

        let weak = Arc::downgrade(&registry);
        registry.subscribe("spawner".into(), SubscriptionFilter::all(), move |_| {
            if let (Some(registry), Some(cb)) = (weak.upgrade(), late_cb.lock().take()) {
                registry.subscribe("late".into(), SubscriptionFilter::all(), cb);
            }
        });

        registry.dispatch(&xp_envelope("u1", 1));
        assert_eq!(late_count.load(Ordering::SeqCst), 0);

        registry.dispatch(&xp_envelope("u1", 2));
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear() {
        let registry = SubscriptionRegistry::new();
        let (count, cb) = counter();
        registry.subscribe("s1".into(), SubscriptionFilter::all(), cb);

        assert_eq!(registry.clear(), 1);
        registry.dispatch(&xp_envelope("u1", 1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
