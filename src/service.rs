//! The service object tying pool, registry, dispatcher and stats together.

use crate::channels::{decode_snapshot, Channel, ChannelSpec};
use crate::config::FanoutConfig;
use crate::dispatch::{Counters, Dispatcher};
use crate::error::Result;
use crate::listeners::{ListenerHandle, ListenerPool, ListenerStatus};
use crate::source::LiveSource;
use crate::stats::StatsReporter;
use crate::subscriptions::{
    CallbackResult, DispatchOutcome, SubscriberId, SubscriptionFilter, SubscriptionRegistry,
};
use crate::types::{ChannelKey, FanoutStats, LeaderboardPeriod, UpdateEnvelope};
use crossbeam_channel::{bounded, Receiver, TrySendError};
use std::sync::Arc;
use tracing::{debug, info};

/// Realtime update fan-out service.
///
/// Construct one per process at startup and hand it to whatever needs
/// live updates. Subscribers and listeners are independent: subscribe to
/// the envelopes you care about, then start the channels that produce
/// them.
pub struct FanoutService {
    config: FanoutConfig,
    source: Arc<dyn LiveSource>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<Dispatcher>,
    pool: ListenerPool,
    reporter: StatsReporter,
    counters: Arc<Counters>,
}

impl FanoutService {
    /// Create a service over `source` with the default configuration.
    pub fn new(source: Arc<dyn LiveSource>) -> Self {
        Self::build(source, FanoutConfig::default())
    }

    /// Create a service with a custom configuration.
    pub fn with_config(source: Arc<dyn LiveSource>, config: FanoutConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(source, config))
    }

    fn build(source: Arc<dyn LiveSource>, config: FanoutConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let counters = Arc::new(Counters::default());
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), Arc::clone(&counters)));
        let pool = ListenerPool::new(
            Arc::clone(&source),
            Arc::clone(&dispatcher),
            Arc::clone(&counters),
            config.collections.clone(),
        );
        let reporter = StatsReporter::new(Arc::clone(&registry), pool.clone(), Arc::clone(&counters));

        Self {
            config,
            source,
            registry,
            dispatcher,
            pool,
            reporter,
            counters,
        }
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    // --- Subscribers ---

    /// Register (or replace) a subscriber.
    pub fn subscribe<F>(&self, id: impl Into<SubscriberId>, filter: SubscriptionFilter, callback: F)
    where
        F: Fn(&UpdateEnvelope) + Send + Sync + 'static,
    {
        self.registry.subscribe(id.into(), filter, callback);
    }

    /// Register a subscriber whose callback may fail.
    pub fn subscribe_fallible<F>(
        &self,
        id: impl Into<SubscriberId>,
        filter: SubscriptionFilter,
        callback: F,
    ) where
        F: Fn(&UpdateEnvelope) -> CallbackResult + Send + Sync + 'static,
    {
        self.registry.subscribe_fallible(id.into(), filter, callback);
    }

    /// Subscribe to one channel type with its concrete payload.
    ///
    /// An empty `user_ids` means every user.
    pub fn subscribe_typed<C, S, F>(
        &self,
        id: impl Into<SubscriberId>,
        user_ids: impl IntoIterator<Item = S>,
        callback: F,
    ) where
        C: Channel,
        S: Into<String>,
        F: Fn(&C::Payload, &UpdateEnvelope) + Send + Sync + 'static,
    {
        let filter = SubscriptionFilter::types([C::TYPE]).with_users(user_ids);
        self.registry.subscribe(id.into(), filter, move |envelope| {
            if let Some(payload) = C::payload(&envelope.data) {
                callback(payload, envelope);
            }
        });
    }

    /// Subscribe through a bounded queue instead of a callback.
    ///
    /// A full queue or a dropped receiver fails that delivery; the
    /// subscriber stays registered until unsubscribed.
    pub fn subscribe_channel(
        &self,
        id: impl Into<SubscriberId>,
        filter: SubscriptionFilter,
    ) -> Receiver<UpdateEnvelope> {
        let (sender, receiver) = bounded(self.config.channel_buffer);
        self.registry
            .subscribe_fallible(id.into(), filter, move |envelope| {
                sender.try_send(envelope.clone()).map_err(|e| match e {
                    TrySendError::Full(_) => "subscriber buffer full".to_string(),
                    TrySendError::Disconnected(_) => "subscriber receiver dropped".to_string(),
                })
            });
        receiver
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: impl Into<SubscriberId>) -> bool {
        self.registry.unsubscribe(&id.into())
    }

    /// Push an envelope to matching subscribers directly.
    pub fn dispatch(&self, envelope: &UpdateEnvelope) -> DispatchOutcome {
        self.dispatcher.dispatch(envelope)
    }

    // --- Listeners ---

    /// Start (or share) the listener for any channel.
    pub fn start_listener(&self, spec: ChannelSpec) -> Result<ListenerHandle> {
        spec.validate(&self.config)?;
        Ok(self.pool.acquire(spec))
    }

    pub fn start_social_stats_listener(&self, user_id: &str) -> Result<ListenerHandle> {
        self.start_listener(ChannelSpec::social_stats(user_id))
    }

    pub fn start_leaderboard_listener(
        &self,
        category: &str,
        period: LeaderboardPeriod,
        limit: usize,
    ) -> Result<ListenerHandle> {
        self.start_listener(ChannelSpec::leaderboard(category, period, limit))
    }

    pub fn start_xp_listener(&self, user_id: &str) -> Result<ListenerHandle> {
        self.start_listener(ChannelSpec::xp(user_id))
    }

    pub fn start_follow_listener(&self, user_id: &str) -> Result<ListenerHandle> {
        self.start_listener(ChannelSpec::follow(user_id))
    }

    /// Read a channel's current value once, without a listener.
    ///
    /// The fallback for callers whose listener is erroring. Nothing is
    /// dispatched; the envelope is returned to the caller only.
    pub fn fetch_once(&self, spec: &ChannelSpec) -> Result<UpdateEnvelope> {
        spec.validate(&self.config)?;
        let query = spec.collection_spec(&self.config.collections);
        let snapshot = self.source.fetch_once(&query)?;
        let payload = decode_snapshot(spec, &snapshot)?;
        debug!(key = %spec.key(), "fetched channel once");
        Ok(UpdateEnvelope::new(payload))
    }

    // --- Diagnostics ---

    pub fn stats(&self) -> FanoutStats {
        self.reporter.stats()
    }

    pub fn active_listeners(&self) -> Vec<ChannelKey> {
        self.reporter.active_listeners()
    }

    pub fn listener_status(&self, key: &ChannelKey) -> Option<ListenerStatus> {
        self.pool.status(key)
    }

    pub fn listener_statuses(&self) -> Vec<ListenerStatus> {
        self.reporter.listener_statuses()
    }

    /// Tear everything down: detach every listener, drop every subscriber
    /// and zero the counters.
    pub fn cleanup(&self) {
        let listeners = self.pool.detach_all();
        let subscribers = self.registry.clear();
        self.counters.reset();
        info!(listeners, subscribers, "fan-out service cleaned up");
    }
}
