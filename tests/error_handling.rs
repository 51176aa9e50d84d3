//! Error handling and edge case tests.

use livefeed::{
    ChannelSpec, CollectionNames, CollectionSpec, FanoutConfig, FanoutService, FeedError,
    LeaderboardPeriod, ListenerState, MemorySource, RawSnapshot, SubscriptionFilter,
    UpdatePayload,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn test_service() -> (Arc<MemorySource>, FanoutService) {
    let source = Arc::new(MemorySource::new());
    let service = FanoutService::new(source.clone());
    (source, service)
}

fn query(spec: &ChannelSpec) -> CollectionSpec {
    spec.collection_spec(&CollectionNames::default())
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&livefeed::UpdateEnvelope) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let captured = Arc::clone(&count);
    (count, move |_: &livefeed::UpdateEnvelope| {
        captured.fetch_add(1, Ordering::SeqCst);
    })
}

// --- Callback Errors ---

#[test]
fn test_panicking_subscriber_does_not_affect_others() {
    let (source, service) = test_service();
    let (count, cb) = counter();

    service.subscribe("broken", SubscriptionFilter::all(), |_| {
        panic!("view unmounted");
    });
    service.subscribe("healthy", SubscriptionFilter::all(), cb);

    let spec = ChannelSpec::xp("u1");
    let handle = service.start_xp_listener("u1").unwrap();
    source.emit(&query(&spec), RawSnapshot::empty());
    source.emit(&query(&spec), RawSnapshot::empty());

    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(handle.state(), ListenerState::Active);
    let stats = service.stats();
    assert_eq!(stats.active_subscribers, 2);
    assert_eq!(stats.errors_total, 2);
    assert_eq!(stats.deliveries_total, 2);
}

#[test]
fn test_fallible_subscriber_error_counted() {
    let (_, service) = test_service();
    service.subscribe_fallible("picky", SubscriptionFilter::all(), |envelope| {
        match envelope.data {
            UpdatePayload::Follow(_) => Ok(()),
            _ => Err("unexpected channel".to_string()),
        }
    });

    let outcome = service.dispatch(&livefeed::UpdateEnvelope::new(UpdatePayload::XpUpdate(
        livefeed::XpRecord::empty("u1"),
    )));
    assert_eq!(outcome.failed, 1);
    assert_eq!(service.stats().errors_total, 1);
}

#[test]
fn test_full_channel_subscriber_stays_registered() {
    let source = Arc::new(MemorySource::new());
    let config = FanoutConfig {
        channel_buffer: 1,
        ..Default::default()
    };
    let service = FanoutService::with_config(source, config).unwrap();
    let receiver = service.subscribe_channel("slow", SubscriptionFilter::all());

    for total in 0..3 {
        service.dispatch(&livefeed::UpdateEnvelope::new(UpdatePayload::XpUpdate(
            livefeed::XpRecord {
                user_id: "u1".into(),
                total,
                ..Default::default()
            },
        )));
    }

    assert_eq!(receiver.len(), 1);
    assert_eq!(service.stats().errors_total, 2);
    assert_eq!(service.stats().active_subscribers, 1);
}

// --- Listener Errors ---

#[test]
fn test_attach_error_is_local_to_channel() {
    let (source, service) = test_service();
    source.fail_attach("leaderboards", FeedError::Unavailable("network".into()));
    let (count, cb) = counter();
    service.subscribe("all", SubscriptionFilter::all(), cb);

    let board = service
        .start_leaderboard_listener("totalXP", LeaderboardPeriod::Daily, 10)
        .unwrap();
    let xp = service.start_xp_listener("u1").unwrap();

    assert_eq!(board.state(), ListenerState::Erroring);
    match board.last_error() {
        Some(FeedError::Attach { key, reason }) => {
            assert_eq!(key, "leaderboard_totalXP_daily_10");
            assert!(reason.contains("network"));
        }
        other => panic!("Expected attach error, got {:?}", other),
    }

    source.emit(&query(&ChannelSpec::xp("u1")), RawSnapshot::empty());
    assert_eq!(xp.state(), ListenerState::Active);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(service.stats().errors_total, 1);
}

#[test]
fn test_erroring_listener_not_retried_by_later_starts() {
    let (source, service) = test_service();
    source.fail_attach("userXP", FeedError::PermissionDenied("rules".into()));

    let first = service.start_xp_listener("u1").unwrap();
    source.clear_failures();
    let second = service.start_xp_listener("u1").unwrap();

    assert_eq!(second.state(), ListenerState::Erroring);
    assert_eq!(source.attach_count(), 0);
    assert_eq!(service.listener_status(first.key()).unwrap().refcount, 2);
}

#[test]
fn test_live_query_error_after_attach() {
    let (source, service) = test_service();
    let spec = ChannelSpec::social_stats("u1");
    let handle = service.start_social_stats_listener("u1").unwrap();
    source.emit(&query(&spec), RawSnapshot::empty());

    source.emit_error(&query(&spec), FeedError::Unavailable("disconnected".into()));
    assert_eq!(handle.state(), ListenerState::Erroring);
    assert_eq!(
        handle.last_error(),
        Some(FeedError::Unavailable("disconnected".into()))
    );
}

#[test]
fn test_undecodable_snapshot_dropped() {
    let (source, service) = test_service();
    let (count, cb) = counter();
    service.subscribe("all", SubscriptionFilter::all(), cb);

    let spec = ChannelSpec::xp("u1");
    let handle = service.start_xp_listener("u1").unwrap();
    source.emit(&query(&spec), RawSnapshot::single("u1", json!({"total": "many"})));
    source.emit(&query(&spec), RawSnapshot::single("u1", json!({"total": 8})));

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), ListenerState::Active);
    assert_eq!(service.stats().errors_total, 1);
}

// --- Parameters & Fallback ---

#[test]
fn test_invalid_listener_params() {
    let (source, service) = test_service();

    assert!(matches!(
        service.start_xp_listener(""),
        Err(FeedError::InvalidParams(_))
    ));
    assert!(matches!(
        service.start_leaderboard_listener("totalXP", LeaderboardPeriod::Weekly, 0),
        Err(FeedError::InvalidParams(_))
    ));
    assert!(matches!(
        service.start_leaderboard_listener("totalXP", LeaderboardPeriod::Weekly, 1000),
        Err(FeedError::InvalidParams(_))
    ));
    assert_eq!(source.attach_count(), 0);
    assert!(service.active_listeners().is_empty());
}

#[test]
fn test_fetch_once_fallback() {
    let (source, service) = test_service();
    let spec = ChannelSpec::xp("u1");
    source.set_results(&query(&spec), RawSnapshot::single("u1", json!({"total": 77})));

    let envelope = service.fetch_once(&spec).unwrap();
    assert_eq!(envelope.user_id.as_deref(), Some("u1"));
    match envelope.data {
        UpdatePayload::XpUpdate(xp) => assert_eq!(xp.total, 77),
        other => panic!("Expected xp update, got {:?}", other),
    }
    assert_eq!(service.stats().dispatches_total, 0);

    source.fail_attach("userXP", FeedError::Unavailable("offline".into()));
    assert!(matches!(
        service.fetch_once(&spec),
        Err(FeedError::Unavailable(_))
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let config = FanoutConfig {
        max_leaderboard_limit: 0,
        ..Default::default()
    };
    assert!(matches!(
        FanoutService::with_config(Arc::new(MemorySource::new()), config),
        Err(FeedError::Config(_))
    ));
}

#[test]
fn test_custom_collection_names() {
    let source = Arc::new(MemorySource::new());
    let config = FanoutConfig::from_json(r#"{"collections": {"userXP": "xp_totals"}}"#).unwrap();
    let service = FanoutService::with_config(source.clone(), config.clone()).unwrap();

    let _handle = service.start_xp_listener("u1").unwrap();
    let expected = ChannelSpec::xp("u1").collection_spec(&config.collections);
    assert_eq!(expected.collection, "xp_totals");
    assert_eq!(source.attachments_for(&expected), 1);
}
