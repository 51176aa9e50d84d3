//! # Live Feed
//!
//! In-process fan-out of a few expensive live queries against a document
//! store to any number of cheap, filtered subscribers.
//!
//! ## Core Concepts
//!
//! - **Channels**: Live feeds identified by type and parameters (one
//!   user's XP, a weekly leaderboard)
//! - **Listeners**: The single live query behind a channel, shared and
//!   reference-counted through [`ListenerHandle`]s
//! - **Subscribers**: Callbacks with a filter on channel type and user id
//! - **Envelopes**: Decoded, typed updates pushed to matching subscribers
//!
//! ## Example
//!
//! ```ignore
//! use livefeed::{FanoutService, MemorySource, SubscriptionFilter, ChannelType};
//!
//! let service = FanoutService::new(Arc::new(MemorySource::new()));
//!
//! service.subscribe(
//!     "xp_header_1700000000000",
//!     SubscriptionFilter::users(["u1"]).with_types([ChannelType::XpUpdate]),
//!     |envelope| println!("{:?}", envelope.data),
//! );
//!
//! // Keep the handle for as long as the view is mounted.
//! let handle = service.start_xp_listener("u1")?;
//! // ...
//! handle.release();
//! ```

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod listeners;
pub mod service;
pub mod source;
pub mod stats;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use channels::{
    decode_snapshot, Channel, ChannelSpec, FollowChannel, LeaderboardChannel, SocialStatsChannel,
    XpChannel,
};
pub use config::{CollectionNames, FanoutConfig};
pub use dispatch::Dispatcher;
pub use error::{FeedError, Result};
pub use listeners::{ListenerHandle, ListenerPool, ListenerState, ListenerStatus};
pub use service::FanoutService;
pub use source::{
    CollectionSpec, Document, FieldFilter, LiveSource, MemorySource, OrderBy, RawSnapshot,
    SnapshotSink, SourceEvent, SourceHandle,
};
pub use stats::StatsReporter;
pub use subscriptions::{
    CallbackResult, DispatchOutcome, SubscriberId, SubscriptionFilter, SubscriptionRegistry,
};
pub use types::*;
