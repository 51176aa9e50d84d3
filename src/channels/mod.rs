//! Channel definitions.
//!
//! A channel is a live feed identified by its type and parameters. This
//! module maps each channel to its stable key and backing query, decodes
//! raw snapshots into typed payloads, and provides the [`Channel`] trait
//! used for compile-time-checked subscriptions.

mod decode;
mod spec;
mod typed;

pub use decode::decode_snapshot;
pub use spec::ChannelSpec;
pub use typed::{Channel, FollowChannel, LeaderboardChannel, SocialStatsChannel, XpChannel};
