//! Core types for the fan-out service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::FeedError;

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// The closed set of live channels the service can serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    SocialStats,
    Leaderboard,
    XpUpdate,
    Follow,
}

impl ChannelType {
    pub const ALL: [ChannelType; 4] = [
        ChannelType::SocialStats,
        ChannelType::Leaderboard,
        ChannelType::XpUpdate,
        ChannelType::Follow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::SocialStats => "social_stats",
            ChannelType::Leaderboard => "leaderboard",
            ChannelType::XpUpdate => "xp_update",
            ChannelType::Follow => "follow",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FeedError::InvalidParams(format!("unknown channel type: {s}")))
    }
}

/// Stable identifier of a channel: `<type>_<param1>_<param2>...`.
///
/// Built only from a [`ChannelSpec`](crate::channels::ChannelSpec), so two
/// call sites asking for the same channel always agree on the key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelKey(pub(crate) String);

impl ChannelKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelKey({})", self.0)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Leaderboard time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaderboardPeriod {
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

impl LeaderboardPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardPeriod::Daily => "daily",
            LeaderboardPeriod::Weekly => "weekly",
            LeaderboardPeriod::Monthly => "monthly",
            LeaderboardPeriod::AllTime => "allTime",
        }
    }
}

impl fmt::Display for LeaderboardPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderboardPeriod {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(LeaderboardPeriod::Daily),
            "weekly" => Ok(LeaderboardPeriod::Weekly),
            "monthly" => Ok(LeaderboardPeriod::Monthly),
            "allTime" => Ok(LeaderboardPeriod::AllTime),
            other => Err(FeedError::InvalidParams(format!(
                "unknown leaderboard period: {other}"
            ))),
        }
    }
}

// --- Payloads ---

/// Aggregate social counters for one user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SocialStats {
    pub user_id: String,
    pub followers_count: u64,
    pub following_count: u64,
    pub posts_count: u64,
    pub likes_received: u64,
    pub trades_completed: u64,
    pub reputation: f64,
}

impl SocialStats {
    /// Zeroed record for a user with no stats document yet.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// One ranked row of a leaderboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based position in the ranking.
    pub rank: u32,
    pub user_id: String,
    pub display_name: Option<String>,
    pub score: f64,
}

/// A full ranked leaderboard as of one change event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardUpdate {
    pub category: String,
    pub period: LeaderboardPeriod,
    pub entries: Vec<LeaderboardEntry>,
}

/// Experience-point totals for one user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XpRecord {
    pub user_id: String,
    pub total: u64,
    pub level: u32,
    pub weekly: u64,
    pub monthly: u64,
}

impl XpRecord {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// Number of followers of one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowerCount {
    pub user_id: String,
    pub count: u64,
}

/// Decoded, channel-specific data carried by an envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UpdatePayload {
    SocialStats(SocialStats),
    Leaderboard(LeaderboardUpdate),
    XpUpdate(XpRecord),
    Follow(FollowerCount),
}

impl UpdatePayload {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            UpdatePayload::SocialStats(_) => ChannelType::SocialStats,
            UpdatePayload::Leaderboard(_) => ChannelType::Leaderboard,
            UpdatePayload::XpUpdate(_) => ChannelType::XpUpdate,
            UpdatePayload::Follow(_) => ChannelType::Follow,
        }
    }

    /// The user this payload is about. Leaderboards span many users.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            UpdatePayload::SocialStats(stats) => Some(&stats.user_id),
            UpdatePayload::Leaderboard(_) => None,
            UpdatePayload::XpUpdate(xp) => Some(&xp.user_id),
            UpdatePayload::Follow(follow) => Some(&follow.user_id),
        }
    }
}

/// The unit pushed from a channel to its matching subscribers.
///
/// Each envelope is a full state overwrite, not a delta: consumers should
/// replace whatever they hold for the channel with `data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnvelope {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub data: UpdatePayload,
    pub timestamp: Timestamp,
}

impl UpdateEnvelope {
    /// Wrap a payload, stamping it with the current time.
    pub fn new(data: UpdatePayload) -> Self {
        Self::at(data, Timestamp::now())
    }

    pub fn at(data: UpdatePayload, timestamp: Timestamp) -> Self {
        Self {
            user_id: data.user_id().map(str::to_string),
            data,
            timestamp,
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        self.data.channel_type()
    }
}

/// Service counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutStats {
    pub active_listeners: u64,
    pub active_subscribers: u64,
    /// Envelopes pushed through the registry.
    pub dispatches_total: u64,
    /// Successful callback invocations.
    pub deliveries_total: u64,
    /// Attach, source, decode and callback failures.
    pub errors_total: u64,
}
