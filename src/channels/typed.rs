//! Compile-time channel descriptors.

use crate::types::{
    ChannelType, FollowerCount, LeaderboardUpdate, SocialStats, UpdatePayload, XpRecord,
};

/// Ties a channel type to its payload shape.
///
/// Used by [`FanoutService::subscribe_typed`](crate::FanoutService::subscribe_typed)
/// so a subscriber's callback receives the concrete payload type and can
/// never be registered against the wrong channel.
pub trait Channel: Send + Sync + 'static {
    const TYPE: ChannelType;
    type Payload: Send + Sync + 'static;

    /// Borrow the payload if the envelope belongs to this channel.
    fn payload(update: &UpdatePayload) -> Option<&Self::Payload>;
}

pub struct SocialStatsChannel;
pub struct LeaderboardChannel;
pub struct XpChannel;
pub struct FollowChannel;

impl Channel for SocialStatsChannel {
    const TYPE: ChannelType = ChannelType::SocialStats;
    type Payload = SocialStats;

    fn payload(update: &UpdatePayload) -> Option<&SocialStats> {
        match update {
            UpdatePayload::SocialStats(stats) => Some(stats),
            _ => None,
        }
    }
}

impl Channel for LeaderboardChannel {
    const TYPE: ChannelType = ChannelType::Leaderboard;
    type Payload = LeaderboardUpdate;

    fn payload(update: &UpdatePayload) -> Option<&LeaderboardUpdate> {
        match update {
            UpdatePayload::Leaderboard(board) => Some(board),
            _ => None,
        }
    }
}

impl Channel for XpChannel {
    const TYPE: ChannelType = ChannelType::XpUpdate;
    type Payload = XpRecord;

    fn payload(update: &UpdatePayload) -> Option<&XpRecord> {
        match update {
            UpdatePayload::XpUpdate(xp) => Some(xp),
            _ => None,
        }
    }
}

impl Channel for FollowChannel {
    const TYPE: ChannelType = ChannelType::Follow;
    type Payload = FollowerCount;

    fn payload(update: &UpdatePayload) -> Option<&FollowerCount> {
        match update {
            UpdatePayload::Follow(follow) => Some(follow),
            _ => None,
        }
    }
}
