//! Channel parameters, keys and backing queries.

use crate::config::{CollectionNames, FanoutConfig};
use crate::error::{FeedError, Result};
use crate::source::CollectionSpec;
use crate::types::{ChannelKey, ChannelType, LeaderboardPeriod};
use serde::{Deserialize, Serialize};

/// A fully parameterized channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelSpec {
    SocialStats {
        user_id: String,
    },
    Leaderboard {
        category: String,
        period: LeaderboardPeriod,
        limit: usize,
    },
    XpUpdate {
        user_id: String,
    },
    Follow {
        user_id: String,
    },
}

impl ChannelSpec {
    pub fn social_stats(user_id: impl Into<String>) -> Self {
        ChannelSpec::SocialStats {
            user_id: user_id.into(),
        }
    }

    pub fn leaderboard(category: impl Into<String>, period: LeaderboardPeriod, limit: usize) -> Self {
        ChannelSpec::Leaderboard {
            category: category.into(),
            period,
            limit,
        }
    }

    pub fn xp(user_id: impl Into<String>) -> Self {
        ChannelSpec::XpUpdate {
            user_id: user_id.into(),
        }
    }

    pub fn follow(user_id: impl Into<String>) -> Self {
        ChannelSpec::Follow {
            user_id: user_id.into(),
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelSpec::SocialStats { .. } => ChannelType::SocialStats,
            ChannelSpec::Leaderboard { .. } => ChannelType::Leaderboard,
            ChannelSpec::XpUpdate { .. } => ChannelType::XpUpdate,
            ChannelSpec::Follow { .. } => ChannelType::Follow,
        }
    }

    /// Ordered parameters that make up the key.
    fn params(&self) -> Vec<String> {
        match self {
            ChannelSpec::SocialStats { user_id }
            | ChannelSpec::XpUpdate { user_id }
            | ChannelSpec::Follow { user_id } => vec![user_id.clone()],
            ChannelSpec::Leaderboard {
                category,
                period,
                limit,
            } => vec![
                category.clone(),
                period.as_str().to_string(),
                limit.to_string(),
            ],
        }
    }

    /// The canonical key, e.g. `leaderboard_totalXP_weekly_50`.
    pub fn key(&self) -> ChannelKey {
        let mut key = self.channel_type().as_str().to_string();
        for param in self.params() {
            key.push('_');
            key.push_str(&escape_param(&param));
        }
        ChannelKey(key)
    }

    /// Check parameters against the service limits.
    pub fn validate(&self, config: &FanoutConfig) -> Result<()> {
        match self {
            ChannelSpec::SocialStats { user_id }
            | ChannelSpec::XpUpdate { user_id }
            | ChannelSpec::Follow { user_id } => {
                if user_id.is_empty() {
                    return Err(FeedError::InvalidParams(format!(
                        "{} listener requires a user id",
                        self.channel_type()
                    )));
                }
            }
            ChannelSpec::Leaderboard {
                category, limit, ..
            } => {
                if category.is_empty() {
                    return Err(FeedError::InvalidParams(
                        "leaderboard listener requires a category".to_string(),
                    ));
                }
                if *limit == 0 || *limit > config.max_leaderboard_limit {
                    return Err(FeedError::InvalidParams(format!(
                        "leaderboard limit {} outside 1..={}",
                        limit, config.max_leaderboard_limit
                    )));
                }
            }
        }
        Ok(())
    }

    /// The live query backing this channel.
    pub fn collection_spec(&self, names: &CollectionNames) -> CollectionSpec {
        match self {
            ChannelSpec::SocialStats { user_id } => {
                CollectionSpec::document(&names.social_stats, user_id)
            }
            ChannelSpec::Leaderboard {
                category,
                period,
                limit,
            } => CollectionSpec::collection(&names.leaderboards)
                .with_filter("period", period.as_str())
                .with_order_by(category, true)
                .with_limit(*limit),
            ChannelSpec::XpUpdate { user_id } => CollectionSpec::document(&names.user_xp, user_id),
            ChannelSpec::Follow { user_id } => {
                CollectionSpec::collection(&names.follows).with_filter("followingId", user_id)
            }
        }
    }
}

/// Percent-escape the separator so distinct parameter lists never collide.
fn escape_param(param: &str) -> String {
    let mut escaped = String::with_capacity(param.len());
    for c in param.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '_' => escaped.push_str("%5F"),
            other => escaped.push(other),
        }
    }
    escaped
}
