//! Service configuration.

use crate::error::{FeedError, Result};
use serde::{Deserialize, Serialize};

/// Names of the backing collections each channel reads from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectionNames {
    pub social_stats: String,
    pub leaderboards: String,
    #[serde(rename = "userXP")]
    pub user_xp: String,
    pub follows: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            social_stats: "socialStats".to_string(),
            leaderboards: "leaderboards".to_string(),
            user_xp: "userXP".to_string(),
            follows: "follows".to_string(),
        }
    }
}

/// Configuration for a [`FanoutService`](crate::FanoutService).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FanoutConfig {
    pub collections: CollectionNames,

    /// Largest leaderboard a listener may request.
    /// Default: 100
    pub max_leaderboard_limit: usize,

    /// Buffered envelopes per channel-backed subscriber.
    /// Default: 1000
    pub channel_buffer: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            collections: CollectionNames::default(),
            max_leaderboard_limit: 100,
            channel_buffer: 1000,
        }
    }
}

impl FanoutConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FanoutConfig =
            serde_json::from_str(json).map_err(|e| FeedError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_leaderboard_limit == 0 {
            return Err(FeedError::Config(
                "maxLeaderboardLimit must be at least 1".to_string(),
            ));
        }
        if self.channel_buffer == 0 {
            return Err(FeedError::Config(
                "channelBuffer must be at least 1".to_string(),
            ));
        }
        let names = [
            &self.collections.social_stats,
            &self.collections.leaderboards,
            &self.collections.user_xp,
            &self.collections.follows,
        ];
        if names.iter().any(|name| name.is_empty()) {
            return Err(FeedError::Config(
                "collection names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
