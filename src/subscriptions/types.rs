//! Subscription types.

use crate::types::{ChannelType, Timestamp, UpdateEnvelope};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Caller-chosen identifier for a subscription.
///
/// Subscribing twice with the same id replaces the first subscription.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub String);

static GENERATED_IDS: AtomicU64 = AtomicU64::new(0);

impl SubscriberId {
    /// Build a collision-resistant id: `<channel>_<discriminator>_<millis>_<seq>`.
    pub fn generate(channel: ChannelType, discriminator: &str) -> Self {
        let seq = GENERATED_IDS.fetch_add(1, Ordering::Relaxed);
        SubscriberId(format!(
            "{}_{}_{}_{}",
            channel,
            discriminator,
            Timestamp::now().0,
            seq
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        SubscriberId(id.to_string())
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        SubscriberId(id)
    }
}

/// Which envelopes a subscriber wants. Empty sets match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriptionFilter {
    pub types: HashSet<ChannelType>,
    pub user_ids: HashSet<String>,
}

impl SubscriptionFilter {
    /// Receive every envelope.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only envelopes of the given channel types.
    pub fn types(types: impl IntoIterator<Item = ChannelType>) -> Self {
        Self {
            types: types.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Only envelopes about the given users.
    pub fn users<S: Into<String>>(user_ids: impl IntoIterator<Item = S>) -> Self {
        Self {
            user_ids: user_ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_types(mut self, types: impl IntoIterator<Item = ChannelType>) -> Self {
        self.types.extend(types);
        self
    }

    pub fn with_users<S: Into<String>>(mut self, user_ids: impl IntoIterator<Item = S>) -> Self {
        self.user_ids.extend(user_ids.into_iter().map(Into::into));
        self
    }

    /// Envelopes without a user id (leaderboards) pass the user clause.
    pub fn matches(&self, envelope: &UpdateEnvelope) -> bool {
        if !self.types.is_empty() && !self.types.contains(&envelope.channel_type()) {
            return false;
        }

        match &envelope.user_id {
            Some(user_id) if !self.user_ids.is_empty() => self.user_ids.contains(user_id),
            _ => true,
        }
    }
}

/// Error returned by a fallible subscriber callback.
pub type CallbackResult = std::result::Result<(), String>;

/// Stored form of every subscriber callback.
pub(crate) type Callback = Arc<dyn Fn(&UpdateEnvelope) -> CallbackResult + Send + Sync>;

/// Result of one dispatch pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Subscribers whose filter matched.
    pub matched: usize,
    /// Callbacks that completed without error.
    pub delivered: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
    /// Subscribers removed after the pass began.
    pub skipped: usize,
}
