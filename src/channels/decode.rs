//! Snapshot decoding into channel payloads.

use crate::error::{FeedError, Result};
use crate::source::{Document, RawSnapshot};
use crate::types::{
    FollowerCount, LeaderboardEntry, LeaderboardPeriod, LeaderboardUpdate, SocialStats,
    UpdatePayload, XpRecord,
};
use serde::de::DeserializeOwned;

use super::spec::ChannelSpec;

/// Turn a raw snapshot into the payload shape of `spec`'s channel.
pub fn decode_snapshot(spec: &ChannelSpec, snapshot: &RawSnapshot) -> Result<UpdatePayload> {
    match spec {
        ChannelSpec::SocialStats { user_id } => {
            let stats = match find_document(snapshot, user_id) {
                Some(doc) => SocialStats {
                    user_id: user_id.clone(),
                    ..decode_document::<SocialStats>("social_stats", doc)?
                },
                None => SocialStats::empty(user_id.clone()),
            };
            Ok(UpdatePayload::SocialStats(stats))
        }
        ChannelSpec::Leaderboard {
            category,
            period,
            limit,
        } => decode_leaderboard(category, *period, *limit, snapshot).map(UpdatePayload::Leaderboard),
        ChannelSpec::XpUpdate { user_id } => {
            let xp = match find_document(snapshot, user_id) {
                Some(doc) => XpRecord {
                    user_id: user_id.clone(),
                    ..decode_document::<XpRecord>("xp_update", doc)?
                },
                None => XpRecord::empty(user_id.clone()),
            };
            Ok(UpdatePayload::XpUpdate(xp))
        }
        ChannelSpec::Follow { user_id } => Ok(UpdatePayload::Follow(FollowerCount {
            user_id: user_id.clone(),
            count: snapshot.documents.len() as u64,
        })),
    }
}

/// The watched document; a missing document means "no data yet".
fn find_document<'a>(snapshot: &'a RawSnapshot, id: &str) -> Option<&'a Document> {
    snapshot.documents.iter().find(|doc| doc.id == id)
}

fn decode_document<T: DeserializeOwned>(channel: &str, doc: &Document) -> Result<T> {
    serde_json::from_value(doc.data.clone()).map_err(|e| FeedError::Decode {
        channel: channel.to_string(),
        reason: format!("document {}: {}", doc.id, e),
    })
}

fn decode_leaderboard(
    category: &str,
    period: LeaderboardPeriod,
    limit: usize,
    snapshot: &RawSnapshot,
) -> Result<LeaderboardUpdate> {
    let mut entries = Vec::with_capacity(snapshot.documents.len().min(limit));

    for (position, doc) in snapshot.documents.iter().take(limit).enumerate() {
        let score = doc
            .data
            .get(category)
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| FeedError::Decode {
                channel: "leaderboard".to_string(),
                reason: format!("document {} has no numeric {}", doc.id, category),
            })?;

        let user_id = doc
            .data
            .get("userId")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&doc.id)
            .to_string();

        let display_name = doc
            .data
            .get("displayName")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        entries.push(LeaderboardEntry {
            rank: position as u32 + 1,
            user_id,
            display_name,
            score,
        });
    }

    Ok(LeaderboardUpdate {
        category: category.to_string(),
        period,
        entries,
    })
}
