use anyhow::Result;
use serde::Serialize;

use crate::level::level_for;
use crate::models::UserProfile;
use crate::store::DocumentStore;

pub const DEFAULT_LIMIT: usize = 50;
/// Largest leaderboard a client may ask for.
pub const MAX_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub uid: String,
    pub name: String,
    pub points: u64,
    pub title: &'static str,
    /// True for the signed-in user's own row.
    pub is_me: bool,
}

/// Fetch the top `limit` profiles and rank them, highest points first.
pub async fn fetch<R: DocumentStore>(
    remote: &R,
    me: Option<&str>,
    limit: usize,
) -> Result<Vec<LeaderboardEntry>> {
    let profiles = remote.top_by_points(limit).await?;
    Ok(rank(profiles, me))
}

/// Number already-sorted profiles from 1.
#[must_use]
pub fn rank(profiles: Vec<(String, UserProfile)>, me: Option<&str>) -> Vec<LeaderboardEntry> {
    profiles
        .into_iter()
        .enumerate()
        .map(|(i, (uid, profile))| LeaderboardEntry {
            rank: i + 1,
            name: profile.public_name(),
            points: profile.points,
            title: level_for(profile.points).title,
            is_me: me == Some(uid.as_str()),
            uid,
        })
        .collect()
}
