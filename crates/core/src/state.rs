//! Delta-cache state records.
//!
//! The short serde names are the wire format of the key/value backing and
//! must stay stable across restarts.

use serde::{Deserialize, Serialize};

/// Last stored (score, rank) pair for a player. Persisted in the
/// `user_state` hash as `{"s": score, "r": rank}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    #[serde(rename = "s")]
    pub score: i64,
    #[serde(rename = "r")]
    pub rank: i64,
}

/// Last holder of a rank. Persisted in the `rank_state` hash as
/// `{"u": user_id, "s": score}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankState {
    #[serde(rename = "u")]
    pub user_id: String,
    #[serde(rename = "s")]
    pub score: i64,
}

/// Key of the per-chapter delta map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChapterKey {
    pub user_id_key: i64,
    pub character_id: i32,
}
