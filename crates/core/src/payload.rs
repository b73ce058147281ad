//! Upstream ranking payload schemas.
//!
//! Decoding is tolerant: every field is optional except the ranking arrays,
//! and unknown fields are ignored. Entries missing any of user id / name /
//! score / rank are discarded when rows are built, not at decode time.

use serde::{Deserialize, Serialize};

/// Cheerful-carnival team membership attached to a ranking entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserCheerfulCarnival {
    pub cheerful_carnival_team_id: Option<i32>,
    pub event_id: Option<i32>,
    pub register_at: Option<i64>,
    pub team_change_count: Option<i32>,
}

/// One player's entry in a ranking or border band.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerRanking {
    pub user_id: Option<i64>,
    pub name: Option<String>,
    pub score: Option<i64>,
    pub rank: Option<i64>,
    pub user_cheerful_carnival: Option<UserCheerfulCarnival>,
}

impl PlayerRanking {
    /// The team id, when upstream attached one.
    pub fn cheerful_team_id(&self) -> Option<i32> {
        self.user_cheerful_carnival
            .as_ref()
            .and_then(|c| c.cheerful_carnival_team_id)
    }
}

/// Per-character top rankings inside a world-bloom top response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterTopRanking {
    pub game_character_id: Option<i32>,
    pub is_world_bloom_chapter_aggregate: Option<bool>,
    pub rankings: Vec<PlayerRanking>,
}

/// Per-character border band inside a world-bloom border response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterBorderRanking {
    pub game_character_id: Option<i32>,
    pub is_world_bloom_chapter_aggregate: Option<bool>,
    pub border_rankings: Vec<PlayerRanking>,
}

/// Response of the `ranking-top100` endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopResponse {
    pub rankings: Vec<PlayerRanking>,
    pub user_ranking_status: Option<String>,
    pub user_world_bloom_chapter_rankings: Option<Vec<ChapterTopRanking>>,
}

/// Response of the `ranking-border` endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BorderResponse {
    pub border_rankings: Vec<PlayerRanking>,
    pub user_world_bloom_chapter_ranking_borders: Option<Vec<ChapterBorderRanking>>,
}
