//! Test fixtures: master-data catalogs, payload builders, and a harness
//! that wires a tracker to SQLite and an in-memory key/value backing.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use tracker_core::{
    BorderResponse, ChapterBorderRanking, ChapterTopRanking, DatabaseConfig, Dialect,
    PlayerRanking, RegionTag, TopResponse,
};
use tracker_daemon::RegionTracker;
use tracker_database::DatabaseEngine;
use tracker_kvcache::KvCache;
use tracker_upstream::RankingApi;

use crate::mocks::{MockRankingApi, TestClock};

/// Write a one-event marathon catalog (instants in epoch ms).
pub fn write_marathon_catalog(
    dir: &Path,
    event_id: i32,
    start_at: i64,
    aggregate_at: i64,
    closed_at: i64,
) {
    let events = serde_json::json!([{
        "id": event_id,
        "eventType": "marathon",
        "assetbundleName": format!("event_{event_id}"),
        "startAt": start_at,
        "aggregateAt": aggregate_at,
        "closedAt": closed_at,
    }]);
    fs::write(dir.join("events.json"), events.to_string()).unwrap();
    fs::write(dir.join("worldBlooms.json"), "[]").unwrap();
}

/// Write a one-event world-bloom catalog with character chapters, each
/// given as (character_id, chapter_start_at, aggregate_at, chapter_end_at).
pub fn write_world_bloom_catalog(
    dir: &Path,
    event_id: i32,
    start_at: i64,
    aggregate_at: i64,
    closed_at: i64,
    chapters: &[(i32, i64, i64, i64)],
) {
    let events = serde_json::json!([{
        "id": event_id,
        "eventType": "world_bloom",
        "assetbundleName": format!("event_{event_id}"),
        "startAt": start_at,
        "aggregateAt": aggregate_at,
        "closedAt": closed_at,
    }]);
    let blooms: Vec<serde_json::Value> = chapters
        .iter()
        .map(|(character_id, start, aggregate, end)| {
            serde_json::json!({
                "eventId": event_id,
                "characterId": character_id,
                "chapterType": "character",
                "chapterStartAt": start,
                "aggregateAt": aggregate,
                "chapterEndAt": end,
            })
        })
        .collect();
    fs::write(dir.join("events.json"), events.to_string()).unwrap();
    fs::write(
        dir.join("worldBlooms.json"),
        serde_json::to_string(&blooms).unwrap(),
    )
    .unwrap();
}

/// One well-formed ranking entry.
pub fn player(user_id: i64, name: &str, score: i64, rank: i64) -> PlayerRanking {
    PlayerRanking {
        user_id: Some(user_id),
        name: Some(name.to_string()),
        score: Some(score),
        rank: Some(rank),
        ..PlayerRanking::default()
    }
}

pub fn top_of(rankings: Vec<PlayerRanking>) -> TopResponse {
    TopResponse {
        rankings,
        user_ranking_status: Some("normal".to_string()),
        ..TopResponse::default()
    }
}

pub fn border_of(border_rankings: Vec<PlayerRanking>) -> BorderResponse {
    BorderResponse {
        border_rankings,
        ..BorderResponse::default()
    }
}

/// Top response carrying per-character world-bloom chapter rankings.
pub fn world_bloom_top(chapters: Vec<(i32, Vec<PlayerRanking>)>) -> TopResponse {
    TopResponse {
        user_world_bloom_chapter_rankings: Some(
            chapters
                .into_iter()
                .map(|(character_id, rankings)| ChapterTopRanking {
                    game_character_id: Some(character_id),
                    is_world_bloom_chapter_aggregate: Some(false),
                    rankings,
                })
                .collect(),
        ),
        ..TopResponse::default()
    }
}

/// Border response carrying per-character world-bloom border bands.
pub fn world_bloom_border(chapters: Vec<(i32, Vec<PlayerRanking>)>) -> BorderResponse {
    BorderResponse {
        user_world_bloom_chapter_ranking_borders: Some(
            chapters
                .into_iter()
                .map(|(character_id, border_rankings)| ChapterBorderRanking {
                    game_character_id: Some(character_id),
                    is_world_bloom_chapter_aggregate: Some(false),
                    border_rankings,
                })
                .collect(),
        ),
        ..BorderResponse::default()
    }
}

/// A region tracker wired to a scratch SQLite database, an in-memory
/// key/value backing, a scriptable upstream, and a settable clock.
pub struct Harness {
    pub dir: TempDir,
    pub engine: Arc<DatabaseEngine>,
    pub kv: KvCache,
    pub api: Arc<MockRankingApi>,
    pub clock: TestClock,
    pub tracker: RegionTracker,
}

impl Harness {
    pub async fn new(now_ms: i64) -> Self {
        let dir = TempDir::new().unwrap();
        let kv = KvCache::memory();
        Self::with_kv(dir, kv, now_ms).await
    }

    /// Build against an existing scratch dir and KV backing; used to
    /// simulate a daemon restart that keeps redis and the database.
    pub async fn with_kv(dir: TempDir, kv: KvCache, now_ms: i64) -> Self {
        let db_config = DatabaseConfig {
            enabled: true,
            dialect: Some(Dialect::Sqlite),
            dsn: format!("sqlite://{}?mode=rwc", dir.path().join("tracker.db").display()),
            ..DatabaseConfig::default()
        };
        let engine = Arc::new(
            DatabaseEngine::connect(RegionTag::Jp, &db_config)
                .await
                .unwrap(),
        );
        let api = Arc::new(MockRankingApi::new());
        let clock = TestClock::new(now_ms);
        let api_dyn: Arc<dyn RankingApi> = api.clone();
        let tracker = RegionTracker::new(
            RegionTag::Jp,
            dir.path(),
            engine.clone(),
            kv.clone(),
            api_dyn,
            clock.clock(),
        );
        Self {
            dir,
            engine,
            kv,
            api,
            clock,
            tracker,
        }
    }

    /// Restart the daemon: drop the tracker, keep the database file and the
    /// KV backing, and come back up at the given instant.
    pub async fn restart(self, now_ms: i64) -> Self {
        let Harness { dir, kv, .. } = self;
        Self::with_kv(dir, kv, now_ms).await
    }

    pub async fn table_exists(&self, name: &str) -> bool {
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(self.engine.pool())
        .await
        .unwrap();
        count == 1
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT count(*) FROM {table}"))
            .fetch_one(self.engine.pool())
            .await
            .unwrap()
    }

    /// (timestamp, status) rows of the timestamp dictionary, in insert order.
    pub async fn heartbeat_rows(&self, event_id: i32) -> Vec<(i64, i64)> {
        sqlx::query_as(&format!(
            "SELECT timestamp, status FROM event_{event_id}_time_id ORDER BY time_id"
        ))
        .fetch_all(self.engine.pool())
        .await
        .unwrap()
    }

    /// (time_id, user_id_key, score, rank) rows of the ranking table.
    pub async fn ranking_rows(&self, event_id: i32) -> Vec<(i64, i64, i64, i64)> {
        sqlx::query_as(&format!(
            "SELECT time_id, user_id_key, score, \"rank\" FROM event_{event_id} ORDER BY time_id, user_id_key"
        ))
        .fetch_all(self.engine.pool())
        .await
        .unwrap()
    }

    /// (time_id, user_id_key, character_id, score, rank) rows of the
    /// chapter ranking table.
    pub async fn chapter_rows(&self, event_id: i32) -> Vec<(i64, i64, i64, i64, i64)> {
        sqlx::query_as(&format!(
            "SELECT time_id, user_id_key, character_id, score, \"rank\" FROM wl_{event_id} \
             ORDER BY time_id, character_id, user_id_key"
        ))
        .fetch_all(self.engine.pool())
        .await
        .unwrap()
    }
}
