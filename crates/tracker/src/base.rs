//! Per-event tracker: delta state and the record-ranking algorithm.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use tracker_core::{
    BorderResponse, ChapterKey, ChapterStatus, EventKind, EventPhase, PlayerRanking, PlayerState,
    RankState, RegionTag, Result, TopResponse,
};
use tracker_database::{
    insert_chapter_ranking_batch, insert_ranking_batch, write_heartbeat, ChapterRankingRow,
    DatabaseEngine, RankingRow,
};
use tracker_kvcache::KvCache;
use tracker_upstream::{body_digest, RankingApi};

use crate::merger::merge_rankings;

/// One tick's fetched-and-merged ranking data.
struct HandledRankingData {
    record_time: i64,
    rankings: Vec<PlayerRanking>,
    world_bloom: HashMap<i32, Vec<PlayerRanking>>,
}

/// Tracks a single event for a single region.
///
/// Holds the in-memory delta maps; all access is serialized by the region's
/// tick, so no locking is needed here.
pub struct EventTrackerBase {
    region: RegionTag,
    event_id: i32,
    kind: EventKind,
    event_ended: bool,
    chapter_statuses: HashMap<i32, ChapterStatus>,
    chapter_ended: HashMap<i32, bool>,
    engine: Arc<DatabaseEngine>,
    kv: KvCache,
    api: Arc<dyn RankingApi>,
    /// user_id_key → last stored (score, rank).
    event_state: HashMap<i64, PlayerState>,
    /// (user_id_key, character_id) → last stored (score, rank).
    chapter_state: HashMap<ChapterKey, PlayerState>,
    /// rank → last holder; survives restarts through the KV backing.
    rank_state: HashMap<i64, RankState>,
    /// user_id → last persisted (score, rank); mirror of the KV hash.
    user_state: HashMap<String, PlayerState>,
}

impl EventTrackerBase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        region: RegionTag,
        event_id: i32,
        kind: EventKind,
        event_ended: bool,
        chapter_statuses: HashMap<i32, ChapterStatus>,
        engine: Arc<DatabaseEngine>,
        kv: KvCache,
        api: Arc<dyn RankingApi>,
    ) -> Self {
        let chapter_ended = chapter_statuses.keys().map(|&id| (id, false)).collect();
        Self {
            region,
            event_id,
            kind,
            event_ended,
            chapter_statuses,
            chapter_ended,
            engine,
            kv,
            api,
            event_state: HashMap::new(),
            chapter_state: HashMap::new(),
            rank_state: HashMap::new(),
            user_state: HashMap::new(),
        }
    }

    /// Load persisted state and migrate the event's tables.
    ///
    /// When a previous run marked the event ended, the tracker comes up in
    /// the ended state without touching the database.
    pub async fn init(&mut self) -> Result<()> {
        info!(region = %self.region, event_id = self.event_id, "initializing event tracker");
        if self.kv.is_event_ended(self.region, self.event_id).await {
            info!(
                region = %self.region,
                event_id = self.event_id,
                "event ended flag found, skipping initialization"
            );
            self.event_ended = true;
            return Ok(());
        }
        self.rank_state = self.kv.load_rank_state(self.region, self.event_id).await;
        self.user_state = self.kv.load_user_state(self.region, self.event_id).await;
        self.engine
            .create_event_tables(self.event_id, self.kind.is_world_bloom())
            .await?;
        info!(region = %self.region, event_id = self.event_id, "event tracker initialized");
        Ok(())
    }

    pub fn event_id(&self) -> i32 {
        self.event_id
    }

    pub fn is_event_ended(&self) -> bool {
        self.event_ended
    }

    /// Mark the event ended and persist the sentinel.
    pub async fn set_event_ended(&mut self) {
        self.event_ended = true;
        self.kv.set_event_ended(self.region, self.event_id).await;
    }

    pub fn chapter_statuses(&self) -> &HashMap<i32, ChapterStatus> {
        &self.chapter_statuses
    }

    pub fn set_chapter_statuses(&mut self, statuses: HashMap<i32, ChapterStatus>) {
        for &id in statuses.keys() {
            self.chapter_ended.entry(id).or_insert(false);
        }
        self.chapter_statuses = statuses;
    }

    pub fn is_chapter_ended(&self, character_id: i32) -> bool {
        self.chapter_ended.get(&character_id).copied().unwrap_or(false)
    }

    pub fn set_chapter_ended(&mut self, character_id: i32) {
        self.chapter_ended.insert(character_id, true);
    }

    /// Write a failure heartbeat for a tick that could not fetch or persist.
    pub async fn write_failure_heartbeat(&self, now_ms: i64) -> Result<()> {
        write_heartbeat(&self.engine, self.event_id, now_ms / 1000, 1).await
    }

    /// One recording pass: fetch, merge, diff, persist.
    ///
    /// `only_world_bloom` restricts the pass to chapter tables; used when a
    /// chapter is finalized mid-event.
    pub async fn record_ranking_data(&mut self, now_ms: i64, only_world_bloom: bool) -> Result<()> {
        if self.event_ended {
            info!(
                region = %self.region,
                event_id = self.event_id,
                "event already ended, skipping recording"
            );
            return Ok(());
        }

        let record_time = now_ms / 1000;
        let data = match self.handle_ranking_data(record_time).await {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    region = %self.region,
                    event_id = self.event_id,
                    error = %e,
                    "upstream failure, writing failure heartbeat"
                );
                write_heartbeat(&self.engine, self.event_id, record_time, 1).await?;
                return Err(e);
            }
        };

        let mut wrote_any = false;
        let mut changed_ranks: HashMap<i64, RankState> = HashMap::new();
        let mut changed_users: HashMap<String, PlayerState> = HashMap::new();
        let mut pending_ranks: Vec<(i64, RankState)> = Vec::new();

        if !only_world_bloom && !data.rankings.is_empty() {
            let candidates = self.diff_rank_based(&data.rankings, &mut pending_ranks);
            let rows = build_event_rows(data.record_time, &candidates);
            if !rows.is_empty() {
                insert_ranking_batch(&self.engine, self.event_id, &rows, &mut self.event_state)
                    .await?;
                wrote_any = true;
                for row in &rows {
                    let state = PlayerState {
                        score: row.score,
                        rank: row.rank,
                    };
                    if self.user_state.get(&row.user_id) != Some(&state) {
                        self.user_state.insert(row.user_id.clone(), state);
                        changed_users.insert(row.user_id.clone(), state);
                    }
                }
            }
        }

        let chapter_rows = build_chapter_rows(data.record_time, &data.world_bloom);
        if !chapter_rows.is_empty() {
            insert_chapter_ranking_batch(
                &self.engine,
                self.event_id,
                &chapter_rows,
                &mut self.chapter_state,
            )
            .await?;
            wrote_any = true;
        }

        if !wrote_any {
            write_heartbeat(&self.engine, self.event_id, record_time, 0).await?;
        }

        // All database writes landed; the in-memory rank view may advance.
        for (rank, state) in pending_ranks {
            self.rank_state.insert(rank, state.clone());
            changed_ranks.insert(rank, state);
        }
        self.kv
            .save_state(self.region, self.event_id, &changed_ranks, &changed_users)
            .await;

        debug!(
            region = %self.region,
            event_id = self.event_id,
            record_time,
            changed_ranks = changed_ranks.len(),
            "recording pass finished"
        );
        Ok(())
    }

    /// Fetch both endpoints and merge them into one canonical list, plus
    /// per-character lists for world-bloom events.
    async fn handle_ranking_data(&mut self, record_time: i64) -> Result<HandledRankingData> {
        let top = self.api.get_top(self.event_id, self.region).await?;
        let (border_digest, border) = self.api.get_border(self.event_id, self.region).await?;

        let world_bloom = if self.kind.is_world_bloom() {
            self.extract_world_bloom(&top, &border).await?
        } else {
            HashMap::new()
        };

        let cache_key = format!("{}-event-{}-main-border", self.region, self.event_id);
        let cached = match self.kv.detect_border_cache(&cache_key, &border_digest).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(
                    region = %self.region,
                    event_id = self.event_id,
                    error = %e,
                    "hash cache probe failed, merging full border"
                );
                false
            }
        };
        let rankings = merge_rankings(top.rankings, border.border_rankings, cached);

        Ok(HandledRankingData {
            record_time,
            rankings,
            world_bloom,
        })
    }

    /// Per-character merge of world-bloom chapter rankings.
    ///
    /// A chapter contributes only while ongoing, or once more when it has
    /// just ended and its sentinel has not flipped yet.
    async fn extract_world_bloom(
        &mut self,
        top: &TopResponse,
        border: &BorderResponse,
    ) -> Result<HashMap<i32, Vec<PlayerRanking>>> {
        let mut result = HashMap::new();
        let Some(chapters) = &top.user_world_bloom_chapter_rankings else {
            return Ok(result);
        };
        for chapter in chapters {
            let Some(character_id) = chapter.game_character_id else {
                continue;
            };
            let Some(status) = self.chapter_statuses.get(&character_id) else {
                continue;
            };
            if chapter.is_world_bloom_chapter_aggregate == Some(true) {
                continue;
            }
            let should_track = match status.phase {
                EventPhase::Ongoing => true,
                EventPhase::Ended if !self.is_chapter_ended(character_id) => {
                    info!(
                        region = %self.region,
                        event_id = self.event_id,
                        character_id,
                        "recording final rankings for world bloom chapter"
                    );
                    true
                }
                _ => false,
            };
            if !should_track || chapter.rankings.is_empty() {
                continue;
            }

            let border_band = border
                .user_world_bloom_chapter_ranking_borders
                .as_ref()
                .and_then(|bands| {
                    bands
                        .iter()
                        .find(|b| b.game_character_id == Some(character_id))
                })
                .map(|b| b.border_rankings.clone())
                .unwrap_or_default();

            let cache_key = format!(
                "{}-event-{}-world-bloom-{}-border",
                self.region, self.event_id, character_id
            );
            let digest = body_digest(&serde_json::to_vec(&border_band)?);
            let cached = match self.kv.detect_border_cache(&cache_key, &digest).await {
                Ok(hit) => hit,
                Err(e) => {
                    warn!(
                        region = %self.region,
                        event_id = self.event_id,
                        character_id,
                        error = %e,
                        "chapter hash cache probe failed, merging full border"
                    );
                    false
                }
            };
            result.insert(
                character_id,
                merge_rankings(chapter.rankings.clone(), border_band, cached),
            );
        }
        Ok(result)
    }

    /// Keep only entries whose rank changed holder or score.
    ///
    /// Updates are collected into `pending` and applied to `rank_state`
    /// only after the tick's writes succeed.
    fn diff_rank_based(
        &self,
        rankings: &[PlayerRanking],
        pending: &mut Vec<(i64, RankState)>,
    ) -> Vec<PlayerRanking> {
        let mut result = Vec::new();
        for entry in rankings {
            let (Some(rank), Some(score), Some(user_id)) = (entry.rank, entry.score, entry.user_id)
            else {
                continue;
            };
            let state = RankState {
                user_id: user_id.to_string(),
                score,
            };
            if self.rank_state.get(&rank) != Some(&state)
                && !pending.iter().any(|(r, _)| *r == rank)
            {
                pending.push((rank, state));
                result.push(entry.clone());
            }
        }
        result
    }
}

/// Build the main write batch, requiring all four fields and keeping the
/// first occurrence per user.
fn build_event_rows(record_time: i64, rankings: &[PlayerRanking]) -> Vec<RankingRow> {
    let mut seen = std::collections::HashSet::new();
    let mut rows = Vec::with_capacity(rankings.len());
    for entry in rankings {
        let (Some(user_id), Some(name), Some(score), Some(rank)) =
            (entry.user_id, &entry.name, entry.score, entry.rank)
        else {
            continue;
        };
        if !seen.insert(user_id) {
            continue;
        }
        rows.push(RankingRow {
            timestamp: record_time,
            user_id: user_id.to_string(),
            name: name.clone(),
            score,
            rank,
            cheerful_team_id: entry.cheerful_team_id(),
        });
    }
    rows
}

/// Build the chapter write batch across all eligible characters.
fn build_chapter_rows(
    record_time: i64,
    world_bloom: &HashMap<i32, Vec<PlayerRanking>>,
) -> Vec<ChapterRankingRow> {
    let mut character_ids: Vec<i32> = world_bloom.keys().copied().collect();
    character_ids.sort_unstable();

    let mut rows = Vec::new();
    for character_id in character_ids {
        let mut seen = std::collections::HashSet::new();
        for entry in &world_bloom[&character_id] {
            let (Some(user_id), Some(name), Some(score), Some(rank)) =
                (entry.user_id, &entry.name, entry.score, entry.rank)
            else {
                continue;
            };
            if !seen.insert(user_id) {
                continue;
            }
            rows.push(ChapterRankingRow {
                timestamp: record_time,
                user_id: user_id.to_string(),
                name: name.clone(),
                score,
                rank,
                cheerful_team_id: entry.cheerful_team_id(),
                character_id,
            });
        }
    }
    rows
}
