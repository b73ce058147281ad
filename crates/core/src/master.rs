//! Master-data catalog records.
//!
//! Loaded from `events.json` / `worldBlooms.json` under a region's
//! master-data directory. Unknown fields are ignored; records missing a
//! required field are skipped by the classifier rather than failing the
//! whole file.

use serde::Deserialize;

use crate::enums::{EventKind, EventPhase, RegionTag};

/// Settling window after `aggregate_at` during which the event is
/// `Aggregating` before flipping to `Ended` (milliseconds).
pub const AGGREGATE_WINDOW_MS: i64 = 10 * 60 * 1000;

/// One event in the game catalog. All instants are epoch milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterEvent {
    pub id: i32,
    pub event_type: EventKind,
    pub assetbundle_name: String,
    pub start_at: i64,
    pub aggregate_at: i64,
    pub closed_at: i64,
}

impl MasterEvent {
    /// Whether `now_ms` falls inside this event's active window.
    pub fn is_active(&self, now_ms: i64) -> bool {
        self.start_at <= now_ms && now_ms < self.closed_at
    }

    /// Phase at `now_ms`, assuming the event is active.
    pub fn phase(&self, now_ms: i64) -> EventPhase {
        if now_ms < self.aggregate_at {
            EventPhase::Ongoing
        } else if now_ms < self.aggregate_at + AGGREGATE_WINDOW_MS {
            EventPhase::Aggregating
        } else {
            EventPhase::Ended
        }
    }
}

/// Chapter type inside a world-bloom event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterType {
    Character,
    Finale,
    #[serde(other)]
    Other,
}

/// One character-scoped chapter of a world-bloom event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub event_id: i32,
    #[serde(alias = "gameCharacterId")]
    pub character_id: i32,
    #[serde(default, alias = "worldBloomChapterType")]
    pub chapter_type: Option<ChapterType>,
    pub chapter_start_at: i64,
    pub aggregate_at: i64,
    pub chapter_end_at: i64,
}

impl Chapter {
    /// Finale chapters aggregate the others and are never tracked.
    pub fn is_finale(&self) -> bool {
        self.chapter_type == Some(ChapterType::Finale)
    }

    /// Phase at `now_ms`. Unlike the event-level rule, a chapter is `Ended`
    /// as soon as its end instant passes.
    pub fn phase(&self, now_ms: i64) -> EventPhase {
        if now_ms >= self.chapter_end_at {
            EventPhase::Ended
        } else if now_ms >= self.aggregate_at {
            EventPhase::Aggregating
        } else if now_ms >= self.chapter_start_at {
            EventPhase::Ongoing
        } else {
            EventPhase::NotStarted
        }
    }
}

/// Derived runtime status of one chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterStatus {
    pub region: RegionTag,
    pub event_id: i32,
    pub character_id: i32,
    pub phase: EventPhase,
}

/// The currently active event for a region, derived from the catalog.
#[derive(Debug, Clone)]
pub struct ActiveEvent {
    pub region: RegionTag,
    pub event_id: i32,
    pub kind: EventKind,
    pub phase: EventPhase,
    pub assetbundle_name: String,
    /// Per-character chapter statuses; populated only for world-bloom events.
    pub chapters: std::collections::HashMap<i32, ChapterStatus>,
}
