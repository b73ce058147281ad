//! Region database engines and the dictionary-encoded ranking store.
//!
//! One [`DatabaseEngine`] per region, speaking MySQL, PostgreSQL, or SQLite
//! through a single pool. Each event owns four tables created on first
//! ingest; their names and columns are an external contract shared with the
//! read side.

pub mod engine;
pub mod insert;
pub mod tables;

pub use engine::DatabaseEngine;
pub use insert::{
    insert_chapter_ranking_batch, insert_ranking_batch, write_heartbeat, ChapterRankingRow,
    RankingRow,
};
pub use tables::{event_tables, EventTables};
