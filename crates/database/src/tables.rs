//! Per-event table identifiers and schema definitions.
//!
//! Table names follow `event_{id}_time_id`, `event_{id}_users`,
//! `event_{id}`, and `wl_{id}`; the lookup from (region, event) to those
//! names is cached process-wide behind a readers-writer lock since the read
//! side resolves through the same map.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use sea_query::{Alias, ColumnDef, Iden, Index, Table, TableCreateStatement};

use tracker_core::RegionTag;

/// Columns of the timestamp dictionary.
#[derive(Iden)]
pub enum TimeCol {
    TimeId,
    Timestamp,
    Status,
}

/// Columns of the user dictionary.
#[derive(Iden)]
pub enum UserCol {
    UserIdKey,
    UserId,
    Name,
    CheerfulTeamId,
}

/// Columns of the per-event ranking table.
#[derive(Iden)]
pub enum RankingCol {
    TimeId,
    UserIdKey,
    Score,
    Rank,
}

/// Columns of the per-event chapter ranking table.
#[derive(Iden)]
pub enum ChapterCol {
    TimeId,
    UserIdKey,
    CharacterId,
    Score,
    Rank,
}

/// Resolved table names for one (region, event) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTables {
    pub event_id: i32,
    time_id: String,
    users: String,
    ranking: String,
    world_bloom: String,
}

impl EventTables {
    fn new(event_id: i32) -> Self {
        Self {
            event_id,
            time_id: format!("event_{event_id}_time_id"),
            users: format!("event_{event_id}_users"),
            ranking: format!("event_{event_id}"),
            world_bloom: format!("wl_{event_id}"),
        }
    }

    pub fn time_id(&self) -> Alias {
        Alias::new(&self.time_id)
    }

    pub fn users(&self) -> Alias {
        Alias::new(&self.users)
    }

    pub fn ranking(&self) -> Alias {
        Alias::new(&self.ranking)
    }

    pub fn world_bloom(&self) -> Alias {
        Alias::new(&self.world_bloom)
    }

    /// DDL for the timestamp dictionary.
    pub fn create_time_id(&self) -> TableCreateStatement {
        Table::create()
            .table(self.time_id())
            .if_not_exists()
            .col(
                ColumnDef::new(TimeCol::TimeId)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(
                ColumnDef::new(TimeCol::Timestamp)
                    .big_integer()
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new(TimeCol::Status).tiny_integer().not_null())
            .to_owned()
    }

    /// DDL for the user dictionary.
    pub fn create_users(&self) -> TableCreateStatement {
        Table::create()
            .table(self.users())
            .if_not_exists()
            .col(
                ColumnDef::new(UserCol::UserIdKey)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(
                ColumnDef::new(UserCol::UserId)
                    .string_len(30)
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new(UserCol::Name).string_len(300).not_null())
            .col(ColumnDef::new(UserCol::CheerfulTeamId).integer())
            .to_owned()
    }

    /// DDL for the ranking fact table. Referential integrity to the two
    /// dictionaries is application-enforced; no foreign keys.
    pub fn create_ranking(&self) -> TableCreateStatement {
        Table::create()
            .table(self.ranking())
            .if_not_exists()
            .col(ColumnDef::new(RankingCol::TimeId).integer().not_null())
            .col(ColumnDef::new(RankingCol::UserIdKey).integer().not_null())
            .col(ColumnDef::new(RankingCol::Score).big_integer().not_null())
            .col(ColumnDef::new(RankingCol::Rank).integer().not_null())
            .primary_key(
                Index::create()
                    .col(RankingCol::TimeId)
                    .col(RankingCol::UserIdKey),
            )
            .to_owned()
    }

    /// DDL for the chapter ranking fact table (world-bloom events only).
    pub fn create_world_bloom(&self) -> TableCreateStatement {
        Table::create()
            .table(self.world_bloom())
            .if_not_exists()
            .col(ColumnDef::new(ChapterCol::TimeId).integer().not_null())
            .col(ColumnDef::new(ChapterCol::UserIdKey).integer().not_null())
            .col(ColumnDef::new(ChapterCol::CharacterId).integer().not_null())
            .col(ColumnDef::new(ChapterCol::Score).big_integer().not_null())
            .col(ColumnDef::new(ChapterCol::Rank).integer().not_null())
            .primary_key(
                Index::create()
                    .col(ChapterCol::TimeId)
                    .col(ChapterCol::UserIdKey)
                    .col(ChapterCol::CharacterId),
            )
            .to_owned()
    }
}

type TableCache = RwLock<HashMap<(RegionTag, i32), Arc<EventTables>>>;

fn cache() -> &'static TableCache {
    static CACHE: OnceLock<TableCache> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Resolve the table names for one (region, event) pair.
///
/// Double-checked: the common path takes only the read lock.
pub fn event_tables(region: RegionTag, event_id: i32) -> Arc<EventTables> {
    let key = (region, event_id);
    if let Some(tables) = cache().read().expect("table cache poisoned").get(&key) {
        return tables.clone();
    }
    let mut cache = cache().write().expect("table cache poisoned");
    if let Some(tables) = cache.get(&key) {
        return tables.clone();
    }
    let tables = Arc::new(EventTables::new(event_id));
    cache.insert(key, tables.clone());
    tables
}
