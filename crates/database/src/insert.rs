//! Dictionary resolution and batch insert helpers.
//!
//! All helpers run inside one transaction per batch: dictionary rows for a
//! tick's timestamp and users are inserted before the ranking rows that
//! reference them, so readers never observe a dangling surrogate key.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use sea_query::{Expr, Query};
use sqlx::{Any, Row, Transaction};
use tracing::debug;

use tracker_core::{ChapterKey, PlayerState, Result};

use crate::engine::{classify, DatabaseEngine};
use crate::tables::{event_tables, ChapterCol, EventTables, RankingCol, TimeCol, UserCol};

/// One candidate row for the per-event ranking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingRow {
    pub timestamp: i64,
    pub user_id: String,
    pub name: String,
    pub score: i64,
    pub rank: i64,
    pub cheerful_team_id: Option<i32>,
}

/// One candidate row for the per-event chapter ranking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRankingRow {
    pub timestamp: i64,
    pub user_id: String,
    pub name: String,
    pub score: i64,
    pub rank: i64,
    pub cheerful_team_id: Option<i32>,
    pub character_id: i32,
}

/// Get-or-insert the time dictionary rows for a set of timestamps.
///
/// Returns timestamp → time_id. New rows carry the given status.
async fn resolve_timestamps(
    tx: &mut Transaction<'static, Any>,
    engine: &DatabaseEngine,
    tables: &EventTables,
    timestamps: &BTreeSet<i64>,
    status: i8,
) -> Result<HashMap<i64, i64>> {
    let mut lookup = HashMap::with_capacity(timestamps.len());
    for &ts in timestamps {
        let select = engine.build_query(
            Query::select()
                .column(TimeCol::TimeId)
                .from(tables.time_id())
                .and_where(Expr::col(TimeCol::Timestamp).eq(ts)),
        );
        if let Some(row) = sqlx::query(&select)
            .fetch_optional(&mut **tx)
            .await
            .map_err(classify)?
        {
            lookup.insert(ts, row.try_get::<i64, _>("time_id").map_err(classify)?);
            continue;
        }
        let insert = engine.build_query(
            Query::insert()
                .into_table(tables.time_id())
                .columns([TimeCol::Timestamp, TimeCol::Status])
                .values_panic([ts.into(), (status as i32).into()]),
        );
        sqlx::query(&insert)
            .execute(&mut **tx)
            .await
            .map_err(classify)?;
        let row = sqlx::query(&select)
            .fetch_one(&mut **tx)
            .await
            .map_err(classify)?;
        lookup.insert(ts, row.try_get::<i64, _>("time_id").map_err(classify)?);
    }
    Ok(lookup)
}

/// Get-or-insert the user dictionary rows for a batch.
///
/// An existing row is updated in place when the name differs, or when the
/// incoming team id is present and differs from the stored one.
async fn resolve_users(
    tx: &mut Transaction<'static, Any>,
    engine: &DatabaseEngine,
    tables: &EventTables,
    users: &BTreeMap<String, (String, Option<i32>)>,
) -> Result<HashMap<String, i64>> {
    let mut lookup = HashMap::with_capacity(users.len());
    for (user_id, (name, team)) in users {
        let select = engine.build_query(
            Query::select()
                .columns([UserCol::UserIdKey, UserCol::Name, UserCol::CheerfulTeamId])
                .from(tables.users())
                .and_where(Expr::col(UserCol::UserId).eq(user_id.as_str())),
        );
        match sqlx::query(&select)
            .fetch_optional(&mut **tx)
            .await
            .map_err(classify)?
        {
            Some(row) => {
                let key = row.try_get::<i64, _>("user_id_key").map_err(classify)?;
                let stored_name = row.try_get::<String, _>("name").map_err(classify)?;
                let stored_team = row
                    .try_get::<Option<i64>, _>("cheerful_team_id")
                    .map_err(classify)?
                    .map(|t| t as i32);
                if stored_name != *name || (team.is_some() && stored_team != *team) {
                    let update = engine.build_query(
                        Query::update()
                            .table(tables.users())
                            .values([
                                (UserCol::Name, name.clone().into()),
                                (UserCol::CheerfulTeamId, (*team).into()),
                            ])
                            .and_where(Expr::col(UserCol::UserId).eq(user_id.as_str())),
                    );
                    sqlx::query(&update)
                        .execute(&mut **tx)
                        .await
                        .map_err(classify)?;
                }
                lookup.insert(user_id.clone(), key);
            }
            None => {
                let insert = engine.build_query(
                    Query::insert()
                        .into_table(tables.users())
                        .columns([UserCol::UserId, UserCol::Name, UserCol::CheerfulTeamId])
                        .values_panic([
                            user_id.as_str().into(),
                            name.clone().into(),
                            (*team).into(),
                        ]),
                );
                sqlx::query(&insert)
                    .execute(&mut **tx)
                    .await
                    .map_err(classify)?;
                let row = sqlx::query(&engine.build_query(
                    Query::select()
                        .column(UserCol::UserIdKey)
                        .from(tables.users())
                        .and_where(Expr::col(UserCol::UserId).eq(user_id.as_str())),
                ))
                .fetch_one(&mut **tx)
                .await
                .map_err(classify)?;
                lookup.insert(
                    user_id.clone(),
                    row.try_get::<i64, _>("user_id_key").map_err(classify)?,
                );
            }
        }
    }
    Ok(lookup)
}

/// Write the tick's heartbeat row in its own transaction.
///
/// Status 0 marks a successful snapshot, 1 an upstream failure.
pub async fn write_heartbeat(
    engine: &DatabaseEngine,
    event_id: i32,
    timestamp: i64,
    status: i8,
) -> Result<()> {
    let tables = event_tables(engine.region(), event_id);
    let mut tx = engine.begin().await?;
    let timestamps = BTreeSet::from([timestamp]);
    resolve_timestamps(&mut tx, engine, &tables, &timestamps, status).await?;
    tx.commit().await.map_err(classify)
}

/// Insert a batch into the per-event ranking table.
///
/// Dictionary rows are resolved first (the timestamp row doubles as the
/// tick's heartbeat), then rows whose (score, rank) equal the last stored
/// pair for the same user are dropped against `prev_state`, which is
/// updated in place. Returns the number of ranking rows written.
pub async fn insert_ranking_batch(
    engine: &DatabaseEngine,
    event_id: i32,
    rows: &[RankingRow],
    prev_state: &mut HashMap<i64, PlayerState>,
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let tables = event_tables(engine.region(), event_id);
    let mut tx = engine.begin().await?;

    let timestamps: BTreeSet<i64> = rows.iter().map(|r| r.timestamp).collect();
    let mut users: BTreeMap<String, (String, Option<i32>)> = BTreeMap::new();
    for row in rows {
        users
            .entry(row.user_id.clone())
            .or_insert_with(|| (row.name.clone(), row.cheerful_team_id));
    }

    let time_ids = resolve_timestamps(&mut tx, engine, &tables, &timestamps, 0).await?;
    let user_keys = resolve_users(&mut tx, engine, &tables, &users).await?;

    let mut changed = Vec::with_capacity(rows.len());
    let mut updates = Vec::with_capacity(rows.len());
    for row in rows {
        let key = user_keys[&row.user_id];
        let state = PlayerState {
            score: row.score,
            rank: row.rank,
        };
        if prev_state.get(&key) != Some(&state) {
            changed.push((time_ids[&row.timestamp], key, row.score, row.rank));
            updates.push((key, state));
        }
    }

    if changed.is_empty() {
        // Nothing beyond the dictionary rows; the timestamp row already
        // serves as this tick's heartbeat.
        tx.commit().await.map_err(classify)?;
        return Ok(0);
    }

    let mut insert = Query::insert()
        .into_table(tables.ranking())
        .columns([
            RankingCol::TimeId,
            RankingCol::UserIdKey,
            RankingCol::Score,
            RankingCol::Rank,
        ])
        .to_owned();
    for (time_id, user_key, score, rank) in &changed {
        insert.values_panic([(*time_id).into(), (*user_key).into(), (*score).into(), (*rank).into()]);
    }
    sqlx::query(&engine.build_query(&insert))
        .execute(&mut *tx)
        .await
        .map_err(classify)?;
    tx.commit().await.map_err(classify)?;

    // State updates apply only after commit so a failed tick retries from
    // scratch on the next cron fire.
    for (key, state) in updates {
        prev_state.insert(key, state);
    }

    debug!(
        region = %engine.region(),
        event_id,
        written = changed.len(),
        offered = rows.len(),
        "ranking batch committed"
    );
    Ok(changed.len())
}

/// Insert a batch into the per-event chapter ranking table.
///
/// Same shape as [`insert_ranking_batch`] with the dedup state keyed by
/// (user, character).
pub async fn insert_chapter_ranking_batch(
    engine: &DatabaseEngine,
    event_id: i32,
    rows: &[ChapterRankingRow],
    prev_state: &mut HashMap<ChapterKey, PlayerState>,
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let tables = event_tables(engine.region(), event_id);
    let mut tx = engine.begin().await?;

    let timestamps: BTreeSet<i64> = rows.iter().map(|r| r.timestamp).collect();
    let mut users: BTreeMap<String, (String, Option<i32>)> = BTreeMap::new();
    for row in rows {
        users
            .entry(row.user_id.clone())
            .or_insert_with(|| (row.name.clone(), row.cheerful_team_id));
    }

    let time_ids = resolve_timestamps(&mut tx, engine, &tables, &timestamps, 0).await?;
    let user_keys = resolve_users(&mut tx, engine, &tables, &users).await?;

    let mut changed = Vec::with_capacity(rows.len());
    let mut updates = Vec::with_capacity(rows.len());
    for row in rows {
        let key = ChapterKey {
            user_id_key: user_keys[&row.user_id],
            character_id: row.character_id,
        };
        let state = PlayerState {
            score: row.score,
            rank: row.rank,
        };
        if prev_state.get(&key) != Some(&state) {
            changed.push((
                time_ids[&row.timestamp],
                key.user_id_key,
                row.character_id,
                row.score,
                row.rank,
            ));
            updates.push((key, state));
        }
    }

    if changed.is_empty() {
        tx.commit().await.map_err(classify)?;
        return Ok(0);
    }

    let mut insert = Query::insert()
        .into_table(tables.world_bloom())
        .columns([
            ChapterCol::TimeId,
            ChapterCol::UserIdKey,
            ChapterCol::CharacterId,
            ChapterCol::Score,
            ChapterCol::Rank,
        ])
        .to_owned();
    for (time_id, user_key, character_id, score, rank) in &changed {
        insert.values_panic([
            (*time_id).into(),
            (*user_key).into(),
            (*character_id).into(),
            (*score).into(),
            (*rank).into(),
        ]);
    }
    sqlx::query(&engine.build_query(&insert))
        .execute(&mut *tx)
        .await
        .map_err(classify)?;
    tx.commit().await.map_err(classify)?;

    for (key, state) in updates {
        prev_state.insert(key, state);
    }

    debug!(
        region = %engine.region(),
        event_id,
        written = changed.len(),
        offered = rows.len(),
        "chapter ranking batch committed"
    );
    Ok(changed.len())
}
