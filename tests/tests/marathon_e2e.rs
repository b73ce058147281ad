//! End-to-end scenarios for marathon events: first ingest, dedup, change
//! tracking, upstream failure, border caching, restart, and event end.

use tracker_core::RegionTag;
use tracker_tests::fixtures::{border_of, player, top_of, write_marathon_catalog, Harness};

const EVENT: i32 = 100;

/// Catalog used across the scenarios: startAt 1_000_000, aggregateAt
/// 2_000_000, closedAt 2_600_000 (all ms).
async fn marathon_harness(now_ms: i64) -> Harness {
    let harness = Harness::new(now_ms).await;
    write_marathon_catalog(harness.dir.path(), EVENT, 1_000_000, 2_000_000, 2_600_000);
    harness
}

#[tokio::test]
async fn first_ingest_creates_tables_and_rows() {
    let mut h = marathon_harness(1_500_000).await;
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![]));

    h.tracker.track().await.unwrap();

    assert!(h.table_exists("event_100_time_id").await);
    assert!(h.table_exists("event_100_users").await);
    assert!(h.table_exists("event_100").await);
    assert!(!h.table_exists("wl_100").await, "marathon has no chapter table");

    assert_eq!(h.heartbeat_rows(EVENT).await, vec![(1_500, 0)]);
    assert_eq!(h.ranking_rows(EVENT).await, vec![(1, 1, 50, 1)]);

    let (user_id, name): (String, String) =
        sqlx::query_as("SELECT user_id, name FROM event_100_users WHERE user_id_key = 1")
            .fetch_one(h.engine.pool())
            .await
            .unwrap();
    assert_eq!(user_id, "1");
    assert_eq!(name, "A");
}

#[tokio::test]
async fn unchanged_upstream_writes_only_heartbeats() {
    let mut h = marathon_harness(1_500_000).await;
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![]));

    h.tracker.track().await.unwrap();
    h.clock.advance(60_000);
    h.tracker.track().await.unwrap();

    assert_eq!(
        h.heartbeat_rows(EVENT).await,
        vec![(1_500, 0), (1_560, 0)],
        "one heartbeat per tick"
    );
    assert_eq!(h.ranking_rows(EVENT).await.len(), 1, "no duplicate rows");
    assert_eq!(h.count("event_100_users").await, 1);
}

#[tokio::test]
async fn score_change_appends_one_row() {
    let mut h = marathon_harness(1_500_000).await;
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![]));
    h.tracker.track().await.unwrap();

    h.clock.advance(60_000);
    h.api.set_top(top_of(vec![player(1, "A", 60, 1)]));
    h.tracker.track().await.unwrap();

    assert_eq!(
        h.ranking_rows(EVENT).await,
        vec![(1, 1, 50, 1), (2, 1, 60, 1)]
    );
    assert_eq!(h.count("event_100_users").await, 1, "dictionary reused");
}

#[tokio::test]
async fn upstream_failure_writes_failure_heartbeat() {
    let mut h = marathon_harness(1_500_000).await;
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![]));
    h.tracker.track().await.unwrap();

    h.clock.advance(60_000);
    h.api.set_fail_top(true);
    assert!(h.tracker.track().await.is_err());

    assert_eq!(h.heartbeat_rows(EVENT).await, vec![(1_500, 0), (1_560, 1)]);
    assert_eq!(h.ranking_rows(EVENT).await.len(), 1);

    // Recovery: the state maps were untouched, so an unchanged upstream
    // tick after the outage writes nothing new.
    h.clock.advance(60_000);
    h.api.set_fail_top(false);
    h.tracker.track().await.unwrap();
    assert_eq!(h.ranking_rows(EVENT).await.len(), 1);
}

#[tokio::test]
async fn cached_border_contributes_no_rows() {
    let mut h = marathon_harness(1_500_000).await;
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![player(10, "J", 5, 200)]));
    h.tracker.track().await.unwrap();
    assert_eq!(h.ranking_rows(EVENT).await.len(), 2);

    // Border body unchanged, top changed: the border arm is skipped, so
    // only the top-sourced row lands.
    h.clock.advance(60_000);
    h.api.set_top(top_of(vec![player(1, "A", 55, 1)]));
    h.tracker.track().await.unwrap();

    let rows = h.ranking_rows(EVENT).await;
    assert_eq!(rows.len(), 3);
    let border_rows: Vec<_> = rows.iter().filter(|(_, _, _, rank)| *rank == 200).collect();
    assert_eq!(border_rows.len(), 1, "no border-sourced rows on a hash hit");
}

#[tokio::test]
async fn restart_with_kv_intact_behaves_like_no_restart() {
    let mut h = marathon_harness(1_500_000).await;
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![]));
    h.tracker.track().await.unwrap();

    let mut h = h.restart(1_560_000).await;
    write_marathon_catalog(h.dir.path(), EVENT, 1_000_000, 2_000_000, 2_600_000);
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![]));
    h.tracker.track().await.unwrap();

    // The rank state survived through the KV backing: no re-written rows,
    // just the new tick's heartbeat.
    assert_eq!(h.ranking_rows(EVENT).await.len(), 1);
    assert_eq!(h.heartbeat_rows(EVENT).await, vec![(1_500, 0), (1_560, 0)]);
}

#[tokio::test]
async fn aggregating_event_skips_recording() {
    let mut h = marathon_harness(1_500_000).await;
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![]));
    h.tracker.track().await.unwrap();

    // aggregateAt <= now < aggregateAt + 10min
    h.clock.set(2_000_000);
    h.api.set_top(top_of(vec![player(1, "A", 99, 1)]));
    h.tracker.track().await.unwrap();

    assert_eq!(h.ranking_rows(EVENT).await.len(), 1);
    assert_eq!(h.heartbeat_rows(EVENT).await.len(), 1, "no tick row while aggregating");
}

#[tokio::test]
async fn event_end_records_once_then_goes_silent() {
    // closedAt leaves room after the ten-minute settling window.
    let mut h = Harness::new(1_500_000).await;
    write_marathon_catalog(h.dir.path(), EVENT, 1_000_000, 2_000_000, 3_000_000);
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![]));
    h.tracker.track().await.unwrap();

    // Past aggregateAt + 10min: phase is ended; one final recording runs
    // and the sentinel flips.
    h.clock.set(2_700_000);
    h.api.set_top(top_of(vec![player(1, "A", 77, 1)]));
    h.tracker.track().await.unwrap();
    assert_eq!(h.ranking_rows(EVENT).await.len(), 2);
    assert!(h.kv.is_event_ended(RegionTag::Jp, EVENT).await);

    // Still inside the event window, but the tracker is ended for good.
    h.clock.set(2_800_000);
    h.api.set_top(top_of(vec![player(1, "A", 88, 1)]));
    h.tracker.track().await.unwrap();
    assert_eq!(h.ranking_rows(EVENT).await.len(), 2);
    assert!(h.kv.is_event_ended(RegionTag::Jp, EVENT).await, "sentinel never cleared");
}

#[tokio::test]
async fn ended_sentinel_blocks_a_fresh_process() {
    let h = Harness::new(1_500_000).await;
    write_marathon_catalog(h.dir.path(), EVENT, 1_000_000, 2_000_000, 2_600_000);
    h.kv.set_event_ended(RegionTag::Jp, EVENT).await;

    let mut h = h;
    h.api.set_top(top_of(vec![player(1, "A", 50, 1)]));
    h.api.set_border(border_of(vec![]));
    h.tracker.track().await.unwrap();
    h.clock.advance(60_000);
    h.tracker.track().await.unwrap();

    // The tracker loaded, saw the sentinel, and never touched the database.
    assert!(!h.table_exists("event_100_time_id").await);
    assert!(!h.table_exists("event_100").await);
}

#[tokio::test]
async fn no_active_event_is_a_no_op() {
    let mut h = marathon_harness(900_000).await;
    h.tracker.track().await.unwrap();
    assert!(!h.table_exists("event_100_time_id").await);
    assert_eq!(h.tracker.tracked_event_id(), None);
}
