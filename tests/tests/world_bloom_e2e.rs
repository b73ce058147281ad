//! End-to-end scenarios for world-bloom events: per-chapter tracking,
//! chapter close finalization, aggregating chapters, and border merges.

use tracker_tests::fixtures::{
    player, world_bloom_border, world_bloom_top, write_world_bloom_catalog, Harness,
};

const EVENT: i32 = 112;

/// Event window 1_000_000..10_000_000 ms, aggregate at 9_000_000.
/// Chapter 21 runs 1_000_000..2_100_000 (aggregate 2_000_000),
/// chapter 22 runs 1_000_000..9_000_000 (aggregate 8_000_000).
async fn world_bloom_harness(now_ms: i64) -> Harness {
    let harness = Harness::new(now_ms).await;
    write_world_bloom_catalog(
        harness.dir.path(),
        EVENT,
        1_000_000,
        9_000_000,
        10_000_000,
        &[
            (21, 1_000_000, 2_000_000, 2_100_000),
            (22, 1_000_000, 8_000_000, 9_000_000),
        ],
    );
    harness
}

#[tokio::test]
async fn ongoing_chapters_write_to_the_chapter_table() {
    let mut h = world_bloom_harness(1_500_000).await;
    h.api.set_top(world_bloom_top(vec![
        (21, vec![player(5, "E", 100, 1)]),
        (22, vec![player(6, "F", 50, 1)]),
    ]));

    h.tracker.track().await.unwrap();

    assert!(h.table_exists("wl_112").await);
    assert_eq!(
        h.chapter_rows(EVENT).await,
        vec![(1, 1, 21, 100, 1), (1, 2, 22, 50, 1)]
    );
    // A single tick touching two chapter tables still produced exactly one
    // timestamp dictionary row.
    assert_eq!(h.heartbeat_rows(EVENT).await.len(), 1);
    assert_eq!(h.count("event_112").await, 0, "no main rows offered");
}

#[tokio::test]
async fn chapter_close_finalizes_exactly_once() {
    let mut h = world_bloom_harness(1_500_000).await;
    h.api.set_top(world_bloom_top(vec![
        (21, vec![player(5, "E", 100, 1)]),
        (22, vec![player(6, "F", 50, 1)]),
    ]));
    h.tracker.track().await.unwrap();

    // Chapter 21 has just ended (2_100_000 passed); its rankings moved.
    h.clock.set(2_150_000);
    h.api.set_top(world_bloom_top(vec![
        (21, vec![player(5, "E", 120, 1)]),
        (22, vec![player(6, "F", 50, 1)]),
    ]));
    h.tracker.track().await.unwrap();

    let rows_21: Vec<_> = h
        .chapter_rows(EVENT)
        .await
        .into_iter()
        .filter(|(_, _, character_id, _, _)| *character_id == 21)
        .collect();
    assert_eq!(rows_21.len(), 2, "one finalization write for the closed chapter");

    // After the sentinel flipped, chapter 21 is skipped entirely even if
    // upstream keeps serving it.
    h.clock.set(2_250_000);
    h.api.set_top(world_bloom_top(vec![
        (21, vec![player(5, "E", 130, 1)]),
        (22, vec![player(6, "F", 50, 1)]),
    ]));
    h.tracker.track().await.unwrap();

    let rows_21: Vec<_> = h
        .chapter_rows(EVENT)
        .await
        .into_iter()
        .filter(|(_, _, character_id, _, _)| *character_id == 21)
        .collect();
    assert_eq!(rows_21.len(), 2, "closed chapter contributes nothing further");
}

#[tokio::test]
async fn aggregating_chapter_contributes_zero_rows() {
    // 8_500_000: chapter 21 long ended, chapter 22 aggregating.
    let mut h = world_bloom_harness(8_500_000).await;
    h.api.set_top(world_bloom_top(vec![(
        22,
        vec![player(6, "F", 50, 1)],
    )]));

    h.tracker.track().await.unwrap();

    let rows_22: Vec<_> = h
        .chapter_rows(EVENT)
        .await
        .into_iter()
        .filter(|(_, _, character_id, _, _)| *character_id == 22)
        .collect();
    assert!(rows_22.is_empty(), "aggregating chapter must not be recorded");
}

#[tokio::test]
async fn aggregate_flagged_payloads_are_ignored() {
    let mut h = world_bloom_harness(1_500_000).await;
    let mut top = world_bloom_top(vec![(21, vec![player(5, "E", 100, 1)])]);
    top.user_world_bloom_chapter_rankings
        .as_mut()
        .unwrap()
        .get_mut(0)
        .unwrap()
        .is_world_bloom_chapter_aggregate = Some(true);
    h.api.set_top(top);

    h.tracker.track().await.unwrap();
    assert_eq!(h.count("wl_112").await, 0);
}

#[tokio::test]
async fn chapter_border_bands_merge_by_rank() {
    let mut h = world_bloom_harness(1_500_000).await;
    h.api.set_top(world_bloom_top(vec![(
        21,
        vec![player(5, "E", 100, 1), player(7, "G", 90, 2)],
    )]));
    h.api.set_border(world_bloom_border(vec![(
        21,
        // Rank 2 collides with the top list; rank 100 is new.
        vec![player(8, "H", 89, 2), player(9, "I", 10, 100)],
    )]));

    h.tracker.track().await.unwrap();

    let rows = h.chapter_rows(EVENT).await;
    let ranks: Vec<i64> = rows.iter().map(|(_, _, _, _, rank)| *rank).collect();
    assert_eq!(ranks, vec![1, 2, 100]);
    // The colliding rank kept the top entry.
    let (_, user_id_key, _, score, _) = rows[1];
    let user_id: String =
        sqlx::query_as::<_, (String,)>("SELECT user_id FROM event_112_users WHERE user_id_key = ?")
            .bind(user_id_key)
            .fetch_one(h.engine.pool())
            .await
            .unwrap()
            .0;
    assert_eq!(user_id, "7");
    assert_eq!(score, 90);
}

#[tokio::test]
async fn unchanged_chapters_dedup_across_ticks() {
    let mut h = world_bloom_harness(1_500_000).await;
    h.api.set_top(world_bloom_top(vec![
        (21, vec![player(5, "E", 100, 1)]),
        (22, vec![player(6, "F", 50, 1)]),
    ]));
    h.tracker.track().await.unwrap();

    h.clock.advance(60_000);
    h.tracker.track().await.unwrap();

    assert_eq!(h.count("wl_112").await, 2, "no duplicate chapter rows");
    assert_eq!(h.heartbeat_rows(EVENT).await.len(), 2, "heartbeat per tick");
}
