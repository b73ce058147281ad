//! Merge of top-N and border-band rankings into one canonical list.

use std::collections::HashSet;

use tracker_core::PlayerRanking;

/// Combine a top list with a border band, deduplicating by rank.
///
/// When the border body was unchanged since the last tick
/// (`border_cached`), the border arm is skipped entirely. Otherwise the
/// result is `top` followed by border entries whose rank is not already
/// present, in arrival order. Border entries without a rank are dropped;
/// duplicate user ids are resolved downstream when the write batch is
/// built (first wins).
pub fn merge_rankings(
    top: Vec<PlayerRanking>,
    border: Vec<PlayerRanking>,
    border_cached: bool,
) -> Vec<PlayerRanking> {
    if border_cached {
        return top;
    }
    let top_ranks: HashSet<i64> = top.iter().filter_map(|r| r.rank).collect();
    let mut merged = top;
    merged.extend(
        border
            .into_iter()
            .filter(|r| r.rank.is_some_and(|rank| !top_ranks.contains(&rank))),
    );
    merged
}
