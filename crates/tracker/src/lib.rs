//! Event classification, ranking merge, tracker state machine, and the
//! cron scheduler that drives one tracker per region.

use std::sync::Arc;

pub mod base;
pub mod classifier;
pub mod merger;
pub mod scheduler;
pub mod tracker;

pub use base::EventTrackerBase;
pub use classifier::EventClassifier;
pub use merger::merge_rankings;
pub use scheduler::TrackerScheduler;
pub use tracker::RegionTracker;

/// Wall-clock source in epoch milliseconds, injectable for tests.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// The production clock.
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}
