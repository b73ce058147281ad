//! Per-region tracker state machine.
//!
//! uninitialized → tracking(event) → ended(event), re-entering
//! uninitialized when the classifier surfaces a newer event. One instance
//! per region; ticks are serialized by the scheduler.

use std::sync::Arc;

use tracing::{info, warn};

use tracker_core::{ActiveEvent, EventPhase, RegionTag, Result};
use tracker_database::DatabaseEngine;
use tracker_kvcache::KvCache;
use tracker_upstream::RankingApi;

use crate::base::EventTrackerBase;
use crate::classifier::EventClassifier;
use crate::Clock;

pub struct RegionTracker {
    region: RegionTag,
    classifier: EventClassifier,
    engine: Arc<DatabaseEngine>,
    kv: KvCache,
    api: Arc<dyn RankingApi>,
    clock: Clock,
    tracker: Option<EventTrackerBase>,
}

impl RegionTracker {
    pub fn new(
        region: RegionTag,
        master_data_dir: impl Into<std::path::PathBuf>,
        engine: Arc<DatabaseEngine>,
        kv: KvCache,
        api: Arc<dyn RankingApi>,
        clock: Clock,
    ) -> Self {
        Self {
            region,
            classifier: EventClassifier::new(region, master_data_dir),
            engine,
            kv,
            api,
            clock,
            tracker: None,
        }
    }

    pub fn region(&self) -> RegionTag {
        self.region
    }

    /// Event id currently tracked, if any.
    pub fn tracked_event_id(&self) -> Option<i32> {
        self.tracker.as_ref().map(|t| t.event_id())
    }

    /// Build the per-event tracker for the given active event.
    async fn init_for(&mut self, event: &ActiveEvent) -> Result<()> {
        let mut base = EventTrackerBase::new(
            self.region,
            event.event_id,
            event.kind,
            event.phase == EventPhase::Ended,
            event.chapters.clone(),
            self.engine.clone(),
            self.kv.clone(),
            self.api.clone(),
        );
        base.init().await?;
        self.tracker = Some(base);
        Ok(())
    }

    /// Eagerly initialize against the currently active event, if one exists.
    /// A failure here is recoverable: the first tick retries.
    pub async fn init(&mut self) -> Result<()> {
        let now_ms = (self.clock)();
        match self.classifier.current_event(now_ms)? {
            Some(event) => self.init_for(&event).await,
            None => {
                info!(region = %self.region, "no active event at startup");
                Ok(())
            }
        }
    }

    /// Write a failure heartbeat after a timed-out tick, when an event is
    /// being tracked.
    pub async fn write_failure_heartbeat(&self) {
        if let Some(tracker) = &self.tracker {
            if !tracker.is_event_ended() {
                if let Err(e) = tracker.write_failure_heartbeat((self.clock)()).await {
                    warn!(region = %self.region, error = %e, "failed to write failure heartbeat");
                }
            }
        }
    }

    /// One scheduler tick.
    pub async fn track(&mut self) -> Result<()> {
        let now_ms = (self.clock)();

        let event = match self.classifier.current_event(now_ms) {
            Ok(Some(event)) => event,
            Ok(None) => {
                info!(region = %self.region, "no active event, skipping tracking");
                return Ok(());
            }
            Err(e) => {
                warn!(region = %self.region, error = %e, "failed to classify current event");
                return Ok(());
            }
        };

        match &self.tracker {
            None => {
                info!(region = %self.region, event_id = event.event_id, "initializing tracker");
                self.init_for(&event).await?;
            }
            Some(tracker) if tracker.event_id() < event.event_id => {
                info!(
                    region = %self.region,
                    old_event_id = tracker.event_id(),
                    event_id = event.event_id,
                    "detected new event, switching tracker"
                );
                self.init_for(&event).await?;
            }
            Some(tracker) if tracker.event_id() > event.event_id => {
                warn!(
                    region = %self.region,
                    tracked = tracker.event_id(),
                    classified = event.event_id,
                    "classifier reports an older event, ignoring tick"
                );
                return Ok(());
            }
            Some(_) => {
                let Some(tracker) = self.tracker.as_mut() else {
                    return Ok(());
                };
                if tracker.is_event_ended() {
                    info!(
                        region = %self.region,
                        event_id = event.event_id,
                        "event already ended, skipping tracking"
                    );
                    return Ok(());
                }
                if event.phase == EventPhase::Aggregating {
                    info!(
                        region = %self.region,
                        event_id = event.event_id,
                        "event is aggregating, skipping tracking"
                    );
                    return Ok(());
                }
                if event.phase == EventPhase::Ended {
                    info!(
                        region = %self.region,
                        event_id = event.event_id,
                        "event has ended, finalizing tracking"
                    );
                    let result = tracker.record_ranking_data(now_ms, false).await;
                    tracker.set_event_ended().await;
                    return result;
                }
                if event.kind.is_world_bloom() {
                    if tracker.chapter_statuses() != &event.chapters {
                        tracker.set_chapter_statuses(event.chapters.clone());
                    }
                    self.finalize_ended_chapter(now_ms).await;
                }
            }
        }

        let Some(tracker) = self.tracker.as_mut() else {
            return Ok(());
        };
        tracker.record_ranking_data(now_ms, false).await
    }

    /// Record one freshly-ended chapter, then flip its sentinel. At most
    /// one chapter is finalized per tick; the rest follow on later fires.
    async fn finalize_ended_chapter(&mut self, now_ms: i64) {
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };
        let mut character_ids: Vec<i32> = tracker.chapter_statuses().keys().copied().collect();
        character_ids.sort_unstable();

        for character_id in character_ids {
            let phase = tracker.chapter_statuses()[&character_id].phase;
            match phase {
                EventPhase::NotStarted => continue,
                EventPhase::Aggregating => {
                    info!(
                        region = %self.region,
                        character_id,
                        "world bloom chapter is aggregating, skipping"
                    );
                    continue;
                }
                EventPhase::Ended if tracker.is_chapter_ended(character_id) => continue,
                EventPhase::Ended => {
                    info!(
                        region = %self.region,
                        character_id,
                        "world bloom chapter has ended, finalizing"
                    );
                    if let Err(e) = tracker.record_ranking_data(now_ms, true).await {
                        warn!(
                            region = %self.region,
                            character_id,
                            error = %e,
                            "failed to record final chapter rankings"
                        );
                    }
                    tracker.set_chapter_ended(character_id);
                    break;
                }
                _ => {}
            }
        }
    }
}
