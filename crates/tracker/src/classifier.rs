//! Event classifier backed by the master-data catalog.
//!
//! Files are re-read on every call but re-parsed only when their SHA-256
//! changes, so the cost of a tick is one hash over a file that rarely
//! changes. Catalog records missing a required field are skipped rather
//! than failing the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use tracker_core::{
    ActiveEvent, Chapter, ChapterStatus, Error, MasterEvent, RegionTag, Result,
};

struct CachedFile {
    digest: String,
    records: Arc<Vec<serde_json::Value>>,
}

/// Parses `events.json` and `worldBlooms.json` under a region's master-data
/// directory and derives the currently active event.
pub struct EventClassifier {
    region: RegionTag,
    master_dir: PathBuf,
    cache: Mutex<HashMap<PathBuf, CachedFile>>,
}

impl EventClassifier {
    pub fn new(region: RegionTag, master_dir: impl Into<PathBuf>) -> Self {
        Self {
            region,
            master_dir: master_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load a catalog file as a JSON array, through the content-hash cache.
    fn load_array(&self, file: &str) -> Result<Arc<Vec<serde_json::Value>>> {
        let path = self.master_dir.join(file);
        let bytes = std::fs::read(&path)
            .map_err(|e| Error::master_data(format!("{}: {e}", path.display())))?;
        let digest = hex::encode(Sha256::digest(&bytes));

        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(&path) {
            if cached.digest == digest {
                return Ok(cached.records.clone());
            }
            debug!(region = %self.region, file, "master data changed, re-parsing");
        }

        let records: Vec<serde_json::Value> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::master_data(format!("{}: {e}", path.display())))?;
        let records = Arc::new(records);
        cache.insert(
            path,
            CachedFile {
                digest,
                records: records.clone(),
            },
        );
        Ok(records)
    }

    /// Chapter statuses for one world-bloom event at `now_ms`, keyed by
    /// character. Finale chapters are skipped.
    pub fn chapter_statuses(
        &self,
        event_id: i32,
        now_ms: i64,
    ) -> Result<HashMap<i32, ChapterStatus>> {
        let records = self.load_array("worldBlooms.json")?;
        let mut statuses = HashMap::new();
        for record in records.iter() {
            let Ok(chapter) = serde_json::from_value::<Chapter>(record.clone()) else {
                continue;
            };
            if chapter.event_id != event_id || chapter.is_finale() {
                continue;
            }
            statuses.insert(
                chapter.character_id,
                ChapterStatus {
                    region: self.region,
                    event_id,
                    character_id: chapter.character_id,
                    phase: chapter.phase(now_ms),
                },
            );
        }
        Ok(statuses)
    }

    /// The event whose window contains `now_ms`, or None.
    pub fn current_event(&self, now_ms: i64) -> Result<Option<ActiveEvent>> {
        let records = self.load_array("events.json")?;
        for record in records.iter() {
            let Ok(event) = serde_json::from_value::<MasterEvent>(record.clone()) else {
                continue;
            };
            if !event.is_active(now_ms) {
                continue;
            }
            let chapters = if event.event_type.is_world_bloom() {
                self.chapter_statuses(event.id, now_ms)?
            } else {
                HashMap::new()
            };
            return Ok(Some(ActiveEvent {
                region: self.region,
                event_id: event.id,
                kind: event.event_type,
                phase: event.phase(now_ms),
                assetbundle_name: event.assetbundle_name,
                chapters,
            }));
        }
        Ok(None)
    }
}
