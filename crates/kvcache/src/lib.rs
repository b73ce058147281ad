//! Key/value backing for tracker state.
//!
//! Keys live under `haruki:tracker:{region}:{event_id}:` except the legacy
//! border-hash keys, which are unprefixed. The store is advisory: load
//! failures degrade to empty state (the next tick re-writes a full
//! snapshot) and save failures only log, since the database remains
//! authoritative.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use tracker_core::{Error, PlayerState, RankState, RedisConfig, RegionTag, Result};

/// TTL for the rank/user state hashes.
const STATE_TTL_SECS: i64 = 14 * 24 * 60 * 60;

/// TTL for the event-ended sentinel.
const ENDED_TTL_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Default)]
struct MemoryStore {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
}

enum Backend {
    Redis(ConnectionManager),
    /// Process-local store for tests and single-node setups.
    Memory(Arc<Mutex<MemoryStore>>),
    /// `redis.enabled = false`: every probe misses, every save is a no-op.
    Disabled,
}

/// Handle to the key/value backing, shared across regions.
#[derive(Clone)]
pub struct KvCache {
    backend: Arc<Backend>,
}

impl KvCache {
    /// Connect to redis and verify the connection with a PING.
    pub async fn connect(cfg: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(cfg.url())
            .map_err(|e| Error::kv_unavailable(format!("invalid redis url: {e}")))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::kv_unavailable(format!("redis connect failed: {e}")))?;
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Error::kv_unavailable(format!("redis ping failed: {e}")))?;
        info!(host = %cfg.host, port = cfg.port, "connected to redis");
        Ok(Self {
            backend: Arc::new(Backend::Redis(conn)),
        })
    }

    /// A backing that never hits and never stores.
    pub fn disabled() -> Self {
        Self {
            backend: Arc::new(Backend::Disabled),
        }
    }

    /// An in-memory backing with redis semantics (TTLs ignored).
    pub fn memory() -> Self {
        Self {
            backend: Arc::new(Backend::Memory(Arc::new(Mutex::new(
                MemoryStore::default(),
            )))),
        }
    }

    fn key(region: RegionTag, event_id: i32, suffix: &str) -> String {
        format!("haruki:tracker:{region}:{event_id}:{suffix}")
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        match &*self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                conn.hgetall(key)
                    .await
                    .map_err(|e| Error::kv_unavailable(e.to_string()))
            }
            Backend::Memory(store) => Ok(store.lock().hashes.get(key).cloned().unwrap_or_default()),
            Backend::Disabled => Ok(HashMap::new()),
        }
    }

    /// Load the persisted rank → (user, score) map; empty on any failure.
    pub async fn load_rank_state(
        &self,
        region: RegionTag,
        event_id: i32,
    ) -> HashMap<i64, RankState> {
        let key = Self::key(region, event_id, "rank_state");
        let raw = match self.hgetall(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(region = %region, event_id, error = %e, "failed to load rank state");
                return HashMap::new();
            }
        };
        let mut state = HashMap::with_capacity(raw.len());
        for (rank, blob) in raw {
            let (Ok(rank), Ok(entry)) = (rank.parse::<i64>(), serde_json::from_str(&blob)) else {
                continue;
            };
            state.insert(rank, entry);
        }
        info!(region = %region, event_id, entries = state.len(), "loaded rank state");
        state
    }

    /// Load the persisted user → (score, rank) map; empty on any failure.
    pub async fn load_user_state(
        &self,
        region: RegionTag,
        event_id: i32,
    ) -> HashMap<String, PlayerState> {
        let key = Self::key(region, event_id, "user_state");
        let raw = match self.hgetall(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(region = %region, event_id, error = %e, "failed to load user state");
                return HashMap::new();
            }
        };
        let mut state = HashMap::with_capacity(raw.len());
        for (user_id, blob) in raw {
            if let Ok(entry) = serde_json::from_str(&blob) {
                state.insert(user_id, entry);
            }
        }
        info!(region = %region, event_id, entries = state.len(), "loaded user state");
        state
    }

    /// Persist the entries a tick changed, pipelined into one round trip.
    /// Failures are logged and swallowed; the database stays authoritative.
    pub async fn save_state(
        &self,
        region: RegionTag,
        event_id: i32,
        changed_ranks: &HashMap<i64, RankState>,
        changed_users: &HashMap<String, PlayerState>,
    ) {
        if changed_ranks.is_empty() && changed_users.is_empty() {
            return;
        }
        let rank_key = Self::key(region, event_id, "rank_state");
        let user_key = Self::key(region, event_id, "user_state");

        let rank_items: Vec<(String, String)> = changed_ranks
            .iter()
            .filter_map(|(rank, state)| {
                serde_json::to_string(state).ok().map(|s| (rank.to_string(), s))
            })
            .collect();
        let user_items: Vec<(String, String)> = changed_users
            .iter()
            .filter_map(|(user, state)| {
                serde_json::to_string(state).ok().map(|s| (user.clone(), s))
            })
            .collect();

        match &*self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let mut pipe = redis::pipe();
                if !rank_items.is_empty() {
                    pipe.hset_multiple(&rank_key, &rank_items)
                        .expire(&rank_key, STATE_TTL_SECS);
                }
                if !user_items.is_empty() {
                    pipe.hset_multiple(&user_key, &user_items)
                        .expire(&user_key, STATE_TTL_SECS);
                }
                if let Err(e) = pipe.query_async::<()>(&mut conn).await {
                    warn!(region = %region, event_id, error = %e, "failed to save state");
                }
            }
            Backend::Memory(store) => {
                let mut store = store.lock();
                store
                    .hashes
                    .entry(rank_key)
                    .or_default()
                    .extend(rank_items);
                store
                    .hashes
                    .entry(user_key)
                    .or_default()
                    .extend(user_items);
            }
            Backend::Disabled => {}
        }
    }

    /// Whether a previous run marked this event ended.
    pub async fn is_event_ended(&self, region: RegionTag, event_id: i32) -> bool {
        let key = Self::key(region, event_id, "ended");
        match &*self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                match conn.get::<_, Option<String>>(&key).await {
                    Ok(value) => value.as_deref() == Some("true"),
                    Err(e) => {
                        warn!(region = %region, event_id, error = %e, "failed to read ended sentinel");
                        false
                    }
                }
            }
            Backend::Memory(store) => {
                store.lock().strings.get(&key).map(String::as_str) == Some("true")
            }
            Backend::Disabled => false,
        }
    }

    /// Set the event-ended sentinel. Never cleared by the tracker.
    pub async fn set_event_ended(&self, region: RegionTag, event_id: i32) {
        let key = Self::key(region, event_id, "ended");
        match &*self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                if let Err(e) = conn
                    .set_ex::<_, _, ()>(&key, "true", ENDED_TTL_SECS as u64)
                    .await
                {
                    warn!(region = %region, event_id, error = %e, "failed to set ended sentinel");
                }
            }
            Backend::Memory(store) => {
                store.lock().strings.insert(key, "true".to_string());
            }
            Backend::Disabled => {}
        }
    }

    /// Probe the response-hash cache.
    ///
    /// Returns true when the stored digest matches (the response body is
    /// unchanged since the last tick). On a miss the new digest is stored
    /// under the unexpiring key before returning.
    pub async fn detect_border_cache(&self, key: &str, digest_hex: &str) -> Result<bool> {
        match &*self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let cached: Option<String> = conn
                    .get(key)
                    .await
                    .map_err(|e| Error::kv_unavailable(e.to_string()))?;
                if cached.as_deref() == Some(digest_hex) {
                    return Ok(true);
                }
                conn.set::<_, _, ()>(key, digest_hex)
                    .await
                    .map_err(|e| Error::kv_unavailable(e.to_string()))?;
                Ok(false)
            }
            Backend::Memory(store) => {
                let mut store = store.lock();
                if store.strings.get(key).map(String::as_str) == Some(digest_hex) {
                    return Ok(true);
                }
                store.strings.insert(key.to_string(), digest_hex.to_string());
                Ok(false)
            }
            Backend::Disabled => Ok(false),
        }
    }
}
