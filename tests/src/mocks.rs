//! Mock implementations for testing.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tracker_core::{BorderResponse, Error, RegionTag, Result, TopResponse};
use tracker_daemon::Clock;
use tracker_upstream::{body_digest, RankingApi};

/// Scriptable upstream that serves in-memory payloads.
///
/// Implements the same `RankingApi` trait as the real client, so the whole
/// tracker path runs against it without a network. The border digest is
/// computed over the serialized payload, mirroring the real client's hash
/// over raw body bytes.
pub struct MockRankingApi {
    top: Mutex<TopResponse>,
    border: Mutex<BorderResponse>,
    fail_top: Mutex<bool>,
    fail_border: Mutex<bool>,
}

impl MockRankingApi {
    pub fn new() -> Self {
        Self {
            top: Mutex::new(TopResponse::default()),
            border: Mutex::new(BorderResponse::default()),
            fail_top: Mutex::new(false),
            fail_border: Mutex::new(false),
        }
    }

    pub fn set_top(&self, top: TopResponse) {
        *self.top.lock() = top;
    }

    pub fn set_border(&self, border: BorderResponse) {
        *self.border.lock() = border;
    }

    /// Simulate a network failure on the top endpoint.
    pub fn set_fail_top(&self, fail: bool) {
        *self.fail_top.lock() = fail;
    }

    /// Simulate a network failure on the border endpoint.
    pub fn set_fail_border(&self, fail: bool) {
        *self.fail_border.lock() = fail;
    }
}

impl Default for MockRankingApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RankingApi for MockRankingApi {
    async fn get_top(&self, _event_id: i32, _region: RegionTag) -> Result<TopResponse> {
        if *self.fail_top.lock() {
            return Err(Error::upstream_unreachable("mock network error"));
        }
        Ok(self.top.lock().clone())
    }

    async fn get_border(
        &self,
        _event_id: i32,
        _region: RegionTag,
    ) -> Result<(String, BorderResponse)> {
        if *self.fail_border.lock() {
            return Err(Error::upstream_unreachable("mock network error"));
        }
        let border = self.border.lock().clone();
        let body = serde_json::to_vec(&border).expect("border serializes");
        Ok((body_digest(&body), border))
    }
}

/// Settable wall clock in epoch milliseconds.
#[derive(Clone)]
pub struct TestClock(Arc<AtomicI64>);

impl TestClock {
    pub fn new(now_ms: i64) -> Self {
        Self(Arc::new(AtomicI64::new(now_ms)))
    }

    pub fn set(&self, now_ms: i64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.0.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    /// The tick timestamp a recording at the current instant would use.
    pub fn now_secs(&self) -> i64 {
        self.now_ms() / 1000
    }

    pub fn clock(&self) -> Clock {
        let inner = self.0.clone();
        Arc::new(move || inner.load(Ordering::SeqCst))
    }
}
