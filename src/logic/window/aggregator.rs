//! Flow Aggregator
//!
//! Owns the live bucket table. Only `ingest` and the flush functions touch it,
//! always under the same lock, so a bucket is never mutated and removed at the
//! same time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use serde::Serialize;

use super::types::{FeatureRecord, PacketObservation, WindowBucket, WindowKey, window_index};

// ============================================================================
// STATE
// ============================================================================

struct AggregatorState {
    buckets: HashMap<WindowKey, WindowBucket>,
    /// Wall-clock time of the last flush scan (seconds since epoch)
    last_scan: f64,
}

/// Counters exposed for the shutdown summary
#[derive(Debug, Default)]
struct Counters {
    packets_ingested: AtomicU64,
    packets_dropped: AtomicU64,
    buckets_created: AtomicU64,
    records_emitted: AtomicU64,
    scans: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatorStats {
    pub packets_ingested: u64,
    pub packets_dropped: u64,
    pub buckets_created: u64,
    pub records_emitted: u64,
    pub scans: u64,
    pub live_buckets: usize,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct FlowAggregator {
    window_secs: f64,
    state: Mutex<AggregatorState>,
    counters: Counters,
}

impl FlowAggregator {
    /// New aggregator whose rate-limit clock starts now
    pub fn new(window_secs: f64) -> Self {
        Self::starting_at(window_secs, unix_now())
    }

    /// New aggregator whose rate-limit clock starts at `started_at`.
    /// The first scan runs no earlier than `started_at + window_secs`.
    pub fn starting_at(window_secs: f64, started_at: f64) -> Self {
        Self {
            window_secs,
            state: Mutex::new(AggregatorState {
                buckets: HashMap::new(),
                last_scan: started_at,
            }),
            counters: Counters::default(),
        }
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// Record one observation. Malformed observations are dropped and counted.
    pub fn ingest(&self, obs: &PacketObservation) {
        if !obs.is_well_formed() {
            self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("Dropped malformed observation from {} (ts={})", obs.source_address, obs.timestamp);
            return;
        }

        let key = WindowKey::new(obs.source_address, obs.timestamp, self.window_secs);

        {
            let mut state = self.state.lock();
            match state.buckets.get_mut(&key) {
                Some(bucket) => bucket.record(obs),
                None => {
                    state.buckets.insert(key, WindowBucket::new(obs));
                    self.counters.buckets_created.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.counters.packets_ingested.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit every window that is safely closed, using the wall clock
    pub fn flush_ready(&self) -> Vec<FeatureRecord> {
        self.flush_ready_at(unix_now())
    }

    /// Emit every window whose index is strictly below `floor(now / W) - 1`.
    ///
    /// Scans at most once per `W` seconds; calls inside that interval return
    /// an empty list without touching the table. Together with the one-window
    /// cutoff this puts emission between `(k + 2)·W` and roughly `(k + 3)·W`
    /// for window `k`.
    pub fn flush_ready_at(&self, now: f64) -> Vec<FeatureRecord> {
        let mut state = self.state.lock();

        if now - state.last_scan < self.window_secs {
            return Vec::new();
        }
        state.last_scan = now;
        self.counters.scans.fetch_add(1, Ordering::Relaxed);

        let cutoff = window_index(now, self.window_secs) - 1;
        let ready: Vec<WindowKey> = state
            .buckets
            .keys()
            .filter(|key| key.window_index < cutoff)
            .copied()
            .collect();

        let mut records = Vec::with_capacity(ready.len());
        for key in ready {
            if let Some(bucket) = state.buckets.remove(&key) {
                records.push(bucket.into_record(key, self.window_secs));
            }
        }
        drop(state);

        if !records.is_empty() {
            self.counters.records_emitted.fetch_add(records.len() as u64, Ordering::Relaxed);
            log::debug!("Flushed {} window(s) (cutoff index {})", records.len(), cutoff);
        }
        records
    }

    /// Emit every live bucket regardless of age. Shutdown only: windows that
    /// are still open get emitted partially.
    pub fn drain_all(&self) -> Vec<FeatureRecord> {
        let drained: Vec<(WindowKey, WindowBucket)> = self.state.lock().buckets.drain().collect();

        let records: Vec<FeatureRecord> = drained
            .into_iter()
            .map(|(key, bucket)| bucket.into_record(key, self.window_secs))
            .collect();

        self.counters.records_emitted.fetch_add(records.len() as u64, Ordering::Relaxed);
        records
    }

    pub fn live_buckets(&self) -> usize {
        self.state.lock().buckets.len()
    }

    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            packets_ingested: self.counters.packets_ingested.load(Ordering::Relaxed),
            packets_dropped: self.counters.packets_dropped.load(Ordering::Relaxed),
            buckets_created: self.counters.buckets_created.load(Ordering::Relaxed),
            records_emitted: self.counters.records_emitted.load(Ordering::Relaxed),
            scans: self.counters.scans.load(Ordering::Relaxed),
            live_buckets: self.live_buckets(),
        }
    }
}

/// Current time in seconds since the Unix epoch
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
