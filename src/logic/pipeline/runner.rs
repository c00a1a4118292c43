//! Pipeline Runner
//!
//! Threads:
//! - capture: feeds observations into the aggregator
//! - flusher: polls `flush_ready` every tick, pushes records to the queue
//! - worker: decision engine + response executor for each record
//! - advisory (optional): sends triage prompts for detections
//!
//! Shutdown: the shared flag is raised by Ctrl-C or when the input ends.
//! The flusher then optionally drains every live bucket and closes the record
//! queue; the worker finishes what is queued and closes the advisory queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use serde::Serialize;
use thiserror::Error;

use crate::logic::advisory::{self, AdvisoryClient};
use crate::logic::policy::DecisionEngine;
use crate::logic::response::types::ActionResult;
use crate::logic::response::ResponseExecutor;
use crate::logic::window::{FeatureRecord, FlowAggregator, PacketObservation};
use super::queue::{BoundedQueue, FeatureQueue, Pop};

// ============================================================================
// OPTIONS / STATS
// ============================================================================

/// Block attempts listed in the exit summary
const SUMMARY_RECENT_ACTIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub flush_tick: Duration,
    pub flush_on_shutdown: bool,
    pub queue_capacity: usize,
    pub advisory_queue_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            flush_tick: Duration::from_millis(DEFAULT_FLUSH_TICK_MS),
            flush_on_shutdown: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            advisory_queue_capacity: DEFAULT_ADVISORY_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub records_processed: AtomicU64,
    pub detections: AtomicU64,
    pub mitigations: AtomicU64,
    pub mitigation_failures: AtomicU64,
    pub advisories_sent: AtomicU64,
    pub advisory_failures: AtomicU64,
}

/// Snapshot logged on exit
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    pub packets_ingested: u64,
    pub packets_dropped: u64,
    pub records_emitted: u64,
    pub records_dropped: u64,
    pub records_processed: u64,
    pub detections: u64,
    pub mitigations: u64,
    pub mitigation_failures: u64,
    pub advisories_sent: u64,
    pub advisory_failures: u64,
    pub unflushed_buckets: usize,
    pub recent_actions: Vec<ActionResult>,
}

impl PipelineSummary {
    pub fn log(&self) {
        log::info!(
            "Summary: {} packets ({} dropped), {} records ({} dropped, {} processed), \
             {} detections, {} blocks ({} failed), {} unflushed buckets",
            self.packets_ingested,
            self.packets_dropped,
            self.records_emitted,
            self.records_dropped,
            self.records_processed,
            self.detections,
            self.mitigations,
            self.mitigation_failures,
            self.unflushed_buckets,
        );
        for action in &self.recent_actions {
            log::info!(
                "  {} {} {} via {} ({} ms): {}",
                action.action_id,
                action.subject,
                action.status.as_str(),
                action.enforcer,
                action.duration_ms,
                action.message
            );
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    aggregator: Arc<FlowAggregator>,
    engine: Arc<DecisionEngine>,
    executor: Arc<ResponseExecutor>,
    advisory: Option<Arc<AdvisoryClient>>,
    records: Arc<FeatureQueue>,
    prompts: Arc<BoundedQueue<String>>,
    options: PipelineOptions,
    shutdown: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    pub fn new(
        aggregator: FlowAggregator,
        engine: DecisionEngine,
        executor: ResponseExecutor,
        options: PipelineOptions,
    ) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            engine: Arc::new(engine),
            executor: Arc::new(executor),
            advisory: None,
            records: Arc::new(BoundedQueue::new("feature", options.queue_capacity)),
            prompts: Arc::new(BoundedQueue::new("advisory", options.advisory_queue_capacity)),
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn with_advisory(mut self, client: Option<AdvisoryClient>) -> Self {
        self.advisory = client.map(Arc::new);
        self
    }

    /// Flag that stops the pipeline when set (wire this to Ctrl-C)
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run until the input ends or shutdown is requested
    pub fn run<I>(&self, observations: I) -> Result<PipelineSummary, PipelineError>
    where
        I: IntoIterator<Item = PacketObservation>,
        I::IntoIter: Send + 'static,
    {
        log::info!(
            "Pipeline started (window {}s, queue {}, flush on shutdown: {})",
            self.aggregator.window_secs(),
            self.records.capacity(),
            self.options.flush_on_shutdown
        );

        let capture = self.spawn_capture(observations.into_iter())?;
        let flusher = self.spawn_flusher()?;
        let worker = self.spawn_worker()?;
        let advisor = match &self.advisory {
            Some(client) => Some(self.spawn_advisor(Arc::clone(client))?),
            None => {
                self.prompts.close();
                None
            }
        };

        while !self.shutdown.load(Ordering::SeqCst) && !capture.is_finished() {
            thread::sleep(self.options.flush_tick.min(Duration::from_millis(100)));
        }
        self.shutdown.store(true, Ordering::SeqCst);

        if capture.is_finished() {
            join("capture", capture);
        } else {
            // Blocked on a read that will never return (e.g. idle stdin)
            log::warn!("Capture input still blocked, abandoning reader");
        }
        join("flusher", flusher);
        join("worker", worker);
        if let Some(handle) = advisor {
            join("advisory", handle);
        }

        let summary = self.summary();
        log::info!("Pipeline stopped");
        Ok(summary)
    }

    pub fn summary(&self) -> PipelineSummary {
        let agg = self.aggregator.stats();
        PipelineSummary {
            packets_ingested: agg.packets_ingested,
            packets_dropped: agg.packets_dropped,
            records_emitted: agg.records_emitted,
            records_dropped: self.records.dropped(),
            records_processed: self.stats.records_processed.load(Ordering::Relaxed),
            detections: self.stats.detections.load(Ordering::Relaxed),
            mitigations: self.stats.mitigations.load(Ordering::Relaxed),
            mitigation_failures: self.stats.mitigation_failures.load(Ordering::Relaxed),
            advisories_sent: self.stats.advisories_sent.load(Ordering::Relaxed),
            advisory_failures: self.stats.advisory_failures.load(Ordering::Relaxed),
            unflushed_buckets: agg.live_buckets,
            recent_actions: self.executor.history(SUMMARY_RECENT_ACTIONS),
        }
    }

    // ------------------------------------------------------------------------
    // threads
    // ------------------------------------------------------------------------

    fn spawn_capture<I>(&self, observations: I) -> Result<JoinHandle<()>, PipelineError>
    where
        I: Iterator<Item = PacketObservation> + Send + 'static,
    {
        let aggregator = Arc::clone(&self.aggregator);
        let shutdown = Arc::clone(&self.shutdown);

        spawn("capture", move || {
            for obs in observations {
                if shutdown.load(Ordering::Relaxed) {
                    log::info!("Capture stopped by shutdown");
                    return;
                }
                aggregator.ingest(&obs);
            }
            log::info!("Capture input exhausted");
        })
    }

    fn spawn_flusher(&self) -> Result<JoinHandle<()>, PipelineError> {
        let aggregator = Arc::clone(&self.aggregator);
        let records = Arc::clone(&self.records);
        let shutdown = Arc::clone(&self.shutdown);
        let tick = self.options.flush_tick;
        let flush_on_shutdown = self.options.flush_on_shutdown;

        spawn("flusher", move || {
            while !shutdown.load(Ordering::Relaxed) {
                for record in aggregator.flush_ready() {
                    records.push(record);
                }
                thread::sleep(tick);
            }

            if flush_on_shutdown {
                let remaining = aggregator.drain_all();
                log::info!("Shutdown flush: {} open window(s)", remaining.len());
                for record in remaining {
                    records.push(record);
                }
            }
            records.close();
        })
    }

    fn spawn_worker(&self) -> Result<JoinHandle<()>, PipelineError> {
        let worker = RecordWorker {
            engine: Arc::clone(&self.engine),
            executor: Arc::clone(&self.executor),
            stats: Arc::clone(&self.stats),
            prompts: self.advisory.as_ref().map(|_| Arc::clone(&self.prompts)),
            hostname: advisory::local_hostname(),
        };
        let records = Arc::clone(&self.records);
        let prompts = Arc::clone(&self.prompts);
        let tick = self.options.flush_tick;

        spawn("worker", move || {
            loop {
                match records.pop_timeout(tick) {
                    Pop::Item(record) => worker.process(&record),
                    Pop::Empty => continue,
                    Pop::Closed => break,
                }
            }
            prompts.close();
        })
    }

    fn spawn_advisor(&self, client: Arc<AdvisoryClient>) -> Result<JoinHandle<()>, PipelineError> {
        let prompts = Arc::clone(&self.prompts);
        let stats = Arc::clone(&self.stats);
        let tick = self.options.flush_tick;

        spawn("advisory", move || loop {
            match prompts.pop_timeout(tick) {
                Pop::Item(prompt) => match client.ask(&prompt) {
                    Ok(reply) => {
                        stats.advisories_sent.fetch_add(1, Ordering::Relaxed);
                        log::info!("[ADVISORY] {}", reply.text);
                    }
                    Err(e) => {
                        stats.advisory_failures.fetch_add(1, Ordering::Relaxed);
                        log::warn!("Advisory request failed: {}", e);
                    }
                },
                Pop::Empty => continue,
                Pop::Closed => break,
            }
        })
    }
}

/// Per-record decision path, shared by the worker thread and the simulator
pub struct RecordWorker {
    pub engine: Arc<DecisionEngine>,
    pub executor: Arc<ResponseExecutor>,
    pub stats: Arc<PipelineStats>,
    pub prompts: Option<Arc<BoundedQueue<String>>>,
    pub hostname: Option<String>,
}

impl RecordWorker {
    pub fn process(&self, record: &FeatureRecord) {
        self.stats.records_processed.fetch_add(1, Ordering::Relaxed);

        let Some(verdict) = self.engine.handle(record) else {
            return;
        };
        self.stats.detections.fetch_add(1, Ordering::Relaxed);

        if let Some(result) = self.executor.execute(&verdict, &record.src_ip.to_string()) {
            if result.succeeded() {
                self.stats.mitigations.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.mitigation_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(prompts) = &self.prompts {
            prompts.push(advisory::triage_prompt(record, &verdict, self.hostname.as_deref()));
        }
    }
}

fn spawn<F>(name: &'static str, f: F) -> Result<JoinHandle<()>, PipelineError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("flowguard-{}", name))
        .spawn(f)
        .map_err(|source| PipelineError::Spawn { name, source })
}

fn join(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("{} thread panicked", name);
    }
}
