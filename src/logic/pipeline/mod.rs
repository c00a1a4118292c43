//! Pipeline Module - Wiring and runtime
//!
//! capture -> aggregator -> flusher -> FeatureQueue -> worker -> executor -> audit

pub mod queue;
pub mod runner;


pub use runner::{Pipeline, PipelineOptions, PipelineStats, RecordWorker};
