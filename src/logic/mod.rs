//! Logic Module - Detection pipeline
//!
//! ## Structure
//! - `window/` - Per-source windowed aggregation
//! - `model/` - Anomaly scorers and label classifiers
//! - `policy/` - Verdicts from scorer output
//! - `response/` - Host blocking
//! - `audit/` - Append-only JSONL trail
//! - `pipeline/` - Threads and queues wiring the stages
//! - `capture/` - JSONL observation replay
//! - `advisory/` - Optional LLM triage suggestions

pub mod window;
pub mod model;
pub mod policy;
pub mod response;
pub mod audit;
pub mod pipeline;
pub mod capture;
pub mod advisory;
pub mod config;
pub mod simulate;
