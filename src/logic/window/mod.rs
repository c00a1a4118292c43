//! Window Module - Per-source flow aggregation
//!
//! Buckets packet observations by `(source, floor(ts / W))` and turns closed
//! windows into `FeatureRecord`s for the decision engine.
//!
//! ## Structure
//! - `types.rs` - PacketObservation, WindowKey, WindowBucket, FeatureRecord
//! - `aggregator.rs` - Lock-guarded bucket table with rate-limited flush

pub mod types;
pub mod aggregator;


pub use types::{FeatureRecord, FeatureVector, PacketObservation, FEATURE_COUNT};
pub use aggregator::FlowAggregator;
