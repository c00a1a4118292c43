//! Policy Module
//!
//! Turns scorer output into verdicts. This is where the security decision is
//! made; models only provide evidence.
//!
//! ## Structure
//! - `types`: Decision, SupervisedLabel, Verdict
//! - `config`: Thresholds and auto-mitigate labels
//! - `engine`: Precedence rules and the audited `DecisionEngine`
//!
//! ## Usage
//! ```ignore
//! let engine = DecisionEngine::new(PolicyConfig::default(), audit)
//!     .with_anomaly_scorer(scorer);
//! if let Some(verdict) = engine.handle(&record) {
//!     if verdict.mitigation_required {
//!         executor.execute(&verdict, &record.src_ip.to_string());
//!     }
//! }
//! ```

pub mod types;
pub mod config;
pub mod engine;

pub use types::Verdict;
pub use config::{PolicyConfig, PolicyConfigError};
pub use engine::DecisionEngine;
