//! Audit Module - Detection & mitigation trail
//!
//! Log format: JSON Lines (.jsonl)
//! Default location: {data_dir}/flowguard/audit_log.jsonl

pub mod types;
pub mod store;

pub use types::{AuditEntry, AUTO_BLOCK_CATEGORY};
pub use store::{AuditLog, most_recent_first, summarize};
