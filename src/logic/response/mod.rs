//! Response Module - Mitigation actions
//!
//! ## Structure
//! - `types`: ActionResult, ActionStatus, ActionError
//! - `firewall`: Enforcer trait, iptables and log-only enforcers
//! - `executor`: Verdict -> block -> "AutoBlock" audit entry

pub mod types;
pub mod firewall;
pub mod executor;

pub use firewall::{Enforcer, IptablesEnforcer, LogOnlyEnforcer};
pub use executor::ResponseExecutor;
