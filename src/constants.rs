//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Every default can be overridden through a `FLOWGUARD_*` environment
//! variable (see `logic::config`) or the matching CLI flag.

/// Aggregation window length (seconds)
pub const DEFAULT_WINDOW_SECONDS: f64 = 5.0;

/// Capacity of the feature record queue between flusher and decision worker
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Capacity of the advisory prompt queue
pub const DEFAULT_ADVISORY_QUEUE_CAPACITY: usize = 64;

/// How often the flusher thread asks the aggregator for ready windows (ms).
/// The aggregator rate-limits the real scan to once per window on its own.
pub const DEFAULT_FLUSH_TICK_MS: u64 = 500;

/// Upper bound for a single enforcement call (seconds)
pub const DEFAULT_BLOCK_TIMEOUT_SECS: u64 = 10;

/// Supervised label is trusted only above this confidence
pub const DEFAULT_SUPERVISED_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Anomaly scores below this (but not flagged) are logged for investigation
pub const DEFAULT_LOW_CONFIDENCE_SCORE_THRESHOLD: f64 = -0.1;

/// Labels that trigger automatic blocking when trusted
pub const DEFAULT_AUTO_MITIGATE_LABELS: &[&str] = &["portscan", "ddos"];

/// Advisory request timeout (seconds)
pub const DEFAULT_ADVISORY_TIMEOUT_SECS: u64 = 20;

/// Advisory model name
pub const DEFAULT_ADVISORY_MODEL: &str = "gemini-1.5-flash";

/// Advisory API base URL
pub const DEFAULT_ADVISORY_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Max tokens requested from the advisory service
pub const DEFAULT_ADVISORY_MAX_TOKENS: u32 = 300;

/// Audit log file name inside the data directory
pub const AUDIT_FILE_NAME: &str = "audit_log.jsonl";

/// Data directory name under the platform local data dir
pub const DATA_DIR_NAME: &str = "flowguard";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "flowguard";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Read a string variable, treating empty values as unset
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Default data directory: `<local data dir>/flowguard`
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// Default audit log path
pub fn default_audit_path() -> std::path::PathBuf {
    default_data_dir().join(AUDIT_FILE_NAME)
}
