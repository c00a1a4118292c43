//! Runtime Configuration
//!
//! Precedence (lowest first): built-in defaults, policy file, `FLOWGUARD_*`
//! environment (a `.env` file is loaded by `main`), CLI flags.
//! Any invalid value is a startup error.

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::*;
use crate::logic::advisory::AdvisoryConfig;
use crate::logic::model::{
    onnx::verify_checksum, HeuristicLimits, ModelLoadError, SupervisedBackend, UnsupervisedBackend,
};
use crate::logic::pipeline::PipelineOptions;
use crate::logic::policy::{PolicyConfig, PolicyConfigError};

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(transparent)]
    Policy(#[from] PolicyConfigError),

    #[error(transparent)]
    Model(#[from] ModelLoadError),

    #[error("advisory client enabled but FLOWGUARD_ADVISORY_API_KEY is not set")]
    AdvisoryKeyMissing,
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key, reason: reason.into() }
}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub window_secs: f64,
    pub queue_capacity: usize,
    pub advisory_queue_capacity: usize,
    pub flush_tick_ms: u64,
    pub flush_on_shutdown: bool,
    pub block_timeout_secs: u64,
    pub use_sudo: bool,
    /// Log blocks instead of applying them
    pub dry_run: bool,
    pub audit_path: PathBuf,
    pub policy: PolicyConfig,
    pub unsupervised: UnsupervisedBackend,
    pub supervised: SupervisedBackend,
    pub heuristic: HeuristicLimits,
    pub advisory: AdvisoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECONDS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            advisory_queue_capacity: DEFAULT_ADVISORY_QUEUE_CAPACITY,
            flush_tick_ms: DEFAULT_FLUSH_TICK_MS,
            flush_on_shutdown: true,
            block_timeout_secs: DEFAULT_BLOCK_TIMEOUT_SECS,
            use_sudo: true,
            dry_run: false,
            audit_path: default_audit_path(),
            policy: PolicyConfig::default(),
            unsupervised: UnsupervisedBackend::Heuristic,
            supervised: SupervisedBackend::None,
            heuristic: HeuristicLimits::default(),
            advisory: AdvisoryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_string)
    }

    /// Load from any key lookup (the process environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let mut config = Config::default();

        if let Some(path) = env.get("FLOWGUARD_POLICY_FILE") {
            config.policy = PolicyConfig::from_file(&PathBuf::from(path))?;
        }

        set(&mut config.window_secs, env.parse("FLOWGUARD_WINDOW_SECONDS")?);
        set(&mut config.queue_capacity, env.parse("FLOWGUARD_QUEUE_CAPACITY")?);
        set(&mut config.advisory_queue_capacity, env.parse("FLOWGUARD_ADVISORY_QUEUE_CAPACITY")?);
        set(&mut config.flush_tick_ms, env.parse("FLOWGUARD_FLUSH_TICK_MS")?);
        set(&mut config.flush_on_shutdown, env.flag("FLOWGUARD_FLUSH_ON_SHUTDOWN"));
        set(&mut config.block_timeout_secs, env.parse("FLOWGUARD_BLOCK_TIMEOUT_SECS")?);
        set(&mut config.use_sudo, env.flag("FLOWGUARD_USE_SUDO"));
        set(&mut config.dry_run, env.flag("FLOWGUARD_DRY_RUN"));
        set(&mut config.audit_path, env.get("FLOWGUARD_AUDIT_PATH").map(PathBuf::from));

        // Policy
        set(
            &mut config.policy.supervised_confidence_threshold,
            env.parse("FLOWGUARD_SUPERVISED_THRESHOLD")?,
        );
        set(
            &mut config.policy.low_confidence_score_threshold,
            env.parse("FLOWGUARD_LOW_CONFIDENCE_THRESHOLD")?,
        );
        if let Some(labels) = env.get("FLOWGUARD_AUTO_MITIGATE_LABELS") {
            config.policy.auto_mitigate_labels = split_labels(&labels);
        }

        // Scorers
        config.unsupervised = unsupervised_backend(&env)?;
        config.supervised = supervised_backend(&env)?;

        // Advisory
        set(&mut config.advisory.enabled, env.flag("FLOWGUARD_ADVISORY"));
        config.advisory.api_key = env.get("FLOWGUARD_ADVISORY_API_KEY");
        set(&mut config.advisory.model, env.get("FLOWGUARD_ADVISORY_MODEL"));
        config.advisory.api_url = env.get("FLOWGUARD_ADVISORY_URL");
        set(&mut config.advisory.timeout_secs, env.parse("FLOWGUARD_ADVISORY_TIMEOUT_SECS")?);

        Ok(config)
    }

    /// Reject anything the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.window_secs.is_finite() || self.window_secs <= 0.0 {
            return Err(invalid("window_secs", format!("{} must be a positive number", self.window_secs)));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be at least 1"));
        }
        if self.advisory_queue_capacity == 0 {
            return Err(invalid("advisory_queue_capacity", "must be at least 1"));
        }
        if self.flush_tick_ms == 0 {
            return Err(invalid("flush_tick_ms", "must be at least 1"));
        }
        if self.block_timeout_secs == 0 {
            return Err(invalid("block_timeout_secs", "must be at least 1"));
        }
        self.policy.validate()?;

        let models = [
            match &self.unsupervised {
                UnsupervisedBackend::Onnx { path, sha256 } => Some((path, sha256)),
                _ => None,
            },
            match &self.supervised {
                SupervisedBackend::Onnx { path, sha256 } => Some((path, sha256)),
                SupervisedBackend::None => None,
            },
        ];
        for (path, sha256) in models.into_iter().flatten() {
            if !path.is_file() {
                return Err(ModelLoadError::NotFound(path.clone()).into());
            }
            if let Some(expected) = sha256 {
                verify_checksum(path, expected)?;
            }
        }

        if self.advisory.enabled
            && self.advisory.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(ConfigError::AdvisoryKeyMissing);
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            flush_tick: std::time::Duration::from_millis(self.flush_tick_ms),
            flush_on_shutdown: self.flush_on_shutdown,
            queue_capacity: self.queue_capacity,
            advisory_queue_capacity: self.advisory_queue_capacity,
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| invalid(key, format!("{:?} is not a valid value", raw))),
            None => Ok(None),
        }
    }

    /// "1", "true", "yes", "on" (any case) are true; anything else is false
    fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

pub fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn unsupervised_backend<F: Fn(&str) -> Option<String>>(
    env: &Lookup<F>,
) -> Result<UnsupervisedBackend, ConfigError> {
    let model = env.get("FLOWGUARD_ANOMALY_MODEL").map(PathBuf::from);
    let sha256 = env.get("FLOWGUARD_ANOMALY_MODEL_SHA256");
    let kind = env
        .get("FLOWGUARD_SCORER")
        .map(|k| k.trim().to_ascii_lowercase())
        .unwrap_or_else(|| if model.is_some() { "onnx".into() } else { "heuristic".into() });

    match kind.as_str() {
        "none" => Ok(UnsupervisedBackend::None),
        "heuristic" => Ok(UnsupervisedBackend::Heuristic),
        "onnx" => match model {
            Some(path) => Ok(UnsupervisedBackend::Onnx { path, sha256 }),
            None => Err(invalid("FLOWGUARD_SCORER", "onnx requires FLOWGUARD_ANOMALY_MODEL")),
        },
        other => Err(invalid("FLOWGUARD_SCORER", format!("unknown scorer {:?}", other))),
    }
}

fn supervised_backend<F: Fn(&str) -> Option<String>>(
    env: &Lookup<F>,
) -> Result<SupervisedBackend, ConfigError> {
    let model = env.get("FLOWGUARD_CLASSIFIER_MODEL").map(PathBuf::from);
    let sha256 = env.get("FLOWGUARD_CLASSIFIER_MODEL_SHA256");
    let kind = env
        .get("FLOWGUARD_CLASSIFIER")
        .map(|k| k.trim().to_ascii_lowercase())
        .unwrap_or_else(|| if model.is_some() { "onnx".into() } else { "none".into() });

    match kind.as_str() {
        "none" => Ok(SupervisedBackend::None),
        "onnx" => match model {
            Some(path) => Ok(SupervisedBackend::Onnx { path, sha256 }),
            None => Err(invalid("FLOWGUARD_CLASSIFIER", "onnx requires FLOWGUARD_CLASSIFIER_MODEL")),
        },
        other => Err(invalid("FLOWGUARD_CLASSIFIER", format!("unknown classifier {:?}", other))),
    }
}

// ============================================================================
// TESTS
// ============================================================================
