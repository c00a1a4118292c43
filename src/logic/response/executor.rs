//! Response Executor
//!
//! Blocks the subject of a verdict that requires mitigation and records the
//! outcome as an "AutoBlock" audit entry. Never propagates a failure: a block
//! that could not be applied is audited as "Failed" and the pipeline moves on.
//!
//! Repeated verdicts for the same subject re-issue the block every time.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::logic::audit::{AuditEntry, AuditLog, AUTO_BLOCK_CATEGORY};
use crate::logic::policy::Verdict;
use super::firewall::Enforcer;
use super::types::{ActionError, ActionResult, ActionStatus};

const MAX_HISTORY: usize = 500;

pub struct ResponseExecutor {
    enforcer: Arc<dyn Enforcer>,
    audit: Arc<AuditLog>,
    history: RwLock<VecDeque<ActionResult>>,
}

impl ResponseExecutor {
    pub fn new(enforcer: Arc<dyn Enforcer>, audit: Arc<AuditLog>) -> Self {
        log::info!("Response executor using {} enforcer", enforcer.name());
        Self {
            enforcer,
            audit,
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Act on a verdict. Returns `None` when no mitigation was required.
    pub fn execute(&self, verdict: &Verdict, subject: &str) -> Option<ActionResult> {
        if !verdict.mitigation_required {
            return None;
        }
        Some(self.block(subject))
    }

    /// Block a subject and audit the outcome
    pub fn block(&self, subject: &str) -> ActionResult {
        let start = Instant::now();

        let outcome = subject
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| ActionError::InvalidSubject { subject: subject.to_string() })
            .and_then(|ip| self.enforcer.block(ip));

        let (status, message) = match outcome {
            Ok(message) => {
                log::warn!("Blocked {} via {}", subject, self.enforcer.name());
                (ActionStatus::Success, message)
            }
            Err(e) => {
                log::error!("Failed to block {}: {}", subject, e);
                (ActionStatus::Failed, e.to_string())
            }
        };

        let result = ActionResult {
            action_id: Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            enforcer: self.enforcer.name().to_string(),
            status,
            message,
            timestamp: Utc::now().timestamp(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        let extra = serde_json::json!({
            "blocked": result.succeeded(),
            "message": result.message,
            "action_id": result.action_id,
            "enforcer": result.enforcer,
            "duration_ms": result.duration_ms,
        });
        self.audit.record(
            AuditEntry::new(subject, AUTO_BLOCK_CATEGORY, status.as_str()).with_extra(extra),
        );
        self.record_action(result.clone());
        result
    }

    fn record_action(&self, result: ActionResult) {
        let mut history = self.history.write();
        history.push_back(result);
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    /// Most recent first
    pub fn history(&self, limit: usize) -> Vec<ActionResult> {
        self.history.read().iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::policy::types::VerdictStatus;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingEnforcer {
        fail: bool,
        calls: Mutex<Vec<IpAddr>>,
    }

    impl Enforcer for RecordingEnforcer {
        fn name(&self) -> &str {
            "recording"
        }

        fn block(&self, subject: IpAddr) -> Result<String, ActionError> {
            self.calls.lock().push(subject);
            if self.fail {
                Err(ActionError::CommandFailed {
                    command: "iptables".to_string(),
                    exit_code: 4,
                    stderr: "Permission denied".to_string(),
                })
            } else {
                Ok(format!("blocked {}", subject))
            }
        }
    }

    fn verdict(mitigate: bool) -> Verdict {
        Verdict {
            category: "Anomaly".to_string(),
            status: VerdictStatus::Detected,
            mitigation_required: mitigate,
        }
    }

    fn setup(fail: bool) -> (tempfile::TempDir, Arc<RecordingEnforcer>, Arc<AuditLog>, ResponseExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("audit.jsonl")).unwrap());
        let enforcer = Arc::new(RecordingEnforcer { fail, ..Default::default() });
        let executor = ResponseExecutor::new(enforcer.clone(), Arc::clone(&audit));
        (dir, enforcer, audit, executor)
    }

    #[test]
    fn test_no_mitigation_no_side_effects() {
        let (_dir, enforcer, audit, executor) = setup(false);
        assert!(executor.execute(&verdict(false), "10.0.0.5").is_none());
        assert!(enforcer.calls.lock().is_empty());
        assert!(audit.read_all().is_empty());
    }

    #[test]
    fn test_success_audited() {
        let (_dir, enforcer, audit, executor) = setup(false);
        let result = executor.execute(&verdict(true), "10.0.0.5").unwrap();
        assert_eq!(result.status, ActionStatus::Success);
        assert_eq!(enforcer.calls.lock().len(), 1);

        let entries = audit.read_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, "AutoBlock");
        assert_eq!(entries[0].status, "Success");
        assert_eq!(entries[0].extra["blocked"], true);
        assert_eq!(entries[0].extra["action_id"], result.action_id.as_str());
    }

    #[test]
    fn test_failure_audited_not_propagated() {
        let (_dir, _enforcer, audit, executor) = setup(true);
        let result = executor.execute(&verdict(true), "10.0.0.5").unwrap();
        assert_eq!(result.status, ActionStatus::Failed);
        assert!(result.message.contains("Permission denied"));

        let entries = audit.read_all();
        assert_eq!(entries[0].status, "Failed");
        assert_eq!(entries[0].extra["blocked"], false);
    }

    #[test]
    fn test_invalid_subject_never_reaches_enforcer() {
        let (_dir, enforcer, audit, executor) = setup(false);
        let result = executor.block("10.0.0.5; rm -rf /");
        assert_eq!(result.status, ActionStatus::Failed);
        assert!(enforcer.calls.lock().is_empty());
        assert_eq!(audit.read_all()[0].status, "Failed");
    }

    #[test]
    fn test_repeated_blocks_not_deduplicated() {
        let (_dir, enforcer, audit, executor) = setup(false);
        executor.execute(&verdict(true), "10.0.0.5");
        executor.execute(&verdict(true), "10.0.0.5");

        assert_eq!(enforcer.calls.lock().len(), 2);
        let entries = audit.read_all();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].extra["action_id"], entries[1].extra["action_id"]);

        let history = executor.history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action_id, entries[1].extra["action_id"].as_str().unwrap());
    }
}
