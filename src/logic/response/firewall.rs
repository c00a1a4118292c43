//! Host Blocking
//!
//! Drops inbound traffic from a source address with
//! `iptables -I INPUT -s <ip> -j DROP` (`ip6tables` for IPv6). Every call is bounded by a timeout;
//! a hung command is killed and reported as a failure.

use std::io::Read;
use std::net::IpAddr;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::types::ActionError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Blocks a subject address on the host
pub trait Enforcer: Send + Sync {
    fn name(&self) -> &str;

    /// Returns a human-readable message on success
    fn block(&self, subject: IpAddr) -> Result<String, ActionError>;
}

// ============================================================================
// IPTABLES
// ============================================================================

pub struct IptablesEnforcer {
    program_v4: String,
    program_v6: String,
    use_sudo: bool,
    timeout: Duration,
}

impl IptablesEnforcer {
    pub fn new(use_sudo: bool, timeout: Duration) -> Self {
        Self {
            program_v4: "iptables".to_string(),
            program_v6: "ip6tables".to_string(),
            use_sudo,
            timeout,
        }
    }

    /// Run a wrapper script for both address families
    #[cfg(test)]
    pub fn with_program(mut self, program: &str) -> Self {
        self.program_v4 = program.to_string();
        self.program_v6 = program.to_string();
        self
    }

    /// Program and arguments for blocking `subject`
    pub fn block_command(&self, subject: IpAddr) -> (String, Vec<String>) {
        let mut args: Vec<String> = ["-I", "INPUT", "-s"].iter().map(|s| s.to_string()).collect();
        args.push(subject.to_string());
        args.extend(["-j", "DROP"].iter().map(|s| s.to_string()));

        let program = if subject.is_ipv6() { &self.program_v6 } else { &self.program_v4 };
        if self.use_sudo {
            args.insert(0, program.clone());
            ("sudo".to_string(), args)
        } else {
            (program.clone(), args)
        }
    }
}

impl Enforcer for IptablesEnforcer {
    fn name(&self) -> &str {
        "iptables"
    }

    fn block(&self, subject: IpAddr) -> Result<String, ActionError> {
        let (program, args) = self.block_command(subject);
        run_with_timeout(&program, &args, self.timeout)?;
        Ok(format!("Blocked inbound traffic from {}", subject))
    }
}

/// Run a command, killing it if it outlives `timeout`
pub fn run_with_timeout(program: &str, args: &[String], timeout: Duration) -> Result<(), ActionError> {
    let command = format!("{} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ActionError::Spawn { command: command.clone(), message: e.to_string() })?;

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ActionError::Timeout {
                    command,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(ActionError::Spawn { command, message: e.to_string() });
            }
        }
    };

    if status.success() {
        return Ok(());
    }

    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }
    Err(ActionError::CommandFailed {
        command,
        exit_code: status.code().unwrap_or(-1),
        stderr: stderr.trim().to_string(),
    })
}

// ============================================================================
// LOG ONLY
// ============================================================================

/// Records the intent without touching the host (dry runs, simulation)
#[derive(Debug, Default)]
pub struct LogOnlyEnforcer;

impl Enforcer for LogOnlyEnforcer {
    fn name(&self) -> &str {
        "log-only"
    }

    fn block(&self, subject: IpAddr) -> Result<String, ActionError> {
        log::warn!("[DRY RUN] would block {}", subject);
        Ok(format!("Dry run: {} not blocked", subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "10.0.0.5".parse().unwrap()
    }

    #[test]
    fn test_block_command_shape() {
        let enforcer = IptablesEnforcer::new(false, Duration::from_secs(1));
        let (program, args) = enforcer.block_command(ip());
        assert_eq!(program, "iptables");
        assert_eq!(args, vec!["-I", "INPUT", "-s", "10.0.0.5", "-j", "DROP"]);

        let sudo = IptablesEnforcer::new(true, Duration::from_secs(1));
        let (program, args) = sudo.block_command(ip());
        assert_eq!(program, "sudo");
        assert_eq!(args[0], "iptables");
        assert_eq!(args.len(), 7);
    }

    #[test]
    fn test_ipv6_subject_uses_ip6tables() {
        let enforcer = IptablesEnforcer::new(false, Duration::from_secs(1));
        let (program, args) = enforcer.block_command("2001:db8::5".parse().unwrap());
        assert_eq!(program, "ip6tables");
        assert_eq!(args[3], "2001:db8::5");

        let (program, _) = enforcer.block_command(ip());
        assert_eq!(program, "iptables");

        let sudo = IptablesEnforcer::new(true, Duration::from_secs(1));
        let (program, args) = sudo.block_command("::1".parse().unwrap());
        assert_eq!(program, "sudo");
        assert_eq!(args[0], "ip6tables");
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let enforcer = IptablesEnforcer::new(false, Duration::from_secs(1))
            .with_program("/nonexistent/flowguard-iptables");
        assert!(matches!(enforcer.block(ip()), Err(ActionError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_mapped() {
        let ok = IptablesEnforcer::new(false, Duration::from_secs(5)).with_program("true");
        assert!(ok.block(ip()).is_ok());

        let failing = IptablesEnforcer::new(false, Duration::from_secs(5)).with_program("false");
        assert!(matches!(
            failing.block(ip()),
            Err(ActionError::CommandFailed { exit_code: 1, .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_command_killed_after_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-iptables");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let enforcer = IptablesEnforcer::new(false, Duration::from_millis(200))
            .with_program(script.to_str().unwrap());

        let started = Instant::now();
        assert!(matches!(enforcer.block(ip()), Err(ActionError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_log_only_never_fails() {
        assert!(LogOnlyEnforcer.block(ip()).is_ok());
    }
}
