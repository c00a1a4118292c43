//! Advisory Module - Natural-language triage suggestions
//!
//! Optional. Turns a detection into a prompt for an external LLM service and
//! logs the suggested triage steps.

pub mod client;

pub use client::{AdvisoryClient, AdvisoryConfig};

use crate::logic::policy::Verdict;
use crate::logic::window::FeatureRecord;

/// Local hostname, if it can be read
pub fn local_hostname() -> Option<String> {
    hostname::get().ok().map(|h| h.to_string_lossy().to_string())
}

/// Triage prompt for one detection
pub fn triage_prompt(record: &FeatureRecord, verdict: &Verdict, host: Option<&str>) -> String {
    format!(
        "You are a security analyst. Host {} raised a {} alert ({}) for source {}: \
         {} packets, {} bytes, {} unique destination ports, {:.1}s duration, {} protocol(s) \
         in one window. Suggest 3 prioritized triage steps and a one-sentence justification for each.",
        host.unwrap_or("unknown"),
        verdict.category,
        if verdict.mitigation_required { "source auto-blocked" } else { "no block applied" },
        record.src_ip,
        record.packets,
        record.bytes,
        record.unique_dst_ports,
        record.duration,
        record.protocol_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::policy::types::VerdictStatus;

    #[test]
    fn test_triage_prompt_mentions_detection() {
        let record = FeatureRecord {
            window_start: 0.0,
            src_ip: "203.0.113.5".parse().unwrap(),
            packets: 120,
            bytes: 40_000,
            unique_dst_ports: 60,
            duration: 2.0,
            protocol_count: 1,
        };
        let verdict = Verdict {
            category: "portscan".to_string(),
            status: VerdictStatus::Detected,
            mitigation_required: true,
        };

        let prompt = triage_prompt(&record, &verdict, Some("sensor-01"));
        assert!(prompt.contains("203.0.113.5"));
        assert!(prompt.contains("portscan"));
        assert!(prompt.contains("sensor-01"));
        assert!(prompt.contains("60 unique destination ports"));
    }
}
