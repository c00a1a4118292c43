//! Window Types
//!
//! Packet observations in, feature records out.

use std::collections::HashSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

// ============================================================================
// FEATURE LAYOUT
// ============================================================================

/// Number of dimensions handed to the scorers
pub const FEATURE_COUNT: usize = 5;

/// Fixed scorer input: `[packets, bytes, unique_dst_ports, duration, protocol_count]`
pub type FeatureVector = [f32; FEATURE_COUNT];

// ============================================================================
// PACKET OBSERVATION
// ============================================================================

/// One captured packet, as reported by the capture collaborator.
///
/// `protocol` is the numeric IP protocol number (6 = TCP, 17 = UDP, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketObservation {
    #[serde(alias = "src", alias = "src_ip")]
    pub source_address: IpAddr,
    #[serde(alias = "dst", alias = "dst_ip")]
    pub destination_address: IpAddr,
    #[serde(default, alias = "dport", alias = "dst_port")]
    pub destination_port: Option<u16>,
    #[serde(default, alias = "proto")]
    pub protocol: Option<u8>,
    #[serde(alias = "size")]
    pub size_bytes: u64,
    /// Seconds since the Unix epoch
    #[serde(alias = "ts")]
    pub timestamp: f64,
}

impl PacketObservation {
    /// Timestamps must be finite and non-negative to map onto a window
    pub fn is_well_formed(&self) -> bool {
        self.timestamp.is_finite() && self.timestamp >= 0.0
    }
}

// ============================================================================
// WINDOW KEY / BUCKET
// ============================================================================

/// (source, window index) - one aggregation bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub source: IpAddr,
    pub window_index: i64,
}

impl WindowKey {
    pub fn new(source: IpAddr, timestamp: f64, window_secs: f64) -> Self {
        Self {
            source,
            window_index: window_index(timestamp, window_secs),
        }
    }
}

/// `floor(ts / W)`
pub fn window_index(timestamp: f64, window_secs: f64) -> i64 {
    (timestamp / window_secs).floor() as i64
}

/// Mutable per-key accumulator
#[derive(Debug, Clone)]
pub struct WindowBucket {
    pub first_seen: f64,
    pub last_seen: f64,
    pub packets: u64,
    pub bytes: u64,
    pub dst_ports: HashSet<u16>,
    pub protocols: HashSet<u8>,
}

impl WindowBucket {
    pub fn new(obs: &PacketObservation) -> Self {
        let mut bucket = Self {
            first_seen: obs.timestamp,
            last_seen: obs.timestamp,
            packets: 0,
            bytes: 0,
            dst_ports: HashSet::new(),
            protocols: HashSet::new(),
        };
        bucket.record(obs);
        bucket
    }

    /// Fold one observation into the counters
    pub fn record(&mut self, obs: &PacketObservation) {
        self.first_seen = self.first_seen.min(obs.timestamp);
        self.last_seen = self.last_seen.max(obs.timestamp);
        self.packets += 1;
        self.bytes = self.bytes.saturating_add(obs.size_bytes);
        if let Some(port) = obs.destination_port {
            self.dst_ports.insert(port);
        }
        if let Some(proto) = obs.protocol {
            self.protocols.insert(proto);
        }
    }

    /// Consume the bucket into its immutable summary
    pub fn into_record(self, key: WindowKey, window_secs: f64) -> FeatureRecord {
        FeatureRecord {
            window_start: key.window_index as f64 * window_secs,
            src_ip: key.source,
            packets: self.packets,
            bytes: self.bytes,
            unique_dst_ports: self.dst_ports.len() as u64,
            duration: (self.last_seen - self.first_seen).max(0.0),
            protocol_count: self.protocols.len() as u64,
        }
    }
}

// ============================================================================
// FEATURE RECORD
// ============================================================================

/// Immutable per-window summary, emitted once per bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Window start (seconds since epoch)
    pub window_start: f64,
    pub src_ip: IpAddr,
    pub packets: u64,
    pub bytes: u64,
    pub unique_dst_ports: u64,
    /// last-seen minus first-seen within the window
    pub duration: f64,
    pub protocol_count: u64,
}

impl FeatureRecord {
    /// Scorer input vector
    pub fn to_vector(&self) -> FeatureVector {
        [
            self.packets as f32,
            self.bytes as f32,
            self.unique_dst_ports as f32,
            self.duration as f32,
            self.protocol_count as f32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(ts: f64, port: Option<u16>, proto: Option<u8>, size: u64) -> PacketObservation {
        PacketObservation {
            source_address: "10.0.0.5".parse().unwrap(),
            destination_address: "10.0.0.1".parse().unwrap(),
            destination_port: port,
            protocol: proto,
            size_bytes: size,
            timestamp: ts,
        }
    }

    #[test]
    fn test_window_index_floor() {
        assert_eq!(window_index(0.0, 5.0), 0);
        assert_eq!(window_index(4.999, 5.0), 0);
        assert_eq!(window_index(5.0, 5.0), 1);
        assert_eq!(window_index(12.5, 5.0), 2);
    }

    #[test]
    fn test_bucket_unions_and_sums() {
        let mut b = WindowBucket::new(&obs(100.0, Some(22), Some(6), 60));
        b.record(&obs(101.5, Some(22), Some(6), 40));
        b.record(&obs(102.0, Some(80), Some(17), 100));
        b.record(&obs(102.5, None, None, 10));

        let key = WindowKey::new("10.0.0.5".parse().unwrap(), 100.0, 5.0);
        let rec = b.into_record(key, 5.0);

        assert_eq!(rec.packets, 4);
        assert_eq!(rec.bytes, 210);
        assert_eq!(rec.unique_dst_ports, 2);
        assert_eq!(rec.protocol_count, 2);
        assert_eq!(rec.window_start, 100.0);
        assert!((rec.duration - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_observation_has_zero_duration() {
        let b = WindowBucket::new(&obs(7.0, Some(443), Some(6), 1500));
        let key = WindowKey::new("10.0.0.5".parse().unwrap(), 7.0, 5.0);
        let rec = b.into_record(key, 5.0);
        assert_eq!(rec.duration, 0.0);
        assert_eq!(rec.window_start, 5.0);
    }

    #[test]
    fn test_observation_aliases() {
        let line = r#"{"src":"192.168.1.10","dst":"192.168.1.1","dport":53,"proto":17,"size":80,"ts":1700000000.25}"#;
        let parsed: PacketObservation = serde_json::from_str(line).unwrap();
        assert_eq!(parsed.destination_port, Some(53));
        assert_eq!(parsed.protocol, Some(17));
        assert!(parsed.is_well_formed());
    }

    #[test]
    fn test_vector_order() {
        let rec = FeatureRecord {
            window_start: 0.0,
            src_ip: "10.0.0.5".parse().unwrap(),
            packets: 120,
            bytes: 40000,
            unique_dst_ports: 60,
            duration: 2.0,
            protocol_count: 1,
        };
        assert_eq!(rec.to_vector(), [120.0, 40000.0, 60.0, 2.0, 1.0]);
    }
}
