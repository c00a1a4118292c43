//! Capture Replay
//!
//! Raw packet capture is done by an external collector. Its output reaches us
//! as JSON Lines, one observation per line:
//!
//! ```json
//! {"src":"10.0.0.5","dst":"10.0.0.1","dport":22,"proto":6,"size":60,"ts":1700000000.25}
//! ```
//!
//! Lines that are not UTF-8 or JSON, miss required fields, or carry an
//! unusable timestamp are counted and skipped. Only EOF or a read error ends
//! the stream.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::logic::window::PacketObservation;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture input {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where observations come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    Stdin,
    File(PathBuf),
}

impl CaptureSource {
    /// `-` means stdin
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == "-" {
            CaptureSource::Stdin
        } else {
            CaptureSource::File(PathBuf::from(raw))
        }
    }

    pub fn open(&self) -> Result<ObservationReader<Box<dyn BufRead + Send>>, CaptureError> {
        let reader: Box<dyn BufRead + Send> = match self {
            CaptureSource::Stdin => Box::new(BufReader::new(std::io::stdin())),
            CaptureSource::File(path) => {
                let file = File::open(path)
                    .map_err(|source| CaptureError::Open { path: path.clone(), source })?;
                Box::new(BufReader::new(file))
            }
        };
        log::info!("Reading observations from {}", self);
        Ok(ObservationReader::new(reader))
    }
}

impl std::fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSource::Stdin => write!(f, "stdin"),
            CaptureSource::File(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Iterator over well-formed observations
pub struct ObservationReader<R: BufRead> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
    malformed: Arc<AtomicU64>,
}

impl<R: BufRead> ObservationReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
            line_no: 0,
            malformed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared skip counter, readable after the reader moves to another thread
    pub fn malformed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.malformed)
    }

    fn skip(&self, reason: &dyn std::fmt::Display) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        log::debug!("Line {}: {}", self.line_no, reason);
    }
}

impl<R: BufRead> Iterator for ObservationReader<R> {
    type Item = PacketObservation;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Capture input stopped at line {}: {}", self.line_no + 1, e);
                    return None;
                }
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    Self::skip(self, &e);
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<PacketObservation>(line) {
                Ok(obs) if obs.is_well_formed() => return Some(obs),
                Ok(_) => Self::skip(self, &"unusable timestamp"),
                Err(e) => Self::skip(self, &e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_aliases_and_full_names() {
        let input = concat!(
            r#"{"src":"10.0.0.5","dst":"10.0.0.1","dport":22,"proto":6,"size":60,"ts":100.5}"#, "\n",
            r#"{"source_address":"10.0.0.6","destination_address":"10.0.0.1","size_bytes":1500,"timestamp":101.0}"#, "\n",
        );
        let obs: Vec<_> = ObservationReader::new(Cursor::new(input)).collect();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].destination_port, Some(22));
        assert_eq!(obs[0].protocol, Some(6));
        assert_eq!(obs[1].destination_port, None);
        assert_eq!(obs[1].size_bytes, 1500);
    }

    #[test]
    fn test_malformed_lines_counted_and_skipped() {
        let input = concat!(
            "garbage\n",
            "\n",
            r#"{"src":"10.0.0.5","dst":"10.0.0.1","size":60}"#, "\n",
            r#"{"src":"10.0.0.5","dst":"10.0.0.1","size":-1,"ts":1.0}"#, "\n",
            r#"{"src":"10.0.0.5","dst":"10.0.0.1","size":60,"ts":-3.0}"#, "\n",
            r#"{"src":"not-an-ip","dst":"10.0.0.1","size":60,"ts":1.0}"#, "\n",
            r#"{"src":"10.0.0.5","dst":"10.0.0.1","size":60,"ts":7.0}"#, "\n",
        );
        let reader = ObservationReader::new(Cursor::new(input));
        let malformed = reader.malformed_counter();
        let obs: Vec<_> = reader.collect();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].timestamp, 7.0);
        assert_eq!(malformed.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_invalid_utf8_line_does_not_end_stream() {
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"src":"10.0.0.5","dst":"10.0.0.1","size":60,"ts":1.0}"#);
        input.push(b'\n');
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(br#"{"src":"10.0.0.6","dst":"10.0.0.1","size":60,"ts":2.0}"#);

        let reader = ObservationReader::new(Cursor::new(input));
        let malformed = reader.malformed_counter();
        let obs: Vec<_> = reader.collect();

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[1].source_address.to_string(), "10.0.0.6");
        assert_eq!(malformed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!(CaptureSource::parse("-"), CaptureSource::Stdin);
        assert_eq!(
            CaptureSource::parse("cap.jsonl"),
            CaptureSource::File(PathBuf::from("cap.jsonl"))
        );
        assert!(matches!(
            CaptureSource::parse("/nonexistent/cap.jsonl").open(),
            Err(CaptureError::Open { .. })
        ));
    }
}
