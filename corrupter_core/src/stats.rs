use crate::observer::Progress;
use serde::Serialize;
use std::fmt;

/// Counters accumulated by the engine over one run.
///
/// `corrupted_bytes <= processed_bytes` holds after every chunk, and on a successful
/// run `processed_bytes` ends equal to `total_size` unless the source changed
/// underneath the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub total_size: u64,
    pub processed_bytes: u64,
    pub corrupted_bytes: u64,
    pub chunks: u64,
}

impl RunStatistics {
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            ..Default::default()
        }
    }

    pub fn record_chunk(&mut self, len: usize, corrupted: u64) {
        self.processed_bytes += len as u64;
        self.corrupted_bytes += corrupted;
        self.chunks += 1;
    }

    pub fn progress(&self) -> Progress {
        Progress {
            processed_bytes: self.processed_bytes,
            total_size: self.total_size,
        }
    }

    /// Share of processed bytes that were corrupted, in percent.
    pub fn actual_rate(&self) -> f64 {
        if self.processed_bytes == 0 {
            0.0
        } else {
            self.corrupted_bytes as f64 / self.processed_bytes as f64 * 100.0
        }
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            statistics: *self,
            actual_rate: self.actual_rate(),
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total bytes: {}", self.processed_bytes)?;
        writeln!(f, "Corrupted bytes: {}", self.corrupted_bytes)?;
        write!(f, "Actual corruption rate: {:.5}%", self.actual_rate())
    }
}

/// Serializable end-of-run summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub statistics: RunStatistics,
    pub actual_rate: f64,
}
