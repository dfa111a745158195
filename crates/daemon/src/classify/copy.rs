//! Output classifier for the stream-copy backend.

use super::{parse_timestamp, EtaTracker, OutputClassifier};
use crate::status::SharedJobStatus;
use regex::Regex;

/// Classifier for the remux-only copy backend.
///
/// A stream copy either works or the process exits non-zero; there is no
/// output marker worth trusting either way. The classifier starts optimistic
/// and only tracks progress from the `time=` field of the stats line.
pub struct CopyClassifier {
    status: SharedJobStatus,
    eta: EtaTracker,
    duration_secs: f64,
    time_re: Regex,
}

impl CopyClassifier {
    pub fn new(status: SharedJobStatus, duration_secs: f64) -> Self {
        Self {
            status,
            eta: EtaTracker::new(),
            duration_secs,
            time_re: Regex::new(r"time=(\d+:\d{2}:\d{2}(?:\.\d+)?)").expect("static regex"),
        }
    }
}

impl OutputClassifier for CopyClassifier {
    fn consume(&mut self, line: &str) {
        if let Some(cap) = self.time_re.captures(line) {
            if let Some(position) = parse_timestamp(&cap[1]) {
                if self.duration_secs > 0.0 {
                    let percent = ((position / self.duration_secs * 100.0) as f32).min(100.0);
                    let eta = self.eta.update(percent);
                    self.status.set_percentage(percent);
                    self.status.set_eta(eta);
                }
            }
        }
    }

    fn succeeded(&self) -> bool {
        true
    }

    fn note_suspended(&mut self, paused: std::time::Duration) {
        self.eta.exclude_suspended(paused);
    }
}
