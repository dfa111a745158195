//! Output classification module for convertd
//!
//! Each wrapped tool gets a stateful classifier that turns raw console lines
//! into progress, ETA, and success/failure signals. Classifiers differ in
//! their progress markers, their success/failure markers, and their default
//! success polarity: tools that print a definitive completion line start
//! pessimistic (success only once seen), tools with no reliable positive
//! output start optimistic (success unless an explicit negative shows up).
//! That polarity is part of each tool's behavioral contract, not a style
//! choice.

mod copy;
mod ffmpeg;
mod handbrake;
mod mencoder;

pub use copy::CopyClassifier;
pub use ffmpeg::FfmpegClassifier;
pub use handbrake::HandbrakeClassifier;
pub use mencoder::MencoderClassifier;

use std::time::{Duration, Instant};

/// Stateful parser for one tool's console output.
///
/// `consume` is fed complete lines from both stdout and stderr by a single
/// consumer task; side effects land on the job's shared status record.
pub trait OutputClassifier: Send {
    /// Process one output line.
    fn consume(&mut self, line: &str);

    /// Whether the tool has (so far) converted successfully, per this tool's
    /// polarity rules. Evaluated after process exit.
    fn succeeded(&self) -> bool;

    /// Whether the tool reported a condition that cannot be recovered by
    /// letting it run; the supervisor kills the process when this turns true.
    fn failed_unrecoverably(&self) -> bool {
        false
    }

    /// Called after the process resumes from suspension so time spent
    /// suspended is excluded from ETA bookkeeping.
    fn note_suspended(&mut self, _paused: Duration) {}
}

/// Shared ETA bookkeeping: `eta = elapsed * (100/percent - 1)`.
///
/// The elapsed baseline restarts whenever the observed percentage regresses,
/// which is how tools running multiple internal passes (percent resets to 0
/// at a pass boundary) are kept from producing absurd estimates. The
/// heuristic assumes percent is monotonic within a pass and is deliberately
/// not made any smarter than that.
#[derive(Debug)]
pub struct EtaTracker {
    started: Instant,
    last_percent: f32,
}

impl EtaTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_percent: 0.0,
        }
    }

    /// Records a progress observation and returns the formatted ETA.
    pub fn update(&mut self, percent: f32) -> String {
        if percent + 1.0 < self.last_percent {
            // Pass boundary: restart the elapsed baseline.
            self.started = Instant::now();
        }
        self.last_percent = percent;

        let elapsed = self.started.elapsed().as_secs_f64();
        match eta_seconds(elapsed, percent) {
            Some(secs) => format_eta(secs),
            None => String::new(),
        }
    }

    /// Shifts the baseline forward by time the process spent suspended, so
    /// suspension does not inflate the estimate.
    pub fn exclude_suspended(&mut self, suspended: Duration) {
        self.started += suspended;
    }

    #[cfg(test)]
    fn backdate(&mut self, secs: u64) {
        if let Some(earlier) = self.started.checked_sub(Duration::from_secs(secs)) {
            self.started = earlier;
        }
    }
}

impl Default for EtaTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Remaining seconds given elapsed time and completion percentage.
pub fn eta_seconds(elapsed_secs: f64, percent: f32) -> Option<f64> {
    if percent <= 0.5 || percent > 100.0 {
        return None;
    }
    Some(elapsed_secs * (100.0 / percent as f64 - 1.0))
}

/// Formats seconds as "HH:MM:SS".
pub fn format_eta(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Parses "HH:MM:SS.ss" to seconds; used by the classifiers that report
/// position as a timestamp.
pub fn parse_timestamp(ts: &str) -> Option<f64> {
    let mut parts = ts.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_eta_seconds_formula() {
        // Halfway in 600s means 600s left.
        let eta = eta_seconds(600.0, 50.0).expect("eta");
        assert!((eta - 600.0).abs() < 0.001);

        // 25% in 300s means 900s left.
        let eta = eta_seconds(300.0, 25.0).expect("eta");
        assert!((eta - 900.0).abs() < 0.001);

        assert!(eta_seconds(100.0, 0.0).is_none());
        assert!(eta_seconds(100.0, 120.0).is_none());
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(0.0), "00:00:00");
        assert_eq!(format_eta(61.0), "00:01:01");
        assert_eq!(format_eta(3725.0), "01:02:05");
        assert_eq!(format_eta(-5.0), "00:00:00");
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("00:00:33.36"), Some(33.36));
        assert_eq!(parse_timestamp("01:30:00"), Some(5400.0));
        assert_eq!(parse_timestamp("90"), None);
        assert_eq!(parse_timestamp("aa:bb:cc"), None);
    }

    #[test]
    fn test_eta_tracker_regression_restarts_baseline() {
        let mut tracker = EtaTracker::new();
        tracker.backdate(600);

        // 50% after 600s: about 600s remain.
        let eta = tracker.update(50.0);
        assert_eq!(eta, "00:10:00");

        // Percent regressed to 2%: second pass started, baseline restarts,
        // so the estimate is computed from a near-zero elapsed time.
        let eta = tracker.update(2.0);
        let parts: Vec<u64> = eta.split(':').map(|p| p.parse().unwrap()).collect();
        let secs = parts[0] * 3600 + parts[1] * 60 + parts[2];
        assert!(secs < 60, "regression should restart the baseline, eta={}", eta);
    }

    #[test]
    fn test_eta_tracker_small_jitter_keeps_baseline() {
        let mut tracker = EtaTracker::new();
        tracker.backdate(100);

        tracker.update(50.0);
        // A sub-1% wobble is not a pass boundary.
        let eta = tracker.update(49.5);
        assert_ne!(eta, "");
        let parts: Vec<u64> = eta.split(':').map(|p| p.parse().unwrap()).collect();
        let secs = parts[0] * 3600 + parts[1] * 60 + parts[2];
        assert!(secs >= 90, "baseline should be kept, eta={}", eta);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // ETA is never negative and always finite for valid inputs.
        #[test]
        fn prop_eta_nonnegative(elapsed in 0.0f64..100_000.0, percent in 0.0f32..110.0) {
            if let Some(eta) = eta_seconds(elapsed, percent) {
                prop_assert!(eta.is_finite());
                prop_assert!(eta >= 0.0);
            }
        }
    }
}
