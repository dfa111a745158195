//! Output classifier for the ffmpeg backend.

use super::{parse_timestamp, EtaTracker, OutputClassifier};
use crate::status::SharedJobStatus;
use regex::Regex;

/// Substrings that mean the conversion has definitively failed.
const FAILURE_MARKERS: &[&str] = &[
    "Conversion failed!",
    "Invalid data found when processing input",
    "Error while decoding stream",
    "could not open",
];

/// Substrings after which letting the process run cannot help.
const UNRECOVERABLE_MARKERS: &[&str] = &[
    "Unknown encoder",
    "Unrecognized option",
    "Error initializing output stream",
];

/// Classifier for ffmpeg console output.
///
/// ffmpeg prints no reliable positive completion marker, so this classifier
/// starts optimistic: success unless an explicit failure marker appears.
/// Progress comes from the `time=` field of the periodic stats line measured
/// against the known source duration.
pub struct FfmpegClassifier {
    status: SharedJobStatus,
    eta: EtaTracker,
    duration_secs: f64,
    time_re: Regex,
    success: bool,
    unrecoverable: bool,
}

impl FfmpegClassifier {
    pub fn new(status: SharedJobStatus, duration_secs: f64) -> Self {
        Self {
            status,
            eta: EtaTracker::new(),
            duration_secs,
            time_re: Regex::new(r"time=(\d+:\d{2}:\d{2}(?:\.\d+)?)").expect("static regex"),
            success: true,
            unrecoverable: false,
        }
    }
}

impl OutputClassifier for FfmpegClassifier {
    fn consume(&mut self, line: &str) {
        if let Some(cap) = self.time_re.captures(line) {
            if let Some(position) = parse_timestamp(&cap[1]) {
                if self.duration_secs > 0.0 {
                    let percent = (position / self.duration_secs * 100.0) as f32;
                    let percent = percent.min(100.0);
                    let eta = self.eta.update(percent);
                    self.status.set_percentage(percent);
                    self.status.set_eta(eta);
                }
            }
            return;
        }

        for marker in UNRECOVERABLE_MARKERS {
            if line.contains(marker) {
                self.success = false;
                self.unrecoverable = true;
                self.status.set_error(line.trim());
                return;
            }
        }

        for marker in FAILURE_MARKERS {
            if line.contains(marker) {
                self.success = false;
                self.status.set_error(line.trim());
                return;
            }
        }
    }

    fn succeeded(&self) -> bool {
        self.success
    }

    fn failed_unrecoverably(&self) -> bool {
        self.unrecoverable
    }

    fn note_suspended(&mut self, paused: std::time::Duration) {
        self.eta.exclude_suspended(paused);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::new_shared_status;

    #[test]
    fn test_optimistic_by_default() {
        let status = new_shared_status();
        let classifier = FfmpegClassifier::new(status, 600.0);
        assert!(classifier.succeeded());
        assert!(!classifier.failed_unrecoverably());
    }

    #[test]
    fn test_progress_from_time_field() {
        let status = new_shared_status();
        let mut classifier = FfmpegClassifier::new(status.clone(), 600.0);

        classifier.consume(
            "frame= 7200 fps=240 q=28.0 size=   20480kB time=00:05:00.00 bitrate= 559.2kbits/s",
        );

        let view = status.snapshot();
        assert!((view.percentage_complete - 50.0).abs() < 0.01);
        assert!(!view.eta.is_empty());
        assert!(classifier.succeeded());
    }

    #[test]
    fn test_progress_clamped_past_duration() {
        let status = new_shared_status();
        let mut classifier = FfmpegClassifier::new(status.clone(), 100.0);

        classifier.consume("time=00:02:30.00 bitrate=1000kbits/s");
        assert!((status.snapshot().percentage_complete - 100.0).abs() < f32::EPSILON);
        assert!(classifier.succeeded());
    }

    #[test]
    fn test_failure_marker_flips_success() {
        let status = new_shared_status();
        let mut classifier = FfmpegClassifier::new(status.clone(), 600.0);

        classifier.consume("time=00:01:00.00 bitrate=1000kbits/s");
        assert!(classifier.succeeded());

        classifier.consume("Conversion failed!");
        assert!(!classifier.succeeded());
        assert!(!classifier.failed_unrecoverably());
        assert_eq!(status.snapshot().error_msg, "Conversion failed!");
    }

    #[test]
    fn test_unrecoverable_marker() {
        let status = new_shared_status();
        let mut classifier = FfmpegClassifier::new(status, 600.0);

        classifier.consume("Unknown encoder 'libx265'");
        assert!(!classifier.succeeded());
        assert!(classifier.failed_unrecoverably());
    }

    #[test]
    fn test_zero_duration_reports_no_progress() {
        let status = new_shared_status();
        let mut classifier = FfmpegClassifier::new(status.clone(), 0.0);

        classifier.consume("time=00:01:00.00 bitrate=1000kbits/s");
        assert!((status.snapshot().percentage_complete - 0.0).abs() < f32::EPSILON);
    }
}
