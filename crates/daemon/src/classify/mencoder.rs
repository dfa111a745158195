//! Output classifier for the mencoder backend.

use super::{EtaTracker, OutputClassifier};
use crate::status::SharedJobStatus;
use regex::Regex;

const FAILURE_MARKERS: &[&str] = &["FATAL:", "Cannot open file", "Exiting... (Fatal error)"];

const UNRECOVERABLE_MARKERS: &[&str] = &["Cannot find codec", "Unknown video codec"];

/// Classifier for mencoder console output.
///
/// mencoder prints an explicit `Video stream:` summary line only when it
/// finishes writing the output, so this classifier starts pessimistic:
/// nothing short of that line counts as success. Progress comes from the
/// percentage in the periodic position line, e.g. `Pos: 123.4s  3702f (12%)`.
/// In a two-pass run the percentage restarts at 0 for the second pass; the
/// ETA tracker's regression restart absorbs that.
pub struct MencoderClassifier {
    status: SharedJobStatus,
    eta: EtaTracker,
    percent_re: Regex,
    success: bool,
    unrecoverable: bool,
}

impl MencoderClassifier {
    pub fn new(status: SharedJobStatus) -> Self {
        Self {
            status,
            eta: EtaTracker::new(),
            percent_re: Regex::new(r"\(\s*(\d+)%\)").expect("static regex"),
            success: false,
            unrecoverable: false,
        }
    }
}

impl OutputClassifier for MencoderClassifier {
    fn consume(&mut self, line: &str) {
        if let Some(cap) = self.percent_re.captures(line) {
            if let Ok(percent) = cap[1].parse::<f32>() {
                let eta = self.eta.update(percent);
                self.status.set_percentage(percent);
                self.status.set_eta(eta);
            }
            return;
        }

        if line.starts_with("Video stream:") {
            self.success = true;
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
    fn test_pessimistic_by_default() {
        let status = new_shared_status();
        let classifier = MencoderClassifier::new(status);
        assert!(!classifier.succeeded());
    }

    #[test]
    fn test_progress_from_position_line() {
        let status = new_shared_status();
        let mut classifier = MencoderClassifier::new(status.clone());

        classifier.consume("Pos: 123.4s   3702f (12%) 24.50fps Trem: 10min 150mb  A-V:0.012");
        assert!((status.snapshot().percentage_complete - 12.0).abs() < f32::EPSILON);
        assert!(!classifier.succeeded());
    }

    #[test]
    fn test_video_stream_line_marks_success() {
        let status = new_shared_status();
        let mut classifier = MencoderClassifier::new(status);

        classifier.consume("Pos: 1800.0s  54000f (100%) 30.00fps Trem: 0min 700mb  A-V:0.004");
        assert!(!classifier.succeeded());

        classifier.consume(
            "Video stream: 1800.000 kbit/s  (225000 B/s)  size: 405000000 bytes  1800.000 secs",
        );
        assert!(classifier.succeeded());
    }

    #[test]
    fn test_fatal_marker_keeps_failure() {
        let status = new_shared_status();
        let mut classifier = MencoderClassifier::new(status.clone());

        classifier.consume("FATAL: cannot allocate video buffer");
        assert!(!classifier.succeeded());
        assert!(!classifier.failed_unrecoverably());
        assert_eq!(
            status.snapshot().error_msg,
            "FATAL: cannot allocate video buffer"
        );
    }

    #[test]
    fn test_failure_after_success_sticks() {
        let status = new_shared_status();
        let mut classifier = MencoderClassifier::new(status);

        classifier.consume("Video stream: 1800.000 kbit/s  (225000 B/s)  size: 405000000 bytes");
        classifier.consume("FATAL: error writing index");
        assert!(!classifier.succeeded());
    }

    #[test]
    fn test_unknown_codec_is_unrecoverable() {
        let status = new_shared_status();
        let mut classifier = MencoderClassifier::new(status);

        classifier.consume("Cannot find codec matching selected -vo and video format");
        assert!(classifier.failed_unrecoverably());
    }

    #[test]
    fn test_second_pass_percent_regression_accepted() {
        let status = new_shared_status();
        let mut classifier = MencoderClassifier::new(status.clone());

        classifier.consume("Pos: 1800.0s  54000f (99%) 30.00fps Trem: 0min 700mb");
        assert!((status.snapshot().percentage_complete - 99.0).abs() < f32::EPSILON);

        // Second pass starts: percent drops back to low single digits.
        classifier.consume("Pos: 18.0s  540f ( 1%) 30.00fps Trem: 30min 700mb");
        assert!((status.snapshot().percentage_complete - 1.0).abs() < f32::EPSILON);
    }
}
