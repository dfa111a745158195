//! Output classifier for the HandBrakeCLI backend.

use super::{EtaTracker, OutputClassifier};
use crate::status::SharedJobStatus;
use regex::Regex;

const SUCCESS_MARKERS: &[&str] = &["Encode done!", "Finished work at"];

const FAILURE_MARKERS: &[&str] = &["No title found", "unable to open", "Encode failed"];

/// Classifier for HandBrakeCLI console output.
///
/// HandBrake prints `Encode done!` on completion, so this classifier starts
/// pessimistic. Progress lines look like `Encoding: task 1 of 2, 45.23 %`;
/// a two-pass encode reports two tasks, and the overall percentage spreads
/// the tasks evenly across 0-100.
pub struct HandbrakeClassifier {
    status: SharedJobStatus,
    eta: EtaTracker,
    encoding_re: Regex,
    success: bool,
}

impl HandbrakeClassifier {
    pub fn new(status: SharedJobStatus) -> Self {
        Self {
            status,
            eta: EtaTracker::new(),
            encoding_re: Regex::new(r"Encoding: task (\d+) of (\d+), ([0-9.]+) %")
                .expect("static regex"),
            success: false,
        }
    }
}

impl OutputClassifier for HandbrakeClassifier {
    fn consume(&mut self, line: &str) {
        if let Some(cap) = self.encoding_re.captures(line) {
            let task: f32 = cap[1].parse().unwrap_or(1.0);
            let total: f32 = cap[2].parse::<f32>().unwrap_or(1.0).max(1.0);
            let task_percent: f32 = cap[3].parse().unwrap_or(0.0);

            let percent = ((task - 1.0) * 100.0 + task_percent) / total;
            let eta = self.eta.update(percent);
            self.status.set_percentage(percent);
            self.status.set_eta(eta);
            return;
        }

        for marker in SUCCESS_MARKERS {
            if line.contains(marker) {
                self.success = true;
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
        let classifier = HandbrakeClassifier::new(status);
        assert!(!classifier.succeeded());
    }

    #[test]
    fn test_single_task_progress() {
        let status = new_shared_status();
        let mut classifier = HandbrakeClassifier::new(status.clone());

        classifier.consume("Encoding: task 1 of 1, 45.23 %");
        assert!((status.snapshot().percentage_complete - 45.23).abs() < 0.01);
    }

    #[test]
    fn test_two_pass_task_progress_spreads() {
        let status = new_shared_status();
        let mut classifier = HandbrakeClassifier::new(status.clone());

        classifier.consume("Encoding: task 1 of 2, 50.00 %");
        assert!((status.snapshot().percentage_complete - 25.0).abs() < 0.01);

        classifier.consume("Encoding: task 2 of 2, 50.00 %");
        assert!((status.snapshot().percentage_complete - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_encode_done_marks_success() {
        let status = new_shared_status();
        let mut classifier = HandbrakeClassifier::new(status);

        classifier.consume("Encoding: task 1 of 1, 100.00 %");
        assert!(!classifier.succeeded());

        classifier.consume("Encode done!");
        assert!(classifier.succeeded());
    }

    #[test]
    fn test_failure_marker() {
        let status = new_shared_status();
        let mut classifier = HandbrakeClassifier::new(status.clone());

        classifier.consume("No title found. Invalid input file?");
        assert!(!classifier.succeeded());
        assert!(!status.snapshot().error_msg.is_empty());
    }
}
