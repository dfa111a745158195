//! Process supervision module for convertd
//!
//! Spawns one external encoder process per run, pumps its stdout and stderr
//! concurrently into the tool's output classifier, and enforces the runtime
//! policy: hang detection, cooperative suspend/resume, live scheduling
//! changes, and forced termination on cancellation. Both streams feed a
//! single consumer task, so the classifier sees one ordered line sequence
//! and status writes have exactly one writer.

use crate::classify::OutputClassifier;
use crate::params::split_args;
use crate::sched::{self, SharedScheduling};
use crate::status::SharedJobStatus;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Supervising loop tick.
const TICK: Duration = Duration::from_millis(100);

/// How long a process may linger after closing its streams before it is
/// declared hung on exit.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// How long to wait for trailing output lines after process exit.
const FLUSH_GRACE: Duration = Duration::from_secs(2);

/// Error type for supervision operations
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The executable does not exist; no process was spawned.
    #[error("Application not found: {0}")]
    ApplicationNotFound(PathBuf),

    /// The OS failed to spawn the process.
    #[error("Failed to launch process: {0}")]
    Launch(#[from] std::io::Error),
}

/// Lifecycle states of one supervised process.
///
/// `NotStarted -> Launching -> Running <-> Suspended` followed by exactly one
/// terminal state, then `Closed` once OS resources are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Launching,
    Running,
    Suspended,
    Succeeded,
    Failed,
    Hung,
    Cancelled,
    Closed,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Succeeded
                | ProcessState::Failed
                | ProcessState::Hung
                | ProcessState::Cancelled
        )
    }
}

/// Result of one supervised run.
#[derive(Debug)]
pub struct RunOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Terminal state reached before the process was closed.
    pub terminal: ProcessState,
}

impl RunOutcome {
    pub fn was_cancelled(&self) -> bool {
        self.terminal == ProcessState::Cancelled
    }

    pub fn was_hung(&self) -> bool {
        self.terminal == ProcessState::Hung
    }
}

/// Events flowing from the stream readers (and the tick loop) to the single
/// classifier consumer.
enum OutputEvent {
    Line(String),
    Resumed { suspended: Duration },
}

/// Supervises one external encoder process per `run` call.
pub struct ProcessSupervisor {
    status: SharedJobStatus,
    control: SharedScheduling,
}

impl ProcessSupervisor {
    pub fn new(status: SharedJobStatus, control: SharedScheduling) -> Self {
        Self { status, control }
    }

    /// Resolves an executable name or path to an existing file.
    ///
    /// Bare names are searched on PATH; anything with a path separator is
    /// checked as given.
    pub fn resolve_executable(executable: &str) -> Option<PathBuf> {
        let direct = Path::new(executable);
        if direct.components().count() > 1 || direct.is_absolute() {
            return direct.is_file().then(|| direct.to_path_buf());
        }

        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(executable))
            .find(|candidate| candidate.is_file())
    }

    /// Runs one process to completion under supervision.
    ///
    /// `hang_period_secs` of total output silence kills the process and
    /// reports a hang; 0 disables hang detection for tools that are silent
    /// for legitimately long stretches. `ignore_suspend` exempts short
    /// housekeeping processes (remux, delay fix) from the global pause.
    pub async fn run(
        &self,
        executable: &str,
        arg_string: &str,
        hang_period_secs: u64,
        ignore_suspend: bool,
        classifier: Box<dyn OutputClassifier + Send>,
    ) -> Result<RunOutcome, SupervisorError> {
        let exe = Self::resolve_executable(executable)
            .ok_or_else(|| SupervisorError::ApplicationNotFound(PathBuf::from(executable)))?;

        let mut state = ProcessState::Launching;
        debug!(executable = %exe.display(), args = arg_string, ?state, "launching encoder");

        let mut child = Command::new(&exe)
            .args(split_args(arg_string))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        state = ProcessState::Running;

        let last_activity = Arc::new(Mutex::new(Instant::now()));
        let (tx, rx) = mpsc::channel::<OutputEvent>(256);

        let stdout_task = spawn_line_reader(
            child.stdout.take().expect("stdout piped"),
            tx.clone(),
            last_activity.clone(),
        );
        let stderr_task = spawn_line_reader(
            child.stderr.take().expect("stderr piped"),
            tx.clone(),
            last_activity.clone(),
        );

        let unrecoverable = Arc::new(AtomicBool::new(false));
        let classifier_task = spawn_classifier(rx, classifier, unrecoverable.clone());

        let hang_period = Duration::from_secs(hang_period_secs);
        let mut interval = tokio::time::interval(TICK);
        let mut applied_generation: Option<u64> = None;
        let mut suspend_started: Option<Instant> = None;
        let mut streams_eof_at: Option<Instant> = None;
        let mut exit_status = None;
        // Terminal state decided inside the loop; None means a natural exit
        // to be judged from the exit status and the classifier's verdict.
        let terminal_early: Option<ProcessState>;

        loop {
            interval.tick().await;

            // Cancellation is terminal for the whole job: forced kill, no
            // graceful shutdown assumed possible for arbitrary encoders.
            if self.status.is_cancelled() {
                terminal_early = Some(ProcessState::Cancelled);
                self.status.set_error("conversion cancelled");
                break;
            }

            if unrecoverable.load(Ordering::SeqCst) {
                terminal_early = Some(ProcessState::Failed);
                break;
            }

            // Cooperative suspension of the OS process itself; the loop keeps
            // ticking so cancellation still works while suspended.
            if !ignore_suspend {
                let want_suspended = self.control.is_suspended();
                if want_suspended && state == ProcessState::Running {
                    if let Some(pid) = child.id() {
                        sched::suspend_process(pid);
                    }
                    state = ProcessState::Suspended;
                    suspend_started = Some(Instant::now());
                } else if !want_suspended && state == ProcessState::Suspended {
                    if let Some(pid) = child.id() {
                        sched::resume_process(pid);
                    }
                    state = ProcessState::Running;
                    if let Some(started) = suspend_started.take() {
                        let paused = started.elapsed();
                        // Freeze the hang clock across the pause and let the
                        // classifier subtract it from ETA bookkeeping.
                        *last_activity.lock().expect("activity lock poisoned") += paused;
                        let _ = tx.try_send(OutputEvent::Resumed { suspended: paused });
                    }
                }
            }

            // Hang budget, frozen while suspended.
            if state == ProcessState::Running && hang_period_secs > 0 {
                let idle = last_activity
                    .lock()
                    .expect("activity lock poisoned")
                    .elapsed();
                if idle > hang_period {
                    terminal_early = Some(ProcessState::Hung);
                    self.status.set_error("process hung");
                    warn!(
                        executable = %exe.display(),
                        idle_secs = idle.as_secs(),
                        "no output within hang budget, killing process"
                    );
                    break;
                }
            }

            // Re-apply scheduling settings when they change (and once at
            // startup).
            let generation = self.control.generation();
            if applied_generation != Some(generation) {
                if let Some(pid) = child.id() {
                    sched::apply_to_process(pid, &self.control.config());
                }
                applied_generation = Some(generation);
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    exit_status = Some(status);
                    terminal_early = None;
                    break;
                }
                Ok(None) => {
                    // Streams closed but the process lingers: give it a grace
                    // window, then declare it hung on exit.
                    if stdout_task.is_finished() && stderr_task.is_finished() {
                        let eof_at = *streams_eof_at.get_or_insert_with(Instant::now);
                        if eof_at.elapsed() > EXIT_GRACE {
                            terminal_early = Some(ProcessState::Hung);
                            self.status.set_error("process hung on exit");
                            break;
                        }
                    }
                }
                Err(e) => {
                    terminal_early = Some(ProcessState::Failed);
                    self.status.set_error(format!("wait failed: {}", e));
                    break;
                }
            }
        }

        // Kill paths: everything except a natural exit.
        if exit_status.is_none() {
            let _ = child.kill().await;
        }
        let final_status = match exit_status {
            Some(status) => Some(status),
            None => child.wait().await.ok(),
        };
        let exit_code = final_status.and_then(|s| s.code());

        // Flush trailing output before judging the classifier's verdict.
        drop(tx);
        let classifier = match tokio::time::timeout(FLUSH_GRACE, classifier_task).await {
            Ok(Ok(classifier)) => Some(classifier),
            _ => None,
        };
        stdout_task.abort();
        stderr_task.abort();

        let terminal = match terminal_early {
            Some(terminal) => terminal,
            None => {
                // Natural exit: the exit status and the tool's own output
                // decide.
                let exited_ok = final_status.map(|s| s.success()).unwrap_or(false);
                let tool_ok = classifier.as_ref().map(|c| c.succeeded()).unwrap_or(false);
                if exited_ok && tool_ok {
                    ProcessState::Succeeded
                } else {
                    if !exited_ok {
                        self.status.set_error(format!(
                            "{} exited with status {}",
                            exe.display(),
                            exit_code.map_or("unknown".to_string(), |c| c.to_string())
                        ));
                    } else if self.status.snapshot().error_msg.is_empty() {
                        self.status.set_error(format!(
                            "{} reported no success confirmation",
                            exe.display()
                        ));
                    }
                    ProcessState::Failed
                }
            }
        };

        debug!(executable = %exe.display(), ?terminal, exit_code, "encoder closed");

        // The child handle drops here: terminal -> Closed, resources released.
        Ok(RunOutcome {
            success: terminal == ProcessState::Succeeded,
            exit_code,
            terminal,
        })
    }
}

fn spawn_line_reader<R>(
    stream: R,
    tx: mpsc::Sender<OutputEvent>,
    last_activity: Arc<Mutex<Instant>>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            *last_activity.lock().expect("activity lock poisoned") = Instant::now();
            if tx.send(OutputEvent::Line(line)).await.is_err() {
                break;
            }
        }
    })
}

fn spawn_classifier(
    mut rx: mpsc::Receiver<OutputEvent>,
    mut classifier: Box<dyn OutputClassifier + Send>,
    unrecoverable: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<Box<dyn OutputClassifier + Send>> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                OutputEvent::Line(line) => {
                    classifier.consume(&line);
                    if classifier.failed_unrecoverably() {
                        unrecoverable.store(true, Ordering::SeqCst);
                    }
                }
                OutputEvent::Resumed { suspended } => {
                    classifier.note_suspended(suspended);
                }
            }
        }
        classifier
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::classify::{CopyClassifier, FfmpegClassifier, MencoderClassifier};
    use crate::sched::SchedulingControl;
    use crate::status::new_shared_status;
    use convertd_config::SchedulingConfig;

    fn supervisor() -> (ProcessSupervisor, SharedJobStatus) {
        let status = new_shared_status();
        let control = SchedulingControl::new(SchedulingConfig::default());
        (ProcessSupervisor::new(status.clone(), control), status)
    }

    #[tokio::test]
    async fn test_missing_executable_fails_before_spawn() {
        let (supervisor, status) = supervisor();
        let classifier = Box::new(CopyClassifier::new(status, 0.0));

        let err = supervisor
            .run("/no/such/encoder-binary", "-i in.ts", 0, false, classifier)
            .await
            .expect_err("should not spawn");

        assert!(matches!(err, SupervisorError::ApplicationNotFound(_)));
    }

    #[tokio::test]
    async fn test_successful_run_with_optimistic_classifier() {
        let (supervisor, status) = supervisor();
        let classifier = Box::new(CopyClassifier::new(status.clone(), 0.0));

        let outcome = supervisor
            .run("sh", "-c \"echo copying; exit 0\"", 10, false, classifier)
            .await
            .expect("run");

        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.terminal, ProcessState::Succeeded);
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let (supervisor, status) = supervisor();
        let classifier = Box::new(CopyClassifier::new(status.clone(), 0.0));

        let outcome = supervisor
            .run("sh", "-c \"exit 3\"", 10, false, classifier)
            .await
            .expect("run");

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.terminal, ProcessState::Failed);
        assert!(status.snapshot().error_msg.contains("exited with status 3"));
    }

    #[tokio::test]
    async fn test_pessimistic_classifier_needs_marker() {
        let (supervisor, status) = supervisor();

        // Clean exit but no completion line: the pessimistic default wins.
        let classifier = Box::new(MencoderClassifier::new(status.clone()));
        let outcome = supervisor
            .run("sh", "-c \"echo encoding; exit 0\"", 10, false, classifier)
            .await
            .expect("run");
        assert!(!outcome.success);

        // Same exit with the completion line: success.
        let classifier = Box::new(MencoderClassifier::new(status.clone()));
        let outcome = supervisor
            .run(
                "sh",
                "-c \"echo 'Video stream: 1800.000 kbit/s  size: 1000 bytes'; exit 0\"",
                10,
                false,
                classifier,
            )
            .await
            .expect("run");
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_classifier_sees_progress_lines() {
        let (supervisor, status) = supervisor();
        let classifier = Box::new(FfmpegClassifier::new(status.clone(), 600.0));

        let outcome = supervisor
            .run(
                "sh",
                "-c \"echo 'time=00:05:00.00 bitrate=1000kbits/s'; exit 0\"",
                10,
                false,
                classifier,
            )
            .await
            .expect("run");

        assert!(outcome.success);
        assert!((status.snapshot().percentage_complete - 50.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_silent_process_hangs() {
        let (supervisor, status) = supervisor();
        let classifier = Box::new(CopyClassifier::new(status.clone(), 0.0));

        let started = Instant::now();
        let outcome = supervisor
            .run("sh", "-c \"sleep 30\"", 1, false, classifier)
            .await
            .expect("run");

        assert!(!outcome.success);
        assert!(outcome.was_hung());
        assert_eq!(status.snapshot().error_msg, "process hung");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_hang_detection_disabled_with_zero_period() {
        let (supervisor, status) = supervisor();
        let classifier = Box::new(CopyClassifier::new(status.clone(), 0.0));

        // Silent for 2s with hang detection off: must complete normally.
        let outcome = supervisor
            .run("sh", "-c \"sleep 2\"", 0, false, classifier)
            .await
            .expect("run");

        assert!(outcome.success);
        assert!(!outcome.was_hung());
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let (supervisor, status) = supervisor();
        let classifier = Box::new(CopyClassifier::new(status.clone(), 0.0));

        let canceller = status.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let outcome = supervisor
            .run("sh", "-c \"sleep 30\"", 0, false, classifier)
            .await
            .expect("run");

        assert!(!outcome.success);
        assert!(outcome.was_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_unrecoverable_marker_kills_process() {
        let (supervisor, status) = supervisor();
        let classifier = Box::new(FfmpegClassifier::new(status.clone(), 600.0));

        let started = Instant::now();
        let outcome = supervisor
            .run(
                "sh",
                "-c \"echo 'Unknown encoder libx265'; sleep 30\"",
                0,
                false,
                classifier,
            )
            .await
            .expect("run");

        assert!(!outcome.success);
        assert_eq!(outcome.terminal, ProcessState::Failed);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_resolve_executable() {
        assert!(ProcessSupervisor::resolve_executable("sh").is_some());
        assert!(ProcessSupervisor::resolve_executable("definitely-not-a-binary-xyz").is_none());
        assert!(ProcessSupervisor::resolve_executable("/no/such/dir/binary").is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProcessState::Succeeded.is_terminal());
        assert!(ProcessState::Failed.is_terminal());
        assert!(ProcessState::Hung.is_terminal());
        assert!(ProcessState::Cancelled.is_terminal());
        assert!(!ProcessState::Running.is_terminal());
        assert!(!ProcessState::Suspended.is_terminal());
        assert!(!ProcessState::Closed.is_terminal());
    }
}
