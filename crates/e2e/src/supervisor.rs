//! Supervised child processes
//!
//! [`Escalation`] is the host-independent timeout policy: a running process
//! gets a graceful terminate at the first deadline and a forced kill at the
//! second. [`SupervisedProcess`] applies it to a tokio child while streaming
//! its output line by line.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Lines kept for diagnosis of a failed or timed out process
pub const OUTPUT_TAIL_LINES: usize = 50;

/// Hard cap on captured output lines per process
const MAX_CAPTURED_LINES: usize = 20_000;

/// How long to keep reading pipes after the process has exited
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionState {
    Running,
    Terminating,
    Killed,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationAction {
    None,
    Terminate,
    Kill,
}

/// Why the supervisor stopped a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Timeout,
    Cancelled,
}

/// Two-deadline stop policy, measured from process start
#[derive(Debug, Clone)]
pub struct Escalation {
    state: SupervisionState,
    graceful_deadline: Duration,
    forceful_deadline: Duration,
    grace: Duration,
    reason: Option<TerminationReason>,
}

impl Escalation {
    pub fn new(timeout: Duration, grace: Duration) -> Self {
        Self {
            state: SupervisionState::Running,
            graceful_deadline: timeout,
            forceful_deadline: timeout + grace,
            grace,
            reason: None,
        }
    }

    pub fn state(&self) -> SupervisionState {
        self.state
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        self.reason
    }

    /// True once a terminate or kill has been issued
    pub fn is_stopping(&self) -> bool {
        matches!(
            self.state,
            SupervisionState::Terminating | SupervisionState::Killed
        )
    }

    /// The next instant (relative to start) at which `poll` may act
    pub fn next_deadline(&self) -> Option<Duration> {
        match self.state {
            SupervisionState::Running => Some(self.graceful_deadline),
            SupervisionState::Terminating => Some(self.forceful_deadline),
            SupervisionState::Killed | SupervisionState::Exited => None,
        }
    }

    /// Advance the policy to `elapsed` and return what to do
    pub fn poll(&mut self, elapsed: Duration) -> EscalationAction {
        match self.state {
            SupervisionState::Running if elapsed >= self.graceful_deadline => {
                self.state = SupervisionState::Terminating;
                self.reason.get_or_insert(TerminationReason::Timeout);
                if elapsed >= self.forceful_deadline {
                    self.state = SupervisionState::Killed;
                    EscalationAction::Kill
                } else {
                    EscalationAction::Terminate
                }
            }
            SupervisionState::Terminating if elapsed >= self.forceful_deadline => {
                self.state = SupervisionState::Killed;
                EscalationAction::Kill
            }
            _ => EscalationAction::None,
        }
    }

    /// Stop on request rather than on the clock
    pub fn request_termination(&mut self, elapsed: Duration) -> EscalationAction {
        if self.state != SupervisionState::Running {
            return EscalationAction::None;
        }
        self.state = SupervisionState::Terminating;
        self.reason = Some(TerminationReason::Cancelled);
        self.forceful_deadline = elapsed + self.grace;
        EscalationAction::Terminate
    }

    pub fn mark_exited(&mut self) {
        self.state = SupervisionState::Exited;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Time budget for one supervised process
#[derive(Debug, Clone, Copy)]
pub struct SupervisionLimits {
    pub timeout: Duration,
    pub grace: Duration,
}

/// What happened to a supervised process
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub termination: Option<TerminationReason>,
    pub final_state: SupervisionState,
    pub output: Vec<String>,
    pub tail: Vec<String>,
    pub duration: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.termination.is_none() && self.exit_code == Some(0)
    }

    pub fn timed_out(&self) -> bool {
        self.termination == Some(TerminationReason::Timeout)
    }
}

/// Runs one child process under an [`Escalation`] policy
pub struct SupervisedProcess;

impl SupervisedProcess {
    /// Spawn `command` and supervise it to completion.
    ///
    /// `on_line` sees every stdout/stderr line as it arrives. The process is
    /// placed in its own process group so that signals reach the browsers it
    /// spawns.
    pub async fn run<F>(
        mut command: Command,
        limits: SupervisionLimits,
        cancel: CancellationToken,
        mut on_line: F,
    ) -> E2eResult<ProcessOutcome>
    where
        F: FnMut(&OutputLine),
    {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let start = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| E2eError::Supervision(format!("spawn failed: {}", e)))?;
        let pid = child.id();
        debug!("Supervising pid {:?}", pid);

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, OutputStream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, OutputStream::Stderr, tx.clone());
        }
        drop(tx);

        let mut escalation = Escalation::new(limits.timeout, limits.grace);
        let mut capture = Capture::default();
        let mut lines_open = true;

        let status = loop {
            let deadline = escalation.next_deadline().map(|d| start + d);
            let wake = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at.into()).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|e| E2eError::Supervision(format!("wait failed: {}", e)))?;
                }
                line = rx.recv(), if lines_open => match line {
                    Some(line) => {
                        on_line(&line);
                        capture.push(line.text);
                    }
                    None => lines_open = false,
                },
                _ = wake => {
                    let action = escalation.poll(start.elapsed());
                    apply(action, &mut child, pid);
                }
                _ = cancel.cancelled(), if !escalation.is_stopping() => {
                    info!("Cancellation requested, terminating pid {:?}", pid);
                    let action = escalation.request_termination(start.elapsed());
                    apply(action, &mut child, pid);
                }
            }
        };
        let final_state = escalation.state();
        escalation.mark_exited();

        // Grandchildren can keep the pipes open after the direct child exits.
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(line) = rx.recv().await {
                on_line(&line);
                capture.push(line.text);
            }
        })
        .await;
        if drained.is_err() {
            warn!("Output pipes still open {:?} after exit, giving up", DRAIN_TIMEOUT);
        }

        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Ok(ProcessOutcome {
            exit_code: status.code(),
            signal,
            termination: escalation.reason(),
            final_state,
            tail: capture.tail.into_iter().collect(),
            output: capture.lines,
            duration: start.elapsed(),
        })
    }
}

#[derive(Default)]
struct Capture {
    lines: Vec<String>,
    tail: VecDeque<String>,
}

impl Capture {
    fn push(&mut self, line: String) {
        if self.tail.len() == OUTPUT_TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.clone());
        if self.lines.len() < MAX_CAPTURED_LINES {
            self.lines.push(line);
        }
    }
}

fn spawn_reader<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(text)) = lines.next_line().await {
            if tx.send(OutputLine { stream, text }).is_err() {
                break;
            }
        }
    });
}

fn apply(action: EscalationAction, child: &mut Child, pid: Option<u32>) {
    match action {
        EscalationAction::None => {}
        EscalationAction::Terminate => {
            warn!("Sending terminate to pid {:?}", pid);
            terminate(child, pid);
        }
        EscalationAction::Kill => {
            warn!("Grace period expired, killing pid {:?}", pid);
            #[cfg(unix)]
            if let Some(pid) = pid {
                use nix::sys::signal::{killpg, Signal};
                use nix::unistd::Pid;
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
            let _ = child.start_kill();
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child, pid: Option<u32>) {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    match pid {
        Some(pid) => {
            let pid = Pid::from_raw(pid as i32);
            if killpg(pid, Signal::SIGTERM).is_err() {
                let _ = kill(pid, Signal::SIGTERM);
            }
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _pid: Option<u32>) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn test_escalation_sequence() {
        let mut esc = Escalation::new(10 * SEC, 5 * SEC);
        assert_eq!(esc.next_deadline(), Some(10 * SEC));
        assert_eq!(esc.poll(9 * SEC), EscalationAction::None);
        assert_eq!(esc.state(), SupervisionState::Running);

        assert_eq!(esc.poll(10 * SEC), EscalationAction::Terminate);
        assert_eq!(esc.state(), SupervisionState::Terminating);
        assert_eq!(esc.reason(), Some(TerminationReason::Timeout));
        assert_eq!(esc.next_deadline(), Some(15 * SEC));

        assert_eq!(esc.poll(12 * SEC), EscalationAction::None);
        assert_eq!(esc.poll(15 * SEC), EscalationAction::Kill);
        assert_eq!(esc.state(), SupervisionState::Killed);
        assert_eq!(esc.next_deadline(), None);
        assert_eq!(esc.poll(100 * SEC), EscalationAction::None);
    }

    #[test]
    fn test_escalation_late_poll_kills_directly() {
        let mut esc = Escalation::new(10 * SEC, 5 * SEC);
        assert_eq!(esc.poll(20 * SEC), EscalationAction::Kill);
        assert_eq!(esc.reason(), Some(TerminationReason::Timeout));
    }

    #[test]
    fn test_cancellation_restarts_grace_window() {
        let mut esc = Escalation::new(60 * SEC, 5 * SEC);
        assert_eq!(esc.request_termination(2 * SEC), EscalationAction::Terminate);
        assert_eq!(esc.reason(), Some(TerminationReason::Cancelled));
        assert_eq!(esc.next_deadline(), Some(7 * SEC));
        assert_eq!(esc.request_termination(3 * SEC), EscalationAction::None);
        assert_eq!(esc.poll(7 * SEC), EscalationAction::Kill);
    }

    #[test]
    fn test_capture_keeps_bounded_tail() {
        let mut capture = Capture::default();
        for i in 0..(OUTPUT_TAIL_LINES + 10) {
            capture.push(format!("line {}", i));
        }
        assert_eq!(capture.tail.len(), OUTPUT_TAIL_LINES);
        assert_eq!(capture.tail.front().map(String::as_str), Some("line 10"));
        assert_eq!(capture.lines.len(), OUTPUT_TAIL_LINES + 10);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_collects_output_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo one; echo two >&2; exit 3"]);
        let mut seen = Vec::new();
        let outcome = SupervisedProcess::run(
            cmd,
            SupervisionLimits {
                timeout: 10 * SEC,
                grace: SEC,
            },
            CancellationToken::new(),
            |line| seen.push(line.text.clone()),
        )
        .await
        .unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success());
        assert!(!outcome.timed_out());
        seen.sort();
        assert_eq!(seen, vec!["one".to_string(), "two".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_escalates_to_kill_when_term_ignored() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "trap '' TERM; echo ready; exec sleep 30"]);
        let outcome = SupervisedProcess::run(
            cmd,
            SupervisionLimits {
                timeout: Duration::from_millis(300),
                grace: Duration::from_millis(300),
            },
            CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert!(outcome.timed_out());
        assert_eq!(outcome.final_state, SupervisionState::Killed);
        assert_eq!(outcome.signal, Some(9));
        assert!(outcome.duration < 10 * SEC);
        assert_eq!(outcome.tail, vec!["ready".to_string()]);
    }
}
