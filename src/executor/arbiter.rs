//! Single-winner completion for one execution.
//!
//! Every signal the supervisor sees (stream closed, exit observed, timer
//! fired, spawn refused) is fed through [`CompletionArbiter::observe`]. The
//! first signal that completes an ending path moves the arbiter to
//! `Finalizing` and yields a [`Completion`]; anything observed afterwards
//! yields nothing. The arbiter is owned by the supervising task, so `&mut`
//! access is the single-entry guard.

use super::multiplexer::{CapturedOutput, StreamOrigin};
use crate::models::ExecutionStatus;
use std::time::Duration;

/// Recorded as the output of a successful run that printed nothing.
pub const NO_OUTPUT_SENTINEL: &str = "(no output)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterState {
    Starting,
    Running,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionSignal {
    Spawned,
    StreamClosed(StreamOrigin),
    /// Exit observed; `None` when the process was ended by a signal.
    Exited(Option<i32>),
    TimedOut,
    SpawnFailed(String),
}

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Exited(Option<i32>),
    TimedOut,
    SpawnFailed(String),
}

#[derive(Debug)]
pub struct CompletionArbiter {
    state: ArbiterState,
    stdout_closed: bool,
    stderr_closed: bool,
    exit: Option<Option<i32>>,
}

impl Default for CompletionArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionArbiter {
    pub fn new() -> Self {
        Self {
            state: ArbiterState::Starting,
            stdout_closed: false,
            stderr_closed: false,
            exit: None,
        }
    }

    pub fn state(&self) -> ArbiterState {
        self.state
    }

    pub fn observe(&mut self, signal: CompletionSignal) -> Option<Completion> {
        if matches!(self.state, ArbiterState::Finalizing | ArbiterState::Done) {
            tracing::trace!("Ignoring {:?} after completion was decided", signal);
            return None;
        }

        let completion = match signal {
            CompletionSignal::Spawned => {
                self.state = ArbiterState::Running;
                None
            }
            CompletionSignal::StreamClosed(StreamOrigin::Stdout) => {
                self.stdout_closed = true;
                self.natural_completion()
            }
            CompletionSignal::StreamClosed(StreamOrigin::Stderr) => {
                self.stderr_closed = true;
                self.natural_completion()
            }
            CompletionSignal::Exited(code) => {
                self.exit = Some(code);
                self.natural_completion()
            }
            CompletionSignal::TimedOut => Some(Completion::TimedOut),
            CompletionSignal::SpawnFailed(reason) => Some(Completion::SpawnFailed(reason)),
        };

        if completion.is_some() {
            self.state = ArbiterState::Finalizing;
        }
        completion
    }

    /// Marks the terminal record and client event as delivered.
    pub fn finish(&mut self) {
        self.state = ArbiterState::Done;
    }

    fn natural_completion(&self) -> Option<Completion> {
        if self.stdout_closed && self.stderr_closed {
            self.exit.map(Completion::Exited)
        } else {
            None
        }
    }
}

/// What gets persisted and announced for a completed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: ExecutionStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    /// Message for an `error` event, when the failure is not already visible
    /// to the client through streamed stderr.
    pub notice: Option<String>,
}

impl Completion {
    pub fn resolve(self, captured: CapturedOutput, interpreter: &str, timeout: Duration) -> Outcome {
        let CapturedOutput { stdout, stderr } = captured;
        let partial_output = |stdout: String| (!stdout.is_empty()).then_some(stdout);

        match self {
            Completion::Exited(Some(0)) => Outcome {
                status: ExecutionStatus::Success,
                output: Some(if stdout.is_empty() {
                    NO_OUTPUT_SENTINEL.to_string()
                } else {
                    stdout
                }),
                error: None,
                notice: None,
            },
            Completion::Exited(code) => {
                let synthesized = match code {
                    Some(code) => format!("{} exited with code {}", interpreter, code),
                    None => format!("{} was terminated by a signal", interpreter),
                };
                if stderr.is_empty() {
                    Outcome {
                        status: ExecutionStatus::Failed,
                        output: partial_output(stdout),
                        error: Some(synthesized.clone()),
                        notice: Some(synthesized),
                    }
                } else {
                    Outcome {
                        status: ExecutionStatus::Failed,
                        output: partial_output(stdout),
                        error: Some(stderr),
                        notice: None,
                    }
                }
            }
            Completion::TimedOut => {
                let message = format!(
                    "Script execution exceeded the {} second timeout and was terminated",
                    timeout.as_secs_f64()
                );
                Outcome {
                    status: ExecutionStatus::Failed,
                    output: partial_output(stdout),
                    error: Some(message.clone()),
                    notice: Some(message),
                }
            }
            Completion::SpawnFailed(reason) => {
                let message = format!("Failed to start {}: {}", interpreter, reason);
                Outcome {
                    status: ExecutionStatus::Failed,
                    output: None,
                    error: Some(message.clone()),
                    notice: Some(message),
                }
            }
        }
    }
}
