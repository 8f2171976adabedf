use super::arbiter::{Completion, CompletionArbiter, CompletionSignal, Outcome};
use super::events::{AnsiFilter, ExecutionEvent};
use super::launcher::{Interpreter, LaunchedProcess};
use super::multiplexer::{CapturedOutput, StreamOrigin, StreamSignal, spawn_reader};
use crate::repository::ExecutionRepository;
use std::time::Duration;
use tokio::sync::mpsc;

/// Runs one script to completion: spawn, stream, time out, persist, announce.
#[derive(Clone)]
pub struct ExecutionPipeline {
    exec_repo: ExecutionRepository,
    interpreter: Interpreter,
    timeout: Duration,
}

impl ExecutionPipeline {
    pub fn new(exec_repo: ExecutionRepository, interpreter: Interpreter, timeout: Duration) -> Self {
        Self {
            exec_repo,
            interpreter,
            timeout,
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Drives the execution identified by `execution_id`, whose record must
    /// already exist. Emits data events while running, then at most one
    /// `error` event, then exactly one `done` event once the record is
    /// updated.
    pub async fn run(
        &self,
        execution_id: String,
        script: String,
        events: mpsc::UnboundedSender<ExecutionEvent>,
    ) -> Outcome {
        let mut relay = OutputRelay::new(ClientSink::new(&execution_id, events));
        let mut arbiter = CompletionArbiter::new();

        let completion = match self.interpreter.launch(script) {
            Ok(process) => {
                arbiter.observe(CompletionSignal::Spawned);
                self.supervise(&mut arbiter, process, &mut relay).await
            }
            Err(e) => {
                tracing::error!(
                    execution_id = %execution_id,
                    "Failed to start {}: {}",
                    self.interpreter.program,
                    e
                );
                let reason = e.to_string();
                arbiter
                    .observe(CompletionSignal::SpawnFailed(reason.clone()))
                    .unwrap_or(Completion::SpawnFailed(reason))
            }
        };

        match &completion {
            Completion::Exited(code) => {
                tracing::info!(execution_id = %execution_id, exit_code = ?code, "Script finished")
            }
            Completion::TimedOut => tracing::warn!(
                execution_id = %execution_id,
                "Script exceeded {:?} timeout, interpreter killed",
                self.timeout
            ),
            Completion::SpawnFailed(_) => {}
        }

        let (captured, mut client) = relay.finish();
        let outcome = completion.resolve(captured, self.interpreter.display_name(), self.timeout);

        if let Some(notice) = &outcome.notice {
            client.send(ExecutionEvent::Error(notice.clone()));
        }
        self.persist(&execution_id, &outcome).await;
        client.send(ExecutionEvent::Done(outcome.status));
        arbiter.finish();

        outcome
    }

    /// Pumps signals into the arbiter until it decides, then releases the
    /// process and its pipes.
    async fn supervise(
        &self,
        arbiter: &mut CompletionArbiter,
        process: LaunchedProcess,
        relay: &mut OutputRelay,
    ) -> Completion {
        let LaunchedProcess {
            mut child,
            stdout,
            stderr,
            stdin_writer,
        } = process;

        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let readers = [
            spawn_reader(stdout, StreamOrigin::Stdout, signal_tx.clone()),
            spawn_reader(stderr, StreamOrigin::Stderr, signal_tx),
        ];

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut exited = false;
        let mut streams_open = true;

        let completion = loop {
            let signal = tokio::select! {
                _ = &mut deadline => CompletionSignal::TimedOut,
                status = child.wait(), if !exited => {
                    exited = true;
                    match status {
                        Ok(status) => CompletionSignal::Exited(status.code()),
                        Err(e) => {
                            tracing::warn!("Failed to wait on interpreter: {}", e);
                            CompletionSignal::Exited(None)
                        }
                    }
                }
                received = signal_rx.recv(), if streams_open => match received {
                    Some(StreamSignal::Chunk { origin, text }) => {
                        relay.forward(origin, &text);
                        continue;
                    }
                    Some(StreamSignal::Closed(origin)) => CompletionSignal::StreamClosed(origin),
                    None => {
                        streams_open = false;
                        continue;
                    }
                },
            };

            if let Some(completion) = arbiter.observe(signal) {
                break completion;
            }
        };

        if completion == Completion::TimedOut && !exited {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill timed out interpreter: {}", e);
            }
        }

        relay.drain(&mut signal_rx);

        // Descendants of a killed interpreter can keep the pipes open.
        stdin_writer.abort();
        for reader in readers {
            reader.abort();
        }

        completion
    }

    async fn persist(&self, execution_id: &str, outcome: &Outcome) {
        match self
            .exec_repo
            .finalize(
                execution_id,
                outcome.status,
                outcome.output.as_deref(),
                outcome.error.as_deref(),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                execution_id = %execution_id,
                "Execution record was already finalized"
            ),
            Err(e) => tracing::error!(
                execution_id = %execution_id,
                "Failed to persist execution outcome, record may remain RUNNING: {}",
                e
            ),
        }
    }
}

/// Routes decoded output to the persisted capture as is, and to the client
/// with escapes stripped.
struct OutputRelay {
    captured: CapturedOutput,
    stdout_display: AnsiFilter,
    stderr_display: AnsiFilter,
    client: ClientSink,
}

impl OutputRelay {
    fn new(client: ClientSink) -> Self {
        Self {
            captured: CapturedOutput::default(),
            stdout_display: AnsiFilter::default(),
            stderr_display: AnsiFilter::default(),
            client,
        }
    }

    fn forward(&mut self, origin: StreamOrigin, text: &str) {
        self.captured.append(origin, text);
        let display = match origin {
            StreamOrigin::Stdout => self.stdout_display.push(text),
            StreamOrigin::Stderr => self.stderr_display.push(text),
        };
        if !display.is_empty() {
            self.client.send(ExecutionEvent::output(origin, display));
        }
    }

    /// Takes chunks the readers queued before the run was decided.
    fn drain(&mut self, signals: &mut mpsc::UnboundedReceiver<StreamSignal>) {
        while let Ok(signal) = signals.try_recv() {
            if let StreamSignal::Chunk { origin, text } = signal {
                self.forward(origin, &text);
            }
        }
    }

    /// Flushes held display text and hands back the capture and the client.
    fn finish(self) -> (CapturedOutput, ClientSink) {
        let mut client = self.client;
        for (origin, filter) in [
            (StreamOrigin::Stdout, self.stdout_display),
            (StreamOrigin::Stderr, self.stderr_display),
        ] {
            let tail = filter.finish();
            if !tail.is_empty() {
                client.send(ExecutionEvent::output(origin, tail));
            }
        }
        (self.captured, client)
    }
}

/// Client side of the event stream. A disconnected client does not stop the
/// run; events are dropped from then on.
struct ClientSink {
    execution_id: String,
    events: mpsc::UnboundedSender<ExecutionEvent>,
    connected: bool,
}

impl ClientSink {
    fn new(execution_id: &str, events: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            events,
            connected: true,
        }
    }

    fn send(&mut self, event: ExecutionEvent) {
        if !self.connected {
            return;
        }
        if self.events.send(event).is_err() {
            self.connected = false;
            tracing::debug!(
                execution_id = %self.execution_id,
                "Client disconnected, execution continues"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{NO_OUTPUT_SENTINEL, ScriptDialect, compose_script};
    use crate::models::ExecutionStatus;
    use crate::repository::memory_pool;
    use std::collections::BTreeMap;
    use std::time::Instant;

    async fn pipeline_with(timeout: Duration) -> (ExecutionPipeline, ExecutionRepository) {
        let repo = ExecutionRepository::new(memory_pool().await);
        let pipeline = ExecutionPipeline::new(
            repo.clone(),
            Interpreter::for_dialect(ScriptDialect::Posix),
            timeout,
        );
        (pipeline, repo)
    }

    async fn run_script(
        pipeline: &ExecutionPipeline,
        repo: &ExecutionRepository,
        body: &str,
    ) -> (String, Outcome, Vec<ExecutionEvent>) {
        let execution = repo
            .create("script", "user", &BTreeMap::new())
            .await
            .expect("create execution");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = pipeline
            .run(execution.id.clone(), body.to_string(), tx)
            .await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (execution.id, outcome, events)
    }

    fn joined(events: &[ExecutionEvent], kind: &str) -> String {
        events
            .iter()
            .filter(|e| e.kind() == kind)
            .map(|e| match e {
                ExecutionEvent::Stdout(t) | ExecutionEvent::Stderr(t) | ExecutionEvent::Error(t) => {
                    t.as_str()
                }
                _ => "",
            })
            .collect()
    }

    fn done_events(events: &[ExecutionEvent]) -> Vec<ExecutionStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::Done(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn successful_run_streams_and_persists_output() {
        let (pipeline, repo) = pipeline_with(Duration::from_secs(10)).await;
        let (id, outcome, events) =
            run_script(&pipeline, &repo, "echo one\necho warn >&2\necho two\n").await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(joined(&events, "stdout"), "one\ntwo\n");
        assert_eq!(joined(&events, "stderr"), "warn\n");
        assert_eq!(events.last(), Some(&ExecutionEvent::Done(ExecutionStatus::Success)));
        assert_eq!(done_events(&events).len(), 1);

        let stored = repo.get(&id).await.expect("get");
        assert_eq!(stored.status, ExecutionStatus::Success);
        assert_eq!(stored.output.as_deref(), Some("one\ntwo\n"));
        assert_eq!(stored.error, None);
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn silent_success_persists_sentinel() {
        let (pipeline, repo) = pipeline_with(Duration::from_secs(10)).await;
        let (id, _, events) = run_script(&pipeline, &repo, "true\n").await;

        assert_eq!(events, vec![ExecutionEvent::Done(ExecutionStatus::Success)]);
        let stored = repo.get(&id).await.expect("get");
        assert_eq!(stored.output.as_deref(), Some(NO_OUTPUT_SENTINEL));
    }

    #[tokio::test]
    async fn stderr_becomes_error_verbatim() {
        let (pipeline, repo) = pipeline_with(Duration::from_secs(10)).await;
        let (id, _, events) = run_script(
            &pipeline,
            &repo,
            "printf '\\033[31mdenied\\033[0m\\n' >&2\nexit 3\n",
        )
        .await;

        // Display is cleaned, the record keeps the raw escapes.
        assert_eq!(joined(&events, "stderr"), "denied\n");
        assert!(events.iter().all(|e| e.kind() != "error"));
        assert_eq!(done_events(&events), vec![ExecutionStatus::Failed]);

        let stored = repo.get(&id).await.expect("get");
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("\u{1b}[31mdenied\u{1b}[0m\n"));
    }

    #[tokio::test]
    async fn silent_failure_reports_exit_code() {
        let (pipeline, repo) = pipeline_with(Duration::from_secs(10)).await;
        let (id, _, events) = run_script(&pipeline, &repo, "exit 7\n").await;

        assert_eq!(joined(&events, "error"), "sh exited with code 7");
        let stored = repo.get(&id).await.expect("get");
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert!(stored.error.as_deref().unwrap_or_default().contains('7'));
    }

    #[tokio::test]
    async fn timeout_kills_interpreter_and_fails_once() {
        let (pipeline, repo) = pipeline_with(Duration::from_secs(1)).await;
        let started = Instant::now();
        let (id, outcome, events) =
            run_script(&pipeline, &repo, "echo started\nsleep 30\necho never\n").await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(joined(&events, "stdout"), "started\n");
        assert!(joined(&events, "error").contains("1 second"));
        assert_eq!(done_events(&events), vec![ExecutionStatus::Failed]);

        let stored = repo.get(&id).await.expect("get");
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert!(stored.error.as_deref().unwrap_or_default().contains("1 second"));

        // A late finalize attempt must not overwrite the timeout record.
        let applied = repo
            .finalize(&id, ExecutionStatus::Success, Some("late"), None)
            .await
            .expect("finalize");
        assert!(!applied);
    }

    #[tokio::test]
    async fn spawn_failure_is_finalized_like_any_other_end() {
        let repo = ExecutionRepository::new(memory_pool().await);
        let pipeline = ExecutionPipeline::new(
            repo.clone(),
            Interpreter {
                program: "/nonexistent/interpreter".to_string(),
                args: Vec::new(),
                dialect: ScriptDialect::Posix,
            },
            Duration::from_secs(10),
        );
        let (id, _, events) = run_script(&pipeline, &repo, "echo hi\n").await;

        assert_eq!(events.len(), 2);
        assert!(joined(&events, "error").starts_with("Failed to start interpreter:"));
        assert_eq!(events[1], ExecutionEvent::Done(ExecutionStatus::Failed));

        let stored = repo.get(&id).await.expect("get");
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert!(stored.ended_at.is_some());
    }

    #[tokio::test]
    async fn bound_parameters_reach_the_interpreter() {
        let (pipeline, repo) = pipeline_with(Duration::from_secs(10)).await;
        let params = BTreeMap::from([("Owner".to_string(), "O'Brien".to_string())]);
        let script = compose_script(ScriptDialect::Posix, "echo \"owner=$Owner\"\n", &params);
        let (_, outcome, _) = run_script(&pipeline, &repo, &script).await;

        assert_eq!(outcome.output.as_deref(), Some("owner=O'Brien\n"));
    }

    #[tokio::test]
    async fn escape_split_across_reads_is_stripped_for_display() {
        let (pipeline, repo) = pipeline_with(Duration::from_secs(10)).await;
        let (id, _, events) = run_script(
            &pipeline,
            &repo,
            "printf '\\033[3'\nsleep 0.3\nprintf '1mred\\033[0m\\n'\n",
        )
        .await;

        let shown = joined(&events, "stdout");
        assert_eq!(shown, "red\n");
        assert!(!shown.contains('\u{1b}'));

        let stored = repo.get(&id).await.expect("get");
        assert_eq!(stored.output.as_deref(), Some("\u{1b}[31mred\u{1b}[0m\n"));
    }

    #[tokio::test]
    async fn queued_chunks_are_kept_when_the_run_is_decided() {
        let (tx, mut events) = mpsc::unbounded_channel();
        let mut relay = OutputRelay::new(ClientSink::new("exec-1", tx));
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        signal_tx
            .send(StreamSignal::Chunk {
                origin: StreamOrigin::Stdout,
                text: "late \u{1b}[1mline\u{1b}[0m\n".to_string(),
            })
            .expect("queue stdout");
        signal_tx
            .send(StreamSignal::Closed(StreamOrigin::Stdout))
            .expect("queue close");
        signal_tx
            .send(StreamSignal::Chunk {
                origin: StreamOrigin::Stderr,
                text: "partial \u{1b}[3".to_string(),
            })
            .expect("queue stderr");

        relay.drain(&mut signal_rx);
        let (captured, _client) = relay.finish();

        assert_eq!(captured.stdout, "late \u{1b}[1mline\u{1b}[0m\n");
        assert_eq!(captured.stderr, "partial \u{1b}[3");
        assert_eq!(
            events.recv().await,
            Some(ExecutionEvent::Stdout("late line\n".to_string()))
        );
        assert_eq!(
            events.recv().await,
            Some(ExecutionEvent::Stderr("partial ".to_string()))
        );
        assert_eq!(
            events.recv().await,
            Some(ExecutionEvent::Stderr("[3".to_string()))
        );
    }

    #[tokio::test]
    async fn failed_persistence_still_ends_the_stream() {
        let pool = memory_pool().await;
        let repo = ExecutionRepository::new(pool.clone());
        let pipeline = ExecutionPipeline::new(
            repo.clone(),
            Interpreter::for_dialect(ScriptDialect::Posix),
            Duration::from_secs(10),
        );
        let execution = repo
            .create("script", "user", &BTreeMap::new())
            .await
            .expect("create execution");
        pool.close().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            pipeline.run(execution.id, "echo hi\n".to_string(), tx),
        )
        .await
        .expect("run returns");

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(joined(&events, "stdout"), "hi\n");
        assert_eq!(events.last(), Some(&ExecutionEvent::Done(ExecutionStatus::Success)));
        assert_eq!(done_events(&events).len(), 1);
    }

    #[tokio::test]
    async fn disconnected_client_does_not_stop_the_run() {
        let (pipeline, repo) = pipeline_with(Duration::from_secs(10)).await;
        let execution = repo
            .create("script", "user", &BTreeMap::new())
            .await
            .expect("create execution");
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let outcome = pipeline
            .run(execution.id.clone(), "echo still-ran\n".to_string(), tx)
            .await;

        assert_eq!(outcome.status, ExecutionStatus::Success);
        let stored = repo.get(&execution.id).await.expect("get");
        assert_eq!(stored.output.as_deref(), Some("still-ran\n"));
    }
}
