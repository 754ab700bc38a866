//! Worker lifecycle supervisor.
//!
//! Owns start/stop of the single worker process and the state that API
//! callers poll. All mutation goes through one lock; the per-run task applies
//! worker events under the same lock, so readers never see a half-applied
//! update.

use super::buffer::OutputBuffer;
use super::shutdown::{poll_until, POLL_INTERVAL, STOP_TIMEOUT};
use crate::config::{ConfigStore, ConfigStoreError};
use crate::engine::{ProcessError, WorkerCommand, WorkerControl, WorkerEngine, WorkerEvent};
use crate::model::{RunStatus, StatusSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};

/// Lines included in a status snapshot, independent of how many are retained.
pub const STATUS_OUTPUT_LINES: usize = 100;

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub worker: WorkerCommand,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl SupervisorSettings {
    pub fn new(worker: WorkerCommand) -> Self {
        Self {
            worker,
            poll_interval: POLL_INTERVAL,
            stop_timeout: STOP_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    /// The persisted configuration failed to load or validate; nothing was launched.
    Rejected(ConfigStoreError),
}

#[derive(Debug)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
    Error(ProcessError),
}

/// Control side of the live worker task.
struct WorkerHandle {
    ctrl_tx: mpsc::UnboundedSender<WorkerControl>,
    exited: watch::Receiver<bool>,
}

struct RunState {
    status: RunStatus,
    output: OutputBuffer,
    /// Present iff `status.is_live()`.
    worker: Option<WorkerHandle>,
    /// Bumped on every start; events from older runs are ignored.
    run_id: u64,
}

impl RunState {
    fn apply(&mut self, run_id: u64, event: WorkerEvent) {
        if run_id != self.run_id {
            return;
        }
        match event {
            WorkerEvent::Launched { pid } => {
                tracing::debug!(run_id, ?pid, "worker running");
                if self.status == RunStatus::Starting {
                    self.status = RunStatus::Running;
                }
            }
            WorkerEvent::Output(line) => self.output.push(line),
            WorkerEvent::Exited { code } => {
                if self.status.is_live() {
                    self.status = RunStatus::StoppedWithCode(code);
                    self.worker = None;
                }
            }
            WorkerEvent::Failed(err) => {
                let msg = err.to_string();
                self.output.push(format!("ERROR: {msg}"));
                if self.status.is_live() {
                    self.status = RunStatus::Error(msg);
                    self.worker = None;
                }
            }
        }
    }
}

pub struct Supervisor {
    state: Arc<Mutex<RunState>>,
    settings: SupervisorSettings,
    config: Option<ConfigStore>,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(RunState {
                status: RunStatus::Stopped,
                output: OutputBuffer::default(),
                worker: None,
                run_id: 0,
            })),
            settings,
            config: None,
        }
    }

    /// Validate this configuration file before every start.
    pub fn with_config(mut self, store: ConfigStore) -> Self {
        self.config = Some(store);
        self
    }

    /// Launch the worker unless one is already live.
    ///
    /// Returns as soon as the status reads `Starting`; the launch itself and
    /// output capture happen on a background task.
    pub async fn start(&self) -> StartOutcome {
        if self.state.lock().await.status.is_live() {
            return StartOutcome::AlreadyRunning;
        }
        if let Some(store) = &self.config {
            if let Err(e) = validate_off_runtime(store.clone()).await {
                if let ConfigStoreError::Invalid(invalid) = &e {
                    tracing::warn!(key = invalid.key(), "configuration rejected");
                }
                tracing::warn!(error = %e, "refusing to start worker");
                return StartOutcome::Rejected(e);
            }
        }

        // Another start may have won while the file was being read.
        let mut state = self.state.lock().await;
        if state.status.is_live() {
            return StartOutcome::AlreadyRunning;
        }

        state.run_id += 1;
        let run_id = state.run_id;
        state.output.clear();
        state.status = RunStatus::Starting;

        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        state.worker = Some(WorkerHandle {
            ctrl_tx,
            exited: exited_rx,
        });
        drop(state);

        let engine = WorkerEngine::new(self.settings.worker.clone());
        let shared = self.state.clone();
        tokio::spawn(async move {
            let (event_tx, mut event_rx) = mpsc::unbounded_channel();
            let apply = async {
                while let Some(event) = event_rx.recv().await {
                    shared.lock().await.apply(run_id, event);
                }
            };
            tokio::join!(engine.run(event_tx, ctrl_rx), apply);
            let _ = exited_tx.send(true);
        });

        tracing::info!(run_id, "worker starting");
        StartOutcome::Started
    }

    /// Terminate the live worker: graceful signal, bounded wait, then kill.
    ///
    /// If signalling fails the status is left as it was and the error is
    /// returned to the caller.
    pub async fn stop(&self) -> StopOutcome {
        let (ctrl_tx, mut exited, run_id) = {
            let state = self.state.lock().await;
            match &state.worker {
                Some(worker) => (
                    worker.ctrl_tx.clone(),
                    worker.exited.clone(),
                    state.run_id,
                ),
                None => return StopOutcome::NotRunning,
            }
        };

        tracing::info!(run_id, "stopping worker");
        if let Err(e) = send_control(&ctrl_tx, WorkerControl::Terminate).await {
            tracing::error!(error = %e, "graceful stop failed");
            return StopOutcome::Error(e);
        }

        let exited_in_time = poll_until(self.settings.poll_interval, self.settings.stop_timeout, || {
            *exited.borrow_and_update()
        })
        .await;

        if !exited_in_time {
            tracing::warn!(
                timeout = ?self.settings.stop_timeout,
                "worker ignored termination request; killing"
            );
            if let Err(e) = send_control(&ctrl_tx, WorkerControl::Kill).await {
                tracing::error!(error = %e, "forced stop failed");
                return StopOutcome::Error(e);
            }
        }

        let mut state = self.state.lock().await;
        if state.run_id == run_id {
            state.status = RunStatus::Terminated;
            state.worker = None;
        }
        StopOutcome::Stopped
    }

    pub async fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().await;
        StatusSnapshot {
            running: state.status.is_live(),
            status: state.status.to_string(),
            state: state.status.kind(),
            exit_code: state.status.exit_code(),
            output: state.output.tail(STATUS_OUTPUT_LINES),
        }
    }

    /// Stop any live worker; used when the control plane itself exits.
    pub async fn shutdown(&self) {
        if let StopOutcome::Error(e) = self.stop().await {
            tracing::error!(error = %e, "worker did not stop cleanly during shutdown");
        }
    }
}

/// Read and validate the configuration on the blocking pool.
async fn validate_off_runtime(store: ConfigStore) -> Result<(), ConfigStoreError> {
    let path = store.path().to_path_buf();
    match tokio::task::spawn_blocking(move || store.load_validated()).await {
        Ok(validated) => validated.map(drop),
        Err(e) => Err(ConfigStoreError::Read {
            path,
            source: std::io::Error::other(e),
        }),
    }
}

/// Deliver a control request and wait for the worker task's answer.
///
/// A task that is already gone has nothing left to signal, which counts as
/// success.
async fn send_control(
    ctrl_tx: &mpsc::UnboundedSender<WorkerControl>,
    make: fn(oneshot::Sender<Result<(), ProcessError>>) -> WorkerControl,
) -> Result<(), ProcessError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    if ctrl_tx.send(make(reply_tx)).is_err() {
        return Ok(());
    }
    reply_rx.await.unwrap_or(Ok(()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::StatusKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn sh(script: &str) -> SupervisorSettings {
        SupervisorSettings::new(WorkerCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            current_dir: None,
            browser_binary: None,
        })
    }

    async fn wait_until<F>(sup: &Supervisor, mut done: F) -> StatusSnapshot
    where
        F: FnMut(&StatusSnapshot) -> bool,
    {
        for _ in 0..200 {
            let snap = sup.status().await;
            if done(&snap) {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not reached; last status: {:?}", sup.status().await);
    }

    #[tokio::test]
    async fn fresh_supervisor_is_stopped() {
        let sup = Supervisor::new(sh("true"));
        let snap = sup.status().await;
        assert!(!snap.running);
        assert_eq!(snap.status, "stopped");
        assert!(snap.output.is_empty());
    }

    #[tokio::test]
    async fn start_is_visible_before_it_returns() {
        let sup = Supervisor::new(sh("exec sleep 30"));
        assert!(matches!(sup.start().await, StartOutcome::Started));
        let snap = sup.status().await;
        assert!(snap.running);
        assert!(matches!(snap.state, StatusKind::Starting | StatusKind::Running));
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn status_reports_last_hundred_lines_after_exit() {
        let sup = Supervisor::new(sh(
            "i=1; while [ $i -le 1200 ]; do echo \"line $i\"; i=$((i+1)); done",
        ));
        sup.start().await;
        let snap = wait_until(&sup, |s| !s.running).await;

        assert_eq!(snap.status, "stopped (exit code: 0)");
        assert_eq!(snap.state, StatusKind::Exited);
        assert_eq!(snap.exit_code, Some(0));
        let expected: Vec<String> = (1101..=1200).map(|i| format!("line {i}")).collect();
        assert_eq!(snap.output, expected);
        assert_eq!(sup.state.lock().await.output.len(), 1000);
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let sup = Supervisor::new(sh("echo hello; exec sleep 30"));
        assert!(matches!(sup.start().await, StartOutcome::Started));
        wait_until(&sup, |s| s.output == vec!["hello".to_string()]).await;

        assert!(matches!(sup.start().await, StartOutcome::AlreadyRunning));
        let snap = sup.status().await;
        assert!(snap.running);
        assert_eq!(snap.output, vec!["hello".to_string()]);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn stop_without_worker_changes_nothing() {
        let sup = Supervisor::new(sh("exit 7"));
        assert!(matches!(sup.stop().await, StopOutcome::NotRunning));
        assert_eq!(sup.status().await.status, "stopped");

        sup.start().await;
        wait_until(&sup, |s| !s.running).await;
        assert!(matches!(sup.stop().await, StopOutcome::NotRunning));
        assert_eq!(sup.status().await.status, "stopped (exit code: 7)");
    }

    #[tokio::test]
    async fn stop_terminates_running_worker() {
        let sup = Supervisor::new(sh("echo up; exec sleep 30"));
        sup.start().await;
        wait_until(&sup, |s| s.state == StatusKind::Running && !s.output.is_empty()).await;

        assert!(matches!(sup.stop().await, StopOutcome::Stopped));
        let snap = sup.status().await;
        assert!(!snap.running);
        assert_eq!(snap.status, "stopped (terminated)");
        assert_eq!(snap.state, StatusKind::Terminated);
        // Output from the stopped run stays readable.
        assert_eq!(snap.output, vec!["up".to_string()]);
    }

    #[tokio::test]
    async fn stop_escalates_to_kill_after_timeout() {
        let mut settings = sh("trap '' TERM; echo stubborn; while true; do sleep 1; done");
        settings.poll_interval = Duration::from_millis(50);
        settings.stop_timeout = Duration::from_millis(300);
        let sup = Supervisor::new(settings);
        sup.start().await;
        wait_until(&sup, |s| !s.output.is_empty()).await;

        let began = std::time::Instant::now();
        assert!(matches!(sup.stop().await, StopOutcome::Stopped));
        assert!(began.elapsed() < Duration::from_secs(5));
        assert_eq!(sup.status().await.status, "stopped (terminated)");
    }

    #[tokio::test]
    async fn launch_failure_becomes_error_status() {
        let sup = Supervisor::new(SupervisorSettings::new(WorkerCommand {
            program: PathBuf::from("/nonexistent/worker-binary"),
            args: Vec::new(),
            current_dir: None,
            browser_binary: None,
        }));
        assert!(matches!(sup.start().await, StartOutcome::Started));
        let snap = wait_until(&sup, |s| !s.running).await;

        assert_eq!(snap.state, StatusKind::Error);
        assert!(snap.status.starts_with("error: failed to launch worker"));
        assert_eq!(snap.output.len(), 1);
        assert!(snap.output[0].starts_with("ERROR: "));
        assert!(sup.state.lock().await.worker.is_none());
    }

    #[tokio::test]
    async fn restart_clears_previous_output() {
        let sup = Supervisor::new(sh("echo once"));
        sup.start().await;
        wait_until(&sup, |s| !s.running).await;
        sup.start().await;
        let snap = wait_until(&sup, |s| !s.running).await;
        assert_eq!(snap.output, vec!["once".to_string()]);
    }

    #[tokio::test]
    async fn invalid_configuration_blocks_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "email: jane@example.com\n").unwrap();
        let sup = Supervisor::new(sh("echo should-not-run")).with_config(ConfigStore::new(&path));

        match sup.start().await {
            StartOutcome::Rejected(ConfigStoreError::Invalid(e)) => {
                assert_eq!(e.key(), "password");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let snap = sup.status().await;
        assert_eq!(snap.status, "stopped");
        assert!(snap.output.is_empty());
    }

    #[tokio::test]
    async fn valid_configuration_allows_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, crate::config::SAMPLE_CONFIG).unwrap();
        let sup = Supervisor::new(sh("echo ok")).with_config(ConfigStore::new(&path));

        assert!(matches!(sup.start().await, StartOutcome::Started));
        let snap = wait_until(&sup, |s| !s.running).await;
        assert_eq!(snap.exit_code, Some(0));
    }

    #[tokio::test]
    async fn concurrent_starts_launch_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, crate::config::SAMPLE_CONFIG).unwrap();
        let sup = Supervisor::new(sh("exec sleep 30")).with_config(ConfigStore::new(&path));

        let (a, b) = tokio::join!(sup.start(), sup.start());
        let started = [&a, &b]
            .iter()
            .filter(|o| matches!(o, StartOutcome::Started))
            .count();
        assert_eq!(started, 1, "outcomes: {a:?}, {b:?}");
        assert_eq!(sup.state.lock().await.run_id, 1);
        sup.shutdown().await;
    }

    /// Install a live worker whose control task answers every request with
    /// `reply`, and whose exit is never observed.
    async fn fake_worker(
        sup: &Supervisor,
        reply: fn(&WorkerControl) -> Result<(), ProcessError>,
    ) -> watch::Sender<bool> {
        let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<WorkerControl>();
        let (exited_tx, exited) = watch::channel(false);
        {
            let mut state = sup.state.lock().await;
            state.run_id = 1;
            state.status = RunStatus::Running;
            state.output.push("working".to_string());
            state.worker = Some(WorkerHandle { ctrl_tx, exited });
        }
        tokio::spawn(async move {
            while let Some(ctl) = ctrl_rx.recv().await {
                let res = reply(&ctl);
                match ctl {
                    WorkerControl::Terminate(tx) | WorkerControl::Kill(tx) => {
                        let _ = tx.send(res);
                    }
                }
            }
        });
        exited_tx
    }

    fn denied() -> ProcessError {
        ProcessError::Termination(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
    }

    #[tokio::test]
    async fn failed_termination_leaves_worker_running() {
        let sup = Supervisor::new(sh("true"));
        let _exited = fake_worker(&sup, |_| Err(denied())).await;

        match sup.stop().await {
            StopOutcome::Error(ProcessError::Termination(_)) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        let snap = sup.status().await;
        assert!(snap.running);
        assert_eq!(snap.status, "running");
        assert_eq!(snap.output, vec!["working".to_string()]);
        assert!(sup.state.lock().await.worker.is_some());
    }

    #[tokio::test]
    async fn failed_kill_leaves_worker_running() {
        let mut settings = sh("true");
        settings.poll_interval = Duration::from_millis(10);
        settings.stop_timeout = Duration::from_millis(50);
        let sup = Supervisor::new(settings);
        let _exited = fake_worker(&sup, |ctl| match ctl {
            WorkerControl::Terminate(_) => Ok(()),
            WorkerControl::Kill(_) => Err(denied()),
        })
        .await;

        assert!(matches!(sup.stop().await, StopOutcome::Error(_)));
        assert_eq!(sup.status().await.status, "running");
        assert!(sup.state.lock().await.worker.is_some());
    }

    #[tokio::test]
    async fn capture_failure_becomes_error_status() {
        let sup = Supervisor::new(sh("true"));
        let _exited = fake_worker(&sup, |_| Ok(())).await;

        sup.state.lock().await.apply(
            1,
            WorkerEvent::Failed(ProcessError::Capture(std::io::Error::other("pipe broke"))),
        );

        let snap = sup.status().await;
        assert!(!snap.running);
        assert_eq!(snap.state, StatusKind::Error);
        assert_eq!(snap.status, "error: failed to capture worker output: pipe broke");
        assert_eq!(
            snap.output.last().map(String::as_str),
            Some("ERROR: failed to capture worker output: pipe broke")
        );
        assert!(sup.state.lock().await.worker.is_none());

        // A late event from that run must not resurrect or overwrite it.
        sup.state.lock().await.apply(1, WorkerEvent::Exited { code: 0 });
        assert_eq!(sup.status().await.state, StatusKind::Error);
    }
}
