mod capture;
mod error;
mod signal;

pub use error::ProcessError;

use capture::MergedOutput;
use std::io::{self, PipeReader};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// Environment variable telling the worker where the browser binary lives.
pub const BROWSER_BINARY_ENV: &str = "CHROME_BINARY";

/// How long to keep reading output after the worker itself has exited.
/// Grandchildren that inherited the pipes can otherwise hold them open forever.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// How to launch the worker executable.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub browser_binary: Option<PathBuf>,
}

impl WorkerCommand {
    /// Spawn the worker with stdout and stderr merged into one pipe.
    ///
    /// `cmd` holds the parent's copies of the write end; it is dropped on
    /// return so the reader sees EOF once the worker side closes.
    fn spawn(&self) -> io::Result<(Child, PipeReader)> {
        let output = MergedOutput::new()?;
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(output.stdout)
            .stderr(output.stderr)
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        if let Some(browser) = &self.browser_binary {
            cmd.env(BROWSER_BINARY_ENV, browser);
        }
        let child = cmd.spawn()?;
        Ok((child, output.reader))
    }
}

/// Requests sent to a running worker.
#[derive(Debug)]
pub enum WorkerControl {
    /// Ask the worker to exit.
    Terminate(oneshot::Sender<Result<(), ProcessError>>),
    /// Kill the worker outright.
    Kill(oneshot::Sender<Result<(), ProcessError>>),
}

/// What the worker did, in order. `Exited` or `Failed` is always last.
#[derive(Debug)]
pub enum WorkerEvent {
    Launched { pid: Option<u32> },
    Output(String),
    Exited { code: i32 },
    Failed(ProcessError),
}

pub struct WorkerEngine {
    cmd: WorkerCommand,
}

impl WorkerEngine {
    pub fn new(cmd: WorkerCommand) -> Self {
        Self { cmd }
    }

    /// Launch the worker and drive it to completion.
    ///
    /// Output is forwarded until the merged pipe closes; then the exit status is
    /// collected. Control requests are served throughout.
    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<WorkerEvent>,
        mut control_rx: mpsc::UnboundedReceiver<WorkerControl>,
    ) {
        let (mut child, output) = match self.cmd.spawn() {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!(program = %self.cmd.program.display(), error = %e, "worker launch failed");
                let _ = event_tx.send(WorkerEvent::Failed(ProcessError::Launch(e)));
                return;
            }
        };
        let pid = child.id();
        tracing::info!(?pid, program = %self.cmd.program.display(), "worker launched");
        let _ = event_tx.send(WorkerEvent::Launched { pid });

        let mut capture = tokio::spawn(capture::capture_output(output, event_tx.clone()));

        let mut exit: Option<io::Result<ExitStatus>> = None;
        let captured = loop {
            tokio::select! {
                joined = &mut capture => {
                    break joined.unwrap_or_else(|e| Err(io::Error::other(e)));
                }
                Some(ctl) = control_rx.recv() => answer(&mut child, ctl),
                status = child.wait(), if exit.is_none() => exit = Some(status),
                _ = tokio::time::sleep(DRAIN_GRACE), if exit.is_some() => {
                    tracing::warn!("worker exited but its output pipes are still open; abandoning capture");
                    capture.abort();
                    break Ok(());
                }
            }
        };

        if let Err(e) = captured {
            tracing::error!(error = %e, "output capture failed; killing worker");
            let _ = child.start_kill();
            let _ = child.wait().await;
            let _ = event_tx.send(WorkerEvent::Failed(ProcessError::Capture(e)));
            return;
        }

        let status = match exit {
            Some(status) => status,
            None => loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(ctl) = control_rx.recv() => answer(&mut child, ctl),
                }
            },
        };

        let event = match status {
            Ok(status) => {
                let code = signal::exit_code(status);
                tracing::info!(code, "worker exited");
                WorkerEvent::Exited { code }
            }
            Err(e) => {
                tracing::error!(error = %e, "waiting for worker exit failed");
                WorkerEvent::Failed(ProcessError::Capture(e))
            }
        };
        let _ = event_tx.send(event);
    }
}

fn answer(child: &mut Child, ctl: WorkerControl) {
    match ctl {
        WorkerControl::Terminate(reply) => {
            let res = signal::request_exit(child).map_err(ProcessError::Termination);
            let _ = reply.send(res);
        }
        WorkerControl::Kill(reply) => {
            let res = signal::force_exit(child).map_err(ProcessError::Termination);
            let _ = reply.send(res);
        }
    }
}
