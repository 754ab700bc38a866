use std::io;

/// Failures while driving the worker process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to launch worker: {0}")]
    Launch(#[source] io::Error),

    #[error("failed to capture worker output: {0}")]
    Capture(#[source] io::Error),

    #[error("failed to terminate worker: {0}")]
    Termination(#[source] io::Error),
}
