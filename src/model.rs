use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the supervised worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Stopped,
    Starting,
    Running,
    StoppedWithCode(i32),
    /// Stopped on request through `stop()`.
    Terminated,
    Error(String),
}

impl RunStatus {
    /// A worker process is (or is about to be) alive.
    pub fn is_live(&self) -> bool {
        matches!(self, RunStatus::Starting | RunStatus::Running)
    }

    pub fn kind(&self) -> StatusKind {
        match self {
            RunStatus::Stopped => StatusKind::Stopped,
            RunStatus::Starting => StatusKind::Starting,
            RunStatus::Running => StatusKind::Running,
            RunStatus::StoppedWithCode(_) => StatusKind::Exited,
            RunStatus::Terminated => StatusKind::Terminated,
            RunStatus::Error(_) => StatusKind::Error,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunStatus::StoppedWithCode(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Stopped => f.write_str("stopped"),
            RunStatus::Starting => f.write_str("starting"),
            RunStatus::Running => f.write_str("running"),
            RunStatus::StoppedWithCode(code) => write!(f, "stopped (exit code: {code})"),
            RunStatus::Terminated => f.write_str("stopped (terminated)"),
            RunStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Machine-checkable form of [`RunStatus`] for API consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Stopped,
    Starting,
    Running,
    Exited,
    Terminated,
    Error,
}

/// Point-in-time view of the supervisor, as returned by `GET /api/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub status: String,
    pub state: StatusKind,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub output: Vec<String>,
}

/// JSON body returned by the start/stop/config mutation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReply {
    pub status: String,
    pub message: String,
}

impl ActionReply {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }
}
