//! Worker lifecycle orchestration.
//!
//! This module owns the run state shared between API callers and the
//! background capture task: start/stop control, the bounded output buffer and
//! the escalation from graceful termination to a forced kill.

mod buffer;
mod shutdown;
mod supervisor;

pub(crate) use supervisor::{StartOutcome, StopOutcome, Supervisor, SupervisorSettings};
