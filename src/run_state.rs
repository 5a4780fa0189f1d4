//! Process-wide run state shared by every thread.
//!
//! `Running -> Stopping -> Stopped`, never backwards. The first stop request
//! records its cause; later requests are no-ops.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Stopping,
    Stopped,
}

/// What triggered shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// `exit` command
    Operator,
    /// Command stream closed
    EndOfInput,
    /// Interrupt signal
    Interrupt,
    /// A worker saw a hardware error
    HardwareFault,
    /// Startup could not complete
    SetupFailure,
}

impl StopCause {
    /// Process exit code for a run that ended this way
    pub fn exit_code(self) -> u8 {
        match self {
            StopCause::Operator | StopCause::EndOfInput | StopCause::Interrupt => 0,
            StopCause::SetupFailure => 1,
            StopCause::HardwareFault => 2,
        }
    }
}

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

#[derive(Debug)]
pub struct RunState {
    phase: AtomicU8,
    cause: OnceLock<StopCause>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(RUNNING),
            cause: OnceLock::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.phase.load(Ordering::Acquire) {
            RUNNING => Phase::Running,
            STOPPING => Phase::Stopping,
            _ => Phase::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Move `Running -> Stopping`. Returns `true` for the request that won.
    pub fn request_stop(&self, cause: StopCause) -> bool {
        let first = self.cause.set(cause).is_ok();
        let _ = self
            .phase
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire);
        first
    }

    /// Move `Stopping -> Stopped` once all workers have been joined.
    pub fn mark_stopped(&self) -> bool {
        self.phase
            .compare_exchange(STOPPING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn cause(&self) -> Option<StopCause> {
        self.cause.get().copied()
    }
}
