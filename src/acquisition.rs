//! Acquisition Loop: keeps the headset polled for as long as the bridge runs.
//!
//! Each iteration calls `idle(0)`, which delivers whatever samples are
//! pending to the registered callback, then sleeps for `poll_interval`.
//! A shorter interval lowers delivery latency at the cost of CPU time; the
//! run state is observed once per iteration.

use crate::run_state::{RunState, StopCause};
use crate::session::DeviceSession;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn run_acquisition_loop(
    session: Arc<DeviceSession>,
    run_state: Arc<RunState>,
    poll_interval: Duration,
) {
    log::info!("Acquisition loop started (poll interval {:?})", poll_interval);
    let mut polls: u64 = 0;

    while run_state.is_running() {
        if let Err(e) = session.idle(Duration::ZERO) {
            log::error!("{}", e);
            run_state.request_stop(StopCause::HardwareFault);
            break;
        }
        polls += 1;
        thread::sleep(poll_interval);
    }

    log::info!("Acquisition loop finished after {} polls", polls);
}
