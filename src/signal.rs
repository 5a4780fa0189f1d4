//! Interrupt handling.
//!
//! A small thread owns a current-thread Tokio runtime that waits for Ctrl-C
//! and turns it into a stop request. Everything else stays synchronous.

use crate::error::BridgeError;
use crate::run_state::{RunState, StopCause};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Builder;

pub fn install_interrupt_handler(run_state: Arc<RunState>) -> Result<(), BridgeError> {
    let thread_error = |source| BridgeError::ThreadCreation {
        name: "signal",
        source,
    };

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(thread_error)?;

    thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::error!("Cannot listen for interrupt signals: {}", e);
                        return;
                    }
                    if run_state.request_stop(StopCause::Interrupt) {
                        log::info!("Interrupt received, shutting down");
                    } else {
                        log::info!("Interrupt received, shutdown already in progress");
                    }
                }
            });
        })
        .map_err(thread_error)?;

    Ok(())
}
