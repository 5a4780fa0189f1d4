//! # Bridge
//!
//! Brings the pieces up in dependency order and tears them down in reverse.
//!
//! ## Startup
//! 1. Configure the device session (connect, choose channels)
//! 2. Create the stream publisher from the configured montage
//! 3. Register the sample forwarder and start acquisition
//! 4. Spawn the acquisition and impedance worker threads
//!
//! A failure at any step undoes the steps before it.
//!
//! ## Shutdown
//! `Running -> Stopping`, join both workers, unregister the sample callback,
//! stop acquisition, idle for the grace window, destroy the publisher, then
//! delete the device session. Every step is best-effort: a failing hardware
//! call is logged and teardown carries on. The sequence runs exactly once,
//! from `shutdown` or from `Drop`.

use crate::acquisition::run_acquisition_loop;
use crate::config::Config;
use crate::console::Console;
use crate::dispatcher::CommandDispatcher;
use crate::error::BridgeError;
use crate::forwarder::SampleForwarder;
use crate::headset::Headset;
use crate::impedance::{
    run_impedance_worker, CallbackFactory, ImpedanceController, ImpedanceRequest, ImpedanceState,
};
use crate::publisher::{StreamBackend, StreamInfo, StreamPublisher};
use crate::run_state::{RunState, StopCause};
use crate::session::{DeviceSession, DeviceSettings};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Per-run selection made on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub device: DeviceSettings,
    pub stream_name: String,
}

pub struct Bridge {
    session: Arc<DeviceSession>,
    publisher: Arc<StreamPublisher>,
    run_state: Arc<RunState>,
    console: Console,
    config: Config,
    requests: Sender<ImpedanceRequest>,
    acquisition_thread: Option<JoinHandle<()>>,
    impedance_thread: Option<JoinHandle<ImpedanceController>>,
    finished: bool,
}

impl Bridge {
    pub fn start(
        headset: Box<dyn Headset>,
        backend: &dyn StreamBackend,
        settings: &BridgeSettings,
        config: Config,
        run_state: Arc<RunState>,
        console: Console,
    ) -> Result<Self, BridgeError> {
        let session = Arc::new(DeviceSession::configure(headset, &settings.device)?);

        let described = session.read(|state| {
            (
                state.info_string(),
                StreamInfo::from_device(state, &settings.stream_name, &config),
            )
        });
        let (info_string, stream_info) = match described {
            Ok(described) => described,
            Err(e) => {
                session.delete();
                return Err(e.into());
            }
        };

        console.notice(&info_string);
        console.line(&format!("REF: {}", stream_info.reference));
        console.line(&format!("Initializing {} outlet", stream_info.name));

        let publisher = match StreamPublisher::create(backend, &stream_info) {
            Ok(publisher) => Arc::new(publisher),
            Err(e) => {
                session.delete();
                return Err(e);
            }
        };

        let (requests, request_rx) = crossbeam_channel::unbounded();
        let mut bridge = Self {
            session,
            publisher,
            run_state,
            console,
            config,
            requests,
            acquisition_thread: None,
            impedance_thread: None,
            finished: false,
        };

        if let Err(e) = bridge.launch(request_rx) {
            bridge.run_state.request_stop(StopCause::SetupFailure);
            bridge.teardown();
            return Err(e);
        }

        bridge.console.line("Streaming...");
        Ok(bridge)
    }

    fn launch(&mut self, request_rx: Receiver<ImpedanceRequest>) -> Result<(), BridgeError> {
        let shared = SampleForwarder::new(Arc::clone(&self.publisher)).into_shared();
        let forwarder: CallbackFactory = Box::new(move || shared.callback());

        self.session.set_sample_callback(Some(forwarder()))?;

        self.console.line("Starting data acquisition");
        self.session.start_acquisition()?;

        let session = Arc::clone(&self.session);
        let run_state = Arc::clone(&self.run_state);
        let poll_interval = self.config.poll_interval();
        self.acquisition_thread = Some(
            thread::Builder::new()
                .name("acquisition".to_string())
                .spawn(move || run_acquisition_loop(session, run_state, poll_interval))
                .map_err(|source| BridgeError::ThreadCreation {
                    name: "acquisition",
                    source,
                })?,
        );

        let controller = ImpedanceController::new(
            Arc::clone(&self.session),
            self.console.clone(),
            Some(forwarder),
        );
        let run_state = Arc::clone(&self.run_state);
        let poll = self.config.impedance_poll();
        self.impedance_thread = Some(
            thread::Builder::new()
                .name("impedance".to_string())
                .spawn(move || run_impedance_worker(controller, request_rx, run_state, poll))
                .map_err(|source| BridgeError::ThreadCreation {
                    name: "impedance",
                    source,
                })?,
        );

        log::info!("Bridge started, streaming to '{}'", self.publisher.name());
        Ok(())
    }

    /// Dispatcher wired to this bridge's session and impedance worker
    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(
            self.requests.clone(),
            Arc::clone(&self.session),
            Arc::clone(&self.run_state),
            self.console.clone(),
            self.config.analog_reset_settle(),
        )
    }

    pub fn run_state(&self) -> &Arc<RunState> {
        &self.run_state
    }

    /// Stop everything and report why the run ended.
    pub fn shutdown(mut self) -> StopCause {
        self.run_state.request_stop(StopCause::Operator);
        self.teardown();
        self.run_state.cause().unwrap_or(StopCause::Operator)
    }

    fn teardown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(handle) = self.acquisition_thread.take() {
            log::info!("Waiting for acquisition thread to terminate...");
            if handle.join().is_err() {
                log::error!("Acquisition thread panicked");
            }
        }

        if let Some(handle) = self.impedance_thread.take() {
            log::info!("Waiting for impedance thread to terminate...");
            match handle.join() {
                Ok(mut controller) => {
                    if controller.state() == ImpedanceState::Checking {
                        log::info!("Impedance check still active, stopping the driver");
                    }
                    controller.finish();
                }
                Err(_) => log::error!("Impedance thread panicked"),
            }
        }

        if let Err(e) = self.session.set_sample_callback(None) {
            log::error!("Failed to unregister sample callback: {}", e);
        }
        if let Err(e) = self.session.stop_acquisition() {
            log::error!("Failed to stop acquisition: {}", e);
        }
        if let Err(e) = self.session.idle(self.config.shutdown_grace()) {
            log::error!("Error while draining the headset: {}", e);
        }

        self.publisher.destroy();
        self.session.delete();
        self.run_state.mark_stopped();
        log::info!("Shutdown complete");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if !self.finished {
            self.run_state.request_stop(StopCause::Operator);
            self.teardown();
        }
    }
}
