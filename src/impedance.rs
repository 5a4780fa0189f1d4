//! # Impedance Controller
//!
//! Two-state machine (`Idle`, `Checking`) that switches the headset between
//! streaming and impedance measurement. Requests arrive from the command
//! dispatcher over a channel and are serviced on a dedicated worker thread,
//! one request per message, so a request is consumed exactly once.
//!
//! ## Key Components
//! - `ImpedanceRequest`: `Start` / `Stop` tokens sent by the dispatcher
//! - `ImpedanceController`: owns the state and swaps the sample callback
//! - `ImpedancePrinter`: the diagnostic callback installed while checking
//! - `run_impedance_worker`: the worker thread body

use crate::console::Console;
use crate::error::HardwareError;
use crate::headset::{HeadsetState, SampleCallback};
use crate::run_state::{RunState, StopCause};
use crate::session::DeviceSession;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

pub const STARTING_NOTICE: &str = "---------Starting Impedance Driver----------------";
pub const STOPPED_NOTICE: &str = "----------Stopped Impedance Driver-------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpedanceRequest {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpedanceState {
    Idle,
    Checking,
}

/// Outcome of servicing one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Stopped,
    /// Start while checking, or stop while idle
    Ignored,
}

/// Builds the normal streaming callback again after a check
pub type CallbackFactory = Box<dyn Fn() -> SampleCallback + Send>;

/// Column headings: time, every referential non-reference source, then CMF.
pub fn header_row(state: &dyn HeadsetState) -> String {
    let mut row = format!("{:>9}", "Time");
    for source in state.sources() {
        if source.is_referential_eeg && !source.is_factory_reference {
            let _ = write!(row, ",{:>9}", source.name);
        }
    }
    let _ = write!(row, ",   CMF={}", state.factory_reference_string());
    row
}

/// One row of impedance values, in the same column order as `header_row`.
pub fn impedance_row(state: &dyn HeadsetState, offset: f64) -> String {
    let mut row = fixed_column(offset);
    for source in state.sources() {
        if source.is_referential_eeg && !source.is_factory_reference {
            let _ = write!(row, ",{}", fixed_column(source.impedance));
        }
    }
    let _ = write!(row, ",{}", fixed_column(state.impedance_cmf()));
    row
}

/// Formats like `% 9.4f`: non-negative values get a blank where the sign
/// goes, even when the number already fills the column.
fn fixed_column(value: f64) -> String {
    let text = if value.is_sign_negative() {
        format!("{:.4}", value)
    } else {
        format!(" {:.4}", value)
    };
    format!("{:>9}", text)
}

/// Sample callback that prints impedances instead of streaming
pub struct ImpedancePrinter {
    console: Console,
}

impl ImpedancePrinter {
    pub fn new(console: Console) -> Self {
        Self { console }
    }

    pub fn on_sample(&self, state: &dyn HeadsetState, offset: f64) {
        self.console.line(&impedance_row(state, offset));
    }

    pub fn into_callback(self) -> SampleCallback {
        Box::new(move |state: &dyn HeadsetState, offset: f64| self.on_sample(state, offset))
    }
}

pub struct ImpedanceController {
    session: Arc<DeviceSession>,
    console: Console,
    restore: Option<CallbackFactory>,
    state: ImpedanceState,
    header_printed: bool,
}

impl ImpedanceController {
    /// `restore` rebuilds the streaming callback on `Stop`. Without one the
    /// driver is stopped and samples are dropped until something else
    /// registers a callback.
    pub fn new(
        session: Arc<DeviceSession>,
        console: Console,
        restore: Option<CallbackFactory>,
    ) -> Self {
        Self {
            session,
            console,
            restore,
            state: ImpedanceState::Idle,
            header_printed: false,
        }
    }

    pub fn state(&self) -> ImpedanceState {
        self.state
    }

    pub fn service(&mut self, request: ImpedanceRequest) -> Result<Transition, HardwareError> {
        match (self.state, request) {
            (ImpedanceState::Idle, ImpedanceRequest::Start) => {
                self.start()?;
                Ok(Transition::Started)
            }
            (ImpedanceState::Checking, ImpedanceRequest::Stop) => {
                self.stop()?;
                Ok(Transition::Stopped)
            }
            _ => {
                log::debug!("Impedance request {:?} ignored while {:?}", request, self.state);
                Ok(Transition::Ignored)
            }
        }
    }

    fn start(&mut self) -> Result<(), HardwareError> {
        self.console.notice(STARTING_NOTICE);
        self.session.start_impedance()?;
        self.state = ImpedanceState::Checking;

        if !self.header_printed {
            let header = self.session.read(header_row)?;
            self.console.line(&header);
            self.header_printed = true;
        }

        let printer = ImpedancePrinter::new(self.console.clone());
        self.session.set_sample_callback(Some(printer.into_callback()))?;
        log::info!("Impedance check started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HardwareError> {
        self.session.stop_impedance()?;
        self.state = ImpedanceState::Idle;
        self.console.notice(STOPPED_NOTICE);

        if let Some(restore) = &self.restore {
            self.session.set_sample_callback(Some(restore()))?;
        }
        log::info!("Impedance check stopped");
        Ok(())
    }

    /// Stop the driver if a check is still running. Used during shutdown.
    pub fn finish(&mut self) {
        if self.state == ImpedanceState::Checking {
            match self.session.stop_impedance() {
                Ok(()) => {
                    self.state = ImpedanceState::Idle;
                    self.console.notice(STOPPED_NOTICE);
                }
                Err(e) => log::error!("Failed to stop impedance driver during shutdown: {}", e),
            }
        }
    }
}

/// Impedance worker thread body.
///
/// Waits up to `poll` for each request so the run state is observed at
/// least once per poll interval. A hardware error stops the bridge.
/// Returns the controller so shutdown can finish an active check.
pub fn run_impedance_worker(
    mut controller: ImpedanceController,
    requests: Receiver<ImpedanceRequest>,
    run_state: Arc<RunState>,
    poll: Duration,
) -> ImpedanceController {
    log::debug!("Impedance worker started");

    while run_state.is_running() {
        match requests.recv_timeout(poll) {
            Ok(request) => {
                if let Err(e) = controller.service(request) {
                    log::error!("{}", e);
                    run_state.request_stop(StopCause::HardwareFault);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("Impedance request channel closed");
                break;
            }
        }
    }

    log::debug!("Impedance worker finished");
    controller
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Capture;
    use crate::headset::Headset;
    use crate::testing::{mock_settings, MockHandle, MockHeadset};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn session(channels: usize) -> (Arc<DeviceSession>, MockHandle) {
        let (headset, handle) = MockHeadset::new(channels);
        let session = DeviceSession::configure(Box::new(headset), &mock_settings()).unwrap();
        (Arc::new(session), handle)
    }

    fn counting_restore(counter: Arc<AtomicUsize>) -> CallbackFactory {
        Box::new(move || {
            let counter = Arc::clone(&counter);
            Box::new(move |_state: &dyn HeadsetState, _offset: f64| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[test]
    fn test_header_and_row_layout() {
        let (mut headset, _handle) = MockHeadset::new(2);
        assert_eq!(
            header_row(&headset),
            "     Time,       S1,       S2,   CMF=Pz"
        );

        headset.start_impedance_driver().unwrap();
        assert_eq!(
            impedance_row(&headset, 1.5),
            "   1.5000,   1.5000,   2.5000,   0.7500"
        );
    }

    #[test]
    fn test_wide_values_keep_sign_blank() {
        assert_eq!(fixed_column(1.5), "   1.5000");
        assert_eq!(fixed_column(-2.5), "  -2.5000");
        assert_eq!(fixed_column(1234.5678), " 1234.5678");
        assert_eq!(fixed_column(-1234.5678), "-1234.5678");
        assert_eq!(fixed_column(12345.6789), " 12345.6789");
    }

    #[test]
    fn test_check_on_then_off() {
        let (session, handle) = session(2);
        let (console, capture) = Capture::new();
        let streamed = Arc::new(AtomicUsize::new(0));
        let mut controller = ImpedanceController::new(
            Arc::clone(&session),
            console,
            Some(counting_restore(Arc::clone(&streamed))),
        );

        assert_eq!(controller.service(ImpedanceRequest::Start).unwrap(), Transition::Started);
        assert_eq!(controller.state(), ImpedanceState::Checking);

        handle.push_samples(&[0.25, 0.5]);
        session.idle(Duration::ZERO).unwrap();
        assert_eq!(streamed.load(Ordering::SeqCst), 0);

        assert_eq!(controller.service(ImpedanceRequest::Stop).unwrap(), Transition::Stopped);
        handle.push_samples(&[0.75]);
        session.idle(Duration::ZERO).unwrap();
        assert_eq!(streamed.load(Ordering::SeqCst), 1);

        let stdout = capture.stdout();
        assert_eq!(stdout.matches("Time").count(), 1);
        assert_eq!(stdout.lines().count(), 3);
        assert!(stdout.contains("   0.2500"));

        let stderr = capture.stderr();
        assert_eq!(stderr.matches(STARTING_NOTICE).count(), 1);
        assert_eq!(stderr.matches(STOPPED_NOTICE).count(), 1);
        assert_eq!(handle.count("start_impedance_driver"), 1);
        assert_eq!(handle.count("stop_impedance_driver"), 1);
    }

    #[test]
    fn test_repeated_requests_are_ignored() {
        let (session, handle) = session(1);
        let (console, capture) = Capture::new();
        let mut controller = ImpedanceController::new(session, console, None);

        assert_eq!(controller.service(ImpedanceRequest::Stop).unwrap(), Transition::Ignored);
        controller.service(ImpedanceRequest::Start).unwrap();
        assert_eq!(controller.service(ImpedanceRequest::Start).unwrap(), Transition::Ignored);

        assert_eq!(handle.count("start_impedance_driver"), 1);
        assert_eq!(handle.count("stop_impedance_driver"), 0);
        assert_eq!(capture.stderr().matches(STARTING_NOTICE).count(), 1);
    }

    #[test]
    fn test_header_printed_once_per_session() {
        let (session, _handle) = session(1);
        let (console, capture) = Capture::new();
        let mut controller = ImpedanceController::new(session, console, None);

        for request in [
            ImpedanceRequest::Start,
            ImpedanceRequest::Stop,
            ImpedanceRequest::Start,
            ImpedanceRequest::Stop,
        ] {
            controller.service(request).unwrap();
        }
        assert_eq!(capture.stdout().matches("Time").count(), 1);
        assert_eq!(capture.stderr().matches(STOPPED_NOTICE).count(), 2);
    }

    #[test]
    fn test_failed_start_stays_idle() {
        let (session, handle) = session(1);
        let (console, capture) = Capture::new();
        let mut controller = ImpedanceController::new(session, console, None);
        handle.fail("start_impedance_driver");

        assert!(controller.service(ImpedanceRequest::Start).is_err());
        assert_eq!(controller.state(), ImpedanceState::Idle);
        assert!(!capture.stdout().contains("Time"));
    }

    #[test]
    fn test_finish_stops_active_check() {
        let (session, handle) = session(1);
        let (console, _capture) = Capture::new();
        let mut controller = ImpedanceController::new(session, console, None);

        controller.finish();
        assert_eq!(handle.count("stop_impedance_driver"), 0);

        controller.service(ImpedanceRequest::Start).unwrap();
        controller.finish();
        controller.finish();
        assert_eq!(handle.count("stop_impedance_driver"), 1);
        assert_eq!(controller.state(), ImpedanceState::Idle);
    }

    #[test]
    fn test_worker_services_requests_and_exits_on_stop() {
        let (session, handle) = session(1);
        let (console, _capture) = Capture::new();
        let controller = ImpedanceController::new(session, console, None);
        let run_state = Arc::new(RunState::new());
        let (tx, rx) = crossbeam_channel::unbounded();

        let worker_state = Arc::clone(&run_state);
        let worker = thread::spawn(move || {
            run_impedance_worker(controller, rx, worker_state, Duration::from_millis(5))
        });

        tx.send(ImpedanceRequest::Start).unwrap();
        tx.send(ImpedanceRequest::Stop).unwrap();
        while handle.count("stop_impedance_driver") == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        run_state.request_stop(StopCause::Operator);
        let controller = worker.join().unwrap();
        assert_eq!(controller.state(), ImpedanceState::Idle);
        assert_eq!(handle.count("start_impedance_driver"), 1);
    }

    #[test]
    fn test_worker_hardware_error_requests_stop() {
        let (session, handle) = session(1);
        let (console, _capture) = Capture::new();
        let controller = ImpedanceController::new(session, console, None);
        let run_state = Arc::new(RunState::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        handle.fail("start_impedance_driver");

        tx.send(ImpedanceRequest::Start).unwrap();
        let worker_state = Arc::clone(&run_state);
        let worker = thread::spawn(move || {
            run_impedance_worker(controller, rx, worker_state, Duration::from_millis(5))
        });

        worker.join().unwrap();
        assert_eq!(run_state.cause(), Some(StopCause::HardwareFault));
    }
}
