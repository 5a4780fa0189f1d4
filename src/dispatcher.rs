//! # Command Dispatcher
//!
//! Turns operator input lines into actions while the bridge streams.
//!
//! ## Commands
//! | line        | action                            |
//! |-------------|-----------------------------------|
//! | `checkZOn`  | impedance `Start` request         |
//! | `checkZOff` | impedance `Stop` request          |
//! | `resetZ`    | analog reset (blocks for settle)  |
//! | `exit`      | stop the bridge (`quit` also)     |
//!
//! Input is read on a detached reader thread and forwarded over a channel,
//! so the dispatcher can notice an interrupt while the operator is idle.

use crate::console::Console;
use crate::error::{BridgeError, HardwareError};
use crate::impedance::ImpedanceRequest;
use crate::run_state::{RunState, StopCause};
use crate::session::DeviceSession;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const EOF_NOTICE: &str = "Error reading input or EOF reached.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ImpedanceOn,
    ImpedanceOff,
    AnalogReset,
    Exit,
    Empty,
    Unknown(String),
}

impl Command {
    /// Commands are case-sensitive and matched on the first token of the line.
    pub fn parse(line: &str) -> Self {
        match line.split_whitespace().next() {
            None => Command::Empty,
            Some("checkZOn") => Command::ImpedanceOn,
            Some("checkZOff") => Command::ImpedanceOff,
            Some("resetZ") => Command::AnalogReset,
            Some("exit") | Some("quit") => Command::Exit,
            Some(other) => Command::Unknown(other.to_string()),
        }
    }
}

/// What a single line resulted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Impedance(ImpedanceRequest),
    AnalogReset,
    Exit,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    Eof,
}

/// Read lines from `reader` on a background thread.
///
/// Lines are decoded lossily; bytes that are not UTF-8 end up in an unknown
/// command rather than ending the input. The thread is never joined: a
/// blocking read cannot be interrupted, and the process exits once shutdown
/// completes.
pub fn spawn_input_reader<R>(mut reader: R) -> Result<Receiver<InputEvent>, BridgeError>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::unbounded();

    thread::Builder::new()
        .name("command-input".to_string())
        .spawn(move || {
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(&['\n', '\r'][..]).to_string();
                        if tx.send(InputEvent::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        log::warn!("Failed to read command input: {}", e);
                        break;
                    }
                }
            }
            let _ = tx.send(InputEvent::Eof);
        })
        .map_err(|source| BridgeError::ThreadCreation {
            name: "command-input",
            source,
        })?;

    Ok(rx)
}

/// Start an analog reset and wait `settle` for it to complete.
///
/// The session lock is only held for the hardware calls, not the wait.
pub fn analog_reset(
    session: &DeviceSession,
    console: &Console,
    settle: Duration,
) -> Result<(), HardwareError> {
    console.notice("---------Starting Analog Reset----------------");
    let mode = session.analog_reset_mode()?;
    console.line(&format!("--> Initial analog reset mode: {}", mode));

    session.start_analog_reset()?;
    thread::sleep(settle);

    console.notice("---------Analog Reset Complete----------------");
    Ok(())
}

pub struct CommandDispatcher {
    requests: Sender<ImpedanceRequest>,
    session: Arc<DeviceSession>,
    run_state: Arc<RunState>,
    console: Console,
    settle: Duration,
}

impl CommandDispatcher {
    pub fn new(
        requests: Sender<ImpedanceRequest>,
        session: Arc<DeviceSession>,
        run_state: Arc<RunState>,
        console: Console,
        settle: Duration,
    ) -> Self {
        Self {
            requests,
            session,
            run_state,
            console,
            settle,
        }
    }

    /// Handle one input line. Produces at most one action.
    pub fn dispatch(&self, line: &str) -> Dispatched {
        match Command::parse(line) {
            Command::ImpedanceOn => self.request(ImpedanceRequest::Start),
            Command::ImpedanceOff => self.request(ImpedanceRequest::Stop),
            Command::AnalogReset => {
                if let Err(e) = analog_reset(&self.session, &self.console, self.settle) {
                    log::error!("{}", e);
                    self.run_state.request_stop(StopCause::HardwareFault);
                }
                Dispatched::AnalogReset
            }
            Command::Exit => {
                log::info!("Exit requested by operator");
                self.run_state.request_stop(StopCause::Operator);
                Dispatched::Exit
            }
            Command::Empty => Dispatched::Ignored,
            Command::Unknown(command) => {
                self.console.notice(&format!("Unknown command: '{}'", command));
                Dispatched::Ignored
            }
        }
    }

    fn request(&self, request: ImpedanceRequest) -> Dispatched {
        if self.requests.send(request).is_err() {
            log::warn!("Impedance worker is gone; {:?} request dropped", request);
        }
        Dispatched::Impedance(request)
    }

    /// Dispatch input until end of input or until the bridge stops.
    ///
    /// The run state is checked at least every `poll`.
    pub fn run(&self, input: &Receiver<InputEvent>, poll: Duration) {
        while self.run_state.is_running() {
            match input.recv_timeout(poll) {
                Ok(InputEvent::Line(line)) => {
                    self.dispatch(&line);
                }
                Ok(InputEvent::Eof) | Err(RecvTimeoutError::Disconnected) => {
                    self.console.line(EOF_NOTICE);
                    self.run_state.request_stop(StopCause::EndOfInput);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }
}
