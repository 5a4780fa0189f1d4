mod acquisition;
mod bridge;
mod config;
mod console;
mod dispatcher;
mod error;
mod forwarder;
mod headset;
mod impedance;
#[cfg(feature = "lsl")]
mod lsl_outlet;
mod options;
mod publisher;
mod run_state;
mod session;
mod signal;
mod simulator;
#[cfg(test)]
mod testing;

use bridge::{Bridge, BridgeSettings};
use config::Config;
use console::Console;
use error::BridgeError;
use headset::Headset;
use options::{usage, Options, PORT_ENV_VAR};
use publisher::StreamBackend;
use run_state::{RunState, StopCause};
use session::DeviceSettings;
use simulator::{is_simulator_port, SimulatedHeadset};
use std::io::{self, BufReader};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = std::env::args().collect();
    let options = Options::parse(&argv);
    let console = Console::stdio();

    if options.help {
        console.notice(&usage(&options.program));
        return ExitCode::SUCCESS;
    }

    for warning in &options.warnings {
        log::warn!("{}", warning);
    }

    match run(&options, console.clone()) {
        Ok(cause) => {
            log::info!("Stopped ({:?})", cause);
            console.line(&format!("{} will exit now...", options.program));
            ExitCode::from(cause.exit_code())
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(options: &Options, console: Console) -> Result<StopCause, BridgeError> {
    let config = Config::resolve(options.config_path.as_deref());
    let command_poll = config.command_poll();
    let backend = publisher::default_backend();

    let bridge = start_bridge(
        options,
        config,
        backend.as_ref(),
        console,
        signal::install_interrupt_handler,
    )?;

    let input = dispatcher::spawn_input_reader(BufReader::new(io::stdin()))?;
    bridge.dispatcher().run(&input, command_poll);

    Ok(bridge.shutdown())
}

/// Connect and start streaming, then hook up interrupt handling.
///
/// A connection failure returns before any thread exists.
fn start_bridge(
    options: &Options,
    config: Config,
    backend: &dyn StreamBackend,
    console: Console,
    install_interrupt: impl FnOnce(Arc<RunState>) -> Result<(), BridgeError>,
) -> Result<Bridge, BridgeError> {
    let port = options.resolve_port().ok_or_else(|| BridgeError::Connection {
        port: String::new(),
        reason: format!(
            "no serial port given; use --port=<port> or set {}",
            PORT_ENV_VAR
        ),
    })?;
    let headset = open_headset(&port)?;

    let settings = BridgeSettings {
        device: DeviceSettings {
            port,
            montage: options.montage.clone(),
            reference: options.reference.clone(),
            verbosity: options.verbosity,
        },
        stream_name: options.stream_name_or(&config.default_stream_name).to_string(),
    };

    let bridge = Bridge::start(
        headset,
        backend,
        &settings,
        config,
        Arc::new(RunState::new()),
        console,
    )?;

    // On failure the bridge is dropped, which tears it down
    install_interrupt(Arc::clone(bridge.run_state()))?;
    Ok(bridge)
}

/// Pick the hardware driver for `port`
fn open_headset(port: &str) -> Result<Box<dyn Headset>, BridgeError> {
    if is_simulator_port(port) {
        log::info!("Using simulated headset on port {}", port);
        return Ok(Box::new(SimulatedHeadset::new()));
    }

    Err(BridgeError::Connection {
        port: port.to_string(),
        reason: "no headset driver is available for this port (use --port=sim for the simulator)"
            .to_string(),
    })
}
