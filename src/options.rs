//! # Command-Line Options
//!
//! Options are accepted as `--name=value`, `-n=value`, `/name:value` or a bare
//! `--name` (empty value). When the same option appears more than once the
//! last occurrence wins. The syntax predates any argument-parsing crate
//! convention and is what the GUI front end emits, so it is matched by hand.

use std::path::PathBuf;

pub const DEFAULT_VERBOSITY: i32 = 2;

/// Environment variable consulted when no usable `--port` is given
pub const PORT_ENV_VAR: &str = "DSISerialPort";

/// Options for one run of the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub program: String,
    pub help: bool,
    pub port: Option<String>,
    pub montage: Option<String>,
    pub reference: Option<String>,
    pub verbosity: i32,
    pub stream_name: Option<String>,
    pub config_path: Option<PathBuf>,
    /// Recoverable problems found while parsing, reported by the caller
    pub warnings: Vec<String>,
}

impl Options {
    /// Parse a full argument vector (program name first).
    pub fn parse(argv: &[String]) -> Self {
        let program = argv
            .first()
            .cloned()
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let args = argv.get(1..).unwrap_or(&[]);
        let mut warnings = Vec::new();

        let verbosity = integer_opt(
            args,
            "verbosity",
            "v",
            DEFAULT_VERBOSITY,
            &mut warnings,
        );

        Self {
            program,
            help: string_opt(args, "help", "h").is_some(),
            port: string_opt(args, "port", "p").map(str::to_string),
            montage: non_empty(string_opt(args, "montage", "m")),
            reference: non_empty(string_opt(args, "reference", "r")),
            verbosity,
            // `-m` is shared with --montage
            stream_name: non_empty(string_opt(args, "lsl-stream-name", "m")),
            config_path: non_empty(string_opt(args, "config", "c")).map(PathBuf::from),
            warnings,
        }
    }

    /// The stream name for this run, or the configured default
    pub fn stream_name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.stream_name.as_deref().unwrap_or(default)
    }

    /// Resolve the serial port, falling back to `DSISerialPort`
    pub fn resolve_port(&self) -> Option<String> {
        self.resolve_port_with(std::env::var(PORT_ENV_VAR).ok())
    }

    fn resolve_port_with(&self, env_port: Option<String>) -> Option<String> {
        match self.port.as_deref() {
            Some(port) if !port.is_empty() && port != "default" => Some(port.to_string()),
            _ => env_port.filter(|p| !p.is_empty()),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Look up `--long` / `-short` in `args`. Returns `None` when absent and the
/// (possibly empty) value otherwise; the last match wins.
pub fn string_opt<'a>(args: &'a [String], long: &str, short: &str) -> Option<&'a str> {
    let mut result = None;

    for arg in args {
        let mut stripped = arg.as_str();
        for _ in 0..2 {
            if let Some(rest) = stripped.strip_prefix(&['-', '/'][..]) {
                stripped = rest;
            }
        }

        for keyword in [long, short] {
            if keyword.is_empty() {
                continue;
            }
            if let Some(rest) = stripped.strip_prefix(keyword) {
                if let Some(value) = rest.strip_prefix(&['=', ':'][..]) {
                    result = Some(value);
                } else if rest.is_empty() {
                    result = Some(rest);
                }
            }
        }
    }

    result
}

/// Integer variant of [`string_opt`]. Malformed values produce a warning and
/// the default.
pub fn integer_opt(
    args: &[String],
    long: &str,
    short: &str,
    default: i32,
    warnings: &mut Vec<String>,
) -> i32 {
    let value = match string_opt(args, long, short) {
        Some(v) if !v.is_empty() => v,
        _ => return default,
    };

    match value.trim_start().parse::<i32>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warnings.push(format!(
                "could not interpret \"{}\" as a valid integer value for the \"{}\" option - reverting to default value {}={}",
                value, long, long, default
            ));
            default
        }
    }
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [ --OPTIONS... ]

With the exception of --help,
the options should be given in --NAME=VALUE or /NAME:VALUE format.

  --help
       Displays this help text.

  --port
       Specifies the serial port address (e.g. --port=COM4 on Windows,
       --port=/dev/cu.DSI24-023-BluetoothSeri on OSX, or --port=/dev/rfcomm0 on Linux)
       on which to connect. Use --port=sim for the built-in simulated headset.
       Note: if you omit this option, or use an empty string or the string
       \"default\", then the environment variable {env} is used, if available.

  --montage
       A list of channel specifications, comma-separated without spaces
       (can also be space-delimited, but then you would need to enclose the
       option in quotes on the command-line).

  --reference
       The name of sensor (or linear combination of sensors, without spaces)
       to be used as reference. Defaults to a \"traditional\" averaged-ears or
       averaged-mastoids reference if available, or the factory reference
       (typically Pz) if these sensors are not available.

  --verbosity
       The higher the number, the more messages the headset will send to the
       console (and the more low-level they will tend to be). Default {verbosity}.

  --lsl-stream-name
       The name of the outlet that will be created to stream the samples
       received from the device. If omitted, the stream will be given the name WS-default.

  --config
       Path to a settings file (TOML). Defaults to the per-user config directory.

While streaming, the following commands are read from standard input:
  checkZOn    start the impedance driver and print impedances
  checkZOff   stop the impedance driver and resume streaming
  resetZ      trigger an analog reset
  exit        stop streaming and quit
",
        program = program,
        env = PORT_ENV_VAR,
        verbosity = DEFAULT_VERBOSITY,
    )
}
