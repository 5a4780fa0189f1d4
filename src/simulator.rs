//! # Simulated Headset
//!
//! A stand-in for the hardware SDK: a 20-sensor dry-electrode EEG headset
//! with a factory reference at Pz, a common-mode follower and an impedance
//! driver. Samples are produced in real time from the wall clock, so
//! `idle` behaves like the real device: it returns whatever is due and, with
//! a non-zero timeout, waits for the next sample.
//!
//! Selected with `--port=sim` (or any `sim:` prefixed port).

use crate::error::HardwareError;
use crate::headset::{Headset, HeadsetState, SourceInfo};
use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

pub const SAMPLING_RATE_HZ: f64 = 300.0;

/// Most samples handed out by a single `idle` call
const MAX_SAMPLES_PER_IDLE: u64 = 300;

const SENSORS: [&str; 21] = [
    "Fp1", "Fp2", "F7", "F3", "Fz", "F4", "F8", "T3", "C3", "Cz", "C4", "T4", "T5", "P3", "P4",
    "T6", "O1", "O2", "A1", "A2", "Pz",
];
const FACTORY_REFERENCE: &str = "Pz";
const DEFAULT_REFERENCE: &str = "A1+A2";

// Injected impedance-driver currents
const DRIVER_FREQUENCIES_HZ: [f64; 2] = [110.0, 130.0];

pub fn is_simulator_port(port: &str) -> bool {
    port == "sim" || port == "simulator" || port.starts_with("sim:")
}

struct SimChannel {
    sensor: usize,
    name: String,
}

pub struct SimulatedHeadset {
    verbosity: i32,
    port: Option<String>,
    channels: Vec<SimChannel>,
    reference: String,
    acquiring: bool,
    impedance_driver: bool,
    analog_reset_mode: i32,
    started_at: Option<Instant>,
    delivered: u64,
    signals: Vec<f64>,
}

impl Default for SimulatedHeadset {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHeadset {
    pub fn new() -> Self {
        Self {
            verbosity: 2,
            port: None,
            channels: Vec::new(),
            reference: DEFAULT_REFERENCE.to_string(),
            acquiring: false,
            impedance_driver: false,
            analog_reset_mode: 0,
            started_at: None,
            delivered: 0,
            signals: Vec::new(),
        }
    }

    fn message(&self, level: i32, text: &str) {
        if level <= self.verbosity {
            log::info!("DSI Message (level {}): {}", level, text);
        }
    }

    fn ensure_connected(&self, operation: &'static str) -> Result<(), HardwareError> {
        if self.port.is_none() {
            return Err(HardwareError::new(operation, "headset is not connected"));
        }
        Ok(())
    }

    fn sensor_index(name: &str) -> Option<usize> {
        SENSORS.iter().position(|s| s.eq_ignore_ascii_case(name))
    }

    fn parse_reference(reference: &str) -> Result<String, HardwareError> {
        for part in reference.split('+') {
            if Self::sensor_index(part.trim()).is_none() {
                return Err(HardwareError::new(
                    "ChooseChannels",
                    format!("unknown reference sensor '{}'", part),
                ));
            }
        }
        Ok(reference.to_string())
    }

    /// Samples that are due but not yet delivered
    fn due(&self) -> u64 {
        match self.started_at {
            Some(start) => {
                let produced = (start.elapsed().as_secs_f64() * SAMPLING_RATE_HZ) as u64;
                produced.saturating_sub(self.delivered)
            }
            None => 0,
        }
    }

    fn generate(&mut self, sample: u64) {
        let t = sample as f64 / SAMPLING_RATE_HZ;
        for (value, channel) in self.signals.iter_mut().zip(&self.channels) {
            let phase = channel.sensor as f64 * 0.37;
            // 10 Hz alpha plus slow drift
            let mut v = 12.0 * (TAU * 10.0 * t + phase).sin() + 4.0 * (TAU * 0.3 * t).sin();
            if self.impedance_driver {
                for freq in DRIVER_FREQUENCIES_HZ {
                    v += 50.0 * (TAU * freq * t).sin();
                }
            }
            *value = v;
        }
    }

    fn sensor_impedance(&self, sensor: usize) -> f64 {
        if !self.impedance_driver {
            return 0.0;
        }
        let t = self.delivered as f64 / SAMPLING_RATE_HZ;
        let base = 0.8 + ((sensor * 37) % 17) as f64 * 0.25;
        base + 0.05 * (TAU * 0.2 * t + sensor as f64).sin()
    }
}

impl HeadsetState for SimulatedHeadset {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn sampling_rate(&self) -> f64 {
        SAMPLING_RATE_HZ
    }

    fn channel_name(&self, index: usize) -> String {
        self.channels
            .get(index)
            .map(|c| c.name.clone())
            .unwrap_or_default()
    }

    fn channel_signal(&self, index: usize) -> f64 {
        self.signals.get(index).copied().unwrap_or(0.0)
    }

    fn sources(&self) -> Vec<SourceInfo> {
        SENSORS
            .iter()
            .enumerate()
            .map(|(i, name)| SourceInfo {
                name: name.to_string(),
                is_referential_eeg: true,
                is_factory_reference: *name == FACTORY_REFERENCE,
                impedance: self.sensor_impedance(i),
            })
            .collect()
    }

    fn impedance_cmf(&self) -> f64 {
        if self.impedance_driver {
            0.6
        } else {
            0.0
        }
    }

    fn reference_string(&self) -> String {
        self.reference.clone()
    }

    fn factory_reference_string(&self) -> String {
        FACTORY_REFERENCE.to_string()
    }

    fn info_string(&self) -> String {
        format!(
            "Simulated DSI headset on port {}: {} channels at {} Hz, reference {}",
            self.port.as_deref().unwrap_or("(none)"),
            self.channels.len(),
            SAMPLING_RATE_HZ,
            self.reference
        )
    }
}

impl Headset for SimulatedHeadset {
    fn as_state(&self) -> &dyn HeadsetState {
        self
    }

    fn set_verbosity(&mut self, level: i32) -> Result<(), HardwareError> {
        self.verbosity = level;
        Ok(())
    }

    fn connect(&mut self, port: &str) -> Result<(), HardwareError> {
        if !is_simulator_port(port) {
            return Err(HardwareError::new(
                "Connect",
                format!("'{}' is not a simulator port", port),
            ));
        }
        self.message(3, &format!("opening simulated port {}", port));
        self.port = Some(port.to_string());
        self.message(2, "headset initialized");
        Ok(())
    }

    fn choose_channels(
        &mut self,
        montage: Option<&str>,
        reference: Option<&str>,
    ) -> Result<(), HardwareError> {
        self.ensure_connected("ChooseChannels")?;

        let reference = match reference {
            Some(r) if !r.trim().is_empty() => Self::parse_reference(r.trim())?,
            _ => DEFAULT_REFERENCE.to_string(),
        };

        let selected: Vec<usize> = match montage {
            Some(m) if !m.trim().is_empty() => m
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|name| {
                    Self::sensor_index(name).ok_or_else(|| {
                        HardwareError::new("ChooseChannels", format!("unknown sensor '{}'", name))
                    })
                })
                .collect::<Result<_, _>>()?,
            _ => (0..SENSORS.len())
                .filter(|&i| SENSORS[i] != FACTORY_REFERENCE)
                .collect(),
        };

        self.channels = selected
            .into_iter()
            .map(|sensor| SimChannel {
                sensor,
                name: format!("{}-{}", SENSORS[sensor], reference),
            })
            .collect();
        self.signals = vec![0.0; self.channels.len()];
        self.reference = reference;
        self.message(2, &format!("montage of {} channels selected", self.channels.len()));
        Ok(())
    }

    fn start_acquisition(&mut self) -> Result<(), HardwareError> {
        self.ensure_connected("StartDataAcquisition")?;
        if !self.acquiring {
            self.acquiring = true;
            self.started_at = Some(Instant::now());
            self.delivered = 0;
            self.message(2, "data acquisition started");
        }
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<(), HardwareError> {
        self.ensure_connected("StopDataAcquisition")?;
        if self.acquiring {
            self.acquiring = false;
            self.message(2, "data acquisition stopped");
        }
        Ok(())
    }

    fn start_impedance_driver(&mut self) -> Result<(), HardwareError> {
        self.ensure_connected("StartImpedanceDriver")?;
        self.impedance_driver = true;
        self.message(3, "impedance driver on");
        Ok(())
    }

    fn stop_impedance_driver(&mut self) -> Result<(), HardwareError> {
        self.ensure_connected("StopImpedanceDriver")?;
        self.impedance_driver = false;
        self.message(3, "impedance driver off");
        Ok(())
    }

    fn analog_reset_mode(&self) -> i32 {
        self.analog_reset_mode
    }

    fn start_analog_reset(&mut self) -> Result<(), HardwareError> {
        self.ensure_connected("StartAnalogReset")?;
        self.message(2, "analog reset requested");
        Ok(())
    }

    fn idle(
        &mut self,
        timeout: Duration,
        on_sample: &mut dyn FnMut(&dyn HeadsetState, f64),
    ) -> Result<(), HardwareError> {
        self.ensure_connected("Idle")?;

        if !self.acquiring {
            thread::sleep(timeout);
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        loop {
            let due = self.due().min(MAX_SAMPLES_PER_IDLE);
            for _ in 0..due {
                self.generate(self.delivered);
                let offset = self.delivered as f64 / SAMPLING_RATE_HZ;
                self.delivered += 1;
                on_sample(&*self, offset);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(Duration::from_secs_f64(1.0 / SAMPLING_RATE_HZ)));
        }
    }
}
