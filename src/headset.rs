//! # Headset Boundary
//!
//! The hardware SDK is an external collaborator. This module describes the
//! slice of it the bridge relies on; `DeviceSession` is the only caller.
//!
//! ## Key Types
//! - `HeadsetState`: read-only view of the device, valid during a sample
//! - `Headset`: the mutable connection (configure, acquisition, impedance)
//! - `SampleCallback`: handler invoked once per delivered sample
//! - `SourceInfo`: one physical sensor, as seen by the impedance printer

use crate::error::HardwareError;
use std::time::Duration;

/// One physical sensor reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub name: String,
    pub is_referential_eeg: bool,
    pub is_factory_reference: bool,
    /// Latest EEG impedance estimate; only meaningful while the impedance
    /// driver is running.
    pub impedance: f64,
}

/// Read-only device state, as it stands for the sample being delivered.
pub trait HeadsetState {
    fn channel_count(&self) -> usize;
    fn sampling_rate(&self) -> f64;
    /// Full channel name, e.g. `Fz-Pz`
    fn channel_name(&self, index: usize) -> String;
    /// Current signal value of channel `index`, in microvolts
    fn channel_signal(&self, index: usize) -> f64;
    fn sources(&self) -> Vec<SourceInfo>;
    /// Common-mode follower impedance
    fn impedance_cmf(&self) -> f64;
    fn reference_string(&self) -> String;
    fn factory_reference_string(&self) -> String;
    fn info_string(&self) -> String;
}

/// Handler for delivered samples: device state plus the packet offset time.
pub type SampleCallback = Box<dyn FnMut(&dyn HeadsetState, f64) + Send>;

/// A connected (or connectable) headset.
///
/// Implementations need not be safe to call concurrently; `DeviceSession`
/// serialises every call.
pub trait Headset: HeadsetState + Send {
    fn as_state(&self) -> &dyn HeadsetState;

    fn set_verbosity(&mut self, level: i32) -> Result<(), HardwareError>;

    fn connect(&mut self, port: &str) -> Result<(), HardwareError>;

    /// Select the montage and reference. `None` keeps the device default.
    fn choose_channels(
        &mut self,
        montage: Option<&str>,
        reference: Option<&str>,
    ) -> Result<(), HardwareError>;

    fn start_acquisition(&mut self) -> Result<(), HardwareError>;

    fn stop_acquisition(&mut self) -> Result<(), HardwareError>;

    fn start_impedance_driver(&mut self) -> Result<(), HardwareError>;

    fn stop_impedance_driver(&mut self) -> Result<(), HardwareError>;

    fn analog_reset_mode(&self) -> i32;

    fn start_analog_reset(&mut self) -> Result<(), HardwareError>;

    /// Process pending input for up to `timeout`, calling `on_sample` once
    /// per sample, synchronously, on the calling thread.
    fn idle(
        &mut self,
        timeout: Duration,
        on_sample: &mut dyn FnMut(&dyn HeadsetState, f64),
    ) -> Result<(), HardwareError>;
}
