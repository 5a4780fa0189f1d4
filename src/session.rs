//! # Device Session
//!
//! Owns the headset connection for the whole run. Every hardware call goes
//! through one mutex, held for that single call only, so the acquisition
//! loop, the impedance worker and the command dispatcher never interleave
//! inside the collaborator.
//!
//! The registered sample callback lives under the same lock and runs inside
//! `idle`, on the polling thread. Callbacks therefore receive the device
//! state directly and must not call back into the session.

use crate::error::{BridgeError, HardwareError};
use crate::headset::{Headset, HeadsetState, SampleCallback};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How to reach and configure the headset
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub port: String,
    pub montage: Option<String>,
    pub reference: Option<String>,
    pub verbosity: i32,
}

struct SessionInner {
    headset: Box<dyn Headset>,
    callback: Option<SampleCallback>,
}

pub struct DeviceSession {
    inner: Mutex<Option<SessionInner>>,
}

impl DeviceSession {
    /// Connect and configure the headset.
    ///
    /// On failure the headset is dropped here, before any thread exists.
    pub fn configure(
        mut headset: Box<dyn Headset>,
        settings: &DeviceSettings,
    ) -> Result<Self, BridgeError> {
        headset.set_verbosity(settings.verbosity)?;

        headset
            .connect(&settings.port)
            .map_err(|e| BridgeError::Connection {
                port: settings.port.clone(),
                reason: e.message,
            })?;

        headset.choose_channels(settings.montage.as_deref(), settings.reference.as_deref())?;

        log::info!(
            "Headset configured on {}: {} channels at {} Hz",
            settings.port,
            headset.channel_count(),
            headset.sampling_rate()
        );

        Ok(Self {
            inner: Mutex::new(Some(SessionInner {
                headset,
                callback: None,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionInner>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn call<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut SessionInner) -> Result<T, HardwareError>,
    ) -> Result<T, HardwareError> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(inner) => f(inner),
            None => Err(HardwareError::session_closed(operation)),
        }
    }

    /// Read device state under the session lock.
    pub fn read<T>(&self, f: impl FnOnce(&dyn HeadsetState) -> T) -> Result<T, HardwareError> {
        self.call("Read", |inner| Ok(f(inner.headset.as_state())))
    }

    pub fn start_acquisition(&self) -> Result<(), HardwareError> {
        self.call("StartDataAcquisition", |inner| inner.headset.start_acquisition())
    }

    pub fn stop_acquisition(&self) -> Result<(), HardwareError> {
        self.call("StopDataAcquisition", |inner| inner.headset.stop_acquisition())
    }

    pub fn start_impedance(&self) -> Result<(), HardwareError> {
        self.call("StartImpedanceDriver", |inner| inner.headset.start_impedance_driver())
    }

    pub fn stop_impedance(&self) -> Result<(), HardwareError> {
        self.call("StopImpedanceDriver", |inner| inner.headset.stop_impedance_driver())
    }

    pub fn analog_reset_mode(&self) -> Result<i32, HardwareError> {
        self.call("GetAnalogResetMode", |inner| Ok(inner.headset.analog_reset_mode()))
    }

    pub fn start_analog_reset(&self) -> Result<(), HardwareError> {
        self.call("StartAnalogReset", |inner| inner.headset.start_analog_reset())
    }

    /// Replace the sample callback. `None` unregisters it; samples delivered
    /// without a callback are dropped.
    pub fn set_sample_callback(&self, callback: Option<SampleCallback>) -> Result<(), HardwareError> {
        self.call("SetSampleCallback", |inner| {
            inner.callback = callback;
            Ok(())
        })
    }

    /// Poll the headset, delivering pending samples to the current callback.
    pub fn idle(&self, timeout: Duration) -> Result<(), HardwareError> {
        self.call("Idle", |inner| {
            let SessionInner { headset, callback } = inner;
            headset.idle(timeout, &mut |state: &dyn HeadsetState, offset: f64| {
                if let Some(cb) = callback.as_mut() {
                    cb(state, offset);
                }
            })
        })
    }

    /// Disconnect and free the headset. Only the first call does anything;
    /// every later hardware call fails with a closed-session error.
    pub fn delete(&self) -> bool {
        let taken = self.lock().take();
        match taken {
            Some(inner) => {
                drop(inner);
                log::info!("Headset session deleted");
                true
            }
            None => false,
        }
    }
}
