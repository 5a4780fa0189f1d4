//! Test doubles for the hardware and streaming collaborators.
//!
//! `MockHeadset` and `MockBackend` share one call log so tests can assert the
//! relative order of hardware calls and outlet destruction.

use crate::error::HardwareError;
use crate::headset::{Headset, HeadsetState, SourceInfo};
use crate::publisher::{Outlet, StreamBackend, StreamInfo};
use crate::session::DeviceSettings;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn mock_settings() -> DeviceSettings {
    DeviceSettings {
        port: "mock".to_string(),
        montage: None,
        reference: None,
        verbosity: 2,
    }
}

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Inspection and scripting handle for a `MockHeadset` that has been moved
/// into a session.
#[derive(Clone, Default)]
pub struct MockHandle {
    pub log: CallLog,
    pending: Arc<Mutex<VecDeque<f64>>>,
    grace: Arc<Mutex<VecDeque<f64>>>,
    failing: Arc<Mutex<HashSet<&'static str>>>,
    idle_calls: Arc<AtomicUsize>,
}

impl MockHandle {
    pub fn calls(&self) -> Vec<String> {
        self.log.entries()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.as_str() == entry)
    }

    /// Make every later call of `operation` fail
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn push_samples(&self, offsets: &[f64]) {
        self.pending.lock().unwrap().extend(offsets.iter().copied());
    }

    /// Samples that arrive only during a blocking `idle`, such as the
    /// shutdown grace window
    pub fn push_grace_samples(&self, offsets: &[f64]) {
        self.grace.lock().unwrap().extend(offsets.iter().copied());
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn idle_calls(&self) -> usize {
        self.idle_calls.load(Ordering::SeqCst)
    }
}

pub struct MockHeadset {
    handle: MockHandle,
    channels: Vec<String>,
    signals: Vec<f64>,
    impedance_on: bool,
    acquisition_stopped: bool,
}

impl MockHeadset {
    pub fn new(channel_count: usize) -> (Self, MockHandle) {
        let handle = MockHandle::default();
        let headset = Self {
            handle: handle.clone(),
            channels: (0..channel_count).map(|i| format!("S{}-Pz", i + 1)).collect(),
            signals: vec![0.0; channel_count],
            impedance_on: false,
            acquisition_stopped: false,
        };
        (headset, handle)
    }

    fn record(&self, operation: &'static str, entry: String) -> Result<(), HardwareError> {
        self.handle.log.push(entry);
        if self.handle.failing.lock().unwrap().contains(operation) {
            Err(HardwareError::new(operation, "injected failure"))
        } else {
            Ok(())
        }
    }
}

impl Drop for MockHeadset {
    fn drop(&mut self) {
        self.handle.log.push("deleted");
    }
}

impl HeadsetState for MockHeadset {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn sampling_rate(&self) -> f64 {
        300.0
    }

    fn channel_name(&self, index: usize) -> String {
        self.channels[index].clone()
    }

    fn channel_signal(&self, index: usize) -> f64 {
        self.signals[index]
    }

    fn sources(&self) -> Vec<SourceInfo> {
        let mut sources: Vec<SourceInfo> = (0..self.channels.len())
            .map(|i| SourceInfo {
                name: format!("S{}", i + 1),
                is_referential_eeg: true,
                is_factory_reference: false,
                impedance: if self.impedance_on { 1.5 + i as f64 } else { 0.0 },
            })
            .collect();
        sources.push(SourceInfo {
            name: "Pz".to_string(),
            is_referential_eeg: true,
            is_factory_reference: true,
            impedance: 0.0,
        });
        sources.push(SourceInfo {
            name: "TRG".to_string(),
            is_referential_eeg: false,
            is_factory_reference: false,
            impedance: 0.0,
        });
        sources
    }

    fn impedance_cmf(&self) -> f64 {
        0.75
    }

    fn reference_string(&self) -> String {
        "Pz".to_string()
    }

    fn factory_reference_string(&self) -> String {
        "Pz".to_string()
    }

    fn info_string(&self) -> String {
        "Mock headset".to_string()
    }
}

impl Headset for MockHeadset {
    fn as_state(&self) -> &dyn HeadsetState {
        self
    }

    fn set_verbosity(&mut self, level: i32) -> Result<(), HardwareError> {
        self.record("set_verbosity", format!("set_verbosity {}", level))
    }

    fn connect(&mut self, port: &str) -> Result<(), HardwareError> {
        self.record("connect", format!("connect {}", port))
    }

    fn choose_channels(
        &mut self,
        _montage: Option<&str>,
        _reference: Option<&str>,
    ) -> Result<(), HardwareError> {
        self.record("choose_channels", "choose_channels".to_string())
    }

    fn start_acquisition(&mut self) -> Result<(), HardwareError> {
        self.record("start_acquisition", "start_acquisition".to_string())?;
        self.acquisition_stopped = false;
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<(), HardwareError> {
        self.record("stop_acquisition", "stop_acquisition".to_string())?;
        self.acquisition_stopped = true;
        Ok(())
    }

    fn start_impedance_driver(&mut self) -> Result<(), HardwareError> {
        self.record("start_impedance_driver", "start_impedance_driver".to_string())?;
        self.impedance_on = true;
        Ok(())
    }

    fn stop_impedance_driver(&mut self) -> Result<(), HardwareError> {
        self.record("stop_impedance_driver", "stop_impedance_driver".to_string())?;
        self.impedance_on = false;
        Ok(())
    }

    fn analog_reset_mode(&self) -> i32 {
        0
    }

    fn start_analog_reset(&mut self) -> Result<(), HardwareError> {
        self.record("start_analog_reset", "start_analog_reset".to_string())
    }

    fn idle(
        &mut self,
        timeout: Duration,
        on_sample: &mut dyn FnMut(&dyn HeadsetState, f64),
    ) -> Result<(), HardwareError> {
        self.handle.idle_calls.fetch_add(1, Ordering::SeqCst);
        if timeout.is_zero() {
            if self.acquisition_stopped {
                self.handle.log.push("poll_after_stop");
            }
        } else {
            self.handle.log.push("grace_idle");
            let grace: Vec<f64> = self.handle.grace.lock().unwrap().drain(..).collect();
            self.handle.pending.lock().unwrap().extend(grace);
        }
        if self.handle.failing.lock().unwrap().contains("idle") {
            return Err(HardwareError::new("Idle", "injected failure"));
        }

        loop {
            let next = self.handle.pending.lock().unwrap().pop_front();
            let Some(offset) = next else { break };
            for (i, value) in self.signals.iter_mut().enumerate() {
                *value = offset * 10.0 + i as f64;
            }
            on_sample(&*self, offset);
        }
        Ok(())
    }
}

/// Streaming backend that records rows and logs outlet destruction
#[derive(Clone, Default)]
pub struct MockBackend {
    pub log: CallLog,
    pub rows: Arc<Mutex<Vec<Vec<f32>>>>,
    pub infos: Arc<Mutex<Vec<StreamInfo>>>,
    pub fail_create: bool,
}

impl MockBackend {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<Vec<f32>> {
        self.rows.lock().unwrap().clone()
    }
}

struct MockOutlet {
    log: CallLog,
    rows: Arc<Mutex<Vec<Vec<f32>>>>,
}

impl Outlet for MockOutlet {
    fn push_sample(&mut self, row: &[f32]) -> Result<(), String> {
        self.rows.lock().unwrap().push(row.to_vec());
        Ok(())
    }
}

impl Drop for MockOutlet {
    fn drop(&mut self) {
        self.log.push("outlet_destroyed");
    }
}

impl StreamBackend for MockBackend {
    fn create_outlet(&self, info: &StreamInfo) -> Result<Box<dyn Outlet>, String> {
        if self.fail_create {
            return Err("mock outlet refused".to_string());
        }
        self.infos.lock().unwrap().push(info.clone());
        self.log.push("outlet_created");
        Ok(Box::new(MockOutlet {
            log: self.log.clone(),
            rows: Arc::clone(&self.rows),
        }))
    }
}
