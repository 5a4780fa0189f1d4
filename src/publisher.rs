//! # Stream Publisher Module
//!
//! Describes the published stream and wraps the streaming collaborator.
//!
//! ## Key Components
//! - `StreamInfo`: stream metadata derived from the configured headset
//! - `StreamBackend` / `Outlet`: the streaming-library boundary
//! - `StreamPublisher`: the single outlet of a run, destroyed exactly once
//! - `LogBackend`: stand-in backend used when no streaming library is built in
//!
//! ## Metadata Layout
//! ```text
//! desc
//! ├── manufacturer      "WearableSensing"
//! ├── channels
//! │   └── channel × N   label, unit="microvolts", type="EEG"
//! └── reference
//!     └── label
//! ```

use crate::config::Config;
use crate::error::BridgeError;
use crate::headset::HeadsetState;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const CONTENT_TYPE: &str = "EEG";
pub const CHANNEL_UNIT: &str = "microvolts";
const SOURCE_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMeta {
    pub label: String,
    pub unit: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub name: String,
    pub content_type: String,
    pub channel_count: usize,
    pub sampling_rate: f64,
    pub source_id: String,
    pub manufacturer: String,
    pub channels: Vec<ChannelMeta>,
    pub reference: String,
    pub chunk_size: u32,
    pub max_buffered_seconds: u32,
}

impl StreamInfo {
    /// Build the stream description from the configured headset.
    pub fn from_device(state: &dyn HeadsetState, name: &str, config: &Config) -> Self {
        let channel_count = state.channel_count();
        let channels = (0..channel_count)
            .map(|i| ChannelMeta {
                label: short_label(&state.channel_name(i)),
                unit: CHANNEL_UNIT.to_string(),
                kind: CONTENT_TYPE.to_string(),
            })
            .collect();

        Self {
            name: name.to_string(),
            content_type: CONTENT_TYPE.to_string(),
            channel_count,
            sampling_rate: state.sampling_rate(),
            source_id: random_source_id(SOURCE_ID_LEN),
            manufacturer: config.manufacturer.clone(),
            channels,
            reference: state.reference_string(),
            chunk_size: config.outlet_chunk_size,
            max_buffered_seconds: config.outlet_buffer_seconds,
        }
    }
}

/// Channel label without the reference part: `Fz-Pz` becomes `Fz`.
pub fn short_label(name: &str) -> String {
    name.split('-')
        .find(|part| !part.is_empty())
        .unwrap_or(name)
        .to_string()
}

/// Random alphabetic source identifier
pub fn random_source_id(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// One open outlet of the streaming library
pub trait Outlet: Send {
    fn push_sample(&mut self, row: &[f32]) -> Result<(), String>;
}

/// Factory for outlets
pub trait StreamBackend {
    fn create_outlet(&self, info: &StreamInfo) -> Result<Box<dyn Outlet>, String>;
}

/// The run's outlet. Shared by every forwarder; `destroy` releases the
/// outlet once, after which `publish` is a no-op.
pub struct StreamPublisher {
    name: String,
    outlet: Mutex<Option<Box<dyn Outlet>>>,
    published: AtomicU64,
}

impl StreamPublisher {
    pub fn create(backend: &dyn StreamBackend, info: &StreamInfo) -> Result<Self, BridgeError> {
        let outlet = backend
            .create_outlet(info)
            .map_err(BridgeError::StreamSetup)?;

        Ok(Self {
            name: info.name.clone(),
            outlet: Mutex::new(Some(outlet)),
            published: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Outlet>>> {
        self.outlet.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push one row. Failures are not reported to the caller.
    pub fn publish(&self, row: &[f32]) {
        let mut guard = self.lock();
        if let Some(outlet) = guard.as_mut() {
            match outlet.push_sample(row) {
                Ok(()) => {
                    self.published.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => log::debug!("push to stream '{}' failed: {}", self.name, e),
            }
        }
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Close the outlet. Returns `false` if it was already closed.
    pub fn destroy(&self) -> bool {
        let taken = self.lock().take();
        match taken {
            Some(outlet) => {
                drop(outlet);
                log::info!(
                    "Stream '{}' destroyed after {} samples",
                    self.name,
                    self.published()
                );
                true
            }
            None => false,
        }
    }
}

/// Backend that only reports throughput through the log
pub struct LogBackend;

struct LogOutlet {
    name: String,
    report_every: u64,
    count: u64,
}

impl Outlet for LogOutlet {
    fn push_sample(&mut self, row: &[f32]) -> Result<(), String> {
        self.count += 1;
        if self.count % self.report_every == 0 {
            log::debug!(
                "stream '{}': {} samples, last row {:?}",
                self.name,
                self.count,
                row
            );
        }
        Ok(())
    }
}

impl StreamBackend for LogBackend {
    fn create_outlet(&self, info: &StreamInfo) -> Result<Box<dyn Outlet>, String> {
        log::warn!(
            "Built without a streaming library; stream '{}' is only reported in the log",
            info.name
        );
        let labels: Vec<String> = info
            .channels
            .iter()
            .map(|c| format!("{} ({}, {})", c.label, c.kind, c.unit))
            .collect();
        log::info!(
            "Stream '{}' [{}] from {} ({}): {} channels at {} Hz, reference {}, chunk {}, buffer {} s: {}",
            info.name,
            info.content_type,
            info.manufacturer,
            info.source_id,
            info.channel_count,
            info.sampling_rate,
            info.reference,
            info.chunk_size,
            info.max_buffered_seconds,
            labels.join(", ")
        );
        Ok(Box::new(LogOutlet {
            name: info.name.clone(),
            report_every: info.sampling_rate.max(1.0) as u64,
            count: 0,
        }))
    }
}

/// The backend compiled into this binary
pub fn default_backend() -> Box<dyn StreamBackend> {
    #[cfg(feature = "lsl")]
    {
        Box::new(crate::lsl_outlet::LslBackend)
    }
    #[cfg(not(feature = "lsl"))]
    {
        Box::new(LogBackend)
    }
}
