//! Sample Forwarder: copies each delivered sample into a reusable row and
//! pushes it to the stream publisher.
//!
//! One forwarder lives for the whole session. `SharedForwarder` hands out
//! callbacks that all write through it, so re-registering streaming after an
//! impedance check keeps the same row buffer.

use crate::headset::{HeadsetState, SampleCallback};
use crate::publisher::StreamPublisher;
use std::sync::{Arc, Mutex, PoisonError};

pub struct SampleForwarder {
    publisher: Arc<StreamPublisher>,
    buffer: Vec<f32>,
}

impl SampleForwarder {
    pub fn new(publisher: Arc<StreamPublisher>) -> Self {
        Self {
            publisher,
            buffer: Vec::new(),
        }
    }

    pub fn on_sample(&mut self, state: &dyn HeadsetState, _offset: f64) {
        let channel_count = state.channel_count();
        // Channel count is fixed after configuration, so this only runs for
        // the first sample of the session
        if self.buffer.len() != channel_count {
            self.buffer.resize(channel_count, 0.0);
        }

        for (index, value) in self.buffer.iter_mut().enumerate() {
            *value = state.channel_signal(index) as f32;
        }

        self.publisher.publish(&self.buffer);
    }

    pub fn into_shared(self) -> SharedForwarder {
        SharedForwarder(Arc::new(Mutex::new(self)))
    }
}

/// Session-wide handle to a single `SampleForwarder`
#[derive(Clone)]
pub struct SharedForwarder(Arc<Mutex<SampleForwarder>>);

impl SharedForwarder {
    /// A sample callback that forwards through the shared forwarder.
    pub fn callback(&self) -> SampleCallback {
        let forwarder = Arc::clone(&self.0);
        Box::new(move |state: &dyn HeadsetState, offset: f64| {
            forwarder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_sample(state, offset)
        })
    }
}
