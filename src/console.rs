//! Operator-facing output.
//!
//! Tabular impedance output and banners go to stdout, notices to stderr.
//! Each call writes one whole line and flushes, so the two streams stay
//! line-buffered when a supervisor merges them. Tests swap in a capture.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Clone)]
pub struct Console {
    out: Sink,
    err: Sink,
}

impl Console {
    pub fn stdio() -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(io::stdout()))),
            err: Arc::new(Mutex::new(Box::new(io::stderr()))),
        }
    }

    /// Write one line to stdout.
    pub fn line(&self, text: &str) {
        Self::write_line(&self.out, text);
    }

    /// Write one line to stderr.
    pub fn notice(&self, text: &str) {
        Self::write_line(&self.err, text);
    }

    fn write_line(sink: &Sink, text: &str) {
        let mut writer = sink.lock().unwrap_or_else(PoisonError::into_inner);
        // Write failures are logged, never returned
        if writeln!(writer, "{}", text).and_then(|_| writer.flush()).is_err() {
            log::debug!("console write failed: {}", text);
        }
    }
}

#[cfg(test)]
pub use capture::Capture;
