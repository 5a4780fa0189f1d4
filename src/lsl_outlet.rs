//! Lab Streaming Layer backend (`lsl` feature).

use crate::publisher::{Outlet, StreamBackend, StreamInfo};
use lsl::Pushable;

pub struct LslBackend;

struct LslOutlet {
    outlet: lsl::StreamOutlet,
    row: Vec<f32>,
}

// SAFETY: liblsl outlets may be used from any thread; the publisher also
// serialises every push behind its own mutex.
unsafe impl Send for LslOutlet {}

impl Outlet for LslOutlet {
    fn push_sample(&mut self, row: &[f32]) -> Result<(), String> {
        self.row.clear();
        self.row.extend_from_slice(row);
        self.outlet
            .push_sample(&self.row)
            .map_err(|e| format!("{:?}", e))
    }
}

impl StreamBackend for LslBackend {
    fn create_outlet(&self, info: &StreamInfo) -> Result<Box<dyn Outlet>, String> {
        let mut stream_info = lsl::StreamInfo::new(
            &info.name,
            &info.content_type,
            info.channel_count as u32,
            info.sampling_rate,
            lsl::ChannelFormat::Float32,
            &info.source_id,
        )
        .map_err(|e| format!("{:?}", e))?;

        let mut desc = stream_info.desc();
        desc.append_child_value("manufacturer", &info.manufacturer);

        let mut channels = desc.append_child("channels");
        for channel in &info.channels {
            let mut element = channels.append_child("channel");
            element.append_child_value("label", &channel.label);
            element.append_child_value("unit", &channel.unit);
            element.append_child_value("type", &channel.kind);
        }

        let mut reference = desc.append_child("reference");
        reference.append_child_value("label", &info.reference);

        let outlet = lsl::StreamOutlet::new(
            &stream_info,
            info.chunk_size as i32,
            info.max_buffered_seconds as i32,
        )
        .map_err(|e| format!("{:?}", e))?;

        log::info!(
            "LSL outlet '{}' ({}) created: {} channels at {} Hz",
            info.name,
            info.source_id,
            info.channel_count,
            info.sampling_rate
        );

        Ok(Box::new(LslOutlet {
            outlet,
            row: Vec::with_capacity(info.channel_count),
        }))
    }
}
