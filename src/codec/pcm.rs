//! Built-in PCM codecs.
//!
//! `pcm_s16le` converts between f32 samples and signed 16-bit little-endian
//! wire data; `pcm_f32le` passes f32 samples straight through. Neither
//! resamples: rate conversion belongs to the external codec collaborators.

use super::{AudioDecoder, AudioEncoder};
use crate::audio::SampleBuffer;
use crate::error::{Result, VoicewireError};

/// Upper bound for one encoded packet, so a burst of staged audio splits
/// across multiple binary frames.
const MAX_PACKET_BYTES: usize = 4096;

fn sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn i16_to_sample(raw: i16) -> f32 {
    raw as f32 / -(i16::MIN as f32)
}

/// f32 → i16 little-endian encoder.
pub struct PcmS16Encoder {
    staged: Vec<u8>,
    input_rate: u32,
    output_rate: u32,
}

impl PcmS16Encoder {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            staged: Vec::new(),
            input_rate,
            output_rate,
        }
    }
}

impl AudioEncoder for PcmS16Encoder {
    fn encode(&mut self, samples: &[f32]) {
        self.staged.reserve(samples.len() * 2);
        for &s in samples {
            self.staged.extend_from_slice(&sample_to_i16(s).to_le_bytes());
        }
    }

    fn next_packet(&mut self) -> Option<Vec<u8>> {
        if self.staged.is_empty() {
            return None;
        }
        let take = self.staged.len().min(MAX_PACKET_BYTES);
        let rest = self.staged.split_off(take);
        Some(std::mem::replace(&mut self.staged, rest))
    }

    fn codec(&self) -> &str {
        "pcm_s16le"
    }

    fn input_sample_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_sample_rate(&self) -> u32 {
        self.output_rate
    }
}

/// i16 little-endian → f32 decoder.
pub struct PcmS16Decoder {
    out: SampleBuffer,
    input_rate: u32,
    output_rate: u32,
}

impl PcmS16Decoder {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            out: SampleBuffer::new(),
            input_rate,
            output_rate,
        }
    }
}

impl AudioDecoder for PcmS16Decoder {
    fn decode(&mut self, packet: &[u8]) -> Result<()> {
        if packet.len() % 2 != 0 {
            return Err(VoicewireError::Protocol(format!(
                "pcm_s16le packet of {} bytes is not sample-aligned",
                packet.len()
            )));
        }
        let region = self.out.begin_write(packet.len() / 2);
        for (slot, pair) in region.iter_mut().zip(packet.chunks_exact(2)) {
            *slot = i16_to_sample(i16::from_le_bytes([pair[0], pair[1]]));
        }
        self.out.commit(packet.len() / 2)
    }

    fn output(&mut self) -> &mut SampleBuffer {
        &mut self.out
    }

    fn codec(&self) -> &str {
        "pcm_s16le"
    }

    fn input_sample_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_sample_rate(&self) -> u32 {
        self.output_rate
    }
}

/// f32 little-endian pass-through encoder.
pub struct PcmF32Encoder {
    staged: Vec<u8>,
    input_rate: u32,
    output_rate: u32,
}

impl PcmF32Encoder {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            staged: Vec::new(),
            input_rate,
            output_rate,
        }
    }
}

impl AudioEncoder for PcmF32Encoder {
    fn encode(&mut self, samples: &[f32]) {
        self.staged.reserve(samples.len() * 4);
        for &s in samples {
            self.staged.extend_from_slice(&s.to_le_bytes());
        }
    }

    fn next_packet(&mut self) -> Option<Vec<u8>> {
        if self.staged.is_empty() {
            return None;
        }
        let take = self.staged.len().min(MAX_PACKET_BYTES);
        let rest = self.staged.split_off(take);
        Some(std::mem::replace(&mut self.staged, rest))
    }

    fn codec(&self) -> &str {
        "pcm_f32le"
    }

    fn input_sample_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_sample_rate(&self) -> u32 {
        self.output_rate
    }
}

/// f32 little-endian pass-through decoder.
pub struct PcmF32Decoder {
    out: SampleBuffer,
    input_rate: u32,
    output_rate: u32,
}

impl PcmF32Decoder {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            out: SampleBuffer::new(),
            input_rate,
            output_rate,
        }
    }
}

impl AudioDecoder for PcmF32Decoder {
    fn decode(&mut self, packet: &[u8]) -> Result<()> {
        if packet.len() % 4 != 0 {
            return Err(VoicewireError::Protocol(format!(
                "pcm_f32le packet of {} bytes is not sample-aligned",
                packet.len()
            )));
        }
        let region = self.out.begin_write(packet.len() / 4);
        for (slot, raw) in region.iter_mut().zip(packet.chunks_exact(4)) {
            *slot = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        }
        self.out.commit(packet.len() / 4)
    }

    fn output(&mut self) -> &mut SampleBuffer {
        &mut self.out
    }

    fn codec(&self) -> &str {
        "pcm_f32le"
    }

    fn input_sample_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_sample_rate(&self) -> u32 {
        self.output_rate
    }
}
