//! Audio codec boundary.
//!
//! The engine never depends on a concrete codec type: it drives encoders
//! and decoders through the narrow traits below, and picks implementations
//! by codec name at construction via [`create_encoder`]/[`create_decoder`].
//!
//! Built in: `pcm_s16le` (f32 ↔ signed 16-bit little-endian) and
//! `pcm_f32le` (pass-through). Compressed codecs are external collaborators
//! that plug in behind the same traits.

mod pcm;

pub use pcm::{PcmF32Decoder, PcmF32Encoder, PcmS16Decoder, PcmS16Encoder};

use crate::audio::SampleBuffer;
use crate::error::{Result, VoicewireError};

/// Encodes device samples into wire packets.
pub trait AudioEncoder: Send {
    /// Stage samples for encoding.
    fn encode(&mut self, samples: &[f32]);

    /// Take the next complete wire packet, if one is ready.
    fn next_packet(&mut self) -> Option<Vec<u8>>;

    /// Wire codec name, as negotiated with the server.
    fn codec(&self) -> &str;

    /// Sample rate of the samples fed to [`encode`](Self::encode).
    fn input_sample_rate(&self) -> u32;

    /// Sample rate of the encoded wire stream.
    fn output_sample_rate(&self) -> u32;
}

/// Decodes wire packets into device samples.
///
/// Decoded output is staged in a [`SampleBuffer`] the caller drains with
/// `peek`/`consume`.
pub trait AudioDecoder: Send {
    /// Decode one wire packet into the output buffer.
    fn decode(&mut self, packet: &[u8]) -> Result<()>;

    /// The staged decoded samples.
    fn output(&mut self) -> &mut SampleBuffer;

    /// Wire codec name, as negotiated with the server.
    fn codec(&self) -> &str;

    /// Sample rate of the encoded wire stream.
    fn input_sample_rate(&self) -> u32;

    /// Sample rate of the decoded output.
    fn output_sample_rate(&self) -> u32;
}

/// Create an encoder by codec name.
///
/// `input_rate` is the device rate, `output_rate` the wire rate.
pub fn create_encoder(
    name: &str,
    input_rate: u32,
    output_rate: u32,
) -> Result<Box<dyn AudioEncoder>> {
    match name {
        "pcm_s16le" => Ok(Box::new(PcmS16Encoder::new(input_rate, output_rate))),
        "pcm_f32le" => Ok(Box::new(PcmF32Encoder::new(input_rate, output_rate))),
        other => Err(VoicewireError::UnknownCodec(other.to_string())),
    }
}

/// Create a decoder by codec name.
///
/// `input_rate` is the wire rate, `output_rate` the device rate.
pub fn create_decoder(
    name: &str,
    input_rate: u32,
    output_rate: u32,
) -> Result<Box<dyn AudioDecoder>> {
    match name {
        "pcm_s16le" => Ok(Box::new(PcmS16Decoder::new(input_rate, output_rate))),
        "pcm_f32le" => Ok(Box::new(PcmF32Decoder::new(input_rate, output_rate))),
        other => Err(VoicewireError::UnknownCodec(other.to_string())),
    }
}
