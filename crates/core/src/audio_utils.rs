use base64::Engine;

use crate::error::CodecError;

/// Sample rate agreed with the Live API for both directions.
pub const LIVE_PCM16_SAMPLE_RATE: u32 = 24000;
/// MIME tag attached to every outbound audio chunk.
pub const LIVE_PCM16_MIME_TYPE: &str = "audio/pcm";
/// Samples per captured block handed to the capture pipeline.
pub const CAPTURE_BLOCK_SIZE: usize = 128;

/// Converts one float sample to PCM16.
///
/// The sample is clamped to [-1, 1]; negative values scale by 32768 and
/// non-negative values by 32767 so both ends of the signed range are reachable
/// without overflow.
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

/// Inverse of [`f32_to_i16`]: the same asymmetric scale factors, so a round
/// trip stays within half a quantization step.
pub fn i16_to_f32(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32.iter().map(|&sample| f32_to_i16(sample)).collect()
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16.iter().map(|&sample| i16_to_f32(sample)).collect()
}

/// Little-endian byte layout of a PCM16 buffer.
pub fn i16_to_le_bytes(pcm16: &[i16]) -> Vec<u8> {
    pcm16
        .iter()
        .flat_map(|&sample| sample.to_le_bytes())
        .collect()
}

/// Encodes float samples as base64 PCM16, ready for a `realtimeInput` chunk.
pub fn encode_f32_to_base64_i16(pcm32: &[f32]) -> String {
    encode_i16(&convert_f32_to_i16(pcm32))
}

pub fn encode_i16(pcm16: &[i16]) -> String {
    base64::engine::general_purpose::STANDARD.encode(i16_to_le_bytes(pcm16))
}

/// Decodes a base64 PCM16 payload. Invalid base64 and odd byte counts are errors.
pub fn decode_i16(base64_fragment: &str) -> Result<Vec<i16>, CodecError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(base64_fragment)?;
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

/// Decodes a base64 PCM16 payload straight to float samples in [-1, 1].
pub fn decode_f32_from_base64_i16(base64_fragment: &str) -> Result<Vec<f32>, CodecError> {
    decode_i16(base64_fragment).map(|pcm16| convert_i16_to_f32(&pcm16))
}
