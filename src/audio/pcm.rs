//! Float → 16-bit PCM quantisation.
//!
//! Negative samples scale by 32768 and non-negative samples by 32767, so
//! `-1.0` maps to `i16::MIN` and `1.0` to `i16::MAX`.  Values are clamped to
//! `[-1.0, 1.0]` first and truncated toward zero.

/// Quantise one sample.
///
/// ```rust
/// use voice_satellite::audio::float_to_pcm16;
///
/// assert_eq!(float_to_pcm16(1.0), 0x7FFF);
/// assert_eq!(float_to_pcm16(-1.0), i16::MIN);
/// assert_eq!(float_to_pcm16(0.0), 0);
/// ```
pub fn float_to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}

/// Quantise a block of samples.
pub fn encode_pcm16(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(float_to_pcm16).collect()
}

/// Append the little-endian wire bytes of `samples` to `out`.
pub fn write_pcm16_le(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&float_to_pcm16(s).to_le_bytes());
    }
}
