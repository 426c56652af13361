//! Sample-rate conversion and channel mixing.
//!
//! The satellite wire format is **16 kHz mono**.  Capture devices deliver
//! whatever rate the platform prefers (44.1 kHz and 48 kHz are the usual
//! suspects), so every outbound batch goes through [`resample`] first.
//!
//! 1. [`stereo_to_mono`]: downmix interleaved channels (legacy capture tier).
//! 2. [`resample`]: linear-interpolation rate conversion.

use std::borrow::Cow;

/// Rate of every PCM frame put on the wire.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.  A trailing partial frame
/// is ignored.
///
/// ```rust
/// use voice_satellite::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!(mono[0].abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample `samples` from `from_rate` Hz to `to_rate` Hz.
///
/// Produces `round(len * to_rate / from_rate)` samples.  Output sample `i`
/// sits at source position `i * from_rate / to_rate` and is linearly
/// interpolated between the two neighbouring input samples; the upper
/// neighbour is clamped to the last input sample.
///
/// Equal rates return the input borrowed, without copying.
///
/// # Panics
///
/// Panics if either rate is zero.
///
/// ```rust
/// use voice_satellite::audio::resample;
///
/// let hi = vec![0.5_f32; 480]; // 10 ms @ 48 kHz
/// assert_eq!(resample(&hi, 48_000, 16_000).len(), 160);
/// ```
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Cow<'_, [f32]> {
    assert!(
        from_rate > 0 && to_rate > 0,
        "sample rates must be > 0 (got {from_rate} -> {to_rate})"
    );

    if from_rate == to_rate {
        return Cow::Borrowed(samples);
    }

    if samples.is_empty() {
        return Cow::Owned(Vec::new());
    }

    let step = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    let last = samples.len() - 1;

    let output = (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * step;
            let low = (src_pos.floor() as usize).min(last);
            let high = (low + 1).min(last);
            let frac = (src_pos - low as f64) as f32;
            samples[low] * (1.0 - frac) + samples[high] * frac
        })
        .collect();

    Cow::Owned(output)
}

/// Shorthand for [`resample`] into [`TARGET_SAMPLE_RATE`].
pub fn resample_to_16k(samples: &[f32], from_rate: u32) -> Cow<'_, [f32]> {
    resample(samples, from_rate, TARGET_SAMPLE_RATE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
