use anyhow::{ensure, Result};
use dasp::{interpolate::sinc::Sinc, ring_buffer, signal, Signal};

use crate::preprocessing::filter::{FilterKind, IirFilter};

/// Taps held by the sinc interpolator's ring buffer.
const SINC_DEPTH: usize = 64;
/// Anti-alias cutoff as a share of the target rate when downsampling.
const ANTI_ALIAS_FRACTION: f64 = 0.45;
const ANTI_ALIAS_ORDER: usize = 8;

/// Band-limited resample of `samples` from `source_rate` to `target_rate`.
///
/// Output length is `ceil(len * target / source)`.
pub fn sinc_resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    ensure!(source_rate > 0, "source sample rate must be positive");
    ensure!(target_rate > 0, "target sample rate must be positive");
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples.to_vec());
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = ((samples.len() as f64) * ratio).ceil().max(1.0) as usize;

    // The interpolator's sinc kernel is fixed at the source Nyquist, so
    // content above the target Nyquist is removed before decimating.
    let band_limited = if target_rate < source_rate {
        anti_alias(samples, source_rate, target_rate)
    } else {
        samples.to_vec()
    };

    let source = signal::from_iter(band_limited.into_iter().map(|sample| [sample]));
    let sinc = Sinc::new(ring_buffer::Fixed::from(vec![[0.0f32]; SINC_DEPTH]));
    let converted = source.from_hz_to_hz(sinc, source_rate as f64, target_rate as f64);

    Ok(converted.take(output_len).map(|[sample]| sample).collect())
}

fn anti_alias(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let mut lowpass = IirFilter::butterworth(
        ANTI_ALIAS_ORDER,
        ANTI_ALIAS_FRACTION * target_rate as f64,
        source_rate as f64,
        FilterKind::Lowpass,
    );
    let wide: Vec<f64> = samples.iter().map(|&sample| sample as f64).collect();
    lowpass
        .apply(&wide)
        .into_iter()
        .map(|sample| sample as f32)
        .collect()
}
