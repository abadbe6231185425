//! Deterministic conditioning chain applied once per recording.

pub mod filter;

use tracing::debug;

use self::filter::IirFilter;
use crate::errors::ExtractionError;
use crate::types::AudioSignal;

pub const PRE_EMPHASIS_COEFFICIENT: f64 = 0.97;
pub const TARGET_RMS: f64 = 0.1;
pub const TRIM_TOP_DB: f64 = 30.0;
pub const TRIM_FRAME_LENGTH: usize = 512;
pub const BANDPASS_ORDER: usize = 5;
pub const BANDPASS_LOW_HZ: f64 = 80.0;
pub const BANDPASS_HIGH_HZ: f64 = 4_000.0;

/// Stage names in application order, as recorded in every feature record.
pub const PREPROCESSING_CHAIN: [&str; 5] = [
    "dc_removal",
    "pre_emphasis",
    "rms_normalize",
    "silence_trim",
    "bandpass_80_4000",
];

/// Conditioned signal ready for analysis.
#[derive(Debug, Clone)]
pub struct ConditionedSignal {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    pub chain: Vec<&'static str>,
}

impl ConditionedSignal {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Run the full chain in its fixed order.
pub fn condition(signal: &AudioSignal) -> Result<ConditionedSignal, ExtractionError> {
    if signal.is_empty() {
        return Err(ExtractionError::EmptySignal);
    }
    let sample_rate = signal.sample_rate;
    let nyquist = sample_rate as f64 / 2.0;
    if BANDPASS_HIGH_HZ >= nyquist {
        return Err(ExtractionError::Preprocessing(format!(
            "band edge {} Hz is above Nyquist for {} Hz audio",
            BANDPASS_HIGH_HZ, sample_rate
        )));
    }

    let mut samples = signal.to_f64();
    remove_dc(&mut samples);
    let mut samples = pre_emphasis(&samples, PRE_EMPHASIS_COEFFICIENT);
    normalize_rms(&mut samples, TARGET_RMS);

    let kept = trim_silence(&samples, TRIM_TOP_DB, TRIM_FRAME_LENGTH);
    debug!(
        before = samples.len(),
        after = kept.len(),
        "silence trimmed"
    );

    let mut bandpass = IirFilter::butterworth_bandpass(
        BANDPASS_ORDER,
        BANDPASS_LOW_HZ,
        BANDPASS_HIGH_HZ,
        sample_rate as f64,
    );
    let filtered = bandpass.apply(kept);
    if filtered.iter().any(|sample| !sample.is_finite()) {
        return Err(ExtractionError::Preprocessing(
            "band-pass filter produced non-finite samples".to_string(),
        ));
    }

    Ok(ConditionedSignal {
        samples: filtered,
        sample_rate,
        chain: PREPROCESSING_CHAIN.to_vec(),
    })
}

pub fn remove_dc(samples: &mut [f64]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    samples.iter_mut().for_each(|sample| *sample -= mean);
}

/// `y[n] = x[n] - c * x[n-1]`, with the sample before the signal taken as
/// the linear extrapolation `2 * x[0] - x[1]`.
pub fn pre_emphasis(samples: &[f64], coefficient: f64) -> Vec<f64> {
    let Some(&first) = samples.first() else {
        return Vec::new();
    };
    let initial = match samples.get(1) {
        Some(&second) => 2.0 * first - second,
        None => first,
    };
    std::iter::once(first - coefficient * initial)
        .chain(
            samples
                .windows(2)
                .map(|pair| pair[1] - coefficient * pair[0]),
        )
        .collect()
}

/// Scale to the target RMS. Silent input is left untouched.
pub fn normalize_rms(samples: &mut [f64], target: f64) {
    let rms = crate::audio::framing::rms(samples);
    if rms > 0.0 {
        let gain = target / rms;
        samples.iter_mut().for_each(|sample| *sample *= gain);
    }
}

/// Drop leading and trailing frames quieter than `top_db` below the loudest
/// frame.
///
/// Frames are `frame_length` samples on a grid anchored at the first sample.
pub fn trim_silence(samples: &[f64], top_db: f64, frame_length: usize) -> &[f64] {
    if samples.is_empty() || frame_length == 0 {
        return samples;
    }
    let powers: Vec<f64> = samples
        .chunks(frame_length)
        .map(|frame| frame.iter().map(|s| s * s).sum::<f64>() / frame.len() as f64)
        .collect();
    let loudest = powers.iter().copied().fold(0.0f64, f64::max);
    let reference_db = power_db(loudest);
    let audible = |power: &f64| power_db(*power) - reference_db > -top_db;

    let first = powers.iter().position(audible);
    let last = powers.iter().rposition(audible);
    match (first, last) {
        (Some(first), Some(last)) => {
            let start = first * frame_length;
            let end = ((last + 1) * frame_length).min(samples.len());
            &samples[start..end]
        }
        _ => samples,
    }
}

fn power_db(power: f64) -> f64 {
    10.0 * power.max(1e-10).log10()
}
