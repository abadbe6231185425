//! Mel-cepstral coefficients with first and second time derivatives.

use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::WindowType;
use ndarray::{Array1, Array2, Axis};

use super::spectrogram::stft;
use super::statistics::MomentSet;
use crate::config::FrameLayout;
use crate::errors::BranchError;
use crate::types::FeatureRecord;

pub const MFCC_COUNT: usize = 13;
pub const MEL_BANDS: usize = 40;
/// Frames on each side entering the delta regression.
pub const DELTA_WINDOW: usize = 4;
const MIN_FREQ: f64 = 20.0;
const MEL_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct CepstralReport {
    pub mfcc: [MomentSet; MFCC_COUNT],
    pub delta: [MomentSet; MFCC_COUNT],
    pub delta_delta: [MomentSet; MFCC_COUNT],
}

impl CepstralReport {
    pub fn zeros() -> Self {
        Self {
            mfcc: [MomentSet::zeros(); MFCC_COUNT],
            delta: [MomentSet::zeros(); MFCC_COUNT],
            delta_delta: [MomentSet::zeros(); MFCC_COUNT],
        }
    }

    /// `mfcc_{i}`, `dmfcc_{i}` and `ddmfcc_{i}` for i in 1..=13.
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        for index in 0..MFCC_COUNT {
            let number = index + 1;
            record.extend_numbers(self.mfcc[index].entries(&format!("mfcc_{}", number)));
            record.extend_numbers(self.delta[index].entries(&format!("dmfcc_{}", number)));
            record.extend_numbers(
                self.delta_delta[index].entries(&format!("ddmfcc_{}", number)),
            );
        }
        record
    }
}

pub fn analyze(
    samples: &[f64],
    sample_rate: u32,
    layout: FrameLayout,
) -> Result<CepstralReport, BranchError> {
    let required = 2 * DELTA_WINDOW * layout.hop;
    if samples.len() < required {
        return Err(BranchError::TooShort {
            samples: samples.len(),
            required,
        });
    }

    let coefficients = mfcc_matrix(samples, sample_rate, layout)?;
    let deltas = compute_delta_matrix(&coefficients, DELTA_WINDOW);
    let delta_deltas = compute_delta_matrix(&deltas, DELTA_WINDOW);

    let summarize = |matrix: &Array2<f64>| -> [MomentSet; MFCC_COUNT] {
        let mut moments = [MomentSet::zeros(); MFCC_COUNT];
        for (slot, column) in moments.iter_mut().zip(matrix.axis_iter(Axis(1))) {
            *slot = MomentSet::from_series(&column.to_vec());
        }
        moments
    };

    Ok(CepstralReport {
        mfcc: summarize(&coefficients),
        delta: summarize(&deltas),
        delta_delta: summarize(&delta_deltas),
    })
}

/// Frames x coefficients.
fn mfcc_matrix(
    samples: &[f64],
    sample_rate: u32,
    layout: FrameLayout,
) -> Result<Array2<f64>, BranchError> {
    let spectrogram = stft(samples, sample_rate, layout, WindowType::Hamming);
    let filterbank = MelFilterbank::new(
        MIN_FREQ,
        sample_rate as f64 / 2.0,
        MEL_BANDS,
        &spectrogram.frequencies(),
        true,
    );
    let mel: Vec<Vec<f64>> = analysis::mel::make_mel_spectrogram(&spectrogram.power(), &filterbank)
        .into_iter()
        .map(|frame| frame.into_iter().map(|e| e.max(MEL_FLOOR)).collect())
        .collect();
    let raw = analysis::mel::mfcc_spectrogram(&mel, MFCC_COUNT, None);

    let frames = raw.len();
    let flat: Vec<f64> = raw
        .iter()
        .flat_map(|frame| frame.iter().copied().take(MFCC_COUNT))
        .collect();
    if flat.len() != frames * MFCC_COUNT {
        return Err(BranchError::Numerical(format!(
            "expected {} cepstral coefficients per frame",
            MFCC_COUNT
        )));
    }
    if flat.iter().any(|value| !value.is_finite()) {
        return Err(BranchError::Numerical(
            "non-finite cepstral coefficient".to_string(),
        ));
    }
    Array2::from_shape_vec((frames, MFCC_COUNT), flat)
        .map_err(|err| BranchError::Numerical(err.to_string()))
}

/// Regression delta over `window` frames each side, edges clamped.
pub(crate) fn compute_delta_matrix(input: &Array2<f64>, window: usize) -> Array2<f64> {
    if input.is_empty() {
        return Array2::zeros(input.raw_dim());
    }
    let frames = input.len_of(Axis(0));
    let coeffs = input.len_of(Axis(1));
    let mut output = Array2::zeros((frames, coeffs));
    let denominator = 2.0 * (1..=window).map(|n| (n * n) as f64).sum::<f64>();

    for t in 0..frames {
        let mut numerator = Array1::<f64>::zeros(coeffs);
        for n in 1..=window {
            let prev = input.row(t.saturating_sub(n));
            let next = input.row((t + n).min(frames - 1));
            numerator += &((&next - &prev) * n as f64);
        }
        output.row_mut(t).assign(&(numerator / denominator));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLINICAL_FRAMES;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn chirp(len: usize) -> Vec<f64> {
        (0..len)
            .map(|n| {
                let t = n as f64 / 16_000.0;
                0.1 * (2.0 * std::f64::consts::PI * (200.0 + 400.0 * t) * t).sin()
            })
            .collect()
    }

    #[test]
    fn delta_of_linear_ramp_is_its_slope() {
        let ramp = Array2::from_shape_fn((20, 2), |(t, c)| (t as f64) * (c as f64 + 1.0));
        let deltas = compute_delta_matrix(&ramp, DELTA_WINDOW);
        assert_abs_diff_eq!(deltas[[10, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(deltas[[10, 1]], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn delta_of_constant_is_zero() {
        let constant = array![[3.0, -1.0], [3.0, -1.0], [3.0, -1.0]];
        let deltas = compute_delta_matrix(&constant, DELTA_WINDOW);
        assert!(deltas.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn produces_all_thirty_nine_series() {
        let report = analyze(&chirp(16_000), 16_000, CLINICAL_FRAMES).unwrap();
        let record = report.to_record();
        assert_eq!(record.len(), 3 * MFCC_COUNT * 6);
        assert!(record.number("mfcc_1_std").unwrap() > 0.0);
        assert!(record.number("ddmfcc_13_mean").is_some());
    }

    #[test]
    fn too_few_frames_is_an_error() {
        assert!(matches!(
            analyze(&chirp(500), 16_000, CLINICAL_FRAMES),
            Err(BranchError::TooShort { .. })
        ));
    }

    #[test]
    fn zero_report_matches_key_set() {
        let zeros = CepstralReport::zeros().to_record();
        assert_eq!(zeros.len(), 234);
        assert_eq!(zeros.number("dmfcc_7_kurtosis"), Some(0.0));
    }
}
