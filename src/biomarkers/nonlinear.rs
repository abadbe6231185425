//! Simplified nonlinear dynamics measures.
//!
//! These are relative, internally consistent metrics. They are not
//! numerically equivalent to the published DFA, RPDE and PPE algorithms.

use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use super::statistics::shannon_entropy;
use crate::types::FeatureRecord;

pub const DFA_SCALES: [usize; 5] = [4, 8, 16, 32, 64];
pub const RPDE_MAX_LAG: usize = 1_000;
pub const RPDE_PEAK_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NonlinearReport {
    pub dfa: f64,
    pub rpde: f64,
    pub ppe: f64,
}

impl NonlinearReport {
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.insert_number("dfa", self.dfa);
        record.insert_number("rpde", self.rpde);
        record.insert_number("ppe", self.ppe);
        record
    }
}

/// Every measure degrades to 0.0 on its own, so this never fails.
pub fn analyze(samples: &[f64], voiced_f0: &[f64]) -> NonlinearReport {
    NonlinearReport {
        dfa: detrended_fluctuation(samples, &DFA_SCALES),
        rpde: recurrence_entropy(samples),
        ppe: pitch_period_entropy(voiced_f0),
    }
}

/// Mean squared residual of a per-box linear fit to the integrated profile,
/// averaged over boxes and then over scales.
pub fn detrended_fluctuation(samples: &[f64], scales: &[usize]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let profile: Vec<f64> = samples
        .iter()
        .scan(0.0, |total, sample| {
            *total += sample - mean;
            Some(*total)
        })
        .collect();

    let per_scale: Vec<f64> = scales
        .iter()
        .filter(|&&scale| scale >= 2 && scale < profile.len())
        .map(|&scale| {
            let boxes: Vec<f64> = profile.chunks_exact(scale).map(linear_residual).collect();
            boxes.iter().sum::<f64>() / boxes.len() as f64
        })
        .collect();

    if per_scale.is_empty() {
        return 0.0;
    }
    per_scale.iter().sum::<f64>() / per_scale.len() as f64
}

/// Mean squared residual after a least-squares line through `values`.
fn linear_residual(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let t_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (t, y) in values.iter().enumerate() {
        let dt = t as f64 - t_mean;
        sxy += dt * (y - y_mean);
        sxx += dt * dt;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    values
        .iter()
        .enumerate()
        .map(|(t, y)| {
            let trend = y_mean + slope * (t as f64 - t_mean);
            (y - trend).powi(2)
        })
        .sum::<f64>()
        / n
}

/// Entropy of the normalised-autocorrelation peaks above the threshold in
/// the first lags. Fewer than two peaks gives 0.0.
pub fn recurrence_entropy(samples: &[f64]) -> f64 {
    let autocorr = autocorrelation_fft(samples);
    if autocorr.len() < 3 || !(autocorr[0] > 0.0) {
        return 0.0;
    }
    let r0 = autocorr[0];
    let normalized: Vec<f64> = autocorr.iter().map(|r| r / r0).collect();
    let last = (normalized.len() - 1).min(RPDE_MAX_LAG);
    let peaks: Vec<f64> = (1..last)
        .filter(|&i| {
            normalized[i] > normalized[i - 1]
                && normalized[i] > normalized[i + 1]
                && normalized[i] > RPDE_PEAK_THRESHOLD
        })
        .map(|i| normalized[i])
        .collect();
    if peaks.len() < 2 {
        return 0.0;
    }
    shannon_entropy(&peaks)
}

/// Entropy of the pitch periods `1 / f0`; needs at least two voiced values.
pub fn pitch_period_entropy(voiced_f0: &[f64]) -> f64 {
    let periods: Vec<f64> = voiced_f0
        .iter()
        .filter(|f| **f > 0.0)
        .map(|f| 1.0 / f)
        .collect();
    if periods.len() < 2 {
        return 0.0;
    }
    shannon_entropy(&periods)
}

/// Linear (non-circular) autocorrelation for non-negative lags.
fn autocorrelation_fft(samples: &[f64]) -> Vec<f64> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let size = (2 * n).next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let mut buffer: Vec<Complex64> = samples
        .iter()
        .map(|&s| Complex64::new(s, 0.0))
        .chain(std::iter::repeat(Complex64::new(0.0, 0.0)))
        .take(size)
        .collect();
    planner.plan_fft_forward(size).process(&mut buffer);
    buffer
        .iter_mut()
        .for_each(|bin| *bin = Complex64::new(bin.norm_sqr(), 0.0));
    planner.plan_fft_inverse(size).process(&mut buffer);
    buffer[..n].iter().map(|c| c.re / size as f64).collect()
}
