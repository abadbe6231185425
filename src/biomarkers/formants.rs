//! Burg LPC formant tracking.
//!
//! The signal is resampled to twice the formant ceiling, pre-emphasised and
//! cut into Gaussian-windowed frames. Each frame's Burg predictor polynomial
//! is rooted through its companion matrix; roots in the upper half plane
//! become formant candidates.

use std::f64::consts::PI;

use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

use super::statistics::{moment_keys, MomentSet};
use crate::errors::BranchError;
use crate::types::FeatureRecord;

pub const MAX_FORMANT_HZ: f64 = 5_500.0;
pub const MAX_FORMANTS: usize = 5;
pub const WINDOW_LENGTH_SECS: f64 = 0.025;
pub const TIME_STEP_SECS: f64 = 0.01;
pub const PRE_EMPHASIS_FROM_HZ: f64 = 50.0;
/// Formants summarised in the record.
pub const REPORTED_FORMANTS: usize = 3;

const EDGE_MARGIN_HZ: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantPoint {
    pub frequency: f64,
    pub bandwidth: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormantFrame {
    pub time: f64,
    /// Ascending by frequency.
    pub formants: Vec<FormantPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormantTrack {
    pub frames: Vec<FormantFrame>,
    pub time_step: f64,
}

impl FormantTrack {
    /// Linearly interpolated frequency of formant `number` (1-based).
    ///
    /// Undefined unless both bracketing frames carry the formant. Within half
    /// a step outside the track the edge frame is used.
    pub fn value_at(&self, number: usize, time: f64) -> Option<f64> {
        let slot = number.checked_sub(1)?;
        let first = self.frames.first()?;
        let position = (time - first.time) / self.time_step;
        let count = self.frames.len();
        if position < -0.5 || position > count as f64 - 0.5 {
            return None;
        }
        let lower = position.floor() as isize;
        let fraction = position - lower as f64;
        let clamp = |index: isize| index.clamp(0, count as isize - 1) as usize;
        let at = |index: usize| {
            self.frames[index]
                .formants
                .get(slot)
                .map(|point| point.frequency)
        };

        if fraction < 1e-9 {
            return at(clamp(lower));
        }
        let left = at(clamp(lower))?;
        let right = at(clamp(lower + 1))?;
        Some(left * (1.0 - fraction) + right * fraction)
    }

    /// Mean bandwidth of formant `number` over frames where it exists.
    pub fn mean_bandwidth(&self, number: usize) -> f64 {
        let widths: Vec<f64> = self
            .frames
            .iter()
            .filter_map(|frame| frame.formants.get(number - 1))
            .map(|point| point.bandwidth)
            .filter(|width| width.is_finite())
            .collect();
        if widths.is_empty() {
            return 0.0;
        }
        widths.iter().sum::<f64>() / widths.len() as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormantReport {
    pub frequencies: [MomentSet; REPORTED_FORMANTS],
    pub bandwidths: [f64; REPORTED_FORMANTS],
}

impl FormantReport {
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        for (index, (moments, bandwidth)) in
            self.frequencies.iter().zip(self.bandwidths).enumerate()
        {
            let number = index + 1;
            record.extend_numbers(moments.entries(&format!("f{}", number)));
            record.insert_number(format!("f{}_bandwidth", number), bandwidth);
        }
        record
    }

    pub fn keys() -> Vec<String> {
        (1..=REPORTED_FORMANTS)
            .flat_map(|number| {
                let mut keys = moment_keys(&format!("f{}", number));
                keys.push(format!("f{}_bandwidth", number));
                keys
            })
            .collect()
    }
}

pub fn analyze(samples: &[f64], sample_rate: u32) -> Result<FormantReport, BranchError> {
    let track = track_formants(samples, sample_rate)?;
    let duration = samples.len() as f64 / sample_rate as f64;
    let grid: Vec<f64> = (0..)
        .map(|step| step as f64 * TIME_STEP_SECS)
        .take_while(|time| *time < duration)
        .collect();

    let mut report = FormantReport::default();
    for number in 1..=REPORTED_FORMANTS {
        let series: Vec<f64> = grid
            .iter()
            .filter_map(|&time| track.value_at(number, time))
            .collect();
        report.frequencies[number - 1] = MomentSet::from_series(&series);
        report.bandwidths[number - 1] = track.mean_bandwidth(number);
    }
    Ok(report)
}

pub fn track_formants(samples: &[f64], sample_rate: u32) -> Result<FormantTrack, BranchError> {
    let original_rate = sample_rate as f64;
    let physical_window = 2.0 * WINDOW_LENGTH_SECS;
    let required = (physical_window * original_rate).ceil() as usize;
    if samples.len() < required {
        return Err(BranchError::TooShort {
            samples: samples.len(),
            required,
        });
    }
    let duration = samples.len() as f64 / original_rate;

    let target_rate = 2.0 * MAX_FORMANT_HZ;
    let (resampled, rate) = if target_rate < original_rate {
        (fft_resample(samples, original_rate, target_rate), target_rate)
    } else {
        (samples.to_vec(), original_rate)
    };

    let alpha = (-2.0 * PI * PRE_EMPHASIS_FROM_HZ / rate).exp();
    let emphasized: Vec<f64> = resampled
        .iter()
        .enumerate()
        .map(|(i, &x)| if i == 0 { x } else { x - alpha * resampled[i - 1] })
        .collect();

    let mut window_len = (physical_window * rate).round() as usize;
    if window_len % 2 == 0 {
        window_len += 1;
    }
    let half_window = (window_len / 2) as isize;
    let window = gaussian_window(window_len);
    let order = 2 * MAX_FORMANTS;

    let frame_count = (((duration - physical_window) / TIME_STEP_SECS).floor().max(0.0) as usize + 1).max(1);
    let first_time = (duration - (frame_count - 1) as f64 * TIME_STEP_SECS) / 2.0;

    let frames: Vec<FormantFrame> = (0..frame_count)
        .map(|index| {
            let time = first_time + index as f64 * TIME_STEP_SECS;
            let start = (time * rate).round() as isize - half_window;
            let windowed: Vec<f64> = window
                .iter()
                .enumerate()
                .map(|(offset, w)| {
                    let position = start + offset as isize;
                    let sample = if position < 0 {
                        0.0
                    } else {
                        emphasized.get(position as usize).copied().unwrap_or(0.0)
                    };
                    sample * w
                })
                .collect();

            let coefficients = burg_lpc(&windowed, order);
            let mut formants =
                roots_to_formants(&lpc_roots(&coefficients), rate, EDGE_MARGIN_HZ, MAX_FORMANT_HZ - EDGE_MARGIN_HZ);
            formants.truncate(MAX_FORMANTS);
            FormantFrame { time, formants }
        })
        .collect();

    if frames.iter().all(|frame| frame.formants.is_empty()) {
        return Err(BranchError::Numerical(
            "no formant candidates in any frame".to_string(),
        ));
    }

    Ok(FormantTrack {
        frames,
        time_step: TIME_STEP_SECS,
    })
}

fn gaussian_window(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let mid = (n - 1) as f64 / 2.0;
    (0..n)
        .map(|i| {
            let x = (i as f64 - mid) / mid;
            (-12.0 * x * x).exp()
        })
        .collect()
}

/// Burg's method. Returns `a[0..=order]` with `a[0] = 1`.
pub(crate) fn burg_lpc(samples: &[f64], order: usize) -> Vec<f64> {
    let n = samples.len();
    let mut a = vec![0.0; order + 1];
    a[0] = 1.0;
    if n <= order {
        return a;
    }

    let mut forward = samples.to_vec();
    let mut backward = samples.to_vec();

    for k in 1..=order {
        let (mut num, mut den) = (0.0, 0.0);
        for i in k..n {
            num += forward[i] * backward[i - 1];
            den += forward[i] * forward[i] + backward[i - 1] * backward[i - 1];
        }
        if den < 1e-30 {
            break;
        }
        let reflection = -2.0 * num / den;

        let mut next_forward = vec![0.0; n];
        let mut next_backward = vec![0.0; n];
        for i in k..n {
            next_forward[i] = forward[i] + reflection * backward[i - 1];
            next_backward[i] = backward[i - 1] + reflection * forward[i];
        }
        forward = next_forward;
        backward = next_backward;

        let previous = a.clone();
        for i in 1..k {
            a[i] = previous[i] + reflection * previous[k - i];
        }
        a[k] = reflection;
    }
    a
}

/// Polynomial `z^p + a1 z^(p-1) + ... + ap` and its derivative at `z`.
fn eval_polynomial(a: &[f64], z: Complex64) -> (Complex64, Complex64) {
    let mut value = Complex64::new(1.0, 0.0);
    let mut derivative = Complex64::new(0.0, 0.0);
    for &coefficient in &a[1..] {
        derivative = value + z * derivative;
        value = value * z + coefficient;
    }
    (value, derivative)
}

fn polish_root(a: &[f64], mut z: Complex64) -> Complex64 {
    for _ in 0..10 {
        let (value, derivative) = eval_polynomial(a, z);
        if derivative.norm() < 1e-30 {
            break;
        }
        let step = value / derivative;
        z -= step;
        if step.norm() < 1e-10 * z.norm() {
            break;
        }
    }
    z
}

/// Companion-matrix roots, reflected into the unit circle then polished.
fn lpc_roots(a: &[f64]) -> Vec<Complex64> {
    let order = a.len().saturating_sub(1);
    if order == 0 || a[1..].iter().map(|c| c.abs()).sum::<f64>() < 1e-10 {
        return Vec::new();
    }

    let mut companion = DMatrix::<f64>::zeros(order, order);
    for i in 0..order {
        companion[(0, i)] = -a[i + 1];
    }
    for i in 1..order {
        companion[(i, i - 1)] = 1.0;
    }

    let Some(schur) = companion.try_schur(1e-12, 1_000) else {
        return Vec::new();
    };
    schur
        .complex_eigenvalues()
        .iter()
        .map(|e| {
            let root = Complex64::new(e.re, e.im);
            let radius = root.norm();
            let inside = if radius > 1.0 {
                root.conj() / (radius * radius)
            } else {
                root
            };
            polish_root(a, inside)
        })
        .collect()
}

fn roots_to_formants(
    roots: &[Complex64],
    sample_rate: f64,
    min_hz: f64,
    max_hz: f64,
) -> Vec<FormantPoint> {
    let mut formants: Vec<FormantPoint> = roots
        .iter()
        .filter(|root| root.im > 0.0)
        .filter_map(|root| {
            let radius = root.norm();
            let frequency = root.arg() * sample_rate / (2.0 * PI);
            let bandwidth = if radius > 0.0 {
                -radius.ln() * sample_rate / PI
            } else {
                f64::INFINITY
            };
            (frequency >= min_hz && frequency <= max_hz && bandwidth > 0.0).then_some(FormantPoint {
                frequency,
                bandwidth,
            })
        })
        .collect();
    formants.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    formants
}

/// Band-limited resampling by truncating or zero-padding the spectrum.
fn fft_resample(samples: &[f64], old_rate: f64, new_rate: f64) -> Vec<f64> {
    let n = samples.len();
    let new_len = (n as f64 * new_rate / old_rate).round() as usize;
    if n == 0 || new_len == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let mut spectrum: Vec<Complex64> = samples.iter().map(|&x| Complex64::new(x, 0.0)).collect();
    planner.plan_fft_forward(n).process(&mut spectrum);

    let mut resized = vec![Complex64::new(0.0, 0.0); new_len];
    let half_old = n / 2;
    let half_new = new_len / 2;
    let shared = half_new.min(half_old);
    for i in 0..=shared.min(new_len - 1) {
        resized[i] = spectrum[i];
    }
    for i in 1..shared {
        resized[new_len - i] = spectrum[n - i];
    }
    if new_len < n && new_len % 2 == 0 && n % 2 == 0 {
        resized[half_new] = spectrum[half_new] * 0.5 + spectrum[n - half_new] * 0.5;
    }

    planner.plan_fft_inverse(new_len).process(&mut resized);
    resized.iter().map(|c| c.re / n as f64).collect()
}
