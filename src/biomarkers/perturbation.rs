//! Jitter and shimmer from a glottal pulse point process.
//!
//! Pulses are placed at waveform peaks one local period apart inside every
//! voiced span of the pitch track. Consecutive pulses give periods and the
//! peak height at each pulse gives the cycle amplitude.

use super::pitch::PitchTrack;
use crate::errors::BranchError;
use crate::types::FeatureRecord;

pub const MIN_PERIOD_SECS: f64 = 0.0001;
pub const MAX_PERIOD_SECS: f64 = 0.02;
pub const MAX_PERIOD_FACTOR: f64 = 1.3;
pub const MAX_AMPLITUDE_FACTOR: f64 = 1.6;

const MIN_PULSES: usize = 3;
const SEARCH_LOW: f64 = 0.8;
const SEARCH_HIGH: f64 = 1.2;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerturbationReport {
    pub jitter_local: f64,
    pub jitter_rap: f64,
    pub jitter_ppq5: f64,
    pub shimmer_local: f64,
    pub shimmer_apq3: f64,
    pub shimmer_apq5: f64,
}

impl PerturbationReport {
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.insert_number("jitter_local", self.jitter_local);
        record.insert_number("jitter_rap", self.jitter_rap);
        record.insert_number("jitter_ppq5", self.jitter_ppq5);
        record.insert_number("shimmer_local", self.shimmer_local);
        record.insert_number("shimmer_apq3", self.shimmer_apq3);
        record.insert_number("shimmer_apq5", self.shimmer_apq5);
        record
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pulse {
    time: f64,
    amplitude: f64,
}

/// One glottal cycle between two consecutive pulses.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cycle {
    period: f64,
    /// Peak height at the opening pulse.
    amplitude: f64,
}

pub fn analyze(
    samples: &[f64],
    sample_rate: u32,
    track: &PitchTrack,
) -> Result<PerturbationReport, BranchError> {
    let pulses = pulse_trains(samples, sample_rate, track);
    let found: usize = pulses.iter().map(Vec::len).sum();
    if found < MIN_PULSES {
        return Err(BranchError::InsufficientPeriods { found });
    }

    // Cycles whose period falls outside the allowed range break a sequence.
    let sequences: Vec<Vec<Cycle>> = pulses
        .iter()
        .flat_map(|train| {
            let cycles: Vec<Cycle> = train
                .windows(2)
                .map(|pair| Cycle {
                    period: pair[1].time - pair[0].time,
                    amplitude: pair[0].amplitude,
                })
                .collect();
            cycles
                .split(|cycle| !(MIN_PERIOD_SECS..=MAX_PERIOD_SECS).contains(&cycle.period))
                .filter(|run| !run.is_empty())
                .map(<[Cycle]>::to_vec)
                .collect::<Vec<_>>()
        })
        .collect();

    let periods: Vec<Vec<f64>> = sequences
        .iter()
        .map(|run| run.iter().map(|cycle| cycle.period).collect())
        .collect();
    let amplitudes: Vec<Vec<f64>> = sequences
        .iter()
        .map(|run| run.iter().map(|cycle| cycle.amplitude).collect())
        .collect();

    let measure = |series: &[Vec<f64>], width: usize, factor: f64| {
        perturbation_quotient(series, width, factor).unwrap_or(0.0)
    };
    Ok(PerturbationReport {
        jitter_local: measure(&periods, 2, MAX_PERIOD_FACTOR),
        jitter_rap: measure(&periods, 3, MAX_PERIOD_FACTOR),
        jitter_ppq5: measure(&periods, 5, MAX_PERIOD_FACTOR),
        shimmer_local: measure(&amplitudes, 2, MAX_AMPLITUDE_FACTOR),
        shimmer_apq3: measure(&amplitudes, 3, MAX_AMPLITUDE_FACTOR),
        shimmer_apq5: measure(&amplitudes, 5, MAX_AMPLITUDE_FACTOR),
    })
}

/// Mean absolute perturbation over the series mean.
///
/// `width == 2` compares neighbours; an odd width compares each value with
/// the average of the window centred on it. Windows containing a
/// neighbour ratio above `max_factor` are skipped.
fn perturbation_quotient(series: &[Vec<f64>], width: usize, max_factor: f64) -> Option<f64> {
    let values: Vec<f64> = series.iter().flatten().copied().collect();
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean <= 0.0 {
        return None;
    }

    let within_factor = |window: &[f64]| {
        window.windows(2).all(|pair| {
            let (lo, hi) = if pair[0] < pair[1] {
                (pair[0], pair[1])
            } else {
                (pair[1], pair[0])
            };
            lo > 0.0 && hi / lo <= max_factor
        })
    };

    let terms: Vec<f64> = series
        .iter()
        .flat_map(|run| run.windows(width))
        .filter(|window| within_factor(window))
        .map(|window| {
            if width == 2 {
                (window[1] - window[0]).abs()
            } else {
                let average = window.iter().sum::<f64>() / width as f64;
                (window[width / 2] - average).abs()
            }
        })
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(terms.iter().sum::<f64>() / terms.len() as f64 / mean)
}

/// Pulses per voiced span, ascending in time.
fn pulse_trains(samples: &[f64], sample_rate: u32, track: &PitchTrack) -> Vec<Vec<Pulse>> {
    let sr = sample_rate as f64;
    let voiced = track.voiced_frequencies();
    if voiced.is_empty() || samples.is_empty() {
        return Vec::new();
    }
    let fallback_f0 = voiced.iter().sum::<f64>() / voiced.len() as f64;
    let last_index = (samples.len() - 1) as f64;

    track
        .voiced_spans()
        .into_iter()
        .filter_map(|(start, end)| {
            let start = (start * sr).max(0.0);
            let end = (end * sr).min(last_index);
            if end <= start {
                return None;
            }
            let period_at = |position: f64| {
                sr / track
                    .frequency_at(position / sr)
                    .unwrap_or(fallback_f0)
            };

            let middle = 0.5 * (start + end);
            let period = period_at(middle);
            let anchor = argmax(samples, middle - 0.5 * period, middle + 0.5 * period, |s| s.abs())?;
            let polarity = if samples[anchor] < 0.0 { -1.0 } else { 1.0 };
            let peak = |lo: f64, hi: f64| argmax(samples, lo.max(start), hi.min(end), |s| polarity * s);

            let mut positions = vec![(refine_peak(samples, anchor, polarity), anchor)];
            let mut cursor = anchor as f64;
            loop {
                let period = period_at(cursor);
                let lo = cursor + SEARCH_LOW * period;
                if lo > end {
                    break;
                }
                match peak(lo, cursor + SEARCH_HIGH * period) {
                    Some(index) if index as f64 > cursor => {
                        positions.push((refine_peak(samples, index, polarity), index));
                        cursor = index as f64;
                    }
                    _ => break,
                }
            }
            cursor = anchor as f64;
            loop {
                let period = period_at(cursor);
                let hi = cursor - SEARCH_LOW * period;
                if hi < start {
                    break;
                }
                match peak(cursor - SEARCH_HIGH * period, hi) {
                    Some(index) if (index as f64) < cursor => {
                        positions.push((refine_peak(samples, index, polarity), index));
                        cursor = index as f64;
                    }
                    _ => break,
                }
            }

            positions.sort_by(|a, b| a.0.total_cmp(&b.0));
            Some(
                positions
                    .into_iter()
                    .map(|(position, index)| Pulse {
                        time: position / sr,
                        amplitude: samples[index].abs(),
                    })
                    .collect(),
            )
        })
        .collect()
}

/// Index in `[lo, hi]` (sample positions) maximising `score`.
fn argmax(samples: &[f64], lo: f64, hi: f64, score: impl Fn(f64) -> f64) -> Option<usize> {
    let first = lo.ceil().max(0.0) as usize;
    let last = (hi.floor() as usize).min(samples.len().checked_sub(1)?);
    if hi < 0.0 || first > last {
        return None;
    }
    (first..=last).max_by(|&a, &b| score(samples[a]).total_cmp(&score(samples[b])))
}

/// Parabolic refinement of a peak, in fractional samples.
fn refine_peak(samples: &[f64], index: usize, polarity: f64) -> f64 {
    if index == 0 || index + 1 >= samples.len() {
        return index as f64;
    }
    let (a, b, c) = (
        polarity * samples[index - 1],
        polarity * samples[index],
        polarity * samples[index + 1],
    );
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-15 {
        return index as f64;
    }
    let delta = 0.5 * (a - c) / denom;
    if delta.abs() < 1.0 {
        index as f64 + delta
    } else {
        index as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biomarkers::pitch::{track_pitch, PitchFrame, PitchSettings, PITCH_TIME_STEP};
    use crate::config::CLINICAL_PITCH;
    use std::f64::consts::PI;

    const SR: u32 = 16_000;

    fn pulse_like(periods: &[f64], amplitudes: &[f64]) -> Vec<f64> {
        let mut samples = Vec::new();
        for (&period, &amplitude) in periods.iter().zip(amplitudes) {
            let len = (period * SR as f64).round() as usize;
            samples.extend((0..len).map(|n| {
                let phase = n as f64 / len as f64;
                amplitude * (2.0 * PI * phase).sin() + 0.3 * amplitude * (4.0 * PI * phase).sin()
            }));
        }
        samples
    }

    /// Damped cycles peaking on their first sample, so pulse times land on
    /// the cycle boundaries.
    fn decaying_cycles(lengths: &[usize]) -> Vec<f64> {
        lengths
            .iter()
            .flat_map(|&len| {
                (0..len).map(move |n| {
                    0.5 * (-(n as f64) / 8.0).exp() * (2.0 * PI * n as f64 / len as f64).cos()
                })
            })
            .collect()
    }

    /// Fully voiced track at a constant frequency.
    fn steady_track(samples: &[f64], frequency: f64) -> PitchTrack {
        let count = samples.len() / (SR as usize / 100);
        PitchTrack {
            frames: (0..count)
                .map(|i| PitchFrame {
                    time: (i as f64 + 0.5) * PITCH_TIME_STEP,
                    frequency,
                    correlation: 0.9,
                })
                .collect(),
            time_step: PITCH_TIME_STEP,
        }
    }

    fn analyse(samples: &[f64]) -> Result<PerturbationReport, BranchError> {
        analyze(samples, SR, &steady_track(samples, 200.0))
    }

    #[test]
    fn steady_voice_has_small_perturbation() {
        let samples = pulse_like(&[0.005; 300], &[0.5; 300]);
        let report = analyse(&samples).unwrap();
        assert!(report.jitter_local < 0.01, "{:?}", report);
        assert!(report.shimmer_local < 0.02, "{:?}", report);
        assert!(report.jitter_rap <= report.jitter_local + 1e-9);
    }

    #[test]
    fn alternating_periods_give_known_jitter() {
        // 5 ms and 5.5 ms cycles in turn.
        let lengths: Vec<usize> = (0..300).map(|i| if i % 2 == 0 { 80 } else { 88 }).collect();
        let samples = decaying_cycles(&lengths);
        let report = analyze(&samples, SR, &steady_track(&samples, SR as f64 / 84.0)).unwrap();

        let expected_local = 8.0 / 84.0;
        assert!(
            (report.jitter_local - expected_local).abs() < 0.1 * expected_local,
            "{:?}",
            report
        );
        let rap_ratio = report.jitter_rap / report.jitter_local;
        assert!((rap_ratio - 2.0 / 3.0).abs() < 0.06, "rap ratio {}", rap_ratio);
        let ppq5_ratio = report.jitter_ppq5 / report.jitter_local;
        assert!((ppq5_ratio - 0.6).abs() < 0.06, "ppq5 ratio {}", ppq5_ratio);
        assert!(report.shimmer_local < 0.02, "{:?}", report);
    }

    #[test]
    fn alternating_amplitudes_raise_shimmer() {
        let amplitudes: Vec<f64> = (0..300).map(|i| if i % 2 == 0 { 0.5 } else { 0.35 }).collect();
        let steady = analyse(&pulse_like(&[0.005; 300], &[0.5; 300])).unwrap();
        let shaky = analyse(&pulse_like(&[0.005; 300], &amplitudes)).unwrap();
        assert!(shaky.shimmer_local > steady.shimmer_local + 0.1, "{:?}", shaky);
    }

    #[test]
    fn tracked_tone_yields_pulses() {
        let samples = pulse_like(&[0.005; 300], &[0.5; 300]);
        let track = track_pitch(&samples, SR, &PitchSettings::contour(CLINICAL_PITCH));
        assert!(analyze(&samples, SR, &track).is_ok());
    }

    #[test]
    fn unvoiced_track_has_no_pulses() {
        let samples = vec![0.0; 16_000];
        let track = track_pitch(&samples, SR, &PitchSettings::contour(CLINICAL_PITCH));
        assert_eq!(
            analyze(&samples, SR, &track),
            Err(BranchError::InsufficientPeriods { found: 0 })
        );
    }

    #[test]
    fn quotients_follow_their_definitions() {
        let series = vec![vec![1.0, 1.1, 1.0, 1.1, 1.0]];
        let mean = 5.2 / 5.0;
        let local = perturbation_quotient(&series, 2, 1.3).unwrap();
        approx::assert_abs_diff_eq!(local, 0.1 / mean, epsilon = 1e-12);
        let rap = perturbation_quotient(&series, 3, 1.3).unwrap();
        let expected = ((1.1f64 - 3.1 / 3.0).abs() + (1.0f64 - 3.2 / 3.0).abs() + (1.1f64 - 3.1 / 3.0).abs()) / 3.0;
        approx::assert_abs_diff_eq!(rap, expected / mean, epsilon = 1e-12);
    }

    #[test]
    fn large_jumps_are_excluded() {
        let series = vec![vec![1.0, 2.0, 1.0]];
        assert_eq!(perturbation_quotient(&series, 2, 1.3), None);
    }

    #[test]
    fn report_keys_are_fixed() {
        assert_eq!(PerturbationReport::default().to_record().len(), 6);
    }
}
