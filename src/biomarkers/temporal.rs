//! Voice activity, articulation rate and pause statistics.

use crate::audio::framing::{frame_rms, zero_crossing_rate};
use crate::audio::pause_detector::detect_pauses;
use crate::config::FrameLayout;
use crate::errors::BranchError;
use crate::types::FeatureRecord;

pub const VAD_FRAMES: FrameLayout = FrameLayout::new(2048, 512);
/// Articulation threshold is `mean + ARTICULATION_STD_FACTOR * std` of frame RMS.
pub const ARTICULATION_STD_FACTOR: f64 = 0.5;
/// Pause VAD: frames quieter than this share of the loudest frame are silent.
pub const PAUSE_RMS_FRACTION: f64 = 0.02;
pub const PAUSE_ZCR_CEILING: f64 = 0.15;
pub const MIN_PAUSE_SECS: f64 = 0.1;
pub const MIN_PEAK_SPACING_SECS: f64 = 0.1;

/// Intensity reference pressure.
const REFERENCE_PRESSURE: f64 = 2e-5;
const MIN_MEAN_SQUARE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemporalReport {
    pub articulation_rate: f64,
    pub pause_frequency: f64,
    pub pause_duration_mean: f64,
    pub pause_duration_total: f64,
    pub intensity_db: f64,
    pub voice_onset_time: f64,
}

impl TemporalReport {
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.insert_number("articulation_rate", self.articulation_rate);
        record.insert_number("pause_frequency", self.pause_frequency);
        record.insert_number("pause_duration_mean", self.pause_duration_mean);
        record.insert_number("pause_duration_total", self.pause_duration_total);
        record.insert_number("intensity_db", self.intensity_db);
        record.insert_number("voice_onset_time", self.voice_onset_time);
        record
    }
}

pub fn analyze(samples: &[f64], sample_rate: u32) -> Result<TemporalReport, BranchError> {
    if samples.is_empty() || sample_rate == 0 {
        return Err(BranchError::TooShort {
            samples: samples.len(),
            required: 1,
        });
    }
    let sr = sample_rate as f64;
    let hop = VAD_FRAMES.hop;
    let duration = samples.len() as f64 / sr;
    let energies = frame_rms(samples, VAD_FRAMES);
    let crossings = zero_crossing_rate(samples, VAD_FRAMES);
    let min_frames = (MIN_PAUSE_SECS * sr / hop as f64) as usize;

    let peaks = syllable_peaks(&energies, (MIN_PEAK_SPACING_SECS * sr / hop as f64) as usize);

    let voiced = pause_vad(&energies, &crossings);
    let silent: Vec<bool> = voiced.iter().map(|v| !v).collect();
    let pauses: Vec<f64> = detect_pauses(&silent, min_frames)
        .iter()
        .map(|run| run.duration_secs(hop, sample_rate))
        .collect();
    let pause_total: f64 = pauses.iter().sum();

    Ok(TemporalReport {
        articulation_rate: peaks.len() as f64 / duration,
        pause_frequency: pauses.len() as f64,
        pause_duration_mean: if pauses.is_empty() {
            0.0
        } else {
            pause_total / pauses.len() as f64
        },
        pause_duration_total: pause_total,
        intensity_db: mean_intensity_db(&energies),
        voice_onset_time: voiced
            .iter()
            .position(|&v| v)
            .map(|frame| (frame * hop) as f64 / sr)
            .unwrap_or(0.0),
    })
}

/// Frames loud relative to the loudest frame and not noise-like.
fn pause_vad(energies: &[f64], crossings: &[f64]) -> Vec<bool> {
    let loudest = energies.iter().copied().fold(0.0f64, f64::max);
    let threshold = PAUSE_RMS_FRACTION * loudest;
    energies
        .iter()
        .zip(crossings)
        .map(|(&rms, &zcr)| rms > threshold && zcr < PAUSE_ZCR_CEILING)
        .collect()
}

/// Energy peaks in voiced frames, at least `min_spacing` frames apart.
fn syllable_peaks(energies: &[f64], min_spacing: usize) -> Vec<usize> {
    if energies.is_empty() {
        return Vec::new();
    }
    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let std = (energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n).sqrt();
    let threshold = mean + ARTICULATION_STD_FACTOR * std;

    let envelope: Vec<f64> = energies
        .iter()
        .map(|&e| if e > threshold { e } else { 0.0 })
        .collect();
    find_peaks(&envelope, threshold, min_spacing)
}

/// Local maxima at or above `height`, thinned so no two are closer than
/// `distance` samples. Taller peaks win; flat tops report their middle.
pub(crate) fn find_peaks(values: &[f64], height: f64, distance: usize) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < values.len() {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead + 1 < values.len() && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks.retain(|&p| values[p] >= height);

    if distance > 1 && peaks.len() > 1 {
        let mut order: Vec<usize> = (0..peaks.len()).collect();
        order.sort_by(|&a, &b| values[peaks[b]].total_cmp(&values[peaks[a]]));
        let mut keep = vec![true; peaks.len()];
        for &index in &order {
            if !keep[index] {
                continue;
            }
            for (other, flag) in keep.iter_mut().enumerate() {
                if other != index && peaks[other].abs_diff(peaks[index]) < distance {
                    *flag = false;
                }
            }
        }
        peaks = peaks
            .into_iter()
            .zip(keep)
            .filter_map(|(peak, kept)| kept.then_some(peak))
            .collect();
    }
    peaks
}

/// Mean frame intensity in dB re 2e-5.
fn mean_intensity_db(energies: &[f64]) -> f64 {
    if energies.is_empty() {
        return 0.0;
    }
    let reference = REFERENCE_PRESSURE * REFERENCE_PRESSURE;
    energies
        .iter()
        .map(|rms| 10.0 * ((rms * rms).max(MIN_MEAN_SQUARE) / reference).log10())
        .sum::<f64>()
        / energies.len() as f64
}
