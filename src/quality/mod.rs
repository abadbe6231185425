//! Recording-quality screening. Annotates the record, never blocks it.

use serde::{Deserialize, Serialize};

use crate::audio::framing::{frame_rms, rms};
use crate::biomarkers::statistics::percentile;
use crate::config::FrameLayout;
use crate::types::FeatureRecord;

pub const CLIPPING_LEVEL: f64 = 0.99;
pub const CLIPPING_RATIO_LIMIT: f64 = 0.01;
pub const CLIPPING_PENALTY: i64 = 40;
pub const MIN_DURATION_SECS: f64 = 1.0;
pub const SHORT_PENALTY: i64 = 50;
pub const MIN_SNR_DB: f64 = 15.0;
pub const SNR_PENALTY: i64 = 30;
pub const PASSED: &str = "Passed";

const MIN_SIGNAL_RMS: f64 = 1e-10;

/// 25 ms window, 10 ms hop at 16 kHz.
const VOICED_FRAMES: FrameLayout = FrameLayout::new(400, 160);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub quality_score: i64,
    pub rejection_reason: String,
    pub snr_db: f64,
    pub clipping_ratio: f64,
    pub voiced_frame_ratio: f64,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.rejection_reason == PASSED
    }

    pub fn write_to(&self, record: &mut FeatureRecord) {
        record.insert_integer("quality_score", self.quality_score);
        record.insert_text("rejection_reason", self.rejection_reason.clone());
        record.insert_number("snr_db", self.snr_db);
        record.insert_number("clipping_ratio", self.clipping_ratio);
        record.insert_number("voiced_frame_ratio", self.voiced_frame_ratio);
    }
}

/// Screen a conditioned signal.
pub fn assess(samples: &[f64], sample_rate: u32) -> QualityReport {
    let clipping_ratio = clipping_ratio(samples);
    let duration = if sample_rate == 0 {
        0.0
    } else {
        samples.len() as f64 / sample_rate as f64
    };
    let snr_db = estimate_snr_db(samples);
    let voiced_frame_ratio = voiced_frame_ratio(samples);

    let mut reasons = Vec::new();
    if clipping_ratio > CLIPPING_RATIO_LIMIT {
        reasons.push(format!("Excessive clipping: {:.2}%", clipping_ratio * 100.0));
    }
    if duration < MIN_DURATION_SECS {
        reasons.push("Sample too short".to_string());
    }
    if snr_db < MIN_SNR_DB {
        reasons.push(format!("Low SNR: {:.2}dB", snr_db));
    }

    QualityReport {
        quality_score: quality_score(clipping_ratio, duration, snr_db),
        rejection_reason: if reasons.is_empty() {
            PASSED.to_string()
        } else {
            reasons.join("; ")
        },
        snr_db,
        clipping_ratio,
        voiced_frame_ratio,
    }
}

/// Composite score in [0, 100].
pub fn quality_score(clipping_ratio: f64, duration_secs: f64, snr_db: f64) -> i64 {
    let mut score = 100;
    if clipping_ratio > CLIPPING_RATIO_LIMIT {
        score -= CLIPPING_PENALTY;
    }
    if duration_secs < MIN_DURATION_SECS {
        score -= SHORT_PENALTY;
    }
    if snr_db < MIN_SNR_DB {
        score -= SNR_PENALTY;
    }
    score.clamp(0, 100)
}

pub fn clipping_ratio(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let clipped = samples.iter().filter(|s| s.abs() > CLIPPING_LEVEL).count();
    clipped as f64 / samples.len() as f64
}

/// Signal RMS against the 10th percentile of absolute amplitude.
///
/// A silent signal reports the floor value instead of negative infinity.
pub fn estimate_snr_db(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let magnitudes: Vec<f64> = samples.iter().map(|s| s.abs()).collect();
    let noise_floor = percentile(&magnitudes, 10.0);
    20.0 * (rms(samples).max(MIN_SIGNAL_RMS) / (noise_floor + 1e-6)).log10()
}

/// Share of frames whose RMS exceeds half the mean frame RMS.
pub fn voiced_frame_ratio(samples: &[f64]) -> f64 {
    let energies = frame_rms(samples, VOICED_FRAMES);
    if energies.is_empty() {
        return 0.0;
    }
    let mean = energies.iter().sum::<f64>() / energies.len() as f64;
    let voiced = energies.iter().filter(|&&e| e > 0.5 * mean).count();
    voiced as f64 / energies.len() as f64
}
