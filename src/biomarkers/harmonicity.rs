//! Harmonics-to-noise ratio from the autocorrelation pitch analysis.

use super::pitch::{track_pitch, PitchSettings};
use crate::config::HnrBounds;
use crate::errors::BranchError;
use crate::types::FeatureRecord;

/// NHR reported when the HNR is not positive.
pub const NHR_CEILING: f64 = 10.0;

const MIN_CORRELATION: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicityReport {
    pub hnr_db: f64,
    pub anomalous: bool,
}

impl HarmonicityReport {
    /// Reported when no voiced frame exists.
    pub fn unavailable() -> Self {
        Self {
            hnr_db: 0.0,
            anomalous: true,
        }
    }

    pub fn nhr(&self) -> f64 {
        if self.hnr_db > 0.0 {
            1.0 / 10f64.powf(self.hnr_db / 10.0)
        } else {
            NHR_CEILING
        }
    }

    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.insert_number("hnr", self.hnr_db);
        record.insert_integer("hnr_anomaly_flag", i64::from(self.anomalous));
        record.insert_number("nhr", self.nhr());
        record
    }
}

/// Mean HNR over voiced frames, flagged when outside `bounds`.
///
/// Out-of-band values are kept as measured.
pub fn analyze(
    samples: &[f64],
    sample_rate: u32,
    floor_hz: f64,
    bounds: HnrBounds,
) -> Result<HarmonicityReport, BranchError> {
    let settings = PitchSettings::harmonicity(floor_hz);
    let track = track_pitch(samples, sample_rate, &settings);
    let per_frame: Vec<f64> = track
        .frames
        .iter()
        .filter(|frame| frame.voiced())
        .map(|frame| hnr_from_correlation(frame.correlation))
        .collect();
    if per_frame.is_empty() {
        return Err(BranchError::NoVoicedFrames);
    }

    let hnr_db = per_frame.iter().sum::<f64>() / per_frame.len() as f64;
    Ok(HarmonicityReport {
        hnr_db,
        anomalous: bounds.is_anomalous(hnr_db),
    })
}

/// `10 log10(r / (1 - r))` with `r` kept strictly inside (0, 1).
pub fn hnr_from_correlation(correlation: f64) -> f64 {
    let r = correlation.clamp(MIN_CORRELATION, 1.0 - MIN_CORRELATION);
    10.0 * (r / (1.0 - r)).log10()
}
