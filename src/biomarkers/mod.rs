//! Analysis branches run over the conditioned signal.
//!
//! Every branch reads the same samples and the shared pitch track, and
//! returns either its features or a [`BranchError`]. The caller substitutes
//! the branch's fallback values on error, so the record keeps its full key
//! set either way.

pub mod cepstral;
pub mod formants;
pub mod harmonicity;
pub mod nonlinear;
pub mod perturbation;
pub mod pitch;
pub mod spectral;
pub mod spectrogram;
pub mod statistics;
pub mod temporal;

use crate::config::ExtractorConfig;
use crate::errors::BranchError;
use crate::types::FeatureRecord;

use self::pitch::PitchTrack;

/// Read-only view handed to every branch.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub samples: &'a [f64],
    pub sample_rate: u32,
    pub config: &'a ExtractorConfig,
    pub pitch: &'a PitchTrack,
}

impl AnalysisInput<'_> {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Pitch,
    Perturbation,
    Harmonicity,
    Formants,
    Cepstral,
    Spectral,
    Nonlinear,
    Temporal,
}

impl Branch {
    pub const ALL: [Branch; 8] = [
        Branch::Pitch,
        Branch::Perturbation,
        Branch::Harmonicity,
        Branch::Formants,
        Branch::Cepstral,
        Branch::Spectral,
        Branch::Nonlinear,
        Branch::Temporal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Branch::Pitch => "pitch",
            Branch::Perturbation => "perturbation",
            Branch::Harmonicity => "harmonicity",
            Branch::Formants => "formants",
            Branch::Cepstral => "cepstral",
            Branch::Spectral => "spectral",
            Branch::Nonlinear => "nonlinear",
            Branch::Temporal => "temporal",
        }
    }

    /// Values written when the branch fails. Same keys as a successful run.
    pub fn fallback(self) -> FeatureRecord {
        match self {
            Branch::Pitch => pitch_features(&[]),
            Branch::Perturbation => perturbation::PerturbationReport::default().to_record(),
            Branch::Harmonicity => harmonicity::HarmonicityReport::unavailable().to_record(),
            Branch::Formants => formants::FormantReport::default().to_record(),
            Branch::Cepstral => cepstral::CepstralReport::zeros().to_record(),
            Branch::Spectral => spectral::SpectralReport::default().to_record(),
            Branch::Nonlinear => nonlinear::NonlinearReport::default().to_record(),
            Branch::Temporal => temporal::TemporalReport::default().to_record(),
        }
    }

    pub fn analyze(self, input: &AnalysisInput<'_>) -> Result<FeatureRecord, BranchError> {
        match self {
            Branch::Pitch => Ok(pitch_features(&input.pitch.voiced_frequencies())),
            Branch::Perturbation => {
                perturbation::analyze(input.samples, input.sample_rate, input.pitch)
                    .map(|report| report.to_record())
            }
            Branch::Harmonicity => harmonicity::analyze(
                input.samples,
                input.sample_rate,
                input.config.pitch.floor_hz,
                input.config.hnr_bounds,
            )
            .map(|report| report.to_record()),
            Branch::Formants => formants::analyze(input.samples, input.sample_rate)
                .map(|report| report.to_record()),
            Branch::Cepstral => cepstral::analyze(
                input.samples,
                input.sample_rate,
                input.config.cepstral_frames,
            )
            .map(|report| report.to_record()),
            Branch::Spectral => spectral::analyze(
                input.samples,
                input.sample_rate,
                input.config.spectral_frames,
            )
            .map(|report| report.to_record()),
            Branch::Nonlinear => Ok(nonlinear::analyze(
                input.samples,
                &input.pitch.voiced_frequencies(),
            )
            .to_record()),
            Branch::Temporal => {
                temporal::analyze(input.samples, input.sample_rate).map(|report| report.to_record())
            }
        }
    }
}

/// F0 moments over voiced frames plus the voiced range.
fn pitch_features(voiced: &[f64]) -> FeatureRecord {
    let mut record = FeatureRecord::new();
    record.extend_numbers(statistics::MomentSet::from_series(voiced).entries("f0"));
    let (min, max) = voiced
        .iter()
        .fold(None, |range: Option<(f64, f64)>, &f| match range {
            Some((lo, hi)) => Some((lo.min(f), hi.max(f))),
            None => Some((f, f)),
        })
        .unwrap_or((0.0, 0.0));
    record.insert_number("f0_min", min);
    record.insert_number("f0_max", max);
    record
}
