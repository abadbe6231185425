//! End-to-end extraction: acquisition, conditioning, screening, analysis
//! branches and record assembly.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tracing::{debug, info, warn};

use crate::audio::decoder::{conform_rate, DecoderChain};
use crate::biomarkers::pitch::{track_pitch, PitchSettings};
use crate::biomarkers::{AnalysisInput, Branch};
use crate::config::ExtractorConfig;
use crate::errors::{BranchError, ExtractionError};
use crate::preprocessing;
use crate::quality;
use crate::types::{AudioSignal, AudioSource, FeatureRecord, TARGET_SAMPLE_RATE};

/// Schema tag written into every record.
pub const FEATURE_VERSION: &str = "v1.3";

/// Owns the decoder chain and analysis settings. Holds no per-recording
/// state, so one pipeline can serve many threads.
pub struct BiomarkerPipeline {
    config: ExtractorConfig,
    decoders: DecoderChain,
}

impl BiomarkerPipeline {
    pub fn new(config: ExtractorConfig) -> Self {
        Self::with_decoders(config, DecoderChain::standard())
    }

    pub fn with_decoders(config: ExtractorConfig, decoders: DecoderChain) -> Self {
        Self { config, decoders }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn extract(&self, source: &AudioSource) -> Result<FeatureRecord, ExtractionError> {
        let signal = self.decoders.acquire(source)?;
        self.extract_signal(signal)
    }

    /// Run the chain on an already decoded signal. Other rates are
    /// resampled to the canonical rate first.
    pub fn extract_signal(&self, signal: AudioSignal) -> Result<FeatureRecord, ExtractionError> {
        if signal.is_empty() {
            return Err(ExtractionError::EmptySignal);
        }
        let signal = if signal.sample_rate == TARGET_SAMPLE_RATE {
            signal
        } else {
            conform_rate(signal, TARGET_SAMPLE_RATE)
                .map_err(|err| ExtractionError::Preprocessing(format!("{:#}", err)))?
        };

        let conditioned = preprocessing::condition(&signal)?;
        let sample_rate = conditioned.sample_rate;
        let report = quality::assess(&conditioned.samples, sample_rate);
        info!(
            samples = conditioned.samples.len(),
            quality_score = report.quality_score,
            rejection_reason = %report.rejection_reason,
            "signal conditioned"
        );

        let pitch = track_pitch(
            &conditioned.samples,
            sample_rate,
            &PitchSettings::contour(self.config.pitch),
        );
        debug!(
            frames = pitch.frames.len(),
            voiced = pitch.voiced_count(),
            "pitch tracked"
        );

        let input = AnalysisInput {
            samples: &conditioned.samples,
            sample_rate,
            config: &self.config,
            pitch: &pitch,
        };
        let outcomes = if self.config.parallel_branches {
            run_parallel(&input)
        } else {
            Branch::ALL
                .iter()
                .map(|&branch| (branch, guarded(branch, || branch.analyze(&input))))
                .collect()
        };

        let mut record = FeatureRecord::new();
        record.insert_text("feature_version", FEATURE_VERSION);
        record.insert_list("preprocessing_chain", conditioned.chain.iter().copied());
        report.write_to(&mut record);

        let mut degraded = Vec::new();
        for (branch, outcome) in outcomes {
            record.merge(branch.fallback());
            match outcome {
                Ok(values) => record.merge(values),
                Err(err) => {
                    warn!(branch = branch.name(), error = %err, "analysis branch degraded to defaults");
                    degraded.push(branch.name());
                }
            }
        }
        record.insert_list("degraded_branches", degraded);
        record.insert_number("duration", conditioned.duration_secs());

        info!(features = record.len(), "feature record assembled");
        Ok(record)
    }
}

/// One scoped thread per branch over the shared input. Results come back
/// in branch order.
fn run_parallel(input: &AnalysisInput<'_>) -> Vec<(Branch, Result<FeatureRecord, BranchError>)> {
    thread::scope(|scope| {
        let handles: Vec<_> = Branch::ALL
            .iter()
            .map(|&branch| (branch, scope.spawn(move || branch.analyze(input))))
            .collect();
        handles
            .into_iter()
            .map(|(branch, handle)| {
                let outcome = handle.join().unwrap_or_else(|_| Err(panicked(branch)));
                (branch, outcome)
            })
            .collect()
    })
}

/// Runs one branch on the calling thread; a panic degrades the branch
/// instead of aborting the recording.
fn guarded<F>(branch: Branch, run: F) -> Result<FeatureRecord, BranchError>
where
    F: FnOnce() -> Result<FeatureRecord, BranchError>,
{
    panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|_| Err(panicked(branch)))
}

fn panicked(branch: Branch) -> BranchError {
    BranchError::Numerical(format!("{} branch panicked", branch.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn voice(seconds: f64, sample_rate: u32) -> AudioSignal {
        let len = (seconds * sample_rate as f64) as usize;
        let samples = (0..len)
            .map(|n| {
                let t = n as f64 / sample_rate as f64;
                let value: f64 = (1..=4)
                    .map(|h| (0.3 / h as f64) * (2.0 * PI * 160.0 * h as f64 * t).sin())
                    .sum();
                value as f32
            })
            .collect();
        AudioSignal::mono(samples, sample_rate)
    }

    #[test]
    fn record_carries_provenance() {
        let pipeline = BiomarkerPipeline::new(ExtractorConfig::default());
        let record = pipeline.extract_signal(voice(1.5, 16_000)).unwrap();
        assert_eq!(
            record.get("feature_version").and_then(|v| v.as_str()),
            Some(FEATURE_VERSION)
        );
        assert!(record.get("preprocessing_chain").is_some());
        assert!(record.get("degraded_branches").is_some());
        assert!(record.number("duration").unwrap() > 1.0);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let sequential = BiomarkerPipeline::new(ExtractorConfig::default());
        let parallel = BiomarkerPipeline::new(ExtractorConfig::default().with_parallel_branches(true));
        let a = sequential.extract_signal(voice(1.2, 16_000)).unwrap();
        let b = parallel.extract_signal(voice(1.2, 16_000)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn foreign_rate_is_conformed() {
        let pipeline = BiomarkerPipeline::new(ExtractorConfig::default());
        let record = pipeline.extract_signal(voice(1.2, 22_050)).unwrap();
        let f0 = record.number("f0_mean").unwrap();
        assert!((f0 - 160.0).abs() < 10.0, "f0 {}", f0);
    }

    #[test]
    fn panicking_branch_becomes_an_error() {
        let branch = Branch::ALL[0];
        let outcome = guarded(branch, || panic!("index out of bounds"));
        match outcome {
            Err(BranchError::Numerical(message)) => {
                assert_eq!(message, format!("{} branch panicked", branch.name()));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn guarded_branch_passes_results_through() {
        let branch = Branch::ALL[1];
        let ok = guarded(branch, || Ok(branch.fallback()));
        assert_eq!(ok, Ok(branch.fallback()));
        let err = guarded(branch, || Err(BranchError::InsufficientPeriods { found: 1 }));
        assert_eq!(err, Err(BranchError::InsufficientPeriods { found: 1 }));
    }

    #[test]
    fn empty_signal_is_a_hard_failure() {
        let pipeline = BiomarkerPipeline::new(ExtractorConfig::default());
        let result = pipeline.extract_signal(AudioSignal::mono(Vec::new(), 16_000));
        assert!(matches!(result, Err(ExtractionError::EmptySignal)));
    }
}
