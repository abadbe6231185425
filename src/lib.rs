//! Acoustic biomarker extraction for clinical voice recordings.
//!
//! One recording in, one flat versioned feature record out. See
//! [`BiomarkerPipeline`] for the entry points.

pub mod audio;
pub mod biomarkers;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod preprocessing;
pub mod quality;
pub mod submission;
pub mod types;

pub use config::{AnalysisProfile, ExtractorConfig};
pub use errors::{AcquisitionError, BranchError, ExtractionError};
pub use pipeline::{BiomarkerPipeline, FEATURE_VERSION};
pub use types::{AudioSignal, AudioSource, FeatureRecord, FeatureValue};
