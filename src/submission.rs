//! Hand-off to the persistence collaborator.
//!
//! The pipeline returns a record and never calls a sink itself. Callers
//! wrap the record with subject metadata and submit it wherever they store
//! data.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::FeatureRecord;

/// Caller-supplied context for one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub language: Option<String>,
    pub clinical_label: Option<String>,
    pub notes: Option<String>,
    pub recording_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub subject_id: String,
    pub metadata: RecordingMetadata,
    pub features: FeatureRecord,
}

impl Submission {
    pub fn new(
        subject_id: impl Into<String>,
        metadata: RecordingMetadata,
        features: FeatureRecord,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            metadata,
            features,
        }
    }
}

pub trait FeatureSink {
    fn submit(&self, submission: &Submission) -> Result<()>;
}

/// Writes each submission as a pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureSink for JsonFileSink {
    fn submit(&self, submission: &Submission) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let document = serde_json::to_string_pretty(submission)
            .context("Failed to serialize submission")?;
        fs::write(&self.path, document)
            .with_context(|| format!("Failed to write submission to {:?}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_sink_round_trips_submission() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("nested").join("subject.json"));

        let mut features = FeatureRecord::new();
        features.insert_number("hnr", 18.5);
        let submission = Submission::new(
            "P-001",
            RecordingMetadata {
                age: Some(67),
                clinical_label: Some("control".to_string()),
                ..RecordingMetadata::default()
            },
            features,
        );
        sink.submit(&submission).unwrap();

        let raw = fs::read_to_string(sink.path()).unwrap();
        let parsed: Submission = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, submission);
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["features"]["hnr"], 18.5);
        assert_eq!(value["metadata"]["age"], 67);
    }
}
