//! Core types for the voice biomarker extraction pipeline

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Canonical analysis rate every stage after acquisition assumes.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Mono PCM signal (f32 samples)
#[derive(Debug, Clone)]
pub struct AudioSignal {
    /// Audio samples, nominally in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Always 1 once acquisition has run
    pub channels: u16,
}

impl AudioSignal {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples widened to f64 for the numerically sensitive analysis stages.
    pub fn to_f64(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| s as f64).collect()
    }
}

/// Where a recording comes from.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Path(PathBuf),
    /// In-memory byte stream; the hint is a container extension such as "wav".
    Bytes {
        data: Arc<[u8]>,
        extension_hint: Option<String>,
    },
}

impl AudioSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn from_bytes(data: impl Into<Arc<[u8]>>, extension_hint: Option<&str>) -> Self {
        Self::Bytes {
            data: data.into(),
            extension_hint: extension_hint.map(|ext| ext.to_ascii_lowercase()),
        }
    }

    pub fn extension(&self) -> Option<String> {
        match self {
            Self::Path(path) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase()),
            Self::Bytes { extension_hint, .. } => extension_hint.clone(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes { data, .. } => format!("<{} byte stream>", data.len()),
        }
    }
}

/// One value in a flat feature record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Integer(i64),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// Flat, versioned feature record: feature name to value.
///
/// The key set is fixed by the pipeline version; degraded branches change
/// values, never keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecord {
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_number(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), FeatureValue::Number(value));
    }

    pub fn insert_integer(&mut self, key: impl Into<String>, value: i64) {
        self.values.insert(key.into(), FeatureValue::Integer(value));
    }

    pub fn insert_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(key.into(), FeatureValue::Text(value.into()));
    }

    pub fn insert_list<I, S>(&mut self, key: impl Into<String>, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = items.into_iter().map(Into::into).collect();
        self.values.insert(key.into(), FeatureValue::List(list));
    }

    pub fn extend_numbers<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        for (key, value) in entries {
            self.insert_number(key, value);
        }
    }

    /// Overlay `other`; its values win on shared keys.
    pub fn merge(&mut self, other: FeatureRecord) {
        self.values.extend(other.values);
    }

    pub fn get(&self, key: &str) -> Option<&FeatureValue> {
        self.values.get(key)
    }

    /// Numeric value for `key`; integers are widened.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(FeatureValue::as_f64)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }
}
