use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Named parameter sets. Older service variants used different pitch ranges
/// and spectral windows; both are kept addressable instead of picking one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisProfile {
    #[default]
    Clinical,
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchRange {
    pub floor_hz: f64,
    pub ceiling_hz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnrBounds {
    pub min_db: f64,
    pub max_db: f64,
}

impl HnrBounds {
    pub fn is_anomalous(&self, hnr_db: f64) -> bool {
        !hnr_db.is_finite() || hnr_db < self.min_db || hnr_db > self.max_db
    }
}

/// Analysis window in samples at the canonical rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub window: usize,
    pub hop: usize,
}

impl FrameLayout {
    pub const fn new(window: usize, hop: usize) -> Self {
        Self { window, hop }
    }
}

pub const CLINICAL_PITCH: PitchRange = PitchRange {
    floor_hz: 75.0,
    ceiling_hz: 600.0,
};
pub const LEGACY_PITCH: PitchRange = PitchRange {
    floor_hz: 75.0,
    ceiling_hz: 500.0,
};
pub const CLINICAL_HNR_BOUNDS: HnrBounds = HnrBounds {
    min_db: 0.0,
    max_db: 40.0,
};
/// 25 ms window, 10 ms hop at 16 kHz.
pub const CLINICAL_FRAMES: FrameLayout = FrameLayout::new(400, 160);
/// The older service ran its spectral statistics on 2048/512 frames.
pub const LEGACY_FRAMES: FrameLayout = FrameLayout::new(2048, 512);

/// Tunables for one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub profile: AnalysisProfile,
    pub pitch: PitchRange,
    pub hnr_bounds: HnrBounds,
    pub cepstral_frames: FrameLayout,
    pub spectral_frames: FrameLayout,
    pub parallel_branches: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::for_profile(AnalysisProfile::Clinical)
    }
}

impl ExtractorConfig {
    pub fn for_profile(profile: AnalysisProfile) -> Self {
        match profile {
            AnalysisProfile::Clinical => Self {
                profile,
                pitch: CLINICAL_PITCH,
                hnr_bounds: CLINICAL_HNR_BOUNDS,
                cepstral_frames: CLINICAL_FRAMES,
                spectral_frames: CLINICAL_FRAMES,
                parallel_branches: false,
            },
            AnalysisProfile::Legacy => Self {
                profile,
                pitch: LEGACY_PITCH,
                hnr_bounds: CLINICAL_HNR_BOUNDS,
                cepstral_frames: LEGACY_FRAMES,
                spectral_frames: LEGACY_FRAMES,
                parallel_branches: false,
            },
        }
    }

    /// Load a JSON config file when given, otherwise the clinical defaults.
    pub fn from_override(path: Option<PathBuf>) -> Result<Self> {
        let config = match path {
            Some(custom) => load_json(&custom)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_parallel_branches(mut self, enabled: bool) -> Self {
        self.parallel_branches = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.pitch.floor_hz > 0.0 && self.pitch.ceiling_hz > self.pitch.floor_hz,
            "pitch range must satisfy 0 < floor < ceiling (got {}..{})",
            self.pitch.floor_hz,
            self.pitch.ceiling_hz
        );
        ensure!(
            self.hnr_bounds.max_db > self.hnr_bounds.min_db,
            "HNR bounds must satisfy min < max"
        );
        for (label, frames) in [
            ("cepstral", self.cepstral_frames),
            ("spectral", self.spectral_frames),
        ] {
            ensure!(
                frames.window >= 2 && frames.hop > 0,
                "{} frames need window >= 2 and hop > 0",
                label
            );
        }
        Ok(())
    }
}

fn load_json(path: &Path) -> Result<ExtractorConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {:?}", path))?;
    parse_config(&raw).with_context(|| format!("invalid config file at {:?}", path))
}

/// Fields missing from the document fall back to the named profile's values.
fn parse_config(raw: &str) -> Result<ExtractorConfig> {
    let document: serde_json::Value =
        serde_json::from_str(raw).context("config is not valid JSON")?;
    let profile = match document.get("profile") {
        Some(value) => serde_json::from_value(value.clone()).context("unknown profile")?,
        None => AnalysisProfile::default(),
    };
    let mut merged = serde_json::to_value(ExtractorConfig::for_profile(profile))
        .context("failed to encode profile defaults")?;
    if let (Some(base), Some(overrides)) = (merged.as_object_mut(), document.as_object()) {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(merged).context("config fields have the wrong shape")
}
