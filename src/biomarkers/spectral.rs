//! Broadband spectral shape per frame: centroid, roll-off, flux and energy.

use aus::WindowType;

use super::spectrogram::{stft, Spectrogram};
use super::statistics::MomentSet;
use crate::config::FrameLayout;
use crate::errors::BranchError;
use crate::types::FeatureRecord;

/// Share of the magnitude sum below the roll-off frequency.
pub const ROLLOFF_PERCENT: f64 = 0.85;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectralReport {
    pub centroid: MomentSet,
    pub rolloff: MomentSet,
    pub flux: MomentSet,
    pub energy: MomentSet,
}

impl SpectralReport {
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.extend_numbers(self.centroid.entries("spectral_centroid"));
        record.extend_numbers(self.rolloff.entries("spectral_rolloff"));
        record.extend_numbers(self.flux.entries("spectral_flux"));
        record.extend_numbers(self.energy.entries("short_time_energy"));
        record
    }
}

pub fn analyze(
    samples: &[f64],
    sample_rate: u32,
    layout: FrameLayout,
) -> Result<SpectralReport, BranchError> {
    if samples.is_empty() {
        return Err(BranchError::TooShort {
            samples: 0,
            required: 1,
        });
    }
    let spectrogram = stft(samples, sample_rate, layout, WindowType::Hanning);
    let frequencies = spectrogram.frequencies();

    let centroids: Vec<f64> = spectrogram
        .magnitude
        .iter()
        .map(|frame| spectral_centroid(frame, &frequencies))
        .collect();
    let rolloffs: Vec<f64> = spectrogram
        .magnitude
        .iter()
        .map(|frame| spectral_rolloff(frame, &frequencies, ROLLOFF_PERCENT))
        .collect();
    let energies: Vec<f64> = spectrogram
        .magnitude
        .iter()
        .map(|frame| frame.iter().map(|m| m * m).sum())
        .collect();

    Ok(SpectralReport {
        centroid: MomentSet::from_series(&centroids),
        rolloff: MomentSet::from_series(&rolloffs),
        flux: MomentSet::from_series(&spectral_flux(&spectrogram)),
        energy: MomentSet::from_series(&energies),
    })
}

/// Magnitude-weighted mean frequency; 0 for a silent frame.
pub fn spectral_centroid(magnitude: &[f64], frequencies: &[f64]) -> f64 {
    let total: f64 = magnitude.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    magnitude
        .iter()
        .zip(frequencies)
        .map(|(m, f)| m * f)
        .sum::<f64>()
        / total
}

/// Lowest bin frequency whose cumulative magnitude reaches `percent` of the
/// frame total.
pub fn spectral_rolloff(magnitude: &[f64], frequencies: &[f64], percent: f64) -> f64 {
    let total: f64 = magnitude.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let threshold = percent * total;
    let mut cumulative = 0.0;
    for (m, f) in magnitude.iter().zip(frequencies) {
        cumulative += m;
        if cumulative >= threshold {
            return *f;
        }
    }
    frequencies.last().copied().unwrap_or(0.0)
}

/// Rectified frame-to-frame magnitude change; the first frame is 0.
fn spectral_flux(spectrogram: &Spectrogram) -> Vec<f64> {
    let magnitude = &spectrogram.magnitude;
    if magnitude.is_empty() {
        return Vec::new();
    }
    std::iter::once(0.0)
        .chain(magnitude.windows(2).map(|pair| {
            pair[1]
                .iter()
                .zip(&pair[0])
                .map(|(curr, prev)| (curr - prev).max(0.0).powi(2))
                .sum::<f64>()
                .sqrt()
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CLINICAL_FRAMES, LEGACY_FRAMES};
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn tone(freq: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|n| (2.0 * PI * freq * n as f64 / 16_000.0).sin())
            .collect()
    }

    #[test]
    fn centroid_of_tone_sits_near_its_frequency() {
        let report = analyze(&tone(1_000.0, 16_000), 16_000, CLINICAL_FRAMES).unwrap();
        assert!((report.centroid.median - 1_000.0).abs() < 60.0, "{:?}", report.centroid);
        assert!(report.rolloff.median >= 1_000.0);
    }

    #[test]
    fn brighter_tone_has_higher_centroid() {
        let low = analyze(&tone(500.0, 16_000), 16_000, LEGACY_FRAMES).unwrap();
        let high = analyze(&tone(3_000.0, 16_000), 16_000, LEGACY_FRAMES).unwrap();
        assert!(high.centroid.median > low.centroid.median);
    }

    #[test]
    fn rolloff_and_centroid_of_flat_frame() {
        let magnitude = [1.0, 1.0, 1.0, 1.0];
        let frequencies = [0.0, 100.0, 200.0, 300.0];
        assert_abs_diff_eq!(spectral_centroid(&magnitude, &frequencies), 150.0, epsilon = 1e-12);
        assert_eq!(spectral_rolloff(&magnitude, &frequencies, 0.85), 300.0);
        assert_eq!(spectral_rolloff(&magnitude, &frequencies, 0.5), 100.0);
        assert_eq!(spectral_centroid(&[0.0; 4], &frequencies), 0.0);
    }

    #[test]
    fn onset_shows_up_as_flux() {
        let mut samples = vec![0.0; 4_000];
        samples.extend(tone(440.0, 4_000));
        let spectrogram = stft(&samples, 16_000, CLINICAL_FRAMES, WindowType::Hanning);
        let flux = spectral_flux(&spectrogram);
        assert_eq!(flux[0], 0.0);
        let onset = 4_000 / 160;
        let peak = flux
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
            .unwrap();
        assert!(peak.abs_diff(onset) <= 2, "peak at {}", peak);
    }

    #[test]
    fn record_has_four_moment_sets() {
        assert_eq!(SpectralReport::default().to_record().len(), 24);
    }
}
