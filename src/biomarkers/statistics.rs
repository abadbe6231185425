use serde::{Deserialize, Serialize};

/// Suffixes of the six summary statistics, in record order.
pub const MOMENT_SUFFIXES: [&str; 6] = ["mean", "std", "median", "iqr", "skew", "kurtosis"];

const MIN_SAMPLES: usize = 3;
const MIN_STD: f64 = 1e-6;

/// Six-statistic summary of a scalar series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentSet {
    pub mean: f64,
    pub std: f64,
    pub median: f64,
    pub iqr: f64,
    pub skew: f64,
    pub kurtosis: f64,
}

impl MomentSet {
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Summarise `values`, ignoring non-finite entries.
    ///
    /// Fewer than three usable samples or a near-constant series yields all
    /// zeros.
    pub fn from_series(values: &[f64]) -> Self {
        let data: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if data.len() < MIN_SAMPLES {
            return Self::zeros();
        }

        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let central = |power: i32| data.iter().map(|v| (v - mean).powi(power)).sum::<f64>() / n;
        let m2 = central(2);
        let std = m2.sqrt();
        if !(std >= MIN_STD) {
            return Self::zeros();
        }
        let m3 = central(3);
        let m4 = central(4);

        Self {
            mean,
            std,
            median: percentile(&data, 50.0),
            iqr: percentile(&data, 75.0) - percentile(&data, 25.0),
            skew: m3 / m2.powf(1.5),
            kurtosis: m4 / (m2 * m2) - 3.0,
        }
    }

    pub fn values(&self) -> [f64; 6] {
        [
            self.mean,
            self.std,
            self.median,
            self.iqr,
            self.skew,
            self.kurtosis,
        ]
    }

    /// `(name_suffix, value)` pairs for a flat record.
    pub fn entries(&self, name: &str) -> impl Iterator<Item = (String, f64)> + '_ {
        let prefix = name.to_string();
        MOMENT_SUFFIXES
            .iter()
            .zip(self.values())
            .map(move |(suffix, value)| (format!("{}_{}", prefix, suffix), value))
    }
}

/// Keys a MomentSet named `name` occupies.
pub fn moment_keys(name: &str) -> Vec<String> {
    MOMENT_SUFFIXES
        .iter()
        .map(|suffix| format!("{}_{}", name, suffix))
        .collect()
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Shannon entropy in nats of `weights` normalised to sum to one.
pub fn shannon_entropy(weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if !(total > 0.0) {
        return 0.0;
    }
    -weights
        .iter()
        .filter(|w| **w > 0.0)
        .map(|w| {
            let p = w / total;
            p * p.ln()
        })
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn summarises_known_series() {
        let moments = MomentSet::from_series(&[1.0, 2.0, 3.0, 4.0, 10.0]);
        assert_abs_diff_eq!(moments.mean, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(moments.std, 10.0f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(moments.median, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(moments.iqr, 2.0, epsilon = 1e-12);
        // deviations from the mean: -3, -2, -1, 0, 6
        let m2: f64 = 10.0;
        let m3 = (-27.0 - 8.0 - 1.0 + 0.0 + 216.0) / 5.0;
        let m4 = (81.0 + 16.0 + 1.0 + 0.0 + 1296.0) / 5.0;
        assert_abs_diff_eq!(moments.skew, m3 / m2.powf(1.5), epsilon = 1e-12);
        assert_abs_diff_eq!(moments.kurtosis, m4 / (m2 * m2) - 3.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_series_are_all_zero() {
        assert_eq!(MomentSet::from_series(&[]), MomentSet::zeros());
        assert_eq!(MomentSet::from_series(&[1.0, 2.0]), MomentSet::zeros());
        assert_eq!(MomentSet::from_series(&[5.0; 40]), MomentSet::zeros());
        assert_eq!(
            MomentSet::from_series(&[1.0, f64::NAN, 2.0, f64::NAN]),
            MomentSet::zeros()
        );
    }

    #[test]
    fn nan_samples_are_dropped() {
        let clean = MomentSet::from_series(&[1.0, 2.0, 4.0, 8.0]);
        let noisy = MomentSet::from_series(&[1.0, f64::NAN, 2.0, 4.0, f64::NAN, 8.0]);
        assert_eq!(clean, noisy);
    }

    #[test]
    fn entries_are_prefixed_with_series_name() {
        let keys: Vec<String> = MomentSet::zeros().entries("f0").map(|(k, _)| k).collect();
        assert_eq!(keys, moment_keys("f0"));
        assert_eq!(
            keys,
            vec!["f0_mean", "f0_std", "f0_median", "f0_iqr", "f0_skew", "f0_kurtosis"]
        );
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_abs_diff_eq!(percentile(&values, 10.0), 1.3, epsilon = 1e-12);
        assert_abs_diff_eq!(percentile(&values, 50.0), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(percentile(&values, 100.0), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn entropy_of_uniform_weights_is_log_n() {
        assert_abs_diff_eq!(shannon_entropy(&[0.5; 4]), 4.0f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(shannon_entropy(&[3.0]), 0.0, epsilon = 1e-12);
        assert_eq!(shannon_entropy(&[]), 0.0);
    }
}
