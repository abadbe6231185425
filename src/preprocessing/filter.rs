//! Butterworth IIR filters as cascades of second-order sections.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// Second-order section `(b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`,
/// run in transposed direct form II.
#[derive(Debug, Clone)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    state: [f64; 2],
}

impl Biquad {
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self {
            b,
            a,
            state: [0.0; 2],
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b[0] * input + self.state[0];
        self.state[0] = self.b[1] * input - self.a[0] * output + self.state[1];
        self.state[1] = self.b[2] * input - self.a[1] * output;
        output
    }

    pub fn reset(&mut self) {
        self.state = [0.0; 2];
    }

    /// Poles inside the unit circle (stability triangle).
    pub fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let numerator = self.b[0] + z_inv * self.b[1] + z_inv2 * self.b[2];
        let denominator = Complex64::new(1.0, 0.0) + z_inv * self.a[0] + z_inv2 * self.a[1];
        numerator / denominator
    }
}

/// Causal cascade of biquads.
#[derive(Debug, Clone)]
pub struct IirFilter {
    sections: Vec<Biquad>,
}

impl IirFilter {
    pub fn new(sections: Vec<Biquad>) -> Self {
        Self { sections }
    }

    pub fn butterworth(order: usize, cutoff_hz: f64, sample_rate: f64, kind: FilterKind) -> Self {
        Self::new(design_butterworth(order, cutoff_hz, sample_rate, kind))
    }

    /// Low-pass at `high_hz` cascaded with high-pass at `low_hz`.
    pub fn butterworth_bandpass(order: usize, low_hz: f64, high_hz: f64, sample_rate: f64) -> Self {
        let mut sections = design_butterworth(order, high_hz, sample_rate, FilterKind::Lowpass);
        sections.extend(design_butterworth(
            order,
            low_hz,
            sample_rate,
            FilterKind::Highpass,
        ));
        Self::new(sections)
    }

    pub fn process(&mut self, input: f64) -> f64 {
        self.sections
            .iter_mut()
            .fold(input, |sample, section| section.process(sample))
    }

    /// Filter a whole buffer from a zero initial state.
    pub fn apply(&mut self, samples: &[f64]) -> Vec<f64> {
        self.reset();
        samples.iter().map(|&sample| self.process(sample)).collect()
    }

    pub fn reset(&mut self) {
        self.sections.iter_mut().for_each(Biquad::reset);
    }

    pub fn is_stable(&self) -> bool {
        self.sections.iter().all(Biquad::is_stable)
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    /// Linear magnitude of the frequency response at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / sample_rate;
        let z_inv = Complex64::new(omega.cos(), -omega.sin());
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, section| {
                acc * section.response(z_inv)
            })
            .norm()
    }
}

fn design_butterworth(
    order: usize,
    cutoff_hz: f64,
    sample_rate: f64,
    kind: FilterKind,
) -> Vec<Biquad> {
    let wc = prewarp(cutoff_hz, sample_rate);
    let k = 2.0 * sample_rate;

    // One section per upper-half-plane pole (its conjugate is implied) plus
    // a first-order section for the real pole of odd orders.
    butterworth_poles(order)
        .into_iter()
        .filter(|pole| pole.im > -1e-10)
        .map(|pole| {
            let scaled = pole * wc;
            let (b, a) = if pole.im.abs() < 1e-10 {
                bilinear_1pole(scaled.re, k, kind)
            } else {
                bilinear_2pole(scaled, k, kind)
            };
            Biquad::new(b, a)
        })
        .collect()
}

fn prewarp(freq_hz: f64, sample_rate: f64) -> f64 {
    2.0 * sample_rate * (PI * freq_hz / sample_rate).tan()
}

/// Analog prototype poles on the left half of the unit circle.
fn butterworth_poles(order: usize) -> Vec<Complex64> {
    (0..order)
        .map(|k| {
            let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
            Complex64::new(theta.cos(), theta.sin())
        })
        .collect()
}

fn bilinear_1pole(p: f64, k: f64, kind: FilterKind) -> ([f64; 3], [f64; 2]) {
    let alpha = k - p;
    let a1 = -(k + p) / alpha;
    match kind {
        FilterKind::Lowpass => ([-p / alpha, -p / alpha, 0.0], [a1, 0.0]),
        FilterKind::Highpass => ([k / alpha, -k / alpha, 0.0], [a1, 0.0]),
    }
}

fn bilinear_2pole(p: Complex64, k: f64, kind: FilterKind) -> ([f64; 3], [f64; 2]) {
    let mag_sq = p.norm_sqr();
    let k2 = k * k;
    let d = k2 - 2.0 * k * p.re + mag_sq;
    let a = [2.0 * (mag_sq - k2) / d, (k2 + 2.0 * k * p.re + mag_sq) / d];
    let b = match kind {
        FilterKind::Lowpass => [mag_sq / d, 2.0 * mag_sq / d, mag_sq / d],
        FilterKind::Highpass => [k2 / d, -2.0 * k2 / d, k2 / d],
    };
    (b, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SR: f64 = 16_000.0;

    #[test]
    fn fifth_order_has_three_sections() {
        let filter = IirFilter::butterworth(5, 1_000.0, SR, FilterKind::Lowpass);
        assert_eq!(filter.num_sections(), 3);
        assert!(filter.is_stable());
    }

    #[test]
    fn lowpass_is_half_power_at_cutoff() {
        let filter = IirFilter::butterworth(5, 1_000.0, SR, FilterKind::Lowpass);
        assert_abs_diff_eq!(filter.magnitude_at(0.0, SR), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            filter.magnitude_at(1_000.0, SR),
            std::f64::consts::FRAC_1_SQRT_2,
            epsilon = 1e-6
        );
        assert!(filter.magnitude_at(4_000.0, SR) < 1e-2);
    }

    #[test]
    fn highpass_blocks_dc() {
        let filter = IirFilter::butterworth(5, 80.0, SR, FilterKind::Highpass);
        assert!(filter.magnitude_at(0.0, SR) < 1e-9);
        assert_abs_diff_eq!(filter.magnitude_at(1_000.0, SR), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn bandpass_passes_voice_band() {
        let filter = IirFilter::butterworth_bandpass(5, 80.0, 4_000.0, SR);
        assert!(filter.is_stable());
        assert_abs_diff_eq!(filter.magnitude_at(500.0, SR), 1.0, epsilon = 1e-2);
        assert!(filter.magnitude_at(20.0, SR) < 1e-2);
        assert!(filter.magnitude_at(7_500.0, SR) < 1e-3);
    }

    #[test]
    fn applied_filter_attenuates_out_of_band_tone() {
        let mut filter = IirFilter::butterworth_bandpass(5, 80.0, 4_000.0, SR);
        let tone: Vec<f64> = (0..16_000)
            .map(|n| (2.0 * PI * 7_000.0 * n as f64 / SR).sin())
            .collect();
        let filtered = filter.apply(&tone);
        let tail_peak = filtered[8_000..]
            .iter()
            .fold(0.0f64, |peak, &s| peak.max(s.abs()));
        assert!(tail_peak < 0.05);
    }
}
