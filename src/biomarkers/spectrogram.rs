use aus::spectrum;
use aus::{analysis, WindowType};

use crate::config::FrameLayout;

/// One-sided magnitude spectrogram, frames x bins.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub magnitude: Vec<Vec<f64>>,
    pub fft_size: usize,
    pub sample_rate: u32,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.magnitude.len()
    }

    pub fn power(&self) -> Vec<Vec<f64>> {
        analysis::make_power_spectrogram(&self.magnitude)
    }

    /// Centre frequency of each bin.
    pub fn frequencies(&self) -> Vec<f64> {
        spectrum::rfftfreq(self.fft_size, self.sample_rate)
    }
}

/// Short-time Fourier transform, FFT size equal to the window length.
/// Frame `i` is centred on sample `i * hop`.
pub fn stft(
    samples: &[f64],
    sample_rate: u32,
    layout: FrameLayout,
    window: WindowType,
) -> Spectrogram {
    let fft_size = layout.window;
    let pad = fft_size / 2;
    let mut padded = vec![0.0; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let frames = spectrum::rstft(&padded, fft_size, layout.hop, window);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&frames);

    Spectrogram {
        magnitude,
        fft_size,
        sample_rate,
    }
}
