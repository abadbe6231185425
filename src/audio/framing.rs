//! Centred short-time framing shared by the frame-wise analyses.
//!
//! Frame `i` is centred on sample `i * hop`; samples outside the signal read
//! as zero. A signal of `n` samples yields `1 + n / hop` frames.

use crate::config::FrameLayout;

pub fn frame_count(len: usize, hop: usize) -> usize {
    if len == 0 || hop == 0 {
        return 0;
    }
    1 + len / hop
}

/// Copy of frame `index`, zero-padded at the signal edges.
pub fn centered_frame(samples: &[f64], index: usize, layout: FrameLayout) -> Vec<f64> {
    let mut frame = vec![0.0; layout.window];
    let start = (index * layout.hop) as isize - (layout.window / 2) as isize;
    for (offset, slot) in frame.iter_mut().enumerate() {
        let position = start + offset as isize;
        if position >= 0 {
            if let Some(&sample) = samples.get(position as usize) {
                *slot = sample;
            }
        }
    }
    frame
}

pub fn centered_frames(samples: &[f64], layout: FrameLayout) -> Vec<Vec<f64>> {
    (0..frame_count(samples.len(), layout.hop))
        .map(|index| centered_frame(samples, index, layout))
        .collect()
}

/// Root-mean-square of each centred frame.
pub fn frame_rms(samples: &[f64], layout: FrameLayout) -> Vec<f64> {
    centered_frames(samples, layout)
        .iter()
        .map(|frame| rms(frame))
        .collect()
}

/// Fraction of sign changes per centred frame.
pub fn zero_crossing_rate(samples: &[f64], layout: FrameLayout) -> Vec<f64> {
    centered_frames(samples, layout)
        .iter()
        .map(|frame| {
            if frame.is_empty() {
                return 0.0;
            }
            let crossings = frame
                .windows(2)
                .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
                .count();
            crossings as f64 / frame.len() as f64
        })
        .collect()
}

pub fn rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const LAYOUT: FrameLayout = FrameLayout::new(4, 2);

    #[test]
    fn counts_centred_frames() {
        assert_eq!(frame_count(0, 512), 0);
        assert_eq!(frame_count(32_000, 512), 63);
        assert_eq!(frame_count(10, 2), 6);
    }

    #[test]
    fn pads_edges_with_zeros() {
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(centered_frame(&samples, 0, LAYOUT), vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(centered_frame(&samples, 1, LAYOUT), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(centered_frame(&samples, 2, LAYOUT), vec![3.0, 4.0, 5.0, 0.0]);
    }

    #[test]
    fn rms_of_constant_frame() {
        let samples = vec![0.5; 16];
        let values = frame_rms(&samples, LAYOUT);
        assert_abs_diff_eq!(values[3], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn alternating_signal_crosses_every_sample() {
        let samples: Vec<f64> = (0..32).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let zcr = zero_crossing_rate(&samples, FrameLayout::new(8, 4));
        assert_abs_diff_eq!(zcr[2], 7.0 / 8.0, epsilon = 1e-12);
    }
}
