//! Autocorrelation pitch tracking with Viterbi path selection.
//!
//! Each frame is mean-removed and Hanning-windowed. Its autocorrelation is
//! divided by the window's own autocorrelation so the correlation at the
//! true period stays close to one. Peaks become voiced candidates, an
//! intensity-dependent unvoiced candidate competes with them, and a Viterbi
//! pass penalising octave jumps and voicing changes picks one per frame.

use std::f64::consts::PI;

use crate::config::PitchRange;

/// Frame step of every pitch-derived series.
pub const PITCH_TIME_STEP: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSettings {
    pub floor_hz: f64,
    pub ceiling_hz: f64,
    pub time_step: f64,
    pub periods_per_window: f64,
    pub voicing_threshold: f64,
    pub silence_threshold: f64,
    pub octave_cost: f64,
    pub octave_jump_cost: f64,
    pub voiced_unvoiced_cost: f64,
    pub max_candidates: usize,
}

impl PitchSettings {
    /// F0 contour settings: three periods per window.
    pub fn contour(range: PitchRange) -> Self {
        Self {
            floor_hz: range.floor_hz,
            ceiling_hz: range.ceiling_hz,
            time_step: PITCH_TIME_STEP,
            periods_per_window: 3.0,
            voicing_threshold: 0.45,
            silence_threshold: 0.03,
            octave_cost: 0.01,
            octave_jump_cost: 0.35,
            voiced_unvoiced_cost: 0.14,
            max_candidates: 15,
        }
    }

    /// Harmonicity settings: longer windows, no path costs.
    pub fn harmonicity(floor_hz: f64) -> Self {
        Self {
            floor_hz,
            ceiling_hz: 600.0,
            time_step: PITCH_TIME_STEP,
            periods_per_window: 4.5,
            voicing_threshold: 0.1,
            silence_threshold: 0.1,
            octave_cost: 0.0,
            octave_jump_cost: 0.0,
            voiced_unvoiced_cost: 0.0,
            max_candidates: 15,
        }
    }

    pub fn window_duration(&self) -> f64 {
        self.periods_per_window / self.floor_hz
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    frequency: f64,
    /// Score used for path selection.
    strength: f64,
    /// Normalised autocorrelation at the candidate lag.
    correlation: f64,
}

/// Selected pitch for one analysis frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchFrame {
    pub time: f64,
    /// Zero when unvoiced.
    pub frequency: f64,
    pub correlation: f64,
}

impl PitchFrame {
    pub fn voiced(&self) -> bool {
        self.frequency > 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PitchTrack {
    pub frames: Vec<PitchFrame>,
    pub time_step: f64,
}

impl PitchTrack {
    pub fn voiced_frequencies(&self) -> Vec<f64> {
        self.frames
            .iter()
            .filter(|frame| frame.voiced())
            .map(|frame| frame.frequency)
            .collect()
    }

    pub fn voiced_count(&self) -> usize {
        self.frames.iter().filter(|frame| frame.voiced()).count()
    }

    /// Frequency of the frame nearest to `time`, if it is voiced.
    pub fn frequency_at(&self, time: f64) -> Option<f64> {
        let first = self.frames.first()?;
        let position = ((time - first.time) / self.time_step).round();
        if position < 0.0 || position >= self.frames.len() as f64 {
            return None;
        }
        let frame = self.frames[position as usize];
        frame.voiced().then_some(frame.frequency)
    }

    /// Time spans `(start, end)` covered by consecutive voiced frames.
    pub fn voiced_spans(&self) -> Vec<(f64, f64)> {
        let half = self.time_step / 2.0;
        let mut spans = Vec::new();
        let mut open: Option<f64> = None;
        for (index, frame) in self.frames.iter().enumerate() {
            match (frame.voiced(), open) {
                (true, None) => open = Some(frame.time - half),
                (false, Some(start)) => {
                    spans.push((start, self.frames[index - 1].time + half));
                    open = None;
                }
                _ => {}
            }
        }
        if let (Some(start), Some(last)) = (open, self.frames.last()) {
            spans.push((start, last.time + half));
        }
        spans
    }
}

pub fn track_pitch(samples: &[f64], sample_rate: u32, settings: &PitchSettings) -> PitchTrack {
    let sr = sample_rate as f64;
    let duration = samples.len() as f64 / sr;
    let window_duration = settings.window_duration();

    let min_lag = ((sr / settings.ceiling_hz).ceil() as usize).max(2);
    let max_lag = (sr / settings.floor_hz).floor() as usize;

    let mut window_len = (window_duration * sr).round() as usize;
    if window_len % 2 == 0 {
        window_len += 1;
    }
    let half_window = (window_len / 2) as isize;
    let window = hanning_window(window_len);
    let window_ac = autocorrelation(&window, max_lag + 1);

    let frame_count = ((duration - window_duration) / settings.time_step + 1e-9)
        .floor()
        .max(0.0) as usize
        + 1;
    let first_time = (duration - (frame_count - 1) as f64 * settings.time_step) / 2.0;
    let global_peak = samples.iter().fold(0.0f64, |peak, s| peak.max(s.abs()));

    let mut frames: Vec<(f64, Vec<Candidate>)> = Vec::with_capacity(frame_count);
    for index in 0..frame_count {
        let time = first_time + index as f64 * settings.time_step;
        let start = (time * sr).round() as isize - half_window;
        let mut frame: Vec<f64> = (0..window_len as isize)
            .map(|offset| {
                let position = start + offset;
                if position < 0 {
                    0.0
                } else {
                    samples.get(position as usize).copied().unwrap_or(0.0)
                }
            })
            .collect();

        let local_peak = frame.iter().fold(0.0f64, |peak, s| peak.max(s.abs()));
        let intensity = local_peak / (global_peak + 1e-30);

        let mean = frame.iter().sum::<f64>() / frame.len() as f64;
        frame
            .iter_mut()
            .zip(&window)
            .for_each(|(sample, w)| *sample = (*sample - mean) * w);

        let mut candidates = vec![Candidate {
            frequency: 0.0,
            strength: unvoiced_strength(intensity, settings),
            correlation: 0.0,
        }];
        let frame_ac = autocorrelation(&frame, max_lag + 1);
        candidates.extend(voiced_candidates(
            &frame_ac, &window_ac, min_lag, max_lag, sr, settings,
        ));
        frames.push((time, candidates));
    }

    let path = viterbi(&frames, settings);
    PitchTrack {
        frames: frames
            .iter()
            .zip(path)
            .map(|((time, candidates), choice)| {
                let chosen = candidates[choice];
                PitchFrame {
                    time: *time,
                    frequency: chosen.frequency,
                    correlation: chosen.correlation,
                }
            })
            .collect(),
        time_step: settings.time_step,
    }
}

fn unvoiced_strength(intensity: f64, settings: &PitchSettings) -> f64 {
    let vt = settings.voicing_threshold;
    let scaled = intensity / (settings.silence_threshold / (1.0 + vt));
    vt + (2.0 - scaled).max(0.0)
}

fn voiced_candidates(
    frame_ac: &[f64],
    window_ac: &[f64],
    min_lag: usize,
    max_lag: usize,
    sample_rate: f64,
    settings: &PitchSettings,
) -> Vec<Candidate> {
    let r0 = frame_ac[0];
    if r0 <= 0.0 || window_ac[0] <= 0.0 {
        return Vec::new();
    }
    let normalized: Vec<f64> = frame_ac
        .iter()
        .zip(window_ac)
        .map(|(r, rw)| {
            if *rw > 0.0 {
                (r / r0) / (rw / window_ac[0])
            } else {
                0.0
            }
        })
        .collect();

    let mut candidates = Vec::new();
    for lag in min_lag..=max_lag.min(normalized.len() - 2) {
        let (prev, curr, next) = (normalized[lag - 1], normalized[lag], normalized[lag + 1]);
        if !(curr > prev && curr >= next) || curr < 0.5 * settings.voicing_threshold {
            continue;
        }
        let denom = prev - 2.0 * curr + next;
        let (refined, height) = if denom.abs() > 1e-12 {
            let delta = 0.5 * (prev - next) / denom;
            if delta.abs() < 1.0 {
                (lag as f64 + delta, curr - 0.25 * (prev - next) * delta)
            } else {
                (lag as f64, curr)
            }
        } else {
            (lag as f64, curr)
        };
        let frequency = sample_rate / refined;
        if frequency < settings.floor_hz || frequency > settings.ceiling_hz {
            continue;
        }
        let correlation = height.min(1.0);
        candidates.push(Candidate {
            frequency,
            strength: correlation - settings.octave_cost * (settings.floor_hz / frequency).log2(),
            correlation,
        });
    }

    candidates.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    candidates.truncate(settings.max_candidates);
    candidates
}

fn viterbi(frames: &[(f64, Vec<Candidate>)], settings: &PitchSettings) -> Vec<usize> {
    if frames.is_empty() {
        return Vec::new();
    }
    let time_correction = 0.01 / settings.time_step;
    let transition = |from: &Candidate, to: &Candidate| -> f64 {
        let cost = match (from.frequency > 0.0, to.frequency > 0.0) {
            (false, false) => 0.0,
            (true, true) => settings.octave_jump_cost * (to.frequency / from.frequency).log2().abs(),
            _ => settings.voiced_unvoiced_cost,
        };
        cost * time_correction
    };

    let mut cost: Vec<f64> = frames[0].1.iter().map(|c| -c.strength).collect();
    let mut back: Vec<Vec<usize>> = Vec::with_capacity(frames.len());
    back.push(vec![0; frames[0].1.len()]);

    for pair in frames.windows(2) {
        let (previous, current) = (&pair[0].1, &pair[1].1);
        let mut next_cost = Vec::with_capacity(current.len());
        let mut pointers = Vec::with_capacity(current.len());
        for to in current {
            let (best_from, best_cost) = previous
                .iter()
                .enumerate()
                .map(|(k, from)| (k, cost[k] + transition(from, to)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap_or((0, 0.0));
            next_cost.push(best_cost - to.strength);
            pointers.push(best_from);
        }
        cost = next_cost;
        back.push(pointers);
    }

    let mut path = vec![0usize; frames.len()];
    let mut choice = cost
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(index, _)| index)
        .unwrap_or(0);
    for index in (0..frames.len()).rev() {
        path[index] = choice;
        choice = back[index][choice];
    }
    path
}

pub(crate) fn hanning_window(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Raw autocorrelation for lags `0..=max_lag`.
pub(crate) fn autocorrelation(samples: &[f64], max_lag: usize) -> Vec<f64> {
    let n = samples.len();
    (0..=max_lag)
        .map(|lag| {
            if lag >= n {
                return 0.0;
            }
            samples[..n - lag]
                .iter()
                .zip(&samples[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CLINICAL_PITCH;

    const SR: u32 = 16_000;

    fn harmonic_tone(f0: f64, seconds: f64) -> Vec<f64> {
        let len = (seconds * SR as f64) as usize;
        (0..len)
            .map(|n| {
                let t = n as f64 / SR as f64;
                (1..=3)
                    .map(|h| (0.5 / h as f64) * (2.0 * PI * f0 * h as f64 * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn tracks_steady_tone() {
        let track = track_pitch(
            &harmonic_tone(220.0, 1.0),
            SR,
            &PitchSettings::contour(CLINICAL_PITCH),
        );
        let voiced = track.voiced_frequencies();
        assert!(voiced.len() > track.frames.len() * 9 / 10);
        let mean = voiced.iter().sum::<f64>() / voiced.len() as f64;
        assert!((mean - 220.0).abs() < 3.0, "mean f0 {}", mean);
    }

    #[test]
    fn silence_is_unvoiced() {
        let track = track_pitch(&vec![0.0; 16_000], SR, &PitchSettings::contour(CLINICAL_PITCH));
        assert_eq!(track.voiced_count(), 0);
        assert!(track.voiced_spans().is_empty());
    }

    #[test]
    fn frames_are_centred_on_the_signal() {
        let track = track_pitch(&vec![0.0; 16_000], SR, &PitchSettings::contour(CLINICAL_PITCH));
        let first = track.frames.first().unwrap().time;
        let last = track.frames.last().unwrap().time;
        assert!((first + last - 1.0).abs() < 1e-9);
    }

    #[test]
    fn voiced_span_covers_tone_region() {
        let mut samples = vec![0.0; 8_000];
        samples.extend(harmonic_tone(150.0, 1.0));
        samples.extend(vec![0.0; 8_000]);
        let track = track_pitch(&samples, SR, &PitchSettings::contour(CLINICAL_PITCH));
        let spans = track.voiced_spans();
        assert_eq!(spans.len(), 1);
        let (start, end) = spans[0];
        assert!((start - 0.5).abs() < 0.05, "start {}", start);
        assert!((end - 1.5).abs() < 0.05, "end {}", end);
        assert!(track.frequency_at(1.0).is_some());
        assert!(track.frequency_at(0.1).is_none());
    }

    #[test]
    fn window_autocorrelation_peaks_at_zero_lag() {
        let window = hanning_window(11);
        let ac = autocorrelation(&window, 12);
        assert!(ac[0] > ac[1]);
        assert_eq!(ac[11], 0.0);
    }
}
