/// A run of consecutive silent frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilentRun {
    pub start_frame: usize,
    pub frames: usize,
}

impl SilentRun {
    pub fn duration_secs(&self, hop: usize, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        (self.frames * hop) as f64 / sample_rate as f64
    }
}

/// Collect silent runs of at least `min_frames` frames.
///
/// # Parameters
/// * `silent` - per-frame silence decisions
/// * `min_frames` - shortest run reported as a pause
///
/// A run still open at the final frame is reported as well.
pub fn detect_pauses(silent: &[bool], min_frames: usize) -> Vec<SilentRun> {
    let mut pauses = Vec::new();
    let mut run_start: Option<usize> = None;

    for (index, &is_silent) in silent.iter().enumerate() {
        if is_silent {
            run_start.get_or_insert(index);
        } else if let Some(start) = run_start.take() {
            push_if_long(&mut pauses, start, index - start, min_frames);
        }
    }

    if let Some(start) = run_start {
        push_if_long(&mut pauses, start, silent.len() - start, min_frames);
    }

    pauses
}

fn push_if_long(pauses: &mut Vec<SilentRun>, start_frame: usize, frames: usize, min_frames: usize) {
    if frames >= min_frames && frames > 0 {
        pauses.push(SilentRun {
            start_frame,
            frames,
        });
    }
}
