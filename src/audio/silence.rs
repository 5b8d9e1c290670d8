/// Energy-based silence splitting.
///
/// A frame is non-silent when its RMS is within `top_db` of the loudest
/// frame. Used to drop long silent stretches before cropping; disabled by
/// default since it shortens the usable signal.
pub(crate) fn split_nonsilent(samples: &[f32], hop: usize, top_db: f32) -> Vec<(usize, usize)> {
    let hop = hop.max(1);
    let window = hop * 2;
    if samples.is_empty() || samples.len() <= window {
        return vec![(0, samples.len())];
    }

    let mut frame_rms = Vec::new();
    let mut start = 0usize;
    while start < samples.len() {
        let end = (start + window).min(samples.len());
        frame_rms.push(rms(&samples[start..end]));
        start += hop;
    }

    let reference = frame_rms.iter().copied().fold(0.0_f32, f32::max);
    if reference <= 0.0 {
        return Vec::new();
    }
    let threshold = reference * db_to_linear(-top_db.abs());

    let mut intervals = Vec::new();
    let mut active_start: Option<usize> = None;
    for (frame, &value) in frame_rms.iter().enumerate() {
        if value >= threshold {
            if active_start.is_none() {
                active_start = Some(frame);
            }
        } else if let Some(begin) = active_start.take() {
            intervals.push(frames_to_samples(begin, frame, hop, window, samples.len()));
        }
    }
    if let Some(begin) = active_start {
        intervals.push(frames_to_samples(begin, frame_rms.len(), hop, window, samples.len()));
    }
    intervals
}

/// Concatenate the non-silent stretches of `samples`.
pub(crate) fn trim_silence(samples: &[f32], hop: usize, top_db: f32) -> Vec<f32> {
    let mut out = Vec::new();
    for (start, end) in split_nonsilent(samples, hop, top_db) {
        out.extend_from_slice(&samples[start..end]);
    }
    out
}

fn frames_to_samples(
    begin_frame: usize,
    end_frame: usize,
    hop: usize,
    window: usize,
    len: usize,
) -> (usize, usize) {
    let start = begin_frame * hop;
    let end = ((end_frame.saturating_sub(1)) * hop + window).min(len);
    (start.min(len), end)
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}
