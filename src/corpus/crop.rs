use rand::Rng;
use rand::rngs::StdRng;

/// Crop an aligned fixed-duration window out of a clean/noisy pair.
///
/// Both waveforms are sliced at the identical offset; they are the same
/// acoustic event with different noise, so any misalignment poisons the
/// supervision target. Clips shorter than the window pass through whole.
pub fn random_crop_aligned(
    clean: &[f32],
    noisy: &[f32],
    sample_rate: u32,
    duration_seconds: f32,
    rng: &mut StdRng,
) -> (Vec<f32>, Vec<f32>) {
    let usable = clean.len().min(noisy.len());
    let sample_rate = sample_rate.max(1);
    let audio_duration_secs = usable as f32 / sample_rate as f32;
    if duration_seconds >= audio_duration_secs {
        return (clean.to_vec(), noisy.to_vec());
    }

    let crop_len = (duration_seconds as f64 * sample_rate as f64).floor() as usize;
    let max_start = usable - crop_len;
    // random_range panics on an empty range, so the degenerate
    // exact-length case picks offset zero explicitly.
    let idx = if max_start == 0 {
        0
    } else {
        rng.random_range(0..max_start)
    };
    (
        clean[idx..idx + crop_len].to_vec(),
        noisy[idx..idx + crop_len].to_vec(),
    )
}
