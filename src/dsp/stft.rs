use super::fft::{Complex32, FftPlan, hann_window};

/// Magnitude/phase frames in row-major `(freq_bins, frames)` layout.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub freq_bins: usize,
    pub frames: usize,
    magnitude: Vec<f32>,
    phase: Vec<f32>,
}

impl Spectrogram {
    pub fn magnitude_at(&self, bin: usize, frame: usize) -> f32 {
        self.magnitude[bin * self.frames + frame]
    }

    pub fn phase_at(&self, bin: usize, frame: usize) -> f32 {
        self.phase[bin * self.frames + frame]
    }

    /// One frame of magnitudes across all frequency bins.
    pub fn magnitude_frame(&self, frame: usize) -> Vec<f32> {
        (0..self.freq_bins)
            .map(|bin| self.magnitude_at(bin, frame))
            .collect()
    }

    pub fn phase_frame(&self, frame: usize) -> Vec<f32> {
        (0..self.freq_bins)
            .map(|bin| self.phase_at(bin, frame))
            .collect()
    }
}

/// Short-time Fourier transform with fixed parameters.
///
/// The parameter set (nfft, hop, Hann window, centering) is part of the
/// record schema: the corpus writer and the training-time reader must build
/// their plans from the same configuration or reconstruction diverges.
pub struct StftPlan {
    nfft: usize,
    hop: usize,
    center: bool,
    window: Vec<f32>,
    fft: FftPlan,
}

impl StftPlan {
    pub fn new(nfft: usize, hop: usize, center: bool) -> Result<Self, String> {
        if hop == 0 || hop > nfft {
            return Err(format!("hop length must be in 1..=nfft, got {hop}"));
        }
        Ok(Self {
            nfft,
            hop,
            center,
            window: hann_window(nfft),
            fft: FftPlan::new(nfft)?,
        })
    }

    pub fn freq_bins(&self) -> usize {
        self.nfft / 2 + 1
    }

    /// Number of frames produced for a signal of `sample_count` samples.
    pub fn frame_count(&self, sample_count: usize) -> usize {
        expected_frame_count(sample_count, self.nfft, self.hop, self.center)
    }

    pub fn compute(&self, samples: &[f32]) -> Result<Spectrogram, String> {
        let frames = self.frame_count(samples.len());
        if frames == 0 {
            return Err(format!(
                "signal of {} samples is shorter than one {}-sample frame",
                samples.len(),
                self.nfft
            ));
        }
        let freq_bins = self.freq_bins();
        let mut magnitude = vec![0.0_f32; freq_bins * frames];
        let mut phase = vec![0.0_f32; freq_bins * frames];
        let mut buffer = vec![Complex32::default(); self.nfft];
        let pad = if self.center { (self.nfft / 2) as isize } else { 0 };

        for frame in 0..frames {
            let start = (frame * self.hop) as isize - pad;
            for (i, cell) in buffer.iter_mut().enumerate() {
                let index = start + i as isize;
                let sample = if index < 0 {
                    0.0
                } else {
                    samples.get(index as usize).copied().unwrap_or(0.0)
                };
                *cell = Complex32::new(sample * self.window[i], 0.0);
            }
            self.fft.process(&mut buffer)?;
            for bin in 0..freq_bins {
                magnitude[bin * frames + frame] = buffer[bin].magnitude();
                phase[bin * frames + frame] = buffer[bin].phase();
            }
        }

        Ok(Spectrogram {
            freq_bins,
            frames,
            magnitude,
            phase,
        })
    }
}

/// Frame count for the given framing parameters.
///
/// With centering the signal is zero-padded by `nfft/2` on both edges, which
/// yields `sample_count/hop + 1` frames; without it only full windows count.
pub fn expected_frame_count(
    sample_count: usize,
    nfft: usize,
    hop: usize,
    center: bool,
) -> usize {
    let hop = hop.max(1);
    if center {
        sample_count / hop + 1
    } else if sample_count < nfft {
        0
    } else {
        (sample_count - nfft) / hop + 1
    }
}

/// Project a clean magnitude onto a noisy phase reference.
///
/// Returns `magnitude * cos(clean_phase - noise_phase)` element-wise. The
/// inputs must agree in length; a mismatch means the spectrograms were framed
/// differently and the projection would be meaningless.
pub fn phase_aware_scaling(
    magnitude: &[f32],
    clean_phase: &[f32],
    noise_phase: &[f32],
) -> Result<Vec<f32>, String> {
    if magnitude.len() != clean_phase.len() || clean_phase.len() != noise_phase.len() {
        return Err(format!(
            "phase shapes must match: magnitude {} clean phase {} noise phase {}",
            magnitude.len(),
            clean_phase.len(),
            noise_phase.len()
        ));
    }
    Ok(magnitude
        .iter()
        .zip(clean_phase.iter().zip(noise_phase.iter()))
        .map(|(&mag, (&clean, &noise))| mag * (clean - noise).cos())
        .collect())
}
