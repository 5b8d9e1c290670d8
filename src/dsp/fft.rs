use std::f32::consts::PI;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Complex32 {
    pub(crate) re: f32,
    pub(crate) im: f32,
}

impl Complex32 {
    pub(crate) fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }

    fn mul(self, other: Self) -> Self {
        Self {
            re: self.re * other.re - self.im * other.im,
            im: self.re * other.im + self.im * other.re,
        }
    }

    fn add(self, other: Self) -> Self {
        Self {
            re: self.re + other.re,
            im: self.im + other.im,
        }
    }

    fn sub(self, other: Self) -> Self {
        Self {
            re: self.re - other.re,
            im: self.im - other.im,
        }
    }

    pub(crate) fn magnitude(self) -> f32 {
        (self.re * self.re + self.im * self.im).sqrt()
    }

    pub(crate) fn phase(self) -> f32 {
        self.im.atan2(self.re)
    }
}

pub(crate) fn hann_window(length: usize) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|n| 0.5_f32 * (1.0 - (2.0 * PI * n as f32 / denom).cos()))
        .collect()
}

/// Reusable forward-FFT plan for one power-of-two length.
///
/// Bit-reversal swaps and per-stage twiddle factors are precomputed once so
/// transforming every frame of a long signal stays cheap.
pub(crate) struct FftPlan {
    len: usize,
    swaps: Vec<(usize, usize)>,
    stages: Vec<Vec<Complex32>>,
}

impl FftPlan {
    pub(crate) fn new(len: usize) -> Result<Self, String> {
        if len == 0 || !len.is_power_of_two() {
            return Err(format!("FFT length must be power-of-two, got {len}"));
        }
        Ok(Self {
            len,
            swaps: build_swaps(len),
            stages: build_stages(len),
        })
    }

    pub(crate) fn process(&self, buffer: &mut [Complex32]) -> Result<(), String> {
        if buffer.len() != self.len {
            return Err(format!(
                "FFT length mismatch: buffer {} plan {}",
                buffer.len(),
                self.len
            ));
        }
        for &(i, j) in &self.swaps {
            buffer.swap(i, j);
        }
        for stage in &self.stages {
            let half = stage.len();
            let step = half * 2;
            for start in (0..self.len).step_by(step) {
                for i in 0..half {
                    let u = buffer[start + i];
                    let v = buffer[start + i + half].mul(stage[i]);
                    buffer[start + i] = u.add(v);
                    buffer[start + i + half] = u.sub(v);
                }
            }
        }
        Ok(())
    }
}

fn build_swaps(len: usize) -> Vec<(usize, usize)> {
    let mut swaps = Vec::new();
    let mut j = 0usize;
    for i in 1..len {
        let mut bit = len >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            swaps.push((i, j));
        }
    }
    swaps
}

fn build_stages(len: usize) -> Vec<Vec<Complex32>> {
    let mut stages = Vec::new();
    let mut step = 2usize;
    while step <= len {
        let half = step / 2;
        let angle = -2.0_f32 * PI / step as f32;
        let mut stage = Vec::with_capacity(half);
        for i in 0..half {
            let theta = angle * i as f32;
            let (sin, cos) = theta.sin_cos();
            stage.push(Complex32::new(cos, sin));
        }
        stages.push(stage);
        step *= 2;
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_is_symmetric_and_zero_at_edges() {
        let w = hann_window(8);
        assert!(w[0].abs() < 1e-6);
        assert!(w[7].abs() < 1e-6);
        assert!((w[1] - w[6]).abs() < 1e-6);
    }

    #[test]
    fn constant_signal_collapses_to_dc_bin() {
        let mut buf = vec![Complex32::new(1.0, 0.0); 8];
        let plan = FftPlan::new(8).unwrap();
        plan.process(&mut buf).unwrap();
        assert!((buf[0].re - 8.0).abs() < 1e-4);
        for bin in 1..8 {
            assert!(buf[bin].re.abs() < 1e-4);
            assert!(buf[bin].im.abs() < 1e-4);
        }
    }

    #[test]
    fn plan_matches_naive_dft() {
        let input: Vec<Complex32> = (0..16)
            .map(|i| Complex32::new((i as f32 * 0.25).sin(), 0.0))
            .collect();
        let mut planned = input.clone();
        let plan = FftPlan::new(16).unwrap();
        plan.process(&mut planned).unwrap();

        for (k, got) in planned.iter().enumerate() {
            let mut expected = Complex32::default();
            for (n, sample) in input.iter().enumerate() {
                let theta = -2.0 * PI * (k * n) as f32 / 16.0;
                expected = expected.add(sample.mul(Complex32::new(theta.cos(), theta.sin())));
            }
            assert!((got.re - expected.re).abs() < 1e-3);
            assert!((got.im - expected.im).abs() < 1e-3);
        }
    }

    #[test]
    fn plan_rejects_non_power_of_two() {
        assert!(FftPlan::new(12).is_err());
        assert!(FftPlan::new(0).is_err());
    }
}
