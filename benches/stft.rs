use clearwave::dsp::stft::StftPlan;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

const SAMPLE_RATE: usize = 16_000;

fn one_second_tone() -> Vec<f32> {
    (0..SAMPLE_RATE)
        .map(|i| (i as f32 * 0.11).sin() * 0.6)
        .collect()
}

fn bench_stft(c: &mut Criterion) {
    let samples = one_second_tone();
    for &(nfft, hop) in &[(256usize, 64usize), (512, 256)] {
        let plan = StftPlan::new(nfft, hop, true).expect("plan");
        c.bench_with_input(
            BenchmarkId::new("stft_1s", format!("nfft{nfft}_hop{hop}")),
            &samples,
            |b, samples| {
                b.iter(|| plan.compute(black_box(samples)).expect("stft"));
            },
        );
    }
}

criterion_group!(benches, bench_stft);
criterion_main!(benches);
