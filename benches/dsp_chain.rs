use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use evilsdr::defaults::{BLOCK_SIZE, FFT_SIZE, SAMPLE_RATE, SPECTRUM_BINS};
use evilsdr::dsp::{BlockParams, DemodMode, DspChain};
use evilsdr::source::synthetic::{Carrier, SyntheticSource};
use evilsdr::source::{SampleBlock, SampleSource, TunerGain, TunerState};
use std::hint::black_box;
use std::time::Instant;

const CENTER: u64 = 98_500_000;

/// One full-size block with a carrier 50 kHz off center.
fn fixture_block() -> anyhow::Result<SampleBlock> {
    let mut source = SyntheticSource::new(
        SAMPLE_RATE,
        BLOCK_SIZE,
        vec![Carrier::new(CENTER + 50_000, 0.4)],
    );
    source.apply(&TunerState {
        center_freq: CENTER,
        sample_rate: SAMPLE_RATE,
        gain: TunerGain::AUTO,
        squelch_db: -60.0,
    })?;
    Ok(source.next_block()?)
}

fn bench_chain(c: &mut Criterion) {
    let block = match fixture_block() {
        Ok(block) => block,
        Err(e) => {
            eprintln!("Skipping dsp_chain benchmark: {}", e);
            return;
        }
    };
    let params = BlockParams::default();

    let mut group = c.benchmark_group("dsp_chain");
    group.throughput(Throughput::Elements(block.len() as u64));
    for mode in [DemodMode::Wbfm, DemodMode::Nbfm, DemodMode::Am] {
        let mut chain = DspChain::new(SAMPLE_RATE, mode, FFT_SIZE, SPECTRUM_BINS);
        group.bench_with_input(BenchmarkId::from_parameter(mode), &block, |b, block| {
            b.iter(|| black_box(chain.process(black_box(block), &params)))
        });
    }
    group.finish();

    // Real-time factor for the WBFM chain; below 0.5 fits in half a core.
    let mut chain = DspChain::new(SAMPLE_RATE, DemodMode::Wbfm, FFT_SIZE, SPECTRUM_BINS);
    let rounds = 20;
    let started = Instant::now();
    for _ in 0..rounds {
        black_box(chain.process(&block, &params));
    }
    let cpu = started.elapsed().as_secs_f64();
    let air = block.duration().as_secs_f64() * rounds as f64;
    println!(
        "WBFM chain: {:.1} ms per {:.1} ms block, realtime factor {:.3}",
        cpu * 1000.0 / rounds as f64,
        block.duration().as_secs_f64() * 1000.0,
        cpu / air
    );
}

criterion_group!(benches, bench_chain);
criterion_main!(benches);
