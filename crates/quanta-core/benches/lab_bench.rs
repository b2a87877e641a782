use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use quanta_core::{MotionStyle, MusicConfig, MusicLab, PsycheConfig, PsycheLab};
use std::time::Duration;

const DT: f32 = 1.0 / 60.0;

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn particle_counts() -> Vec<usize> {
    std::env::var("QUANTA_BENCH_PARTICLES")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|t| t.trim().parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![500_usize, 2000, 8000])
}

fn configure(group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    group.sample_size(env_usize("QUANTA_BENCH_SAMPLES", 30));
    group.warm_up_time(Duration::from_secs(env_usize("QUANTA_BENCH_WARMUP_SECS", 2) as u64));
    group.measurement_time(Duration::from_secs(env_usize("QUANTA_BENCH_MEASURE_SECS", 10) as u64));
}

fn bench_music_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("music_step");
    configure(&mut group);
    let steps = env_usize("QUANTA_BENCH_STEPS", 64);
    for &particles in &particle_counts() {
        for style in [MotionStyle::Murmuration, MotionStyle::Polarization, MotionStyle::Lattice] {
            group.bench_function(format!("steps{steps}_particles{particles}_{}", style.name()), |b| {
                b.iter_batched(
                    || {
                        let mut config = MusicConfig {
                            capacity: particles,
                            particle_count: particles,
                            rng_seed: Some(0xBEEF),
                            trail_len: 0,
                            ..MusicConfig::default()
                        };
                        config.motion.style = style;
                        MusicLab::new(config).expect("music config")
                    },
                    |mut lab| {
                        let mut notes = 0_usize;
                        for _ in 0..steps {
                            lab.step(DT, &mut |_| notes += 1);
                        }
                        criterion::black_box(notes);
                    },
                    BatchSize::LargeInput,
                );
            });
        }
    }
    group.finish();
}

fn bench_psyche_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("psyche_step");
    configure(&mut group);
    let steps = env_usize("QUANTA_BENCH_STEPS", 64);
    for &particles in &particle_counts() {
        group.bench_function(format!("steps{steps}_particles{particles}"), |b| {
            b.iter_batched(
                || {
                    PsycheLab::new(PsycheConfig {
                        capacity: particles,
                        particle_count: particles,
                        rng_seed: Some(0xBEEF),
                        trail_len: 0,
                        ..PsycheConfig::default()
                    })
                    .expect("psyche config")
                },
                |mut lab| {
                    let mut events = 0_usize;
                    for _ in 0..steps {
                        lab.step(DT, &mut |_| events += 1);
                    }
                    criterion::black_box((events, lab.phase()));
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_music_steps, bench_psyche_steps);
criterion_main!(benches);
