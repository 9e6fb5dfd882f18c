// Fluid backdrop tick benchmarks
//
// Runs full frames (splats, solver passes, presentation) on the CPU backend
// at the sim resolutions the device tiers pick.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use fluid_backdrop::constants::splat::AMBIENT_POINTER_ID;
use fluid_backdrop::{
    CapabilityProfile, CpuBackend, FluidEngine, PointerPhase, SimulationConfig,
};

const SIM_RESOLUTIONS: &[u32] = &[32, 56, 96];

fn engine(sim_resolution: u32) -> FluidEngine<CpuBackend> {
    let backend = CpuBackend::new(320, 180, CapabilityProfile::half_float());
    let config = SimulationConfig {
        sim_resolution,
        dye_resolution: sim_resolution * 2,
        target_fps: 0.0,
        seed: Some(1),
        ..SimulationConfig::default()
    };
    FluidEngine::start(backend, config, None).expect("engine should start")
}

fn bench_idle_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("idle_tick");

    for &resolution in SIM_RESOLUTIONS {
        group.bench_with_input(
            BenchmarkId::from_parameter(resolution),
            &resolution,
            |b, &resolution| {
                let mut engine = engine(resolution);
                let mut now = Duration::ZERO;
                b.iter(|| {
                    now += Duration::from_millis(16);
                    black_box(engine.tick(now).ok());
                });
            },
        );
    }

    group.finish();
}

fn bench_stirred_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("stirred_tick");

    for &resolution in SIM_RESOLUTIONS {
        group.bench_with_input(
            BenchmarkId::from_parameter(resolution),
            &resolution,
            |b, &resolution| {
                let mut engine = engine(resolution);
                let mut now = Duration::ZERO;
                let mut frame = 0u32;
                b.iter(|| {
                    frame += 1;
                    now += Duration::from_millis(16);
                    let x = 160.0 + 80.0 * (frame as f32 * 0.1).sin();
                    let y = 90.0 + 40.0 * (frame as f32 * 0.13).cos();
                    engine.feed_pointer(AMBIENT_POINTER_ID, x, y, PointerPhase::Move);
                    black_box(engine.tick(now).ok());
                });
            },
        );
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_idle_tick, bench_stirred_tick
}
criterion_main!(benches);
