//! Integrator benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use glam::Vec3;
use rand::{rngs::StdRng, Rng, SeedableRng};

use kart_replication::vehicle::input::{ControlFrame, ControlInputLog};
use kart_replication::vehicle::{integrator, OpenWorld, Plane, PlaneWorld};
use kart_replication::{Pose, VehicleConfig, VehicleState};

const DT: f32 = 1.0 / 60.0;

fn moving_state() -> VehicleState {
    let mut state = VehicleState::at_rest(Pose::IDENTITY);
    state.velocity = Vec3::new(12.0, 3.0, 0.0);
    state.throttle = 0.8;
    state.steering = -0.3;
    state
}

fn bench_step(c: &mut Criterion) {
    let config = VehicleConfig::default();
    let state = moving_state();

    c.bench_function("step_open_world", |b| {
        b.iter(|| integrator::step(black_box(&state), &config, DT, &OpenWorld))
    });

    let walls = PlaneWorld::new(
        (0..8)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::FRAC_PI_4;
                let normal = Vec3::new(angle.cos(), angle.sin(), 0.0);
                Plane::through(-normal * 5000.0, normal)
            })
            .collect(),
    );
    c.bench_function("step_eight_walls", |b| {
        b.iter(|| integrator::step(black_box(&state), &config, DT, &walls))
    });
}

fn bench_replay(c: &mut Criterion) {
    let config = VehicleConfig::default();
    let mut rng = StdRng::seed_from_u64(7);

    // One minute of input changing a few times a second
    let mut log = ControlInputLog::new();
    let mut frame = ControlFrame::NEUTRAL;
    for tick in 0..3600 {
        if tick % 20 == 0 {
            frame = ControlFrame::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0));
        }
        log.record(tick, frame);
    }

    c.bench_function("replay_one_minute", |b| {
        b.iter_batched(
            || VehicleState::at_rest(Pose::IDENTITY),
            |initial| integrator::replay(initial, &config, black_box(&log), 0, DT, &OpenWorld),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_step, bench_replay);
criterion_main!(benches);
