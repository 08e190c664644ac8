use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use glam::Vec2;
use splashfluid::solver::{Splat, StepParams};
use splashfluid::target::GridSize;
use splashfluid::{CanvasSize, CpuFluid, FluidBackend, InputEvent, MOUSE_POINTER_ID, Rgb, SimConfig, Simulation};

fn seeded_fluid(sim: GridSize, dye: GridSize) -> CpuFluid {
    let mut fluid = CpuFluid::new();
    fluid.resize(sim, dye);
    fluid.splat(&Splat {
        point: Vec2::new(0.5, 0.5),
        velocity: Vec2::new(300.0, 120.0),
        color: Rgb::new(1.5, 0.3, 0.1),
        radius: 0.002,
        aspect_ratio: sim.aspect_ratio(),
    });
    fluid
}

fn benchmark_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver_step");
    let params = StepParams::from(&SimConfig::default());

    for size in [32u32, 64, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut fluid = seeded_fluid(GridSize::new(size, size), GridSize::new(size * 4, size * 4));
            b.iter(|| fluid.step(black_box(1.0 / 60.0), &params));
        });
    }
    group.finish();
}

fn benchmark_frame(c: &mut Criterion) {
    c.bench_function("frame_800x600_drag", |b| {
        let canvas = CanvasSize::new(800.0, 600.0);
        let config = SimConfig {
            dye_resolution: 256,
            ..SimConfig::default()
        };
        let mut sim = Simulation::with_seed(CpuFluid::new(), config, canvas, 9);
        let mut surface = sim.create_surface();
        sim.handle_event(InputEvent::PointerDown {
            id: MOUSE_POINTER_ID,
            x: 400.0,
            y: 300.0,
        });
        let mut angle = 0.0f32;

        b.iter(|| {
            angle += 0.2;
            sim.handle_event(InputEvent::PointerMove {
                id: MOUSE_POINTER_ID,
                x: 400.0 + 150.0 * angle.cos(),
                y: 300.0 + 100.0 * angle.sin(),
            });
            sim.frame_with_dt(1.0 / 60.0, canvas, &mut surface);
        });
    });
}

fn benchmark_passes(c: &mut Criterion) {
    let mut group = c.benchmark_group("passes");
    let mut fluid = seeded_fluid(GridSize::new(128, 128), GridSize::new(512, 512));
    let params = StepParams::from(&SimConfig::default());
    for _ in 0..5 {
        fluid.step(1.0 / 60.0, &params);
    }

    group.bench_function("pressure_solve_15", |b| {
        let mut fluid = fluid.clone();
        fluid.divergence_pass();
        b.iter(|| fluid.pressure_solve(black_box(15)));
    });

    group.bench_function("advect_dye", |b| {
        let mut fluid = fluid.clone();
        b.iter(|| fluid.advect_dye(black_box(1.0 / 60.0), 3.5));
    });

    group.bench_function("vorticity", |b| {
        let mut fluid = fluid.clone();
        b.iter(|| {
            fluid.curl_pass();
            fluid.vorticity_pass(black_box(3.0), 1.0 / 60.0);
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_step, benchmark_frame, benchmark_passes);
criterion_main!(benches);
