//! GPU backend checks. Each test returns early when no adapter is available.
#![cfg(feature = "gpu")]

use splashfluid::analysis::FluidMetrics;
use splashfluid::target::{GridSize, Texels};
use splashfluid::{CanvasSize, FluidBackend, GpuFluid, InputEvent, MOUSE_POINTER_ID, SimConfig, Simulation};

fn small_config() -> SimConfig {
    SimConfig {
        sim_resolution: 32,
        dye_resolution: 64,
        capture_resolution: 48,
        ..SimConfig::default()
    }
}

async fn gpu() -> Option<GpuFluid> {
    match GpuFluid::new().await {
        Ok(fluid) => Some(fluid),
        Err(err) => {
            eprintln!("skipping gpu test: {err}");
            None
        }
    }
}

#[tokio::test]
async fn test_gpu_simulation_allocates_grids() {
    let Some(fluid) = gpu().await else { return };
    let mut sim = Simulation::with_seed(fluid, small_config(), CanvasSize::new(800.0, 600.0), 3);

    assert_eq!(sim.sim_size(), GridSize::new(43, 32));
    assert_eq!(sim.dye_size(), GridSize::new(85, 64));
    let surface = sim.create_surface();
    assert_eq!(surface.size(), GridSize::new(800, 600), "surface matches backing size");
}

#[tokio::test]
async fn test_gpu_click_deposits_dye() {
    let Some(fluid) = gpu().await else { return };
    let canvas = CanvasSize::new(200.0, 200.0);
    let mut sim = Simulation::with_seed(fluid, small_config(), canvas, 3);
    let mut surface = sim.create_surface();

    sim.handle_event(InputEvent::PointerDown {
        id: MOUSE_POINTER_ID,
        x: 100.0,
        y: 100.0,
    });
    for _ in 0..3 {
        sim.frame_with_dt(1.0 / 60.0, canvas, &mut surface);
    }

    let snapshot = sim.snapshot().expect("gpu snapshot");
    assert_eq!(snapshot.dye.size(), GridSize::new(64, 64));
    let metrics = FluidMetrics::analyze(&snapshot, 3);
    assert!(metrics.total_dye > 0.0, "click should leave dye");
    assert!(snapshot.dye.texels().iter().all(|t| t.is_finite()));
}

#[tokio::test]
async fn test_gpu_surface_and_capture_readback() {
    let Some(fluid) = gpu().await else { return };
    let canvas = CanvasSize::new(120.0, 90.0);
    let mut sim = Simulation::with_seed(fluid, small_config(), canvas, 3);
    let mut surface = sim.create_surface();
    sim.frame_with_dt(1.0 / 60.0, canvas, &mut surface);

    let frame = sim.backend_mut().read_surface(&surface).expect("surface readback");
    assert_eq!(frame.size, GridSize::new(120, 90));
    assert_eq!(frame.pixels.len(), 120 * 90);

    let capture = sim.capture().expect("capture");
    assert_eq!(capture.size, GridSize::new(64, 48));
}
