#![cfg(feature = "cpu")]

use splashfluid::caps::Capabilities;
use splashfluid::error::FluidError;
use splashfluid::target::{GridSize, Texels};
use splashfluid::{
    CanvasSize, CpuFluid, Effect, ImageExporter, InputEvent, MOUSE_POINTER_ID, SimConfig, Simulation,
};

fn small_config() -> SimConfig {
    SimConfig {
        sim_resolution: 32,
        dye_resolution: 64,
        capture_resolution: 48,
        ..SimConfig::default()
    }
}

#[test]
fn test_simulation_allocates_grids_for_canvas() {
    let sim = Simulation::with_seed(
        CpuFluid::new(),
        small_config(),
        CanvasSize::new(800.0, 600.0),
        1,
    );

    assert_eq!(sim.backing_size(), GridSize::new(800, 600));
    assert_eq!(sim.sim_size(), GridSize::new(43, 32));
    assert_eq!(sim.dye_size(), GridSize::new(85, 64));

    let fields = sim.backend().fields().expect("fields allocated on creation");
    assert_eq!(fields.velocity.size(), sim.sim_size());
    assert_eq!(fields.pressure.size(), sim.sim_size());
    assert_eq!(fields.divergence.size(), sim.sim_size());
    assert_eq!(fields.curl.size(), sim.sim_size());
    assert_eq!(fields.dye.size(), sim.dye_size());
}

#[test]
fn test_tall_canvas_puts_resolution_on_width() {
    let sim = Simulation::with_seed(
        CpuFluid::new(),
        small_config(),
        CanvasSize::new(300.0, 600.0),
        1,
    );
    assert_eq!(sim.sim_size(), GridSize::new(32, 64));
    assert_eq!(sim.dye_size(), GridSize::new(64, 128));
}

#[test]
fn test_defaults_match_reference_values() {
    let c = SimConfig::default();
    assert_eq!(c.sim_resolution, 128);
    assert_eq!(c.dye_resolution, 1024);
    assert_eq!(c.capture_resolution, 512);
    assert_eq!(c.density_dissipation, 3.5);
    assert_eq!(c.velocity_dissipation, 2.0);
    assert_eq!(c.pressure, 0.1);
    assert_eq!(c.pressure_iterations, 15);
    assert_eq!(c.curl, 3.0);
    assert_eq!(c.splat_radius, 0.2);
    assert_eq!(c.splat_force, 6000.0);
    assert!(c.shading);
    assert_eq!(c.color_update_speed, 10.0);
    assert!(c.transparent);
}

#[test]
fn test_missing_linear_filtering_degrades_config() {
    let sim = Simulation::with_seed(
        CpuFluid::with_capabilities(Capabilities::without_linear_filtering()),
        SimConfig::default(),
        CanvasSize::new(400.0, 400.0),
        1,
    );
    assert_eq!(sim.config().dye_resolution, 256);
    assert!(!sim.config().shading);
    assert_eq!(sim.dye_size(), GridSize::new(256, 256));
}

#[test]
fn test_capture_uses_capture_resolution() {
    let mut sim = Simulation::with_seed(
        CpuFluid::new(),
        small_config(),
        CanvasSize::new(800.0, 600.0),
        1,
    );
    let frame = sim.capture().expect("cpu capture cannot fail");
    assert_eq!(frame.size, GridSize::new(64, 48));
    assert_eq!(frame.pixels.len(), 64 * 48);
}

#[test]
fn test_pixel_ratio_scales_backing_size() {
    let canvas = CanvasSize::new(400.0, 300.0);
    let mut sim = Simulation::with_seed(CpuFluid::new(), small_config(), canvas, 1);
    let mut surface = sim.create_surface();
    assert_eq!(surface.size, GridSize::new(400, 300));

    sim.handle_event(InputEvent::PixelRatioChanged(2.0));
    sim.frame_with_dt(0.0, canvas, &mut surface);

    assert_eq!(sim.backing_size(), GridSize::new(800, 600));
    assert_eq!(surface.size, GridSize::new(800, 600));
}

#[test]
fn test_inert_effect_ignores_everything() {
    let mut effect: Effect<CpuFluid> = Effect::mount(
        Err(FluidError::Unsupported("no float targets".into())),
        SimConfig::default(),
        CanvasSize::new(100.0, 100.0),
    );
    assert!(!effect.is_active());

    effect.handle_event(InputEvent::PointerDown {
        id: MOUSE_POINTER_ID,
        x: 50.0,
        y: 50.0,
    });
    effect.set_config(small_config());
    assert!(effect
        .frame(std::time::Instant::now(), CanvasSize::new(100.0, 100.0))
        .is_none());
    assert!(effect.read_frame().is_none());
}

#[test]
fn test_unmount_makes_effect_inert() {
    let canvas = CanvasSize::new(100.0, 100.0);
    let mut effect = Effect::mount(Ok(CpuFluid::new()), small_config(), canvas);
    assert!(effect.is_active());
    assert!(effect.frame(std::time::Instant::now(), canvas).is_some());

    effect.unmount();
    assert!(!effect.is_active());
    effect.handle_event(InputEvent::PointerUp {
        id: MOUSE_POINTER_ID,
    });
    assert!(effect.frame(std::time::Instant::now(), canvas).is_none());
}

#[test]
fn test_exporter_writes_capture_sequence_and_velocity() {
    let dir = std::env::temp_dir().join(format!("splashfluid-export-{}", std::process::id()));
    let exporter = ImageExporter::new(&dir);
    let canvas = CanvasSize::new(800.0, 600.0);
    let mut sim = Simulation::with_seed(CpuFluid::new(), small_config(), canvas, 1);
    let mut surface = sim.create_surface();
    sim.handle_event(InputEvent::PointerDown {
        id: MOUSE_POINTER_ID,
        x: 400.0,
        y: 300.0,
    });

    let paths = exporter
        .export_frame_sequence(&mut sim, &mut surface, canvas, 3, 1.0 / 60.0, "click")
        .expect("sequence export");
    assert_eq!(paths.len(), 3);
    assert!(paths[2].ends_with("click_frame_0002.png"));
    let capture = image::open(&paths[0]).expect("png readable");
    assert_eq!((capture.width(), capture.height()), (64, 48));

    let velocity = exporter
        .export_velocity_png(&mut sim, "velocity.png")
        .expect("velocity export");
    let velocity = image::open(&velocity).expect("png readable");
    assert_eq!((velocity.width(), velocity.height()), (43, 32));

    std::fs::remove_dir_all(&dir).ok();
}
