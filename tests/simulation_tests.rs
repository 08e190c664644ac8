#![cfg(feature = "cpu")]

use glam::Vec2;
use splashfluid::target::{GridSize, Texels};
use splashfluid::{
    AnalysisRecorder, CanvasSize, CpuFluid, FluidBackend, FluidMetrics, InputEvent,
    MOUSE_POINTER_ID, Rgb, SimConfig, Simulation,
};
use std::time::{Duration, Instant};

const DT: f32 = 1.0 / 60.0;

fn small_config() -> SimConfig {
    SimConfig {
        sim_resolution: 32,
        dye_resolution: 64,
        capture_resolution: 32,
        ..SimConfig::default()
    }
}

fn simulation(config: SimConfig, canvas: CanvasSize) -> Simulation<CpuFluid> {
    Simulation::with_seed(CpuFluid::new(), config, canvas, 7)
}

fn down(x: f32, y: f32) -> InputEvent {
    InputEvent::PointerDown {
        id: MOUSE_POINTER_ID,
        x,
        y,
    }
}

fn mouse_move(x: f32, y: f32) -> InputEvent {
    InputEvent::PointerMove {
        id: MOUSE_POINTER_ID,
        x,
        y,
    }
}

#[test]
fn test_pointer_down_decays_in_place() {
    let canvas = CanvasSize::new(400.0, 400.0);
    let mut sim = simulation(small_config(), canvas);
    let mut surface = sim.create_surface();
    let mut recorder = AnalysisRecorder::new();

    sim.handle_event(down(200.0, 200.0));
    let pointer = sim.pointers().get(MOUSE_POINTER_ID).expect("pointer record");
    assert_eq!(pointer.texcoord, Vec2::new(0.5, 0.5));
    assert!(pointer.down);

    recorder.record_frame(&sim.snapshot().expect("snapshot"), 0);
    for frame in 1..=120 {
        sim.frame_with_dt(DT, canvas, &mut surface);
        recorder.record_frame(&sim.snapshot().expect("snapshot"), frame);
    }

    assert!(
        recorder.peak_dye_strictly_decreasing(),
        "peak dye must fall every frame"
    );

    let history = &recorder.metrics_history;
    let start = history[0].dye_centroid.expect("dye after click");
    assert!((start - Vec2::new(0.5, 0.5)).length() < 0.02, "start {start}");
    for metrics in history {
        let centroid = metrics.dye_centroid.expect("dye never fully vanishes");
        assert!(
            (centroid - Vec2::new(0.5, 0.5)).length() < 0.3,
            "frame {} centroid {centroid}",
            metrics.frame
        );
    }

    let first = &history[0];
    let last = &history[history.len() - 1];
    assert!(last.peak_dye < first.peak_dye * 0.01);
    assert!(last.peak_speed < first.peak_speed * 0.5);
}

#[test]
fn test_still_splat_footprint_stays_symmetric() {
    let canvas = CanvasSize::new(400.0, 400.0);
    let mut sim = simulation(small_config(), canvas);
    let mut surface = sim.create_surface();
    sim.splat(Vec2::new(0.5, 0.5), Vec2::ZERO, Rgb::new(1.0, 1.0, 1.0));

    let quadrants = |sim: &Simulation<CpuFluid>| {
        let dye = sim.backend().fields().expect("allocated").dye.read();
        let (w, h) = (dye.size().width, dye.size().height);
        let mut sums = [0.0f32; 4];
        for y in 0..h {
            for x in 0..w {
                let q = usize::from(x >= w / 2) + 2 * usize::from(y >= h / 2);
                sums[q] += dye.texel(x, y).x;
            }
        }
        sums
    };

    let mut peak = f32::MAX;
    for frame in 0..60 {
        sim.frame_with_dt(DT, canvas, &mut surface);
        let sums = quadrants(&sim);
        let max = sums.iter().copied().fold(0.0, f32::max);
        let min = sums.iter().copied().fold(f32::MAX, f32::min);
        assert!(min > 0.0, "frame {frame}: empty quadrant {sums:?}");
        assert!((max - min) < 0.01 * max, "frame {frame}: lopsided {sums:?}");

        let next = sim.backend().fields().expect("allocated").dye.read().max_component(0);
        assert!(next < peak, "frame {frame}: peak {next} did not fall");
        peak = next;
    }
}

#[test]
fn test_resize_same_aspect_preserves_dye() {
    let small = CanvasSize::new(800.0, 600.0);
    let large = CanvasSize::new(1600.0, 1200.0);
    let mut sim = simulation(small_config(), small);
    let mut surface = sim.create_surface();

    sim.handle_event(down(400.0, 300.0));
    for _ in 0..5 {
        sim.frame_with_dt(DT, small, &mut surface);
    }
    let before = sim.snapshot().expect("snapshot").dye;

    sim.frame_with_dt(0.0, large, &mut surface);

    assert_eq!(sim.backing_size(), GridSize::new(1600, 1200));
    assert_eq!(surface.size, GridSize::new(1600, 1200));
    let after = sim.snapshot().expect("snapshot").dye;
    assert_eq!(after.size(), before.size());
    for (a, b) in before.texels().iter().zip(after.texels()) {
        assert!((*a - *b).abs().max_element() < 1e-4);
    }
}

#[test]
fn test_resize_new_aspect_resamples_dye() {
    let wide = CanvasSize::new(800.0, 600.0);
    let tall = CanvasSize::new(600.0, 800.0);
    let config = SimConfig {
        splat_radius: 1.0,
        ..small_config()
    };
    let mut sim = simulation(config, wide);
    let mut surface = sim.create_surface();

    sim.handle_event(down(400.0, 300.0));
    sim.frame_with_dt(0.0, wide, &mut surface);
    let before = FluidMetrics::analyze(&sim.snapshot().expect("snapshot"), 0);

    sim.frame_with_dt(0.0, tall, &mut surface);
    assert_eq!(sim.sim_size(), GridSize::new(32, 43));
    assert_eq!(sim.dye_size(), GridSize::new(64, 85));

    let snapshot = sim.snapshot().expect("snapshot");
    assert_eq!(snapshot.dye.size(), GridSize::new(64, 85));
    assert_eq!(snapshot.velocity.size(), GridSize::new(32, 43));
    let after = FluidMetrics::analyze(&snapshot, 1);

    let texels_before = 85.0 * 64.0;
    let texels_after = 64.0 * 85.0;
    let mean_before = before.total_dye / texels_before;
    let mean_after = after.total_dye / texels_after;
    assert!(
        (mean_after - mean_before).abs() < 0.25 * mean_before,
        "mean dye {mean_before} -> {mean_after}"
    );
}

#[test]
fn test_zero_splat_force_deposits_color_only() {
    let canvas = CanvasSize::new(400.0, 400.0);
    let config = SimConfig {
        splat_force: 0.0,
        ..small_config()
    };
    let mut sim = simulation(config, canvas);
    let mut surface = sim.create_surface();

    for i in 0..20 {
        let t = i as f32 / 20.0;
        sim.handle_event(mouse_move(100.0 + 200.0 * t, 150.0 + 100.0 * t));
        sim.frame_with_dt(DT, canvas, &mut surface);
    }

    let metrics = FluidMetrics::analyze(&sim.snapshot().expect("snapshot"), 20);
    assert!(metrics.total_dye > 0.0, "drag should leave dye");
    assert!(metrics.peak_speed < 1e-6, "speed {}", metrics.peak_speed);
}

#[test]
fn test_hover_motion_splats_velocity() {
    let canvas = CanvasSize::new(400.0, 400.0);
    let mut sim = simulation(small_config(), canvas);
    let mut surface = sim.create_surface();

    sim.handle_event(mouse_move(100.0, 200.0));
    assert!(!sim.pointers().get(MOUSE_POINTER_ID).expect("created").moved);
    sim.handle_event(mouse_move(140.0, 200.0));
    assert!(sim.pointers().get(MOUSE_POINTER_ID).expect("created").moved);

    sim.frame_with_dt(DT, canvas, &mut surface);

    assert!(!sim.pointers().get(MOUSE_POINTER_ID).expect("created").moved);
    let metrics = FluidMetrics::analyze(&sim.snapshot().expect("snapshot"), 1);
    assert!(metrics.peak_speed > 1.0);
    assert!(metrics.total_dye > 0.0);
}

#[test]
fn test_color_cycle_recolors_pointers() {
    let canvas = CanvasSize::new(200.0, 200.0);
    let mut sim = simulation(small_config(), canvas);
    let mut surface = sim.create_surface();

    sim.handle_event(down(100.0, 100.0));
    let initial = sim.pointers().get(MOUSE_POINTER_ID).expect("pointer").color;

    // 10 per second at a clamped 0.016666 s is just under 1 after six frames.
    for _ in 0..6 {
        sim.frame_with_dt(DT, canvas, &mut surface);
    }
    assert!(sim.color_timer() < 1.0);
    assert_eq!(sim.pointers().get(MOUSE_POINTER_ID).expect("pointer").color, initial);

    sim.frame_with_dt(DT, canvas, &mut surface);
    assert!(sim.color_timer() >= 0.0 && sim.color_timer() < 1.0);
    assert_ne!(sim.pointers().get(MOUSE_POINTER_ID).expect("pointer").color, initial);
}

#[test]
fn test_long_frame_gap_is_clamped() {
    let canvas = CanvasSize::new(200.0, 200.0);
    let mut sim = simulation(small_config(), canvas);
    let mut surface = sim.create_surface();

    let start = Instant::now();
    sim.frame(start, canvas, &mut surface);
    assert_eq!(sim.color_timer(), 0.0);

    sim.frame(start + Duration::from_secs(5), canvas, &mut surface);
    assert!((sim.color_timer() - 0.16666).abs() < 1e-5);

    sim.frame_with_dt(-1.0, canvas, &mut surface);
    assert!((sim.color_timer() - 0.16666).abs() < 1e-5);
}

#[test]
fn test_config_changes_apply_at_frame_boundary() {
    let canvas = CanvasSize::new(400.0, 400.0);
    let mut sim = simulation(small_config(), canvas);
    let mut surface = sim.create_surface();

    sim.set_config(SimConfig {
        sim_resolution: 16,
        curl: 10.0,
        ..small_config()
    });
    assert_eq!(sim.config().curl, 3.0);
    assert_eq!(sim.sim_size(), GridSize::new(32, 32));

    sim.frame_with_dt(DT, canvas, &mut surface);
    assert_eq!(sim.config().curl, 10.0);
    assert_eq!(sim.sim_size(), GridSize::new(16, 16));
    assert_eq!(
        sim.backend().fields().expect("allocated").velocity.size(),
        GridSize::new(16, 16)
    );
}

#[test]
fn test_touches_keep_separate_records() {
    let canvas = CanvasSize::new(400.0, 400.0);
    let mut sim = simulation(small_config(), canvas);

    sim.handle_event(InputEvent::PointerDown { id: 1, x: 100.0, y: 100.0 });
    sim.handle_event(InputEvent::PointerDown { id: 2, x: 300.0, y: 300.0 });
    sim.handle_event(InputEvent::PointerMove { id: 2, x: 320.0, y: 300.0 });
    sim.handle_event(InputEvent::PointerUp { id: 1 });

    let one = sim.pointers().get(1).expect("touch 1");
    let two = sim.pointers().get(2).expect("touch 2");
    assert!(!one.down && !one.moved);
    assert!(two.down && two.moved);
    assert_eq!(one.texcoord, Vec2::new(0.25, 0.75));
    assert_eq!(sim.pointers().len(), 2);
}

#[test]
fn test_opaque_background_is_drawn_under_dye() {
    let canvas = CanvasSize::new(64.0, 64.0);
    let config = SimConfig {
        transparent: false,
        back_color: Rgb::new(0.5, 0.0, 0.0),
        ..small_config()
    };
    let mut sim = simulation(config, canvas);
    let mut surface = sim.create_surface();

    sim.frame_with_dt(DT, canvas, &mut surface);
    assert!(surface
        .pixels
        .iter()
        .all(|p| *p == glam::Vec4::new(0.5, 0.0, 0.0, 1.0)));

    let mut transparent = simulation(small_config(), canvas);
    let mut surface = transparent.create_surface();
    transparent.frame_with_dt(DT, canvas, &mut surface);
    assert!(surface.pixels.iter().all(|p| *p == glam::Vec4::ZERO));
}

#[test]
fn test_dye_is_displayed_upright() {
    let canvas = CanvasSize::new(200.0, 200.0);
    let mut sim = simulation(small_config(), canvas);
    let mut surface = sim.create_surface();

    // Near the top of the canvas in client coordinates.
    sim.handle_event(down(100.0, 30.0));
    sim.frame_with_dt(0.0, canvas, &mut surface);

    let frame = sim.backend_mut().read_surface(&surface).expect("cpu readback");
    let row_alpha = |y: u32| (0..frame.size.width).map(|x| frame.pixel(x, y).w).sum::<f32>();
    let brightest = (0..frame.size.height)
        .max_by(|a, b| row_alpha(*a).total_cmp(&row_alpha(*b)))
        .expect("rows");
    assert!(brightest < frame.size.height / 4, "brightest row {brightest}");
}

#[test]
fn test_zero_radius_click_on_texel_center_stays_finite() {
    let canvas = CanvasSize::new(256.0, 256.0);
    let config = SimConfig::from_json(
        r#"{"SIM_RESOLUTION": 32, "DYE_RESOLUTION": 128, "SPLAT_RADIUS": 0.0}"#,
    )
    .expect("config parses");
    let mut sim = simulation(config, canvas);
    let mut surface = sim.create_surface();

    // Lands exactly on dye texel (32, 64).
    sim.handle_event(down(65.0, 127.0));
    for _ in 0..3 {
        sim.frame_with_dt(DT, canvas, &mut surface);
    }

    let snapshot = sim.snapshot().expect("snapshot");
    assert!(snapshot.dye.texels().iter().all(|t| t.is_finite()));
    assert!(snapshot.velocity.texels().iter().all(|t| t.is_finite()));
    assert!(surface.pixels.iter().all(|p| p.is_finite()));
    assert!(snapshot.dye.max_component(0) > 0.0, "the click still deposits dye");
}
