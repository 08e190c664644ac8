use splashfluid::error::FluidError;
use splashfluid::{
    AnalysisRecorder, CanvasSize, DefaultBackend, Effect, FluidMetrics, ImageExporter,
    InputEvent, MOUSE_POINTER_ID, SimConfig, Simulation, SplashApp,
};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).ok_or("--config needs a file path")?;
            SimConfig::load(Path::new(path))?
        }
        None => SimConfig::default(),
    };

    if args.len() > 1 && args[1] == "test" {
        run_headless_test(config)?;
    } else {
        run_gui_app(config)?;
    }

    Ok(())
}

#[cfg(feature = "cpu")]
fn create_backend() -> Result<DefaultBackend, FluidError> {
    Ok(splashfluid::CpuFluid::new())
}

#[cfg(all(feature = "gpu", not(feature = "cpu")))]
fn create_backend() -> Result<DefaultBackend, FluidError> {
    pollster::block_on(splashfluid::GpuFluid::new())
}

/// Scripted press-and-drag on an 800x600 canvas, reporting metrics and
/// writing captures every 30 frames.
fn run_headless_test(config: SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Running headless splash test...");

    let canvas = CanvasSize::new(800.0, 600.0);
    let mut simulation = Simulation::with_seed(create_backend()?, config, canvas, 42);
    let mut surface = simulation.create_surface();
    let mut exporter = ImageExporter::new("splash_output");
    exporter.velocity_scale = 5.0;
    std::fs::create_dir_all(exporter.output_dir())?;
    let mut recorder = AnalysisRecorder::new();

    println!(
        "Grids: sim {}x{}, dye {}x{}",
        simulation.sim_size().width,
        simulation.sim_size().height,
        simulation.dye_size().width,
        simulation.dye_size().height
    );

    simulation.handle_event(InputEvent::PointerDown {
        id: MOUSE_POINTER_ID,
        x: 400.0,
        y: 300.0,
    });

    let dt = 1.0 / 60.0;
    for frame in 0..120 {
        if frame < 20 {
            let angle = frame as f32 * 0.3;
            simulation.handle_event(InputEvent::PointerMove {
                id: MOUSE_POINTER_ID,
                x: 400.0 + 120.0 * angle.cos(),
                y: 300.0 + 80.0 * angle.sin(),
            });
        } else if frame == 20 {
            simulation.handle_event(InputEvent::PointerUp {
                id: MOUSE_POINTER_ID,
            });
        }

        simulation.frame_with_dt(dt, canvas, &mut surface);

        let snapshot = simulation.snapshot()?;
        recorder.record_frame(&snapshot, frame);

        if frame % 30 == 0 || frame == 119 {
            FluidMetrics::analyze(&snapshot, frame).print_summary();
            exporter.export_capture_png(&mut simulation, &format!("splash_{frame:04}.png"))?;
            exporter.export_velocity_png(&mut simulation, &format!("velocity_{frame:04}.png"))?;
        }
    }

    recorder.print_trends();
    println!(
        "Test completed! Captures written to {}",
        exporter.output_dir().display()
    );
    Ok(())
}

fn run_gui_app(config: SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 720.0])
            .with_title("splashfluid"),
        ..Default::default()
    };

    let effect = Effect::mount(create_backend(), config.clone(), CanvasSize::new(1024.0, 720.0));
    eframe::run_native(
        "splashfluid",
        options,
        Box::new(|_cc| Box::new(SplashApp::new(effect, config))),
    )?;
    Ok(())
}
