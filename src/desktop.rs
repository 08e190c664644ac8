use crate::FluidBackend;
use crate::color::Rgb;
use crate::config::SimConfig;
use crate::export::ImageExporter;
use crate::pointer::{InputEvent, MOUSE_POINTER_ID};
use crate::scheduler::{CanvasSize, Effect};
use eframe::egui;
use std::time::Instant;

/// Desktop host: mounts the effect on a full-window canvas, forwards pointer
/// and touch input, and exposes the configuration in a side panel.
pub struct SplashApp<B: FluidBackend> {
    effect: Effect<B>,
    draft: SimConfig,
    applied: SimConfig,
    exporter: ImageExporter,
    texture: Option<egui::TextureHandle>,
    pixels_per_point: f32,
    show_controls: bool,
    status: String,
}

impl<B: FluidBackend> SplashApp<B> {
    pub fn new(effect: Effect<B>, config: SimConfig) -> Self {
        let status = if effect.is_active() {
            String::new()
        } else {
            "Fluid effect unavailable on this device".to_string()
        };
        Self {
            effect,
            draft: config.clone(),
            applied: config,
            exporter: ImageExporter::new("."),
            texture: None,
            pixels_per_point: 1.0,
            show_controls: true,
            status,
        }
    }

    fn forward_input(&mut self, ctx: &egui::Context, canvas: egui::Rect) {
        let pixels_per_point = ctx.pixels_per_point();
        if pixels_per_point != self.pixels_per_point {
            self.pixels_per_point = pixels_per_point;
            self.effect
                .handle_event(InputEvent::PixelRatioChanged(pixels_per_point));
        }

        let events = ctx.input(|i| i.events.clone());
        // egui mirrors touches as pointer events; prefer the per-finger stream.
        let has_touch = events
            .iter()
            .any(|e| matches!(e, egui::Event::Touch { .. }));

        for event in &events {
            if let Some(event) = translate_event(event, canvas, has_touch) {
                self.effect.handle_event(event);
            }
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        let c = &mut self.draft;
        ui.heading("Fluid");
        ui.add(egui::Slider::new(&mut c.sim_resolution, 32..=256).text("Sim resolution"));
        ui.add(egui::Slider::new(&mut c.dye_resolution, 128..=2048).text("Dye resolution"));
        ui.add(egui::Slider::new(&mut c.density_dissipation, 0.0..=10.0).text("Density diffusion"));
        ui.add(egui::Slider::new(&mut c.velocity_dissipation, 0.0..=10.0).text("Velocity diffusion"));
        ui.add(egui::Slider::new(&mut c.pressure, 0.0..=1.0).text("Pressure"));
        ui.add(egui::Slider::new(&mut c.pressure_iterations, 1..=60).text("Pressure iterations"));
        ui.add(egui::Slider::new(&mut c.curl, 0.0..=50.0).text("Vorticity"));
        ui.add(egui::Slider::new(&mut c.splat_radius, 0.01..=1.0).text("Splat radius"));
        ui.add(egui::Slider::new(&mut c.splat_force, 0.0..=20000.0).text("Splat force"));
        ui.add(egui::Slider::new(&mut c.color_update_speed, 0.0..=50.0).text("Color speed"));
        ui.checkbox(&mut c.shading, "Shading");
        ui.checkbox(&mut c.transparent, "Transparent");

        let mut back = [c.back_color.r, c.back_color.g, c.back_color.b];
        ui.horizontal(|ui| {
            ui.label("Background");
            ui.color_edit_button_rgb(&mut back);
        });
        c.back_color = Rgb::new(back[0], back[1], back[2]);

        ui.separator();
        if ui.button("Reset defaults").clicked() {
            self.draft = SimConfig::default();
        }
        if ui.button("Save capture").clicked() {
            self.status = match self.effect.simulation_mut() {
                Some(simulation) => match self
                    .exporter
                    .export_capture_png(simulation, "splash_capture.png")
                {
                    Ok(path) => format!("Saved {}", path.display()),
                    Err(err) => {
                        log::error!("capture failed: {err}");
                        format!("Capture failed: {err}")
                    }
                },
                None => "Nothing to capture".to_string(),
            };
        }
        if !self.status.is_empty() {
            ui.label(&self.status);
        }

        if self.draft != self.applied {
            self.applied = self.draft.clone();
            self.effect.set_config(self.applied.clone());
        }
    }

    fn show_frame(&mut self, ctx: &egui::Context, ui: &mut egui::Ui, canvas: egui::Rect) {
        let Some(frame) = self.effect.read_frame() else {
            return;
        };
        let image = egui::ColorImage::from_rgba_premultiplied(
            [frame.size.width as usize, frame.size.height as usize],
            &frame.to_premultiplied_bytes(),
        );
        match self.texture.as_mut() {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture(
                    "splash-fluid",
                    image,
                    egui::TextureOptions::LINEAR,
                ));
            }
        }
        let Some(texture) = self.texture.as_ref() else {
            return;
        };
        ui.painter().image(
            texture.id(),
            canvas,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );
    }
}

impl<B: FluidBackend> eframe::App for SplashApp<B> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            self.effect.unmount();
            return;
        }

        if ctx.input(|i| i.key_pressed(egui::Key::Tab)) {
            self.show_controls = !self.show_controls;
        }

        if self.show_controls {
            egui::SidePanel::right("controls").show(ctx, |ui| self.controls(ui));
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let (canvas, _response) =
                    ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());

                self.forward_input(ctx, canvas);
                let size = CanvasSize::new(canvas.width(), canvas.height());
                if self.effect.frame(Instant::now(), size).is_some() {
                    self.show_frame(ctx, ui, canvas);
                } else if !self.status.is_empty() {
                    ui.put(canvas, egui::Label::new(&self.status));
                }
            });

        ctx.request_repaint();
    }
}

/// Maps one egui event to an engine event in canvas-local coordinates.
///
/// Mouse motion and presses only count inside `canvas`; releases always do so
/// a drag ending over the side panel still lifts the pointer. With `has_touch`
/// the mirrored pointer events are dropped in favor of the touch stream.
fn translate_event(event: &egui::Event, canvas: egui::Rect, has_touch: bool) -> Option<InputEvent> {
    match *event {
        egui::Event::Touch { id, phase, pos, .. } => {
            let id = id.0 as i64;
            let local = pos - canvas.min;
            match phase {
                egui::TouchPhase::Start => Some(InputEvent::PointerDown {
                    id,
                    x: local.x,
                    y: local.y,
                }),
                egui::TouchPhase::Move => Some(InputEvent::PointerMove {
                    id,
                    x: local.x,
                    y: local.y,
                }),
                egui::TouchPhase::End | egui::TouchPhase::Cancel => Some(InputEvent::PointerUp { id }),
            }
        }
        egui::Event::PointerMoved(pos) if !has_touch && canvas.contains(pos) => {
            let local = pos - canvas.min;
            Some(InputEvent::PointerMove {
                id: MOUSE_POINTER_ID,
                x: local.x,
                y: local.y,
            })
        }
        egui::Event::PointerButton {
            pos,
            button: egui::PointerButton::Primary,
            pressed,
            ..
        } if !has_touch && (canvas.contains(pos) || !pressed) => {
            let local = pos - canvas.min;
            Some(if pressed {
                InputEvent::PointerDown {
                    id: MOUSE_POINTER_ID,
                    x: local.x,
                    y: local.y,
                }
            } else {
                InputEvent::PointerUp {
                    id: MOUSE_POINTER_ID,
                }
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> egui::Rect {
        egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(400.0, 300.0))
    }

    fn button(x: f32, y: f32, pressed: bool) -> egui::Event {
        egui::Event::PointerButton {
            pos: egui::pos2(x, y),
            button: egui::PointerButton::Primary,
            pressed,
            modifiers: egui::Modifiers::NONE,
        }
    }

    #[test]
    fn test_moves_over_side_panel_are_dropped() {
        let outside = egui::Event::PointerMoved(egui::pos2(520.0, 100.0));
        assert_eq!(translate_event(&outside, canvas(), false), None);

        let inside = egui::Event::PointerMoved(egui::pos2(100.0, 50.0));
        assert_eq!(
            translate_event(&inside, canvas(), false),
            Some(InputEvent::PointerMove {
                id: MOUSE_POINTER_ID,
                x: 100.0,
                y: 50.0
            })
        );
    }

    #[test]
    fn test_release_outside_canvas_still_lifts_pointer() {
        assert_eq!(translate_event(&button(520.0, 100.0, true), canvas(), false), None);
        assert_eq!(
            translate_event(&button(520.0, 100.0, false), canvas(), false),
            Some(InputEvent::PointerUp {
                id: MOUSE_POINTER_ID
            })
        );
    }

    #[test]
    fn test_mirrored_pointer_events_ignored_with_touch() {
        let moved = egui::Event::PointerMoved(egui::pos2(100.0, 50.0));
        assert_eq!(translate_event(&moved, canvas(), true), None);
        assert_eq!(translate_event(&button(100.0, 50.0, true), canvas(), true), None);
    }
}
