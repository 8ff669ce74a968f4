//! Fractal Drift: an animated, paintable Mandelbrot/Julia explorer.
//! - live view rendered with wgpu (or on the CPU) and shown through egui
//! - drag to pan and leave a ripple, wheel to zoom
//! - optional auto-evolve random walk of the view
//! - 1080p / 4K PNG wallpaper export, from the window or headless

mod animation;
mod config;
mod export;
#[cfg(feature = "gpu")]
mod gpu_renderer;
mod input;
mod palette;
mod pipeline;
mod render;
mod viewport;

use std::{path::PathBuf, process::ExitCode, time::Instant};

use chrono::Utc;
use clap::{Parser, Subcommand};
use eframe::{egui, App};
use egui::{pos2, vec2, Color32, ColorImage, Rect, Sense, TextureHandle};
use tracing::{error, info, trace};
use tracing_subscriber::EnvFilter;

use animation::AnimationDriver;
use config::{load_config, open_config_dialog, AppConfig};
use export::{ExportError, ExportRenderer, ExportResolution};
use input::{pointer_events, InputController};
use palette::{palette_matching, palettes};
use pipeline::LivePipeline;
use render::{FrameInputs, FrameSize, RenderBackend};
use viewport::ViewportState;

const BACKDROP: Color32 = Color32::from_rgb(15, 15, 26);

// ------------------------- CLI -------------------------

#[derive(Parser)]
#[command(name = "Fractal Drift")]
#[command(about = "Animated Mandelbrot/Julia explorer with wallpaper export")]
struct Args {
    /// Optional config file to start from (.json / .toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the config's render backend
    #[arg(short, long, value_enum, global = true)]
    backend: Option<RenderBackend>,

    /// Headless export (no UI)
    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Render a single wallpaper and write it as PNG
    Export {
        /// 1080p or 4K
        #[arg(short, long, default_value = "1080p")]
        resolution: ExportResolution,

        /// Session time in seconds the frame is rendered at
        #[arg(short, long, default_value_t = 0.0)]
        time: f64,

        /// Output directory (defaults to the config's export_dir, then ".")
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
}

fn initialise_tracing() {
    let default_filter =
        "warn,fractal_drift=info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ------------------------- App State -------------------------

struct FractalApp {
    state: ViewportState,
    input: InputController,
    driver: AnimationDriver,
    live: LivePipeline,
    exporter: ExportRenderer,
    export_dir: Option<PathBuf>,
    tex: Option<TextureHandle>,
    notice: Option<String>,
}

impl FractalApp {
    fn new(config: AppConfig, backend: RenderBackend, now: Instant) -> Self {
        info!(backend = backend.label(), "starting session");
        let mut input = InputController::new();
        input.set_paint_observer(|sample| {
            trace!(
                re = sample.seed.re,
                im = sample.seed.im,
                intensity = sample.intensity,
                "paint"
            );
        });
        Self {
            state: config.viewport,
            input,
            driver: AnimationDriver::new(now),
            live: LivePipeline::new(backend),
            exporter: ExportRenderer::new(backend),
            export_dir: config.export_dir,
            tex: None,
            notice: None,
        }
    }

    fn controls_ui(&mut self, ui: &mut egui::Ui, now: Instant) -> Option<ExportResolution> {
        let mut export_request = None;
        ui.horizontal_wrapped(|ui| {
            ui.heading("Fractal Drift");
            ui.separator();

            let mut julia = self.state.is_julia();
            if ui.checkbox(&mut julia, "Julia").changed() {
                self.state.set_is_julia(julia);
            }
            let mut evolve = self.state.auto_evolve();
            if ui.checkbox(&mut evolve, "Auto-evolve").changed() {
                self.driver.set_auto_evolve(&mut self.state, evolve, now);
            }
            let mut speed = self.state.animation_speed();
            if ui
                .add(egui::Slider::new(&mut speed, 0.0..=3.0).text("Speed"))
                .changed()
            {
                self.state.set_animation_speed(speed);
            }

            let current = palette_matching(&self.state.colors()).map_or("Custom", |p| p.name);
            ui.menu_button(format!("Palette: {current}"), |ui| {
                for palette in palettes() {
                    if ui
                        .button(palette.name)
                        .on_hover_text(palette.description)
                        .clicked()
                    {
                        self.state.apply_palette(palette);
                        info!(palette = palette.name, "palette selected");
                        ui.close_menu();
                    }
                }
            });
            ui.separator();

            if ui.button("Randomize").clicked() {
                let palette = self.state.randomize(self.driver.rng_mut());
                info!(palette = palette.name, julia = self.state.is_julia(), "randomized view");
            }
            if ui.button("Reset").clicked() {
                self.state.reset();
            }
            if ui.button("Load Config").clicked() {
                if let Some(config) = open_config_dialog() {
                    self.state = config.viewport;
                    if config.export_dir.is_some() {
                        self.export_dir = config.export_dir;
                    }
                }
            }
            ui.separator();

            for resolution in ExportResolution::ALL {
                if ui.button(format!("Export {}", resolution.tag())).clicked() {
                    export_request = Some(resolution);
                }
            }
            ui.separator();
            ui.label(format!(
                "{} renderer: {}",
                self.live.backend().label(),
                self.live.status().label()
            ));
            if self.driver.is_evolving() {
                ui.label("evolving");
            }
            if let Some(notice) = &self.notice {
                ui.separator();
                ui.label(notice);
            }
        });
        export_request
    }

    fn canvas_ui(&mut self, ui: &mut egui::Ui, now: Instant) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let surface = FrameSize::new(rect.width().max(0.0) as u32, rect.height().max(0.0) as u32);

        let hovered = response.hovered();
        let dragging = self.input.is_dragging();
        let events = ui.input(|i| pointer_events(i, rect, hovered, dragging));
        for event in events {
            self.input.handle(event, surface, &mut self.state);
        }

        let inputs = FrameInputs::capture(&self.state, self.driver.elapsed(now));
        if let Some(frame) = self.live.render_frame(&inputs, surface, now) {
            let image = ColorImage::from_rgba_unmultiplied(
                [frame.width as usize, frame.height as usize],
                &frame.pixels,
            );
            match &mut self.tex {
                Some(tex) => tex.set(image, egui::TextureOptions::LINEAR),
                None => {
                    self.tex = Some(ui.ctx().load_texture(
                        "fractal",
                        image,
                        egui::TextureOptions::LINEAR,
                    ))
                }
            }
        }

        let painter = ui.painter_at(rect);
        if let Some(tex) = &self.tex {
            painter.image(
                tex.id(),
                rect,
                Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                Color32::WHITE,
            );
        }
        let galley = painter.layout_no_wrap(
            status_text(&self.state),
            egui::FontId::monospace(12.0),
            Color32::from_white_alpha(220),
        );
        let origin = rect.left_top() + vec2(12.0, 12.0);
        painter.rect_filled(
            Rect::from_min_size(origin, galley.size()).expand(6.0),
            4.0,
            Color32::from_black_alpha(150),
        );
        painter.galley(origin, galley, Color32::WHITE);

        self.driver.end_frame(&mut self.state);
    }

    fn export(&mut self, resolution: ExportResolution) {
        let inputs = FrameInputs::capture(&self.state, self.driver.elapsed(Instant::now()));
        let image = match self.exporter.export(&inputs, resolution, Utc::now()) {
            Ok(image) => image,
            Err(err) => {
                error!(error = %err, resolution = resolution.tag(), "export failed");
                self.notice = Some(format!("Export failed: {err}"));
                return;
            }
        };

        let mut dialog = rfd::FileDialog::new()
            .add_filter("PNG", &["png"])
            .set_file_name(image.filename.as_str());
        if let Some(dir) = &self.export_dir {
            dialog = dialog.set_directory(dir);
        }
        let Some(path) = dialog.save_file() else {
            info!(file = %image.filename, "export cancelled");
            return;
        };
        self.notice = Some(match image.write_to(&path) {
            Ok(()) => format!("Saved {}x{} to {}", image.width, image.height, path.display()),
            Err(err) => {
                error!(path = %path.display(), error = %err, "could not save wallpaper");
                format!("Save failed: {err}")
            }
        });
    }
}

impl App for FractalApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.driver.tick(&mut self.state, now);

        let export_request = egui::TopBottomPanel::top("top")
            .show(ctx, |ui| self.controls_ui(ui, now))
            .inner;

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(BACKDROP))
            .show(ctx, |ui| self.canvas_ui(ui, now));

        if let Some(resolution) = export_request {
            self.export(resolution);
        }
        ctx.request_repaint();
    }
}

impl Drop for FractalApp {
    fn drop(&mut self) {
        self.driver.stop();
        self.live.teardown();
        info!("session closed");
    }
}

fn status_text(state: &ViewportState) -> String {
    let center = state.center();
    let mut text = format!(
        "center  {:+.6} {:+.6}i\nzoom    {:.4}x\n",
        center.re,
        center.im,
        state.zoom()
    );
    if state.is_julia() {
        let c = state.julia_c();
        text.push_str(&format!("julia c {:+.4} {:+.4}i\n", c.re, c.im));
    }
    let palette = palette_matching(&state.colors()).map_or("Custom", |p| p.name);
    text.push_str(&format!(
        "shift   {:.2}\npalette {palette}",
        state.color_shift()
    ));
    text
}

// ------------------------- Entry -------------------------

fn run_export(
    config: AppConfig,
    backend: RenderBackend,
    resolution: ExportResolution,
    time: f64,
    out_dir: Option<PathBuf>,
) -> Result<PathBuf, ExportError> {
    let inputs = FrameInputs::capture(&config.viewport, time.max(0.0));
    let image = ExportRenderer::new(backend).export(&inputs, resolution, Utc::now())?;
    let dir = out_dir
        .or(config.export_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    image.write_into(&dir)
}

fn run_app(config: AppConfig, backend: RenderBackend) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Fractal Drift")
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 400.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Fractal Drift",
        options,
        Box::new(move |_cc| Box::new(FractalApp::new(config, backend, Instant::now()))),
    )
}

fn main() -> ExitCode {
    let args = Args::parse();
    initialise_tracing();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(err) => {
                error!(path = %path.display(), error = %err, "could not load config");
                return ExitCode::FAILURE;
            }
        },
        None => AppConfig::default(),
    };
    let backend = args.backend.unwrap_or(config.render_backend);

    if let Some(Cmd::Export {
        resolution,
        time,
        out_dir,
    }) = args.cmd
    {
        return match run_export(config, backend, resolution, time, out_dir) {
            Ok(path) => {
                info!(path = %path.display(), "export complete");
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!(error = %err, "export failed");
                ExitCode::FAILURE
            }
        };
    }

    match run_app(config, backend) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "window closed with an error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lists_julia_constant_only_in_julia_mode() {
        let mut state = ViewportState::default();
        let text = status_text(&state);
        assert!(text.contains("center  -0.750000 +0.000000i"));
        assert!(text.contains("palette Electric Neon"));
        assert!(!text.contains("julia c"));

        state.set_is_julia(true);
        state.set_colors([[0.5; 3]; 3]);
        let text = status_text(&state);
        assert!(text.contains("julia c -0.7000 +0.27"));
        assert!(text.contains("palette Custom"));
    }

    #[test]
    fn headless_export_writes_png_into_out_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.viewport.set_center(viewport::Complex::new(50.0, 50.0));
        let path = run_export(
            config,
            RenderBackend::Cpu,
            ExportResolution::FullHd,
            2.0,
            Some(dir.path().to_path_buf()),
        )
        .expect("export");
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("fractal-") && name.ends_with("-1080p.png"));
        let decoded = image::open(&path).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (1920, 1080));
    }

    #[test]
    fn cli_parses_export_subcommand() {
        let args = Args::try_parse_from([
            "fractal_drift",
            "export",
            "--resolution",
            "4k",
            "--backend",
            "cpu",
            "--out-dir",
            "walls",
        ])
        .expect("parse");
        assert_eq!(args.backend, Some(RenderBackend::Cpu));
        let Some(Cmd::Export {
            resolution,
            out_dir,
            ..
        }) = args.cmd
        else {
            panic!("expected export subcommand");
        };
        assert_eq!(resolution, ExportResolution::Uhd4k);
        assert_eq!(out_dir, Some(PathBuf::from("walls")));
    }
}
