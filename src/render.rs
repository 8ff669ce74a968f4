// ------------------------- Frame Rendering -------------------------
//
// The per-pixel stage lives here as plain Rust so the CPU backend and the
// tests evaluate exactly what the WGSL program in `gpu_renderer` evaluates.
// Both run in f32.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::palette::Rgb;
use crate::viewport::ViewportState;

pub const MAX_ITERATIONS: u32 = 128;
pub const ESCAPE_RADIUS_SQ: f32 = 4.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RenderBackend {
    Cpu,
    Gpu,
}

impl Default for RenderBackend {
    fn default() -> Self {
        if cfg!(feature = "gpu") {
            RenderBackend::Gpu
        } else {
            RenderBackend::Cpu
        }
    }
}

impl RenderBackend {
    pub fn label(&self) -> &'static str {
        match self {
            RenderBackend::Cpu => "CPU",
            RenderBackend::Gpu => "GPU",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// No adapter/device right now. The caller may retry later.
    #[error("GPU context unavailable: {0}")]
    ContextUnavailable(String),
    /// The program failed validation. Terminal for the renderer instance.
    #[error("shader compile/link failed: {0}")]
    CompileOrLink(String),
    /// A single draw or readback failed.
    #[error("frame render failed: {0}")]
    Frame(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width.max(1) as f64 / self.height.max(1) as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Tightly packed RGBA8, row 0 at the top.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One consistent snapshot of the view plus the clock value for that frame.
#[derive(Debug, Clone)]
pub struct FrameInputs {
    pub state: ViewportState,
    pub time: f64,
}

impl FrameInputs {
    pub fn capture(state: &ViewportState, time: f64) -> Self {
        Self {
            state: state.clone(),
            time,
        }
    }

    pub fn shader_params(&self, size: FrameSize) -> ShaderParams {
        let s = &self.state;
        let center = s.center();
        let julia_c = s.julia_c();
        let seed = s.paint_seed();
        ShaderParams {
            resolution: [size.width.max(1) as f32, size.height.max(1) as f32],
            center: [center.re as f32, center.im as f32],
            julia_c: [julia_c.re as f32, julia_c.im as f32],
            paint_seed: [seed.re as f32, seed.im as f32],
            colors: s.colors(),
            time: self.time as f32,
            zoom: s.zoom() as f32,
            // only the fractional part reaches the gradient
            color_shift: s.color_shift().rem_euclid(1.0) as f32,
            animation_speed: s.animation_speed() as f32,
            paint_intensity: s.paint_intensity() as f32,
            is_julia: s.is_julia(),
        }
    }
}

/// f32 projection of a frame snapshot; mirrors the GPU uniform block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderParams {
    pub resolution: [f32; 2],
    pub center: [f32; 2],
    pub julia_c: [f32; 2],
    pub paint_seed: [f32; 2],
    pub colors: [Rgb; 3],
    pub time: f32,
    pub zoom: f32,
    pub color_shift: f32,
    pub animation_speed: f32,
    pub paint_intensity: f32,
    pub is_julia: bool,
}

pub trait FrameRenderer {
    fn label(&self) -> &'static str;

    fn render(&mut self, inputs: &FrameInputs, size: FrameSize) -> Result<Frame, RenderError>;
}

/// Produces renderers on demand; swapped out in tests.
pub type RendererFactory =
    Box<dyn FnMut(RenderBackend) -> Result<Box<dyn FrameRenderer>, RenderError>>;

/// Builds a fresh renderer instance. Every call yields independent resources.
pub fn create_renderer(backend: RenderBackend) -> Result<Box<dyn FrameRenderer>, RenderError> {
    match backend {
        RenderBackend::Cpu => Ok(Box::new(CpuRenderer)),
        RenderBackend::Gpu => {
            #[cfg(feature = "gpu")]
            {
                Ok(Box::new(crate::gpu_renderer::GpuRenderer::new()?))
            }
            #[cfg(not(feature = "gpu"))]
            {
                warn!("built without the `gpu` feature, rendering on the CPU");
                Ok(Box::new(CpuRenderer))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct CpuRenderer;

impl FrameRenderer for CpuRenderer {
    fn label(&self) -> &'static str {
        "cpu"
    }

    fn render(&mut self, inputs: &FrameInputs, size: FrameSize) -> Result<Frame, RenderError> {
        if size.is_empty() {
            warn!(width = size.width, height = size.height, "refusing to render empty frame");
            return Err(RenderError::Frame("empty target".into()));
        }
        Ok(render_frame_cpu(&inputs.shader_params(size), size))
    }
}

pub fn render_frame_cpu(params: &ShaderParams, size: FrameSize) -> Frame {
    let (w, h) = (size.width as usize, size.height as usize);
    let mut pixels = vec![0u8; w * h * 4];
    for (row, line) in pixels.chunks_exact_mut(w * 4).enumerate() {
        let v = 1.0 - (row as f32 + 0.5) / h as f32;
        for (col, px) in line.chunks_exact_mut(4).enumerate() {
            let u = (col as f32 + 0.5) / w as f32;
            px.copy_from_slice(&shade_pixel(params, [u, v]));
        }
    }
    Frame {
        width: size.width,
        height: size.height,
        pixels,
    }
}

/// Maps a surface coordinate (`uv` in `[0, 1]`, y up) to the warped fractal
/// plane point that gets iterated.
pub fn fractal_coordinate(p: &ShaderParams, uv: [f32; 2]) -> [f32; 2] {
    let aspect = p.resolution[0] / p.resolution[1];
    let mut x = (uv[0] * 2.0 - 1.0) * aspect / p.zoom + p.center[0];
    let mut y = (uv[1] * 2.0 - 1.0) / p.zoom + p.center[1];

    let breathe = (p.time * p.animation_speed).sin() * 0.1 + 1.0;
    x *= breathe;
    y *= breathe;

    let dist = ((x - p.paint_seed[0]).powi(2) + (y - p.paint_seed[1]).powi(2)).sqrt();
    let effect = (-dist * 5.0).exp() * p.paint_intensity;
    x += effect * (p.time * 2.0).sin() * 0.1;
    y += effect * (p.time * 2.0).cos() * 0.1;
    [x, y]
}

/// `julia_c` plus the time-driven wobble.
pub fn julia_constant(p: &ShaderParams) -> [f32; 2] {
    let t = p.time * p.animation_speed;
    [
        p.julia_c[0] + (t * 0.7).sin() * 0.2,
        p.julia_c[1] + (t * 0.5).cos() * 0.2,
    ]
}

/// Iteration at which `|z|² > 4` was first observed, or `None` if the orbit
/// stayed bounded for `MAX_ITERATIONS` steps.
pub fn escape_iteration(z0: [f32; 2], c: [f32; 2]) -> Option<u32> {
    let (mut zx, mut zy) = (z0[0], z0[1]);
    for i in 0..MAX_ITERATIONS {
        if zx * zx + zy * zy > ESCAPE_RADIUS_SQ {
            return Some(i);
        }
        let nx = zx * zx - zy * zy + c[0];
        zy = 2.0 * zx * zy + c[1];
        zx = nx;
    }
    None
}

/// Normalized escape value; `0.0` is the interior sentinel.
pub fn escape_value(z0: [f32; 2], c: [f32; 2]) -> f32 {
    match escape_iteration(z0, c) {
        Some(i) => i as f32 / MAX_ITERATIONS as f32,
        None => 0.0,
    }
}

/// Piecewise-linear cyclic gradient over three equal thirds of `t`.
pub fn gradient(colors: &[Rgb; 3], t: f32) -> Rgb {
    let t = t.rem_euclid(1.0);
    let third = 1.0 / 3.0;
    let (a, b, u) = if t < third {
        (colors[0], colors[1], t * 3.0)
    } else if t < 2.0 * third {
        (colors[1], colors[2], (t - third) * 3.0)
    } else {
        (colors[2], colors[0], (t - 2.0 * third) * 3.0)
    };
    [
        a[0] + (b[0] - a[0]) * u,
        a[1] + (b[1] - a[1]) * u,
        a[2] + (b[2] - a[2]) * u,
    ]
}

pub fn shade_value(p: &ShaderParams, value: f32) -> [u8; 4] {
    if value == 0.0 {
        return [0, 0, 0, 255];
    }
    let phase = p.time * p.animation_speed;
    let t = value + p.color_shift + phase * 0.3;
    let color = gradient(&p.colors, t);
    let intensity = 0.5 + 0.5 * (value * 20.0 + phase * 2.0).sin();
    [
        to_unorm(color[0] * intensity),
        to_unorm(color[1] * intensity),
        to_unorm(color[2] * intensity),
        255,
    ]
}

pub fn shade_pixel(p: &ShaderParams, uv: [f32; 2]) -> [u8; 4] {
    let coord = fractal_coordinate(p, uv);
    let value = if p.is_julia {
        escape_value(coord, julia_constant(p))
    } else {
        escape_value([0.0, 0.0], coord)
    };
    shade_value(p, value)
}

fn to_unorm(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
