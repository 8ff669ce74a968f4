// ------------------------- GPU Backend -------------------------

use std::borrow::Cow;
use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use tracing::{debug, error, info};

use crate::render::{Frame, FrameInputs, FrameRenderer, FrameSize, RenderError, ShaderParams};

const SHADER_SRC: &str = r#"
struct VertexOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> VertexOut {
    var positions = array<vec2<f32>, 4>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, 1.0),
    );
    var output: VertexOut;
    let pos = positions[idx];
    output.pos = vec4<f32>(pos, 0.0, 1.0);
    output.uv = (pos + vec2<f32>(1.0, 1.0)) * 0.5;
    return output;
}

struct Params {
    resolution: vec2<f32>,
    center: vec2<f32>,
    julia_c: vec2<f32>,
    paint_seed: vec2<f32>,
    color1: vec4<f32>,
    color2: vec4<f32>,
    color3: vec4<f32>,
    time: f32,
    zoom: f32,
    color_shift: f32,
    animation_speed: f32,
    paint_intensity: f32,
    is_julia: u32,
    pad: vec2<f32>,
};

@group(0) @binding(0) var<uniform> params: Params;

fn escape_value(z0: vec2<f32>, c: vec2<f32>) -> f32 {
    var z = z0;
    for (var i: u32 = 0u; i < 128u; i = i + 1u) {
        if (dot(z, z) > 4.0) {
            return f32(i) / 128.0;
        }
        z = vec2<f32>(z.x * z.x - z.y * z.y, 2.0 * z.x * z.y) + c;
    }
    return 0.0;
}

fn gradient(t_in: f32) -> vec3<f32> {
    let t = fract(t_in);
    let third = 1.0 / 3.0;
    if (t < third) {
        return mix(params.color1.rgb, params.color2.rgb, t * 3.0);
    }
    if (t < 2.0 * third) {
        return mix(params.color2.rgb, params.color3.rgb, (t - third) * 3.0);
    }
    return mix(params.color3.rgb, params.color1.rgb, (t - 2.0 * third) * 3.0);
}

@fragment
fn fs_main(input: VertexOut) -> @location(0) vec4<f32> {
    let aspect = params.resolution.x / params.resolution.y;
    let phase = params.time * params.animation_speed;

    var uv = (input.uv * 2.0 - vec2<f32>(1.0, 1.0)) * vec2<f32>(aspect, 1.0);
    uv = uv / params.zoom + params.center;
    uv = uv * (sin(phase) * 0.1 + 1.0);

    let paint = exp(-distance(uv, params.paint_seed) * 5.0) * params.paint_intensity;
    uv = uv + paint * vec2<f32>(sin(params.time * 2.0), cos(params.time * 2.0)) * 0.1;

    var value: f32;
    if (params.is_julia != 0u) {
        let c = params.julia_c + vec2<f32>(sin(phase * 0.7) * 0.2, cos(phase * 0.5) * 0.2);
        value = escape_value(uv, c);
    } else {
        value = escape_value(vec2<f32>(0.0, 0.0), uv);
    }

    if (value == 0.0) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    let color = gradient(value + params.color_shift + phase * 0.3);
    let intensity = 0.5 + 0.5 * sin(value * 20.0 + phase * 2.0);
    return vec4<f32>(color * intensity, 1.0);
}
"#;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct RenderTarget {
    size: FrameSize,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    bytes_per_row: u32,
}

/// Owns one device, one compiled program and one offscreen target. Two
/// instances never share GPU state; dropping one releases everything it holds.
pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    target: Option<RenderTarget>,
}

impl GpuRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| RenderError::ContextUnavailable("no GPU adapter available".into()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("fractal_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
            },
            None,
        ))
        .map_err(|e| RenderError::ContextUnavailable(format!("failed to create device: {e}")))?;
        device.on_uncaptured_error(Box::new(|err| {
            error!(error = %err, "uncaptured wgpu error");
        }));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fractal_shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(SHADER_SRC)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fractal_bind"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<GpuUniform>() as u64
                    ),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fractal_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("fractal_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::CompileOrLink(err.to_string()));
        }

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fractal_uniform"),
            size: std::mem::size_of::<GpuUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fractal_bind"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "GPU renderer ready"
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            uniform_buffer,
            bind_group,
            target: None,
        })
    }

    fn ensure_target(&mut self, size: FrameSize) -> Result<(), RenderError> {
        if matches!(&self.target, Some(target) if target.size == size) {
            return Ok(());
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if size.is_empty() || size.width > max || size.height > max {
            return Err(RenderError::Frame(format!(
                "target {}x{} outside device limit {max}",
                size.width, size.height
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("fractal_target"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            // COPY_SRC keeps the drawn contents readable after the pass
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bytes_per_row = align_to(size.width * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fractal_readback"),
            size: bytes_per_row as u64 * size.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        debug!(width = size.width, height = size.height, "allocated offscreen target");
        self.target = Some(RenderTarget {
            size,
            texture,
            view,
            readback,
            bytes_per_row,
        });
        Ok(())
    }
}

impl FrameRenderer for GpuRenderer {
    fn label(&self) -> &'static str {
        "gpu"
    }

    fn render(&mut self, inputs: &FrameInputs, size: FrameSize) -> Result<Frame, RenderError> {
        self.ensure_target(size)?;
        let Some(target) = self.target.as_ref() else {
            return Err(RenderError::Frame("offscreen target missing".into()));
        };

        let uniforms = GpuUniform::from(inputs.shader_params(size));
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fractal_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("fractal_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.draw(0..4, 0..1);
        }
        encoder.copy_texture_to_buffer(
            target.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &target.readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(target.bytes_per_row),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = target.readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        let received = rx.recv().ok();
        let scope_error = pollster::block_on(self.device.pop_error_scope());
        let mapped = matches!(received, Some(Ok(())));
        if let Err(err) = readback_status(received, scope_error.map(|e| e.to_string())) {
            if mapped {
                target.readback.unmap();
            }
            return Err(err);
        }

        let row_bytes = (size.width * 4) as usize;
        let padded = target.bytes_per_row as usize;
        let mut pixels = vec![0u8; row_bytes * size.height as usize];
        {
            let data = slice.get_mapped_range();
            for (row_idx, chunk) in pixels.chunks_mut(row_bytes).enumerate() {
                let start = row_idx * padded;
                chunk.copy_from_slice(&data[start..start + row_bytes]);
            }
        }
        target.readback.unmap();

        Ok(Frame {
            width: size.width,
            height: size.height,
            pixels,
        })
    }
}

/// Folds the map callback and the popped validation scope into one result.
/// A validation error wins because it is what made the map fail.
fn readback_status(
    received: Option<Result<(), wgpu::BufferAsyncError>>,
    scope_error: Option<String>,
) -> Result<(), RenderError> {
    if let Some(err) = scope_error {
        return Err(RenderError::Frame(err));
    }
    match received {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(RenderError::Frame(format!("map error: {e}"))),
        None => Err(RenderError::Frame("readback callback dropped".into())),
    }
}

impl Drop for GpuRenderer {
    fn drop(&mut self) {
        debug!("releasing GPU renderer");
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GpuUniform {
    resolution: [f32; 2],
    center: [f32; 2],
    julia_c: [f32; 2],
    paint_seed: [f32; 2],
    color1: [f32; 4],
    color2: [f32; 4],
    color3: [f32; 4],
    time: f32,
    zoom: f32,
    color_shift: f32,
    animation_speed: f32,
    paint_intensity: f32,
    is_julia: u32,
    pad: [f32; 2],
}

impl From<ShaderParams> for GpuUniform {
    fn from(p: ShaderParams) -> Self {
        let rgba = |c: [f32; 3]| [c[0], c[1], c[2], 1.0];
        Self {
            resolution: p.resolution,
            center: p.center,
            julia_c: p.julia_c,
            paint_seed: p.paint_seed,
            color1: rgba(p.colors[0]),
            color2: rgba(p.colors[1]),
            color3: rgba(p.colors[2]),
            time: p.time,
            zoom: p.zoom,
            color_shift: p.color_shift,
            animation_speed: p.animation_speed,
            paint_intensity: p.paint_intensity,
            is_julia: u32::from(p.is_julia),
            pad: [0.0; 2],
        }
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    ((value + alignment - 1) / alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_matches_wgsl_layout() {
        // Params in WGSL: 4 vec2 + 3 vec4 + 6 scalars + trailing vec2 = 112 bytes
        assert_eq!(std::mem::size_of::<GpuUniform>(), 112);
    }

    #[test]
    fn readback_rows_are_aligned() {
        assert_eq!(align_to(1920 * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 7680);
        assert_eq!(align_to(10 * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 256);
    }

    #[test]
    fn readback_status_reports_every_failure() {
        assert!(readback_status(Some(Ok(())), None).is_ok());
        assert!(matches!(
            readback_status(None, None),
            Err(RenderError::Frame(msg)) if msg.contains("dropped")
        ));
        assert!(matches!(
            readback_status(Some(Err(wgpu::BufferAsyncError)), None),
            Err(RenderError::Frame(msg)) if msg.starts_with("map error")
        ));
        assert!(matches!(
            readback_status(None, Some("bad binding".into())),
            Err(RenderError::Frame(msg)) if msg == "bad binding"
        ));
    }
}
