//! GPU renderer backend - one draw call for the whole fleet.
//!
//! Owns a single WGSL shader program hosted by the external map engine:
//! the vertex stage rotates and scales a unit-quad corner offset per
//! entity and projects the entity's world position through the host's
//! frame matrix; the fragment stage shapes a rounded-rectangle silhouette
//! with a border via signed-distance math, discarding pixels outside the
//! shape.
//!
//! Per frame the interpolated fleet is packed as six vertices per entity
//! into a staging array and uploaded into one pre-allocated GPU buffer.
//! No allocation happens per frame beyond that buffer reuse. Entities
//! beyond the configured pool size are dropped deterministically (sprites
//! arrive slot-ordered); that is documented degradation, not an error.

use crate::config::EngineConfig;
use crate::render::{EntitySprite, GpuFrame, RenderBackend, RenderError};
use bytemuck::{Pod, Zeroable};

const SPRITE_SHADER: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    viewport_px: vec2<f32>,
    quad_size_px: f32,
    corner_radius: f32,
    border_width: f32,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

struct VsIn {
    @location(0) world: vec2<f32>,
    @location(1) corner: vec2<f32>,
    @location(2) color: vec4<f32>,
    @location(3) angle: f32,
    @location(4) scale: f32,
};

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) local: vec2<f32>,
    @location(1) color: vec4<f32>,
};

@vertex
fn vs_main(vs_in: VsIn) -> VsOut {
    let c = cos(vs_in.angle);
    let s = sin(vs_in.angle);
    let rotated = vec2<f32>(
        vs_in.corner.x * c - vs_in.corner.y * s,
        vs_in.corner.x * s + vs_in.corner.y * c,
    );

    var clip = globals.view_proj * vec4<f32>(vs_in.world, 0.0, 1.0);

    // Screen-space offset: world y grows south, clip y grows up
    let half_px = globals.quad_size_px * 0.5 * vs_in.scale;
    let offset = vec2<f32>(rotated.x, -rotated.y) * half_px / globals.viewport_px * 2.0;
    clip = vec4<f32>(clip.xy + offset * clip.w, clip.zw);

    return VsOut(clip, vs_in.corner, vs_in.color);
}

@fragment
fn fs_main(fs_in: VsOut) -> @location(0) vec4<f32> {
    // Rounded-rectangle signed distance in local [-1, 1] space
    let r = globals.corner_radius;
    let q = abs(fs_in.local) - vec2<f32>(1.0 - r, 1.0 - r);
    let d = length(max(q, vec2<f32>(0.0, 0.0))) + min(max(q.x, q.y), 0.0) - r;

    if (d > 0.0) {
        discard;
    }

    // Darkened rim inside the border band
    let rim = step(-globals.border_width, d);
    let rgb = mix(fs_in.color.rgb, fs_in.color.rgb * 0.55, rim);

    // Premultiplied alpha
    return vec4<f32>(rgb * fs_in.color.a, fs_in.color.a);
}
"#;

/// One vertex of an entity quad (six per entity).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct QuadVertex {
    world: [f32; 2],
    corner: [f32; 2],
    color: [f32; 4],
    angle: f32,
    scale: f32,
}

impl QuadVertex {
    const SIZE: u64 = std::mem::size_of::<QuadVertex>() as u64;
    const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x2,
        2 => Float32x4,
        3 => Float32,
        4 => Float32,
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Frame-constant shader inputs. Layout mirrors the WGSL `Globals` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Globals {
    view_proj: [[f32; 4]; 4],
    viewport_px: [f32; 2],
    quad_size_px: f32,
    corner_radius: f32,
    border_width: f32,
    _pad: [f32; 3],
}

/// Unit-quad corners as two counter-clockwise triangles.
const QUAD_CORNERS: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
];

/// Packs sprites into quad vertices, truncating at the pool size.
///
/// Opacity folds into the vertex alpha so the fragment stage only ever
/// multiplies.
fn pack_sprites(staging: &mut Vec<QuadVertex>, sprites: &[EntitySprite], pool_size: usize) {
    staging.clear();
    let count = sprites.len().min(pool_size);

    for sprite in &sprites[..count] {
        let color = [
            sprite.rgba[0] as f32 / 255.0,
            sprite.rgba[1] as f32 / 255.0,
            sprite.rgba[2] as f32 / 255.0,
            sprite.rgba[3] as f32 / 255.0 * sprite.opacity,
        ];
        for corner in QUAD_CORNERS {
            staging.push(QuadVertex {
                world: sprite.world,
                corner,
                color,
                angle: sprite.angle,
                scale: sprite.scale,
            });
        }
    }
}

/// The GPU backend: shader program, reusable buffers, one batch draw.
pub struct GpuLayer {
    pipeline: wgpu::RenderPipeline,
    globals_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,

    /// CPU-side staging, capacity fixed at pool_size * 6
    staging: Vec<QuadVertex>,
    pool_size: usize,

    quad_size_px: f32,
    corner_radius: f32,
    border_width: f32,
}

impl GpuLayer {
    /// Creates the shader program and buffer pool on the host's device.
    ///
    /// A WGSL compile or pipeline validation error is fatal to this
    /// backend only: the error is returned and the host application must
    /// select the retained backend instead. There is no automatic
    /// failover afterwards.
    pub async fn new(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        config: &EngineConfig,
    ) -> Result<Self, RenderError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fleet-sprites"),
            source: wgpu::ShaderSource::Wgsl(SPRITE_SHADER.into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("fleet-sprites-globals"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fleet-sprites"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("fleet-sprites"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[QuadVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fleet-sprites-globals"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fleet-sprites-globals"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fleet-sprites-vertices"),
            size: config.gpu_pool_size as u64 * 6 * QuadVertex::SIZE,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        if let Some(error) = device.pop_error_scope().await {
            return Err(RenderError::Pipeline(error.to_string()));
        }

        Ok(Self {
            pipeline,
            globals_buffer,
            bind_group,
            vertex_buffer,
            staging: Vec::with_capacity(config.gpu_pool_size * 6),
            pool_size: config.gpu_pool_size,
            quad_size_px: config.quad_size_px,
            corner_radius: config.corner_radius,
            border_width: config.border_width,
        })
    }
}

impl RenderBackend for GpuLayer {
    fn draw(
        &mut self,
        sprites: &[EntitySprite],
        gpu: Option<GpuFrame<'_, '_>>,
    ) -> Result<(), RenderError> {
        let frame = gpu.ok_or(RenderError::FrameUnavailable)?;

        pack_sprites(&mut self.staging, sprites, self.pool_size);
        if self.staging.is_empty() {
            return Ok(());
        }

        let globals = Globals {
            view_proj: frame.view_proj,
            viewport_px: frame.viewport_px,
            quad_size_px: self.quad_size_px,
            corner_radius: self.corner_radius,
            border_width: self.border_width,
            _pad: [0.0; 3],
        };
        frame
            .queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));
        frame
            .queue
            .write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&self.staging));

        let pass = frame.pass;
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(0..self.staging.len() as u32, 0..1);

        Ok(())
    }

    fn name(&self) -> &'static str {
        "gpu"
    }
}
