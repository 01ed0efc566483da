//! WGSL generation and the `wgpu` draw routine for a tweened point cloud.
//!
//! Points render as instanced screen-aligned quads: six vertices per
//! instance, every per-point attribute stepped per instance, and the
//! instance index standing in for the point's draw index in the stagger.

use std::fmt::Write as _;
use std::sync::Arc;

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::attributes::{AttributeLayout, AttributeSlot};
use crate::draw::{DrawFactory, DrawRequest, DrawRoutine, DrawUniforms};
use crate::error::{VisError, VisResult};
use crate::gpu::{GpuContext, GpuFrame};

const QUAD_VERTICES: u32 = 6;

/// Channels the vertex stage reads directly, with the length it expects.
const REQUIRED_CHANNELS: [(&str, usize); 3] = [("x", 1), ("y", 1), ("color", 4)];

const UNIFORMS_WGSL: &str = r#"struct Uniforms {
    elapsed: f32,
    duration: f32,
    delay_by_index: f32,
    point_size: f32,
    max_point_size: f32,
    scale: f32,
    stage_width: f32,
    stage_height: f32,
    translate: vec2<f32>,
    _padding: vec2<f32>,
};

@group(0) @binding(0)
var<uniform> u: Uniforms;
"#;

const BODY_WGSL: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

fn ease_cubic_in_out(raw: f32) -> f32 {
    let p = clamp(raw, 0.0, 2.0);
    var eased: f32;
    if (p <= 1.0) {
        eased = p * p * p;
    } else {
        let q = p - 2.0;
        eased = q * q * q + 2.0;
    }
    return clamp(eased / 2.0, 0.0, 1.0);
}

fn tween_progress(index: f32) -> f32 {
    if (u.duration == 0.0) {
        return 1.0;
    }
    let delay = u.delay_by_index * index;
    if (u.elapsed < delay) {
        return 0.0;
    }
    return ease_cubic_in_out(2.0 * (u.elapsed - delay) / u.duration);
}

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) instance_index: u32,
    point: PointInput,
) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, -0.5),
        vec2<f32>(-0.5, 0.5),
        vec2<f32>(-0.5, 0.5),
        vec2<f32>(0.5, -0.5),
        vec2<f32>(0.5, 0.5),
    );

    let t = tween_progress(f32(instance_index));
    let x = mix(point.x_start, point.x_end, t);
    let y = mix(point.y_start, point.y_end, t);

    let pixel = vec2<f32>(x, y) * u.scale + u.translate;
    let size = min(u.scale * u.point_size, u.max_point_size);
    let at = pixel + corners[vertex_index] * size;

    var out: VertexOutput;
    out.position = vec4<f32>(
        2.0 * at.x / u.stage_width - 1.0,
        1.0 - 2.0 * at.y / u.stage_height,
        0.0,
        1.0,
    );
    out.color = mix(point.color_start, point.color_end, t);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return input.color;
}
"#;

/// Vertex-stage source for `layout`: one `<key>_start` / `<key>_end` input per
/// channel at sequential locations, in slot order.
pub fn generate_wgsl(layout: &AttributeLayout) -> VisResult<String> {
    for (key, length) in REQUIRED_CHANNELS {
        match layout.channel(key) {
            Some(channel) if channel.length == length => {}
            Some(channel) => {
                return Err(VisError::config(format!(
                    "channel '{key}' must have length {length}, got {}",
                    channel.length
                )))
            }
            None => {
                return Err(VisError::config(format!(
                    "missing required channel '{key}'"
                )))
            }
        }
    }

    let mut source = String::from(UNIFORMS_WGSL);
    source.push_str("\nstruct PointInput {\n");
    for (location, slot) in layout.slots().iter().enumerate() {
        let _ = writeln!(
            source,
            "    @location({location}) {}: {},",
            slot.name,
            wgsl_type(slot.components)
        );
    }
    source.push_str("};\n");
    source.push_str(BODY_WGSL);
    Ok(source)
}

fn wgsl_type(components: usize) -> &'static str {
    match components {
        1 => "f32",
        2 => "vec2<f32>",
        3 => "vec3<f32>",
        _ => "vec4<f32>",
    }
}

fn vertex_format(components: usize) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn vertex_attributes(slots: &[AttributeSlot]) -> Vec<wgpu::VertexAttribute> {
    slots
        .iter()
        .enumerate()
        .map(|(location, slot)| wgpu::VertexAttribute {
            format: vertex_format(slot.components),
            offset: slot.offset,
            shader_location: location as u32,
        })
        .collect()
}

/// Compiles [`PointsDraw`] routines for frames targeting `format`.
///
/// The pipeline depends only on the attribute layout, so it is kept until a
/// request arrives with a different one.
pub struct PointsDrawFactory {
    gpu: Arc<GpuContext>,
    format: wgpu::TextureFormat,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipeline: Option<(AttributeLayout, Arc<wgpu::RenderPipeline>)>,
}

impl PointsDrawFactory {
    pub fn new(gpu: Arc<GpuContext>, format: wgpu::TextureFormat) -> Self {
        let bind_group_layout =
            gpu.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("tweenvis-points-bind-group-layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(
                                std::mem::size_of::<DrawUniforms>() as u64,
                            ),
                        },
                        count: None,
                    }],
                });
        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("tweenvis-points-pipeline-layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        Self {
            gpu,
            format,
            bind_group_layout,
            pipeline_layout,
            pipeline: None,
        }
    }

    fn pipeline_for(&mut self, layout: &AttributeLayout) -> VisResult<Arc<wgpu::RenderPipeline>> {
        if let Some((cached_layout, pipeline)) = &self.pipeline {
            if cached_layout == layout {
                return Ok(Arc::clone(pipeline));
            }
        }

        let max_attributes = self.gpu.device.limits().max_vertex_attributes as usize;
        if layout.slots().len() > max_attributes {
            return Err(VisError::config(format!(
                "{} vertex attributes exceed the device limit of {max_attributes}",
                layout.slots().len()
            )));
        }

        let source = generate_wgsl(layout)?;
        let attributes = vertex_attributes(layout.slots());
        let format = self.format;
        let pipeline_layout = &self.pipeline_layout;

        let pipeline = self.gpu.validated("points pipeline", |device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("tweenvis-points-shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("tweenvis-points-pipeline"),
                layout: Some(pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: layout.stride(),
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &attributes,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
            })
        })?;

        let pipeline = Arc::new(pipeline);
        self.pipeline = Some((layout.clone(), Arc::clone(&pipeline)));
        tracing::debug!(slots = layout.slots().len(), "compiled points pipeline");
        Ok(pipeline)
    }
}

impl DrawFactory<GpuFrame> for PointsDrawFactory {
    fn create_draw(&mut self, request: DrawRequest<'_>) -> VisResult<Box<dyn DrawRoutine<GpuFrame>>> {
        let pipeline = self.pipeline_for(request.layout)?;
        let device = &self.gpu.device;

        let vertex_buffer = (request.count > 0).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tweenvis-points-vertex-buffer"),
                contents: bytemuck::cast_slice(request.attributes),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tweenvis-points-uniforms"),
            contents: bytemuck::bytes_of(&DrawUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tweenvis-points-bind-group"),
            layout: &self.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Ok(Box::new(PointsDraw {
            gpu: Arc::clone(&self.gpu),
            pipeline,
            vertex_buffer,
            uniform_buffer,
            bind_group,
            count: request.count,
        }))
    }
}

/// One compiled points draw bound to its own vertex and uniform buffers.
pub struct PointsDraw {
    gpu: Arc<GpuContext>,
    pipeline: Arc<wgpu::RenderPipeline>,
    vertex_buffer: Option<wgpu::Buffer>,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    count: u32,
}

impl DrawRoutine<GpuFrame> for PointsDraw {
    fn draw(&self, frame: &mut GpuFrame, uniforms: &DrawUniforms) -> VisResult<()> {
        let Some(vertex_buffer) = &self.vertex_buffer else {
            return Ok(());
        };
        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tweenvis-points-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.draw(0..QUAD_VERTICES, 0..self.count);
        Ok(())
    }

    fn count(&self) -> u32 {
        self.count
    }
}
