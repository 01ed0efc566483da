use std::sync::{mpsc, Arc};

use crate::error::{VisError, VisResult};
use crate::stage::Canvas;

/// Adapter, device and queue shared by every draw routine on a stage.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Context without a window, for offscreen rendering.
    pub async fn headless() -> VisResult<Self> {
        Self::request(wgpu::Instance::default(), None).await
    }

    /// Context whose adapter can present to `surface`.
    pub async fn for_surface(
        instance: wgpu::Instance,
        surface: &wgpu::Surface<'_>,
    ) -> VisResult<Self> {
        Self::request(instance, Some(surface)).await
    }

    async fn request(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> VisResult<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: surface,
            })
            .await
            .ok_or_else(|| VisError::gpu("no suitable GPU adapter found"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tweenvis-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|error| VisError::gpu(format!("failed to request wgpu device: {error}")))?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "gpu ready");

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Runs `build` inside a validation error scope so shader and pipeline
    /// failures come back as errors instead of device panics.
    pub fn validated<T>(&self, what: &str, build: impl FnOnce(&wgpu::Device) -> T) -> VisResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = build(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(VisError::gpu(format!("{what}: {error}"))),
            None => Ok(value),
        }
    }
}

/// One frame being recorded: the encoder and the view every pass targets.
///
/// The view has already been cleared to the stage background when a draw
/// routine sees it, so routines load rather than clear.
pub struct GpuFrame {
    pub encoder: wgpu::CommandEncoder,
    pub view: wgpu::TextureView,
    pub surface_texture: Option<wgpu::SurfaceTexture>,
}

impl GpuFrame {
    pub fn begin(
        gpu: &GpuContext,
        view: wgpu::TextureView,
        surface_texture: Option<wgpu::SurfaceTexture>,
        background: [f32; 4],
    ) -> Self {
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tweenvis-frame-encoder"),
            });

        {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tweenvis-clear-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(to_color(background)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }

        Self {
            encoder,
            view,
            surface_texture,
        }
    }
}

fn to_color(rgba: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(rgba[0]),
        g: f64::from(rgba[1]),
        b: f64::from(rgba[2]),
        a: f64::from(rgba[3]),
    }
}

/// Offscreen render target with a padded readback buffer. Every finished
/// frame is copied into the buffer; [`OffscreenCanvas::read_rgba`] maps it.
pub struct OffscreenCanvas {
    gpu: Arc<GpuContext>,
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    readback_buffer: wgpu::Buffer,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
}

impl OffscreenCanvas {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(gpu: Arc<GpuContext>, width: u32, height: u32) -> VisResult<Self> {
        if width == 0 || height == 0 {
            return Err(VisError::config(format!(
                "canvas size must be positive, got {width}x{height}"
            )));
        }

        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tweenvis-offscreen-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let unpadded_bytes_per_row = width
            .checked_mul(4)
            .ok_or_else(|| VisError::config("frame width overflow when computing row bytes"))?;
        let padded_bytes_per_row =
            align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tweenvis-readback-buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            gpu,
            width,
            height,
            texture,
            readback_buffer,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        })
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Tightly packed RGBA bytes of the last finished frame.
    pub fn read_rgba(&self) -> VisResult<Vec<u8>> {
        let buffer_slice = self.readback_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();

        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.gpu.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| VisError::gpu("failed receiving GPU map callback"))?
            .map_err(|error| VisError::gpu(format!("GPU buffer mapping failed: {error}")))?;

        let row = self.unpadded_bytes_per_row as usize;
        let mapped = buffer_slice.get_mapped_range();
        let mut frame = vec![0_u8; row * self.height as usize];
        for (row_index, chunk) in mapped
            .chunks(self.padded_bytes_per_row as usize)
            .take(self.height as usize)
            .enumerate()
        {
            let start = row_index * row;
            frame[start..start + row].copy_from_slice(&chunk[..row]);
        }

        drop(mapped);
        self.readback_buffer.unmap();
        Ok(frame)
    }
}

impl Canvas for OffscreenCanvas {
    type Frame = GpuFrame;

    fn begin_frame(&mut self, background: [f32; 4]) -> VisResult<GpuFrame> {
        let view = self
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuFrame::begin(&self.gpu, view, None, background))
    }

    fn finish_frame(&mut self, frame: GpuFrame) -> VisResult<()> {
        let mut encoder = frame.encoder;
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.readback_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        self.gpu.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
