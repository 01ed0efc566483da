//! Interactive preview: the scene on a window surface, an egui HUD on top and
//! hot reload of the scene file. Redraws are only scheduled while the stage
//! loops; otherwise the window waits for input.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use egui::{Color32, FontFamily, FontId, RichText};
use egui_wgpu::{Renderer as EguiRenderer, ScreenDescriptor};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event as WinitEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use crate::driver::ScenePlayer;
use crate::error::{VisError, VisResult};
use crate::gpu::{GpuContext, GpuFrame};
use crate::manifest::{load_and_validate_scene, LayoutKind, DEFAULT_CLUSTERS};
use crate::points_draw::PointsDrawFactory;
use crate::schema::{UpdateMode, ZoomTransform};
use crate::stage::Canvas;

const PAN_STEP: f32 = 20.0;
const ZOOM_STEP: f32 = 1.25;

/// Window surface as a stage canvas. A finished frame is parked until the
/// HUD has been drawn over it and it is presented.
pub struct SurfaceCanvas {
    gpu: Arc<GpuContext>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pending: Option<GpuFrame>,
}

impl SurfaceCanvas {
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.pending = None;
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.gpu.device, &self.config);
    }

    fn take_pending(&mut self) -> Option<GpuFrame> {
        self.pending.take()
    }

    fn acquire(&mut self) -> VisResult<wgpu::SurfaceTexture> {
        match self.surface.get_current_texture() {
            Ok(texture) => Ok(texture),
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                self.surface.configure(&self.gpu.device, &self.config);
                self.surface
                    .get_current_texture()
                    .map_err(|error| VisError::draw(format!("surface unavailable: {error}")))
            }
            Err(error) => Err(VisError::draw(format!("surface unavailable: {error}"))),
        }
    }
}

impl Canvas for SurfaceCanvas {
    type Frame = GpuFrame;

    fn begin_frame(&mut self, background: [f32; 4]) -> VisResult<GpuFrame> {
        // A newer frame replaces one that never made it to the screen.
        self.pending = None;
        let texture = self.acquire()?;
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuFrame::begin(&self.gpu, view, Some(texture), background))
    }

    fn finish_frame(&mut self, frame: GpuFrame) -> VisResult<()> {
        self.pending = Some(frame);
        Ok(())
    }
}

pub fn run_play(scene_path: &Path) -> Result<()> {
    let scene_path = canonical_scene_path(scene_path);
    let scene = load_and_validate_scene(&scene_path)?;
    let fps = scene.stage.fps;

    let event_loop = EventLoop::new().context("failed to create play event loop")?;
    let initial_size = PhysicalSize::new(scene.stage.width, scene.stage.height);
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(format!("tweenvis - {}", scene_path.display()))
            .with_inner_size(initial_size)
            .with_resizable(false)
            .build(&event_loop)
            .context("failed to create preview window")?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .context("failed to create wgpu surface")?;
    let gpu = Arc::new(
        pollster::block_on(GpuContext::for_surface(instance, &surface))
            .context("failed to initialize wgpu for the preview window")?,
    );

    let caps = surface.get_capabilities(&gpu.adapter);
    let format = pick_surface_format(&caps.formats)?;
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: initial_size.width.max(1),
        height: initial_size.height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&gpu.device, &config);

    let canvas = SurfaceCanvas {
        gpu: Arc::clone(&gpu),
        surface,
        config,
        pending: None,
    };
    let factory = PointsDrawFactory::new(Arc::clone(&gpu), format);
    let mut player = ScenePlayer::new(scene, canvas, factory)?;

    let clock = Instant::now();
    let now = move || clock.elapsed().as_secs_f64();
    player.show_initial(now())?;

    let (watch_tx, watch_rx) = mpsc::channel::<()>();
    let watcher_scene = scene_path.clone();
    let mut watcher =
        notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if should_reload(&event) && event_targets_scene(&event, &watcher_scene) {
                    let _ = watch_tx.send(());
                }
            }
            Err(error) => tracing::warn!(%error, "file watcher error"),
        })
        .context("failed to create file watcher")?;
    let watch_root = scene_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    watcher
        .watch(&watch_root, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", watch_root.display()))?;

    let egui_ctx = egui::Context::default();
    let mut egui_state = egui_winit::State::new(
        egui_ctx.clone(),
        egui::ViewportId::ROOT,
        &event_loop,
        None,
        None,
    );
    let mut egui_renderer = EguiRenderer::new(&gpu.device, format, None, 1);

    tracing::info!(
        points = player.points().len(),
        width = initial_size.width,
        height = initial_size.height,
        fps,
        "preview started"
    );
    tracing::info!("controls: R random, C clusters, P phyllotaxis, F file, Space next step, arrows pan, +/- zoom, 0 reset, Esc quit");

    let mut step_index = 0_usize;
    let mut next_redraw_at = Instant::now();

    event_loop
        .run(move |event, target| {
            // Keep the watcher alive for the lifetime of the loop.
            let _ = &watcher;
            target.set_control_flow(ControlFlow::Wait);

            match event {
                WinitEvent::WindowEvent { window_id, event } if window_id == window.id() => {
                    let egui_response = egui_state.on_window_event(&window, &event);
                    if egui_response.repaint {
                        window.request_redraw();
                    }
                    match event {
                        WindowEvent::CloseRequested => target.exit(),
                        WindowEvent::KeyboardInput { event, .. } => {
                            if event.state == ElementState::Pressed
                                && !event.repeat
                                && !egui_response.consumed
                            {
                                if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                                    target.exit();
                                    return;
                                }
                                if let Err(error) = handle_key(
                                    event.physical_key,
                                    &mut player,
                                    &mut step_index,
                                    now(),
                                ) {
                                    tracing::warn!("{error:#}");
                                }
                                next_redraw_at = Instant::now();
                                window.request_redraw();
                            }
                        }
                        WindowEvent::RedrawRequested => {
                            if let Err(error) = redraw(&mut player, now()) {
                                tracing::warn!(%error, "frame failed");
                            }
                            present(
                                &window,
                                &gpu,
                                &mut player,
                                &egui_ctx,
                                &mut egui_state,
                                &mut egui_renderer,
                            );
                        }
                        WindowEvent::Resized(size) => {
                            player
                                .stage_mut()
                                .canvas_mut()
                                .resize(size.width, size.height);
                            window.request_redraw();
                        }
                        _ => {}
                    }
                }
                WinitEvent::AboutToWait => {
                    let mut scene_dirty = false;
                    while watch_rx.try_recv().is_ok() {
                        scene_dirty = true;
                    }
                    if scene_dirty {
                        try_hot_reload(&scene_path, &mut player, &mut step_index, now());
                        next_redraw_at = Instant::now();
                        window.request_redraw();
                    }

                    if player.stage().is_looping() {
                        let now = Instant::now();
                        if now >= next_redraw_at {
                            window.request_redraw();
                            next_redraw_at = now + frame_interval(fps);
                        }
                        target.set_control_flow(ControlFlow::WaitUntil(next_redraw_at));
                    }
                }
                _ => {}
            }
        })
        .map_err(|error| anyhow!("play event loop terminated: {error}"))
}

/// Ticks while animating. When idle, reuses a frame an immediate draw left
/// behind, or draws a fresh one for the HUD to sit on.
fn redraw(player: &mut ScenePlayer<SurfaceCanvas>, now: f64) -> VisResult<()> {
    let stage = player.stage_mut();
    if stage.is_looping() {
        return stage.tick(now);
    }
    if stage.canvas().pending.is_none() {
        return stage.draw(now, &[]);
    }
    Ok(())
}

fn present(
    window: &Window,
    gpu: &GpuContext,
    player: &mut ScenePlayer<SurfaceCanvas>,
    egui_ctx: &egui::Context,
    egui_state: &mut egui_winit::State,
    egui_renderer: &mut EguiRenderer,
) {
    let hud = Hud {
        points: player.points().len(),
        animating: player.stage().is_looping(),
        transform: player.transform(),
    };
    let canvas = player.stage_mut().canvas_mut();
    let size = [canvas.config.width, canvas.config.height];
    let Some(mut frame) = canvas.take_pending() else {
        return;
    };

    let raw_input = egui_state.take_egui_input(window);
    let full_output = egui_ctx.run(raw_input, |ctx| draw_hud(ctx, &hud));
    egui_state.handle_platform_output(window, full_output.platform_output);

    let pixels_per_point = window.scale_factor() as f32;
    let paint_jobs = egui_ctx.tessellate(full_output.shapes, pixels_per_point);
    for (texture_id, delta) in &full_output.textures_delta.set {
        egui_renderer.update_texture(&gpu.device, &gpu.queue, *texture_id, delta);
    }

    let screen_descriptor = ScreenDescriptor {
        size_in_pixels: size,
        pixels_per_point,
    };
    egui_renderer.update_buffers(
        &gpu.device,
        &gpu.queue,
        &mut frame.encoder,
        &paint_jobs,
        &screen_descriptor,
    );

    {
        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tweenvis-hud-pass"),
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
        egui_renderer.render(&mut pass, &paint_jobs, &screen_descriptor);
    }

    for texture_id in &full_output.textures_delta.free {
        egui_renderer.free_texture(texture_id);
    }

    gpu.queue.submit(Some(frame.encoder.finish()));
    if let Some(texture) = frame.surface_texture {
        texture.present();
    }
}

struct Hud {
    points: usize,
    animating: bool,
    transform: ZoomTransform,
}

fn draw_hud(ctx: &egui::Context, hud: &Hud) {
    egui::Area::new("tweenvis_hud".into())
        .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-12.0, 12.0))
        .show(ctx, |ui| {
            egui::Frame::none()
                .fill(Color32::from_black_alpha(120))
                .rounding(egui::Rounding::same(3.0))
                .inner_margin(egui::Margin::same(8.0))
                .show(ui, |ui| {
                    ui.label(
                        RichText::new(format!("{} points", hud.points))
                            .font(FontId::new(16.0, FontFamily::Monospace))
                            .color(Color32::from_rgb(230, 230, 230)),
                    );
                    ui.label(
                        RichText::new(if hud.animating { "animating" } else { "idle" })
                            .font(FontId::new(13.0, FontFamily::Monospace))
                            .color(if hud.animating {
                                Color32::from_rgb(180, 255, 180)
                            } else {
                                Color32::from_rgb(200, 200, 200)
                            }),
                    );
                    ui.label(
                        RichText::new(format!(
                            "zoom {:.2}  pan {:.0},{:.0}",
                            hud.transform.k, hud.transform.x, hud.transform.y
                        ))
                        .font(FontId::new(13.0, FontFamily::Monospace))
                        .color(Color32::from_rgb(200, 200, 200)),
                    );
                });
        });
}

fn handle_key(
    key: PhysicalKey,
    player: &mut ScenePlayer<SurfaceCanvas>,
    step_index: &mut usize,
    now: f64,
) -> Result<()> {
    let PhysicalKey::Code(code) = key else {
        return Ok(());
    };

    match code {
        KeyCode::KeyR => player.arrange(LayoutKind::Random, None, UpdateMode::Animate, now),
        KeyCode::KeyC => player.arrange(
            LayoutKind::Clusters,
            Some(DEFAULT_CLUSTERS),
            UpdateMode::Animate,
            now,
        ),
        KeyCode::KeyP => player.arrange(LayoutKind::Phyllotaxis, None, UpdateMode::Animate, now),
        KeyCode::KeyF if player.scene().points.file.is_some() => {
            player.arrange(LayoutKind::File, None, UpdateMode::Animate, now)
        }
        KeyCode::Space => {
            let steps = &player.scene().steps;
            if steps.is_empty() {
                return Ok(());
            }
            *step_index = (*step_index + 1) % steps.len();
            let step = steps[*step_index].clone();
            player.apply_step(&step, now)
        }
        KeyCode::ArrowLeft => pan(player, PAN_STEP, 0.0, now),
        KeyCode::ArrowRight => pan(player, -PAN_STEP, 0.0, now),
        KeyCode::ArrowUp => pan(player, 0.0, PAN_STEP, now),
        KeyCode::ArrowDown => pan(player, 0.0, -PAN_STEP, now),
        KeyCode::Equal | KeyCode::NumpadAdd => zoom(player, ZOOM_STEP, now),
        KeyCode::Minus | KeyCode::NumpadSubtract => zoom(player, 1.0 / ZOOM_STEP, now),
        KeyCode::Digit0 => player.set_transform(player.scene().transform, now),
        _ => Ok(()),
    }
}

fn pan(player: &mut ScenePlayer<SurfaceCanvas>, dx: f32, dy: f32, now: f64) -> Result<()> {
    let mut transform = player.transform();
    transform.x += dx;
    transform.y += dy;
    player.set_transform(transform, now)
}

/// Zooms about the stage centre.
fn zoom(player: &mut ScenePlayer<SurfaceCanvas>, factor: f32, now: f64) -> Result<()> {
    let centre_x = player.scene().stage.width as f32 / 2.0;
    let centre_y = player.scene().stage.height as f32 / 2.0;
    let current = player.transform();
    let transform = ZoomTransform {
        k: current.k * factor,
        x: centre_x - (centre_x - current.x) * factor,
        y: centre_y - (centre_y - current.y) * factor,
    };
    player.set_transform(transform, now)
}

fn try_hot_reload(
    scene_path: &Path,
    player: &mut ScenePlayer<SurfaceCanvas>,
    step_index: &mut usize,
    now: f64,
) {
    let next_scene = match load_and_validate_scene(scene_path) {
        Ok(next_scene) => next_scene,
        Err(error) => {
            tracing::warn!("reload parse error: {error:#}");
            return;
        }
    };

    let (width, height) = (next_scene.stage.width, next_scene.stage.height);
    if (width, height) != (player.scene().stage.width, player.scene().stage.height) {
        tracing::warn!(
            width,
            height,
            "stage size changes need a restart; keeping the current window size"
        );
    }

    match player.reload(next_scene, now) {
        Ok(()) => {
            *step_index = 0;
            tracing::info!(path = %scene_path.display(), "reloaded scene");
        }
        Err(error) => tracing::warn!("reload failed: {error:#}"),
    }
}

fn should_reload(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    )
}

fn event_targets_scene(event: &Event, scene_path: &Path) -> bool {
    if event.paths.is_empty() {
        return true;
    }

    event.paths.iter().any(|path| {
        path == scene_path
            || std::fs::canonicalize(path)
                .map(|resolved| resolved == scene_path)
                .unwrap_or(false)
    })
}

fn canonical_scene_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}

fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Result<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|format| format.is_srgb())
        .or_else(|| formats.first().copied())
        .ok_or_else(|| anyhow!("surface reports no supported formats"))
}
