//! Scene playback without a window: a virtual clock advanced one frame at a
//! time, ticking the stage only while it loops.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::animated::AnimatedObject;
use crate::draw::DrawFactory;
use crate::gpu::{GpuContext, OffscreenCanvas};
use crate::layout::XorShift64;
use crate::manifest::{LayoutKind, Scene, Step};
use crate::points_draw::PointsDrawFactory;
use crate::scheduler::ObjectId;
use crate::schema::{Point, PropsPatch, UpdateMode, ZoomTransform};
use crate::stage::{Canvas, Stage};

/// A scene's point cloud hosted on a stage, plus the state needed to move
/// it between layouts.
pub struct ScenePlayer<C: Canvas> {
    scene: Scene,
    stage: Stage<C>,
    object: ObjectId,
    source: Vec<Point>,
    points: Vec<Point>,
    rng: XorShift64,
}

impl<C: Canvas> ScenePlayer<C> {
    pub fn new(
        scene: Scene,
        canvas: C,
        factory: impl DrawFactory<C::Frame> + 'static,
    ) -> Result<Self> {
        let mut rng = scene.rng();
        let source = scene.initial_points(&mut rng)?;
        let object = AnimatedObject::new(&scene.channels(), scene.props(source.len()), factory)?;

        let mut stage = Stage::new(canvas, scene.stage.background);
        let object = stage.add(object);

        Ok(Self {
            scene,
            stage,
            object,
            points: source.clone(),
            source,
            rng,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn stage(&self) -> &Stage<C> {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage<C> {
        &mut self.stage
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Draws the starting layout in place.
    pub fn show_initial(&mut self, now: f64) -> Result<()> {
        let points = self.points.clone();
        self.stage
            .with_object(self.object, now, |vis| {
                vis.update(Some(&points), None, UpdateMode::Draw)
            })??;
        Ok(())
    }

    pub fn arrange(
        &mut self,
        kind: LayoutKind,
        clusters: Option<usize>,
        mode: UpdateMode,
        now: f64,
    ) -> Result<()> {
        let next = self
            .scene
            .arrange(kind, clusters, &self.points, &self.source, &mut self.rng);
        let patch = PropsPatch {
            delay_by_index: Some(self.scene.delay_by_index(next.len())),
            ..PropsPatch::default()
        };

        self.stage
            .with_object(self.object, now, |vis| vis.update(Some(&next), Some(&patch), mode))??;
        tracing::debug!(?kind, count = next.len(), ?mode, "arranged points");
        self.points = next;
        Ok(())
    }

    /// Pans/zooms without touching the data; redraws immediately.
    pub fn set_transform(&mut self, transform: ZoomTransform, now: f64) -> Result<()> {
        let patch = PropsPatch {
            transform: Some(transform),
            ..PropsPatch::default()
        };
        self.stage
            .with_object(self.object, now, |vis| vis.update(None, Some(&patch), UpdateMode::Draw))??;
        Ok(())
    }

    pub fn transform(&self) -> ZoomTransform {
        self.stage
            .object(self.object)
            .map(|vis| vis.props().transform)
            .unwrap_or_default()
    }

    /// Swaps in an edited scene and animates to its first step. A changed
    /// `points` section regenerates the cloud; ids still match up, so points
    /// with the same id glide over instead of jumping.
    pub fn reload(&mut self, scene: Scene, now: f64) -> Result<()> {
        if scene.points != self.scene.points {
            let mut rng = scene.rng();
            self.source = scene.initial_points(&mut rng)?;
            self.points = self.source.clone();
            self.rng = rng;
        }

        let patch = PropsPatch::from(&scene.props(self.points.len()));
        self.stage.set_background(scene.stage.background);
        self.stage
            .with_object(self.object, now, |vis| vis.update_props(&patch))?;
        self.scene = scene;

        match self.scene.steps.first().cloned() {
            Some(step) => self.apply_step(&step, now),
            None => Ok(()),
        }
    }

    pub fn apply_step(&mut self, step: &Step, now: f64) -> Result<()> {
        if let Some(transform) = step.transform {
            let patch = PropsPatch {
                transform: Some(transform),
                ..PropsPatch::default()
            };
            self.stage
                .with_object(self.object, now, |vis| vis.update_props(&patch))?;
        }
        self.arrange(step.layout, step.clusters, step.mode, now)
    }
}

/// Fixed-rate virtual clock. Frame `n` happens at `n / fps` seconds.
#[derive(Debug, Clone, Copy)]
pub struct FrameDriver {
    fps: u32,
    frame: u64,
}

impl FrameDriver {
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1), frame: 0 }
    }

    pub fn now(&self) -> f64 {
        self.frame as f64 / f64::from(self.fps)
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Plays every step of the scene, calling `sink` once per output frame
    /// with the canvas holding that frame. Returns the number of frames.
    pub fn run<C, S>(&mut self, player: &mut ScenePlayer<C>, mut sink: S) -> Result<u64>
    where
        C: Canvas,
        S: FnMut(&C, u64) -> Result<()>,
    {
        let first = self.frame;
        player.show_initial(self.now())?;
        self.emit(player, &mut sink)?;

        let steps = player.scene().steps.clone();
        for (index, step) in steps.iter().enumerate() {
            player.apply_step(step, self.now())?;
            if step.mode == UpdateMode::Draw {
                self.emit(player, &mut sink)?;
            }

            while player.stage().is_looping() {
                player.stage_mut().tick(self.now())?;
                self.emit(player, &mut sink)?;
            }

            for _ in 0..step.hold_frames {
                self.emit(player, &mut sink)?;
            }
            tracing::info!(step = index, frame = self.frame, "step finished");
        }

        Ok(self.frame - first)
    }

    fn emit<C, S>(&mut self, player: &ScenePlayer<C>, sink: &mut S) -> Result<()>
    where
        C: Canvas,
        S: FnMut(&C, u64) -> Result<()>,
    {
        sink(player.stage().canvas(), self.frame)?;
        self.frame += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RenderSummary {
    pub frames: u64,
    pub points: usize,
    pub output_dir: PathBuf,
}

/// Renders `scene` offscreen and writes `frame_000000.png`, ... to `output_dir`.
pub fn render_scene_to_dir(scene: Scene, output_dir: &Path) -> Result<RenderSummary> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir {}", output_dir.display()))?;

    let gpu = Arc::new(pollster::block_on(GpuContext::headless())?);
    let (width, height) = (scene.stage.width, scene.stage.height);
    let canvas = OffscreenCanvas::new(Arc::clone(&gpu), width, height)?;
    let factory = PointsDrawFactory::new(gpu, OffscreenCanvas::FORMAT);

    let mut driver = FrameDriver::new(scene.stage.fps);
    let mut player = ScenePlayer::new(scene, canvas, factory)?;
    let points = player.points().len();

    let frames = driver.run(&mut player, |canvas, frame| {
        let rgba = canvas.read_rgba()?;
        let path = output_dir.join(format!("frame_{frame:06}.png"));
        let image = image::RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| anyhow!("frame {frame} has the wrong byte length"))?;
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))
    })?;

    Ok(RenderSummary {
        frames,
        points,
        output_dir: output_dir.to_path_buf(),
    })
}
