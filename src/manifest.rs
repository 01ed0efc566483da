use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::{self, XorShift64};
use crate::schema::{Point, TweenChannel, UpdateMode, VisProps, ZoomTransform};

const DEFAULT_STAGGER_BUDGET_MS: f32 = 800.0;

/// A YAML scene: one point cloud on one stage, stepped through a list of
/// layouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scene {
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub points: PointsConfig,
    #[serde(default)]
    pub transition: TransitionConfig,
    #[serde(default)]
    pub transform: ZoomTransform,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_background")]
    pub background: [f32; 4],
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            background: default_background(),
        }
    }
}

impl StageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!(
                "stage resolution must be positive, got {}x{}",
                self.width,
                self.height
            );
        }
        if self.fps == 0 {
            bail!("stage fps must be greater than 0");
        }
        if self.background.iter().any(|c| !(0.0..=1.0).contains(c)) {
            bail!("stage background components must be within [0, 1]");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PointsConfig {
    #[serde(default = "default_point_count")]
    pub count: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_point_size")]
    pub size: f32,
    /// Cap on the drawn size in pixels. Defaults to eight times `size`.
    #[serde(default)]
    pub max_size: Option<f32>,
    /// JSON array of point records, relative to the scene file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            count: default_point_count(),
            seed: 0,
            size: default_point_size(),
            max_size: None,
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionConfig {
    #[serde(default = "default_duration_ms")]
    pub duration_ms: f32,
    /// Per-index delay. Unset spreads 800ms of stagger over the whole cloud.
    #[serde(default)]
    pub stagger_ms: Option<f32>,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
            stagger_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    Random,
    Phyllotaxis,
    Clusters,
    /// Back to the points as loaded from `points.file`.
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub layout: LayoutKind,
    #[serde(default)]
    pub clusters: Option<usize>,
    #[serde(default = "default_hold_frames")]
    pub hold_frames: u32,
    #[serde(default)]
    pub mode: UpdateMode,
    #[serde(default)]
    pub transform: Option<ZoomTransform>,
}

fn default_width() -> u32 {
    1000
}

fn default_height() -> u32 {
    700
}

fn default_fps() -> u32 {
    60
}

fn default_background() -> [f32; 4] {
    [1.0, 1.0, 1.0, 1.0]
}

fn default_point_count() -> usize {
    30_000
}

fn default_point_size() -> f32 {
    3.0
}

fn default_duration_ms() -> f32 {
    2000.0
}

fn default_hold_frames() -> u32 {
    30
}

pub const DEFAULT_CLUSTERS: usize = 50;

impl Scene {
    pub fn channels(&self) -> Vec<TweenChannel> {
        TweenChannel::default_set()
    }

    pub fn delay_by_index(&self, count: usize) -> f32 {
        self.transition
            .stagger_ms
            .unwrap_or_else(|| DEFAULT_STAGGER_BUDGET_MS / count.max(1) as f32)
    }

    /// Props for an object holding `count` points.
    pub fn props(&self, count: usize) -> VisProps {
        VisProps {
            duration: self.transition.duration_ms,
            delay_by_index: self.delay_by_index(count),
            transform: self.transform,
            point_size: self.points.size,
            max_point_size: self.points.max_size.unwrap_or(self.points.size * 8.0),
            stage_width: self.stage.width as f32,
            stage_height: self.stage.height as f32,
        }
    }

    pub fn rng(&self) -> XorShift64 {
        XorShift64::from_seed(self.points.seed)
    }

    /// Points the scene starts from: the point file if one is set, otherwise
    /// a seeded random scatter.
    pub fn initial_points(&self, rng: &mut XorShift64) -> Result<Vec<Point>> {
        match &self.points.file {
            Some(path) => load_points(path),
            None => Ok(layout::random_points(
                self.points.count,
                self.stage.width as f32,
                self.stage.height as f32,
                rng,
            )),
        }
    }

    /// Lays `current` out per `kind`. Ids are preserved so the transition
    /// tweens each point to its new place.
    pub fn arrange(
        &self,
        kind: LayoutKind,
        clusters: Option<usize>,
        current: &[Point],
        source: &[Point],
        rng: &mut XorShift64,
    ) -> Vec<Point> {
        let width = self.stage.width as f32;
        let height = self.stage.height as f32;
        let radius = self.points.size / 2.0 + 1.0;

        match kind {
            LayoutKind::Random => {
                let scattered = layout::random_points(current.len(), width, height, rng);
                current
                    .iter()
                    .zip(scattered)
                    .map(|(point, random)| Point {
                        x: random.x,
                        y: random.y,
                        color: random.color,
                        ..point.clone()
                    })
                    .collect()
            }
            LayoutKind::Phyllotaxis => {
                layout::phyllotaxis_layout(current, radius, radius, width / 2.0, height / 2.0)
            }
            LayoutKind::Clusters => layout::cluster_layout(
                current,
                clusters.unwrap_or(DEFAULT_CLUSTERS),
                self.points.size,
                width,
                height,
                rng,
            ),
            LayoutKind::File => source.to_vec(),
        }
    }
}

pub fn load_and_validate_scene(path: &Path) -> Result<Scene> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    let mut scene: Scene = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;

    validate_scene(&mut scene, path)?;
    Ok(scene)
}

fn validate_scene(scene: &mut Scene, scene_path: &Path) -> Result<()> {
    scene.stage.validate()?;

    if scene.points.size <= 0.0 {
        bail!("points.size must be positive");
    }
    if scene.points.max_size.is_some_and(|max| max <= 0.0) {
        bail!("points.max_size must be positive");
    }
    if scene.transition.duration_ms < 0.0 {
        bail!("transition.duration_ms must not be negative");
    }
    if scene.transition.stagger_ms.is_some_and(|stagger| stagger < 0.0) {
        bail!("transition.stagger_ms must not be negative");
    }
    if scene.transform.k <= 0.0 {
        bail!("transform.k must be positive");
    }

    match &scene.points.file {
        Some(file) => {
            let scene_dir = scene_path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            let resolved = if file.is_absolute() {
                file.clone()
            } else {
                scene_dir.join(file)
            };
            if !resolved.is_file() {
                bail!("points.file does not exist: {}", resolved.display());
            }
            scene.points.file = Some(resolved);
        }
        None if scene.points.count == 0 => {
            bail!("points.count must be greater than 0 unless points.file is set");
        }
        None => {}
    }

    if scene.steps.is_empty() {
        bail!("scene must define at least one step");
    }
    for (index, step) in scene.steps.iter().enumerate() {
        if step.hold_frames == 0 {
            bail!("step {index}: hold_frames must be greater than 0");
        }
        if step.clusters == Some(0) {
            bail!("step {index}: clusters must be at least 1");
        }
        if step.layout == LayoutKind::File && scene.points.file.is_none() {
            bail!("step {index}: layout 'file' requires points.file");
        }
        if step.transform.is_some_and(|transform| transform.k <= 0.0) {
            bail!("step {index}: transform.k must be positive");
        }
    }

    Ok(())
}

/// Reads a JSON array of point records.
pub fn load_points(path: &Path) -> Result<Vec<Point>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read points {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse points json {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write should succeed");
        path
    }

    #[test]
    fn minimal_scene_takes_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = write(dir.path(), "scene.yaml", "steps:\n  - layout: phyllotaxis\n");
        let scene = load_and_validate_scene(&path).expect("scene should load");

        assert_eq!(scene.stage.width, 1000);
        assert_eq!(scene.stage.height, 700);
        assert_eq!(scene.points.count, 30_000);
        assert_eq!(scene.steps[0].mode, UpdateMode::Animate);

        let props = scene.props(30_000);
        assert_eq!(props.duration, 2000.0);
        assert_eq!(props.max_point_size, 24.0);
        assert!((props.delay_by_index - 800.0 / 30_000.0).abs() < 1e-9);
    }

    #[test]
    fn parse_errors_report_location() {
        let dir = tempdir().expect("tempdir");
        let path = write(dir.path(), "bad.yaml", "stage:\n  width: wide\nsteps: []\n");
        let err = load_and_validate_scene(&path).expect_err("should fail");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "scene.yaml",
            "stage:\n  depth: 3\nsteps:\n  - layout: random\n",
        );
        assert!(load_and_validate_scene(&path).is_err());
    }

    #[test]
    fn empty_steps_fail_validation() {
        let dir = tempdir().expect("tempdir");
        let path = write(dir.path(), "scene.yaml", "steps: []\n");
        let err = load_and_validate_scene(&path).expect_err("should fail");
        assert!(err.to_string().contains("at least one step"));
    }

    #[test]
    fn file_layout_requires_point_file() {
        let dir = tempdir().expect("tempdir");
        let path = write(dir.path(), "scene.yaml", "steps:\n  - layout: file\n");
        let err = load_and_validate_scene(&path).expect_err("should fail");
        assert!(err.to_string().contains("requires points.file"));
    }

    #[test]
    fn point_file_resolves_relative_to_scene() {
        let dir = tempdir().expect("tempdir");
        write(
            dir.path(),
            "points.json",
            r#"[{"id": "a", "x": 1, "y": 2}, {"id": "b", "x": 3, "y": 4, "color": [1, 0, 0, 1]}]"#,
        );
        let path = write(
            dir.path(),
            "scene.yaml",
            "points:\n  file: points.json\nsteps:\n  - layout: file\n    hold_frames: 2\n",
        );
        let scene = load_and_validate_scene(&path).expect("scene should load");
        let points = scene
            .initial_points(&mut scene.rng())
            .expect("points should load");

        assert_eq!(points.len(), 2);
        assert_eq!(points[1].color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn arrange_keeps_ids_in_order_for_random() {
        let dir = tempdir().expect("tempdir");
        let path = write(
            dir.path(),
            "scene.yaml",
            "points:\n  count: 20\n  seed: 4\nsteps:\n  - layout: random\n",
        );
        let scene = load_and_validate_scene(&path).expect("scene should load");
        let mut rng = scene.rng();
        let first = scene.initial_points(&mut rng).expect("points");
        let next = scene.arrange(LayoutKind::Random, None, &first, &first, &mut rng);

        assert_eq!(next.len(), first.len());
        for (a, b) in first.iter().zip(&next) {
            assert_eq!(a.id, b.id);
        }
        assert_ne!(first, next);
    }
}
