use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of a point across datasets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(i64),
    Str(String),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for PointId {
    fn from(value: i64) -> Self {
        Self::Num(value)
    }
}

impl From<usize> for PointId {
    fn from(value: usize) -> Self {
        Self::Num(value as i64)
    }
}

impl From<&str> for PointId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for PointId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// One point record. Everything except `id` is a tweenable value.
///
/// Numeric fields other than `id`, `x`, `y` and `color` land in `extra` and can
/// be named as tween channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_color")]
    pub color: [f32; 4],
    #[serde(flatten)]
    pub extra: BTreeMap<String, Vec<f32>>,
}

impl Point {
    pub fn new(id: impl Into<PointId>, x: f32, y: f32, color: [f32; 4]) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            color,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_channel(mut self, key: impl Into<String>, values: Vec<f32>) -> Self {
        self.extra.insert(key.into(), values);
        self
    }

    pub fn channel(&self, key: &str) -> Option<&[f32]> {
        match key {
            "x" => Some(std::slice::from_ref(&self.x)),
            "y" => Some(std::slice::from_ref(&self.y)),
            "color" => Some(&self.color),
            other => self.extra.get(other).map(Vec::as_slice),
        }
    }

    /// Overwrites the leading components of a channel. Unknown keys are added
    /// to `extra`.
    pub fn set_channel(&mut self, key: &str, values: &[f32]) {
        match key {
            "x" => {
                if let Some(value) = values.first() {
                    self.x = *value;
                }
            }
            "y" => {
                if let Some(value) = values.first() {
                    self.y = *value;
                }
            }
            "color" => {
                for (slot, value) in self.color.iter_mut().zip(values) {
                    *slot = *value;
                }
            }
            other => {
                self.extra.insert(other.to_owned(), values.to_vec());
            }
        }
    }
}

fn default_color() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

/// Names a point attribute and its component count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweenChannel {
    pub key: String,
    pub length: usize,
}

impl TweenChannel {
    pub fn new(key: impl Into<String>, length: usize) -> Self {
        Self {
            key: key.into(),
            length,
        }
    }

    /// Position as two scalars plus an RGBA colour.
    pub fn default_set() -> Vec<Self> {
        vec![Self::new("x", 1), Self::new("y", 1), Self::new("color", 4)]
    }
}

/// Pan/zoom transform: world position `p` lands at `p * k + (x, y)` pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoomTransform {
    #[serde(default = "default_scale")]
    pub k: f32,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
}

impl Default for ZoomTransform {
    fn default() -> Self {
        Self {
            k: 1.0,
            x: 0.0,
            y: 0.0,
        }
    }
}

fn default_scale() -> f32 {
    1.0
}

/// Fully resolved props of one animated object. Times are milliseconds,
/// sizes are pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisProps {
    pub duration: f32,
    pub delay_by_index: f32,
    pub transform: ZoomTransform,
    pub point_size: f32,
    pub max_point_size: f32,
    pub stage_width: f32,
    pub stage_height: f32,
}

impl Default for VisProps {
    fn default() -> Self {
        Self {
            duration: 0.0,
            delay_by_index: 0.0,
            transform: ZoomTransform::default(),
            point_size: 1.0,
            max_point_size: 8.0,
            stage_width: 1.0,
            stage_height: 1.0,
        }
    }
}

impl VisProps {
    pub fn merge(&mut self, patch: &PropsPatch) {
        if let Some(duration) = patch.duration {
            self.duration = duration;
        }
        if let Some(delay_by_index) = patch.delay_by_index {
            self.delay_by_index = delay_by_index;
        }
        if let Some(transform) = patch.transform {
            self.transform = transform;
        }
        if let Some(point_size) = patch.point_size {
            self.point_size = point_size;
        }
        if let Some(max_point_size) = patch.max_point_size {
            self.max_point_size = max_point_size;
        }
        if let Some(stage_width) = patch.stage_width {
            self.stage_width = stage_width;
        }
        if let Some(stage_height) = patch.stage_height {
            self.stage_height = stage_height;
        }
    }

    pub fn merged(&self, patch: &PropsPatch) -> Self {
        let mut next = *self;
        next.merge(patch);
        next
    }
}

/// Partial props; unset fields leave the current value alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropsPatch {
    #[serde(default)]
    pub duration: Option<f32>,
    #[serde(default)]
    pub delay_by_index: Option<f32>,
    #[serde(default)]
    pub transform: Option<ZoomTransform>,
    #[serde(default)]
    pub point_size: Option<f32>,
    #[serde(default)]
    pub max_point_size: Option<f32>,
    #[serde(default)]
    pub stage_width: Option<f32>,
    #[serde(default)]
    pub stage_height: Option<f32>,
}

impl PropsPatch {
    pub fn timing(duration: f32, delay_by_index: f32) -> Self {
        Self {
            duration: Some(duration),
            delay_by_index: Some(delay_by_index),
            ..Self::default()
        }
    }

    /// Fields set in `top` win over fields set in `self`.
    pub fn layered(&self, top: &PropsPatch) -> Self {
        Self {
            duration: top.duration.or(self.duration),
            delay_by_index: top.delay_by_index.or(self.delay_by_index),
            transform: top.transform.or(self.transform),
            point_size: top.point_size.or(self.point_size),
            max_point_size: top.max_point_size.or(self.max_point_size),
            stage_width: top.stage_width.or(self.stage_width),
            stage_height: top.stage_height.or(self.stage_height),
        }
    }
}

impl From<&VisProps> for PropsPatch {
    fn from(props: &VisProps) -> Self {
        Self {
            duration: Some(props.duration),
            delay_by_index: Some(props.delay_by_index),
            transform: Some(props.transform),
            point_size: Some(props.point_size),
            max_point_size: Some(props.max_point_size),
            stage_width: Some(props.stage_width),
            stage_height: Some(props.stage_height),
        }
    }
}

/// Per-draw overrides held by the stage for each hosted object.
/// `start_time` is in stage-clock seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawOverrides {
    pub props: PropsPatch,
    pub start_time: Option<f64>,
}

impl DrawOverrides {
    pub fn immediate() -> Self {
        Self {
            props: PropsPatch::timing(0.0, 0.0),
            start_time: None,
        }
    }

    pub fn layered(&self, top: &DrawOverrides) -> Self {
        Self {
            props: self.props.layered(&top.props),
            start_time: top.start_time.or(self.start_time),
        }
    }
}

/// What `update` does after applying data and props.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    #[default]
    Animate,
    Draw,
    Skip,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_deserialize_from_numbers_and_strings() {
        let points: Vec<Point> = serde_json::from_str(
            r#"[{"id": 7, "x": 1, "y": 2, "color": [1, 0, 0, 1]}, {"id": "paris", "x": 3, "y": 4}]"#,
        )
        .expect("points should parse");

        assert_eq!(points[0].id, PointId::Num(7));
        assert_eq!(points[1].id, PointId::from("paris"));
        assert_eq!(points[1].color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn extra_numeric_fields_become_channels() {
        let point: Point =
            serde_json::from_str(r#"{"id": 1, "x": 0, "y": 0, "size": [3.5]}"#).expect("parse");
        assert_eq!(point.channel("size"), Some(&[3.5][..]));
        assert_eq!(point.channel("missing"), None);
    }

    #[test]
    fn set_channel_writes_builtin_and_extra_fields() {
        let mut point = Point::new(1_i64, 0.0, 0.0, [0.0; 4]);
        point.set_channel("x", &[4.0]);
        point.set_channel("color", &[0.5, 0.5, 0.5, 1.0]);
        point.set_channel("size", &[2.0]);

        assert_eq!(point.x, 4.0);
        assert_eq!(point.color, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(point.channel("size"), Some(&[2.0][..]));
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let mut props = VisProps {
            duration: 2000.0,
            point_size: 3.0,
            ..VisProps::default()
        };
        props.merge(&PropsPatch {
            point_size: Some(5.0),
            ..PropsPatch::default()
        });

        assert_eq!(props.duration, 2000.0);
        assert_eq!(props.point_size, 5.0);
    }

    #[test]
    fn layered_overrides_prefer_top() {
        let base = DrawOverrides {
            props: PropsPatch::timing(1000.0, 2.0),
            start_time: Some(1.5),
        };
        let top = DrawOverrides::immediate();
        let layered = base.layered(&top);

        assert_eq!(layered.props.duration, Some(0.0));
        assert_eq!(layered.props.delay_by_index, Some(0.0));
        assert_eq!(layered.start_time, Some(1.5));
    }
}
