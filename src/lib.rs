//! GPU particle stage: tens of thousands of tagged points cross-faded between
//! layouts on the vertex stage, with one shared frame loop that only runs
//! while something is animating.

pub mod animated;
pub mod attributes;
pub mod draw;
pub mod driver;
pub mod error;
pub mod gpu;
pub mod layout;
pub mod manifest;
#[cfg(feature = "play")]
pub mod play;
pub mod points_draw;
pub mod recording;
pub mod scheduler;
pub mod schema;
pub mod stage;
pub mod tween;

pub use animated::{AnimatedObject, VisEvent};
pub use error::{VisError, VisResult};
pub use scheduler::ObjectId;
pub use schema::{Point, PointId, PropsPatch, TweenChannel, UpdateMode, VisProps};
pub use stage::{Canvas, Stage};
