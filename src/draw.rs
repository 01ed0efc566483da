use bytemuck::{Pod, Zeroable};

use crate::attributes::AttributeLayout;
use crate::error::VisResult;
use crate::schema::VisProps;

/// Uniform block shared by every compiled points routine.
///
/// Field order matches the `Uniforms` struct emitted by `points_draw`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
pub struct DrawUniforms {
    pub elapsed: f32,
    pub duration: f32,
    pub delay_by_index: f32,
    pub point_size: f32,
    pub max_point_size: f32,
    pub scale: f32,
    pub stage_width: f32,
    pub stage_height: f32,
    pub translate: [f32; 2],
    pub _padding: [f32; 2],
}

impl DrawUniforms {
    /// `elapsed` is milliseconds since the animation started.
    pub fn from_props(props: &VisProps, elapsed: f32) -> Self {
        Self {
            elapsed,
            duration: props.duration,
            delay_by_index: props.delay_by_index,
            point_size: props.point_size,
            max_point_size: props.max_point_size,
            scale: props.transform.k,
            stage_width: props.stage_width,
            stage_height: props.stage_height,
            translate: [props.transform.x, props.transform.y],
            _padding: [0.0; 2],
        }
    }
}

/// Everything a factory needs to compile one draw routine.
#[derive(Debug, Clone, Copy)]
pub struct DrawRequest<'a> {
    pub layout: &'a AttributeLayout,
    /// Interleaved per-point records, `layout.floats_per_point()` floats each.
    pub attributes: &'a [f32],
    pub count: u32,
}

/// A compiled draw bound to one set of attribute buffers.
pub trait DrawRoutine<F> {
    fn draw(&self, frame: &mut F, uniforms: &DrawUniforms) -> VisResult<()>;

    fn count(&self) -> u32;
}

/// Compiles draw routines whenever an object's attribute buffers change.
pub trait DrawFactory<F> {
    fn create_draw(&mut self, request: DrawRequest<'_>) -> VisResult<Box<dyn DrawRoutine<F>>>;
}
