//! GPU-free canvas and draw factory that record what would have been drawn.
//! Used by the tests and handy for checking a stage without an adapter.

use std::cell::Cell;
use std::rc::Rc;

use crate::attributes::{AttributeLayout, AttributeRole};
use crate::draw::{DrawFactory, DrawRequest, DrawRoutine, DrawUniforms};
use crate::error::{VisError, VisResult};
use crate::stage::Canvas;
use crate::tween;

#[derive(Debug, Clone)]
pub struct RecordedDraw {
    pub layout: AttributeLayout,
    pub attributes: Rc<Vec<f32>>,
    pub count: u32,
    pub uniforms: DrawUniforms,
}

impl RecordedDraw {
    /// Interpolated value of `key` for the point at `index`, as the vertex
    /// stage would compute it.
    pub fn channel_at(&self, index: u32, key: &str) -> Option<Vec<f32>> {
        if index >= self.count {
            return None;
        }
        let record = index as usize * self.layout.floats_per_point();
        let slot = |role| {
            self.layout
                .slots()
                .iter()
                .find(|slot| self.layout.channels()[slot.channel].key == key && slot.role == role)
        };
        let start = slot(AttributeRole::Start)?;
        let end = slot(AttributeRole::End)?;

        let read = |offset: u64, len: usize| {
            let from = record + (offset / 4) as usize;
            &self.attributes[from..from + len]
        };
        let t = tween::progress(
            self.uniforms.elapsed,
            self.uniforms.duration,
            self.uniforms.delay_by_index,
            index,
        );
        Some(tween::mix(
            read(start.offset, start.components),
            read(end.offset, end.components),
            t,
        ))
    }

    /// Pixel position after the zoom transform, before the flip into clip space.
    pub fn pixel_position(&self, index: u32) -> Option<[f32; 2]> {
        let x = self.channel_at(index, "x")?[0];
        let y = self.channel_at(index, "y")?[0];
        Some([
            x * self.uniforms.scale + self.uniforms.translate[0],
            y * self.uniforms.scale + self.uniforms.translate[1],
        ])
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingFrame {
    pub background: [f32; 4],
    pub draws: Vec<RecordedDraw>,
}

/// Shared switches and counters of a [`RecordingFactory`], kept by the test
/// after the factory moves into an object.
#[derive(Debug, Clone, Default)]
pub struct RecordingProbe {
    compiled: Rc<Cell<usize>>,
    fail_draws: Rc<Cell<bool>>,
}

impl RecordingProbe {
    pub fn compiled(&self) -> usize {
        self.compiled.get()
    }

    pub fn fail_draws(&self, fail: bool) {
        self.fail_draws.set(fail);
    }
}

#[derive(Debug, Default)]
pub struct RecordingFactory {
    probe: RecordingProbe,
}

impl RecordingFactory {
    pub fn probe(&self) -> RecordingProbe {
        self.probe.clone()
    }
}

impl DrawFactory<RecordingFrame> for RecordingFactory {
    fn create_draw(
        &mut self,
        request: DrawRequest<'_>,
    ) -> VisResult<Box<dyn DrawRoutine<RecordingFrame>>> {
        self.probe.compiled.set(self.probe.compiled.get() + 1);
        Ok(Box::new(RecordingDraw {
            layout: request.layout.clone(),
            attributes: Rc::new(request.attributes.to_vec()),
            count: request.count,
            fail: self.probe.fail_draws.clone(),
        }))
    }
}

struct RecordingDraw {
    layout: AttributeLayout,
    attributes: Rc<Vec<f32>>,
    count: u32,
    fail: Rc<Cell<bool>>,
}

impl DrawRoutine<RecordingFrame> for RecordingDraw {
    fn draw(&self, frame: &mut RecordingFrame, uniforms: &DrawUniforms) -> VisResult<()> {
        if self.fail.get() {
            return Err(VisError::draw("injected draw failure"));
        }
        frame.draws.push(RecordedDraw {
            layout: self.layout.clone(),
            attributes: Rc::clone(&self.attributes),
            count: self.count,
            uniforms: *uniforms,
        });
        Ok(())
    }

    fn count(&self) -> u32 {
        self.count
    }
}

/// Keeps every finished frame.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    pub frames: Vec<RecordingFrame>,
    pub begun: usize,
}

impl RecordingCanvas {
    pub fn last_frame(&self) -> Option<&RecordingFrame> {
        self.frames.last()
    }
}

impl Canvas for RecordingCanvas {
    type Frame = RecordingFrame;

    fn begin_frame(&mut self, background: [f32; 4]) -> VisResult<RecordingFrame> {
        self.begun += 1;
        Ok(RecordingFrame {
            background,
            draws: Vec::new(),
        })
    }

    fn finish_frame(&mut self, frame: RecordingFrame) -> VisResult<()> {
        self.frames.push(frame);
        Ok(())
    }
}
