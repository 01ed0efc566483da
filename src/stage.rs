use crate::animated::{AnimatedObject, VisEvent};
use crate::error::{VisError, VisResult};
use crate::scheduler::{AnimationScheduler, ObjectId};
use crate::schema::{DrawOverrides, PropsPatch};

/// The drawing surface a stage composites into.
///
/// A frame is begun cleared to the background colour; objects draw into it
/// in registration order and the stage hands it back to be finished.
pub trait Canvas {
    type Frame;

    fn begin_frame(&mut self, background: [f32; 4]) -> VisResult<Self::Frame>;

    fn finish_frame(&mut self, frame: Self::Frame) -> VisResult<()>;
}

struct Hosted<F> {
    id: ObjectId,
    object: AnimatedObject<F>,
    overrides: DrawOverrides,
}

/// Hosts animated objects on one canvas and runs the shared frame loop only
/// while at least one of them is animating.
///
/// The stage does not own a timer. Whoever drives it (the headless driver or
/// the preview window) calls [`Stage::tick`] once per display frame while
/// [`Stage::is_looping`] is true and passes the current clock in seconds.
pub struct Stage<C: Canvas> {
    canvas: C,
    background: [f32; 4],
    objects: Vec<Hosted<C::Frame>>,
    next_id: usize,
    scheduler: AnimationScheduler,
}

impl<C: Canvas> Stage<C> {
    pub fn new(canvas: C, background: [f32; 4]) -> Self {
        Self {
            canvas,
            background,
            objects: Vec::new(),
            next_id: 0,
            scheduler: AnimationScheduler::new(),
        }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn background(&self) -> [f32; 4] {
        self.background
    }

    pub fn set_background(&mut self, background: [f32; 4]) {
        self.background = background;
    }

    pub fn add(&mut self, object: AnimatedObject<C::Frame>) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.scheduler.register(id);
        self.objects.push(Hosted {
            id,
            object,
            overrides: DrawOverrides::default(),
        });
        id
    }

    /// Destroys the object and takes it off the stage for good.
    pub fn remove(&mut self, id: ObjectId) -> VisResult<AnimatedObject<C::Frame>> {
        let position = self.position(id)?;
        self.objects[position].object.destroy();
        self.dispatch(id, 0.0)?;

        self.scheduler.unregister(id);
        let hosted = self.objects.remove(position);
        Ok(hosted.object)
    }

    pub fn object(&self, id: ObjectId) -> Option<&AnimatedObject<C::Frame>> {
        self.objects
            .iter()
            .find(|hosted| hosted.id == id)
            .map(|hosted| &hosted.object)
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.iter().map(|hosted| hosted.id).collect()
    }

    /// Runs `operation` on a hosted object, then routes the events it queued
    /// (`start`, `stop`, `draw`) at clock time `now`.
    pub fn with_object<R>(
        &mut self,
        id: ObjectId,
        now: f64,
        operation: impl FnOnce(&mut AnimatedObject<C::Frame>) -> R,
    ) -> VisResult<R> {
        let position = self.position(id)?;
        let result = operation(&mut self.objects[position].object);
        self.dispatch(id, now)?;
        Ok(result)
    }

    fn dispatch(&mut self, id: ObjectId, now: f64) -> VisResult<()> {
        let position = self.position(id)?;
        let events = self.objects[position].object.take_events();

        for event in events {
            match event {
                VisEvent::Start {
                    max_duration,
                    props,
                } => self.on_start(id, now, max_duration, props),
                VisEvent::Stop => self.on_stop(id),
                VisEvent::Draw { overrides } => self.on_draw(id, now, overrides)?,
            }
        }
        Ok(())
    }

    /// `start` notification: Idle -> Animating at `now`.
    pub fn on_start(&mut self, id: ObjectId, now: f64, max_duration: f64, props: PropsPatch) {
        let Ok(position) = self.position(id) else {
            return;
        };
        if self.objects[position].object.is_destroyed() {
            return;
        }

        let first = self.scheduler.start(id, now, max_duration);
        let hosted = &mut self.objects[position];
        hosted.overrides = DrawOverrides {
            props,
            start_time: Some(now),
        };
        hosted.object.animation_started(now);

        if first {
            self.scheduler.start_loop();
        }
    }

    /// `stop` notification: Animating -> Idle; halts the loop when nothing is
    /// left animating.
    pub fn on_stop(&mut self, id: ObjectId) {
        if self.scheduler.stop(id) {
            if let Ok(position) = self.position(id) {
                self.objects[position].object.animation_ended();
            }
        }
        if self.scheduler.animating_count() == 0 {
            self.scheduler.stop_loop();
        }
    }

    /// `draw` notification: redraws the whole stage right away so the
    /// objects stay composited together.
    pub fn on_draw(&mut self, id: ObjectId, now: f64, overrides: DrawOverrides) -> VisResult<()> {
        self.draw(now, &[(id, overrides)])
    }

    /// Clears the canvas and draws every live object in registration order.
    ///
    /// An object that fails to draw does not stop the others: the frame is
    /// still finished and the first draw error is returned afterwards.
    pub fn draw(&mut self, now: f64, overrides: &[(ObjectId, DrawOverrides)]) -> VisResult<()> {
        let mut frame = self.canvas.begin_frame(self.background)?;
        let mut first_error = None;

        for hosted in &self.objects {
            if hosted.object.is_destroyed() {
                continue;
            }
            let draw_overrides = overrides
                .iter()
                .find(|(id, _)| *id == hosted.id)
                .map(|(_, top)| hosted.overrides.layered(top))
                .unwrap_or(hosted.overrides);
            if let Err(error) = hosted.object.draw(&mut frame, now, &draw_overrides) {
                tracing::debug!(id = ?hosted.id, %error, "object failed to draw");
                first_error.get_or_insert(error);
            }
        }

        self.canvas.finish_frame(frame)?;
        first_error.map_or(Ok(()), Err)
    }

    /// One iteration of the shared loop. Does nothing while idle.
    ///
    /// Tick and expiry bookkeeping run after the draw pass even when it fails,
    /// so a bad frame cannot leave objects animating forever; the draw error
    /// is returned afterwards.
    pub fn tick(&mut self, now: f64) -> VisResult<()> {
        if !self.scheduler.is_looping() {
            return Ok(());
        }

        let drawn = self.draw(now, &[]);
        if let Err(error) = &drawn {
            tracing::warn!(%error, "frame failed; continuing tick bookkeeping");
        }

        for id in self.scheduler.animating_ids() {
            if let Ok(position) = self.position(id) {
                self.objects[position].object.animation_ticked(now);
            }
        }
        for id in self.scheduler.expired(now) {
            self.on_stop(id);
        }

        drawn
    }

    pub fn is_looping(&self) -> bool {
        self.scheduler.is_looping()
    }

    pub fn animating_count(&self) -> usize {
        self.scheduler.animating_count()
    }

    pub fn is_animating(&self, id: ObjectId) -> bool {
        self.scheduler.is_animating(id)
    }

    fn position(&self, id: ObjectId) -> VisResult<usize> {
        self.objects
            .iter()
            .position(|hosted| hosted.id == id)
            .ok_or(VisError::UnknownObject(id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{RecordingCanvas, RecordingFactory, RecordingFrame};
    use crate::schema::{Point, TweenChannel, UpdateMode, VisProps};

    fn vis() -> (AnimatedObject<RecordingFrame>, crate::recording::RecordingProbe) {
        let factory = RecordingFactory::default();
        let probe = factory.probe();
        let props = VisProps {
            duration: 1000.0,
            stage_width: 100.0,
            stage_height: 100.0,
            ..VisProps::default()
        };
        let object = AnimatedObject::new(&TweenChannel::default_set(), props, factory)
            .expect("object should build");
        (object, probe)
    }

    fn points(x: f32) -> Vec<Point> {
        vec![Point::new(1_i64, x, 0.0, [0.0, 0.0, 0.0, 1.0])]
    }

    fn stage() -> Stage<RecordingCanvas> {
        Stage::new(RecordingCanvas::default(), [1.0, 1.0, 1.0, 1.0])
    }

    #[test]
    fn ids_come_from_the_stage_counter() {
        let mut first = stage();
        let mut second = stage();
        let a = first.add(vis().0);
        let b = first.add(vis().0);
        let c = second.add(vis().0);

        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn animate_starts_one_loop_and_stop_halts_it() {
        let mut stage = stage();
        let a = stage.add(vis().0);
        let b = stage.add(vis().0);

        stage
            .with_object(a, 0.0, |vis| vis.update(Some(&points(0.0)), None, UpdateMode::Animate))
            .expect("dispatch")
            .expect("update");
        assert!(stage.is_looping());

        stage
            .with_object(b, 0.1, |vis| vis.update(Some(&points(0.0)), None, UpdateMode::Animate))
            .expect("dispatch")
            .expect("update");
        assert_eq!(stage.animating_count(), 2);

        stage.on_stop(a);
        assert!(stage.is_looping());
        stage.on_stop(b);
        assert!(!stage.is_looping());
    }

    #[test]
    fn idle_stage_does_not_draw_on_tick() {
        let mut stage = stage();
        stage.add(vis().0);
        stage.tick(0.5).expect("tick");
        assert_eq!(stage.canvas().begun, 0);
    }

    #[test]
    fn tick_expires_objects_after_max_duration() {
        let mut stage = stage();
        let id = stage.add(vis().0);
        stage
            .with_object(id, 0.0, |vis| vis.update(Some(&points(0.0)), None, UpdateMode::Animate))
            .expect("dispatch")
            .expect("update");

        stage.tick(0.5).expect("tick");
        assert!(stage.is_animating(id));
        stage.tick(1.0).expect("tick");
        assert!(!stage.is_animating(id));
        assert!(!stage.is_looping());
        assert_eq!(stage.canvas().frames.len(), 2);

        let object = stage.object(id).expect("object");
        assert!(object.target_data_by_id().is_none());
        assert!(object.data_by_id().is_some());
    }

    #[test]
    fn draw_event_redraws_every_object() {
        let mut stage = stage();
        let a = stage.add(vis().0);
        let b = stage.add(vis().0);
        stage
            .with_object(b, 0.0, |vis| vis.update(Some(&points(2.0)), None, UpdateMode::Skip))
            .expect("dispatch")
            .expect("update");
        stage
            .with_object(a, 0.0, |vis| vis.update(Some(&points(1.0)), None, UpdateMode::Draw))
            .expect("dispatch")
            .expect("update");

        let frame = stage.canvas().last_frame().expect("frame");
        assert_eq!(frame.background, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(frame.draws.len(), 2);
        assert_eq!(frame.draws[0].uniforms.duration, 0.0);
        assert_eq!(frame.draws[1].uniforms.duration, 1000.0);
        assert!(!stage.is_looping());
    }

    #[test]
    fn failed_frame_still_runs_bookkeeping() {
        let mut stage = stage();
        let (object, probe) = vis();
        let id = stage.add(object);
        stage
            .with_object(id, 0.0, |vis| vis.update(Some(&points(0.0)), None, UpdateMode::Animate))
            .expect("dispatch")
            .expect("update");

        probe.fail_draws(true);
        let err = stage.tick(2.0).expect_err("draw should fail");
        assert!(matches!(err, VisError::Draw(_)));
        assert!(!stage.is_looping());
        assert!(!stage.is_animating(id));
    }

    #[test]
    fn failing_object_does_not_drop_the_frame() {
        let mut stage = stage();
        let (broken, probe) = vis();
        let a = stage.add(broken);
        let b = stage.add(vis().0);
        for (id, x) in [(a, 1.0), (b, 2.0)] {
            stage
                .with_object(id, 0.0, |vis| vis.update(Some(&points(x)), None, UpdateMode::Skip))
                .expect("dispatch")
                .expect("update");
        }

        probe.fail_draws(true);
        let err = stage.draw(0.0, &[]).expect_err("first object should fail");
        assert!(matches!(err, VisError::Draw(_)));

        let frame = stage.canvas().last_frame().expect("frame finished");
        assert_eq!(stage.canvas().frames.len(), 1);
        assert_eq!(frame.draws.len(), 1);
        assert_eq!(frame.draws[0].channel_at(0, "x"), Some(vec![2.0]));
    }

    #[test]
    fn destroyed_objects_are_never_ticked_again() {
        let mut stage = stage();
        let id = stage.add(vis().0);
        stage
            .with_object(id, 0.0, |vis| vis.update(Some(&points(0.0)), None, UpdateMode::Animate))
            .expect("dispatch")
            .expect("update");

        stage.with_object(id, 0.1, |vis| vis.destroy()).expect("dispatch");
        assert!(!stage.is_looping());

        stage
            .with_object(id, 0.2, |vis| vis.animate(PropsPatch::default()))
            .expect("dispatch");
        assert!(!stage.is_animating(id));
        assert!(!stage.is_looping());
    }

    #[test]
    fn remove_unregisters_and_returns_object() {
        let mut stage = stage();
        let id = stage.add(vis().0);
        stage
            .with_object(id, 0.0, |vis| vis.update(Some(&points(0.0)), None, UpdateMode::Animate))
            .expect("dispatch")
            .expect("update");

        let removed = stage.remove(id).expect("remove");
        assert!(removed.is_destroyed());
        assert!(stage.object(id).is_none());
        assert!(!stage.is_looping());
        assert!(matches!(stage.remove(id), Err(VisError::UnknownObject(_))));
    }

    #[test]
    fn recompiles_only_on_data_updates() {
        let mut stage = stage();
        let (object, probe) = vis();
        let id = stage.add(object);
        stage
            .with_object(id, 0.0, |vis| vis.update(Some(&points(0.0)), None, UpdateMode::Draw))
            .expect("dispatch")
            .expect("update");
        stage
            .with_object(id, 0.0, |vis| {
                vis.update(None, Some(&PropsPatch::timing(500.0, 0.0)), UpdateMode::Draw)
            })
            .expect("dispatch")
            .expect("update");

        assert_eq!(probe.compiled(), 1);
        assert_eq!(stage.canvas().frames.len(), 2);
    }
}
