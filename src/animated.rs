use std::collections::HashMap;

use crate::attributes::AttributeLayout;
use crate::draw::{DrawFactory, DrawRequest, DrawRoutine, DrawUniforms};
use crate::error::{VisError, VisResult};
use crate::schema::{DrawOverrides, Point, PointId, PropsPatch, TweenChannel, UpdateMode, VisProps};
use crate::tween;

/// Notification queued by an [`AnimatedObject`] for the stage hosting it.
#[derive(Debug, Clone, PartialEq)]
pub enum VisEvent {
    /// Start ticking; `max_duration` is seconds.
    Start {
        max_duration: f64,
        props: PropsPatch,
    },
    Stop,
    /// Redraw the whole stage once, with `overrides` applied to this object.
    Draw { overrides: DrawOverrides },
}

/// Destination of an in-flight animation, with the point's draw index.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPoint {
    pub index: u32,
    pub point: Point,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AnimationClock {
    start_time: f64,
    last_tick: f64,
    duration: f32,
    delay_by_index: f32,
}

/// One dataset of tagged points plus the compiled draw that tweens it.
///
/// The object never drives time itself: its host reports start, tick and end
/// through `animation_started`, `animation_ticked` and `animation_ended`, and
/// drains the events it queues with `take_events`.
pub struct AnimatedObject<F> {
    layout: AttributeLayout,
    factory: Box<dyn DrawFactory<F>>,
    routine: Option<Box<dyn DrawRoutine<F>>>,
    props: VisProps,
    count: usize,
    data_by_id: Option<HashMap<PointId, Point>>,
    target_data_by_id: Option<HashMap<PointId, TargetPoint>>,
    pending_timing: (f32, f32),
    animation: Option<AnimationClock>,
    events: Vec<VisEvent>,
    destroyed: bool,
}

impl<F> AnimatedObject<F> {
    pub fn new(
        channels: &[TweenChannel],
        props: VisProps,
        factory: impl DrawFactory<F> + 'static,
    ) -> VisResult<Self> {
        Ok(Self {
            layout: AttributeLayout::new(channels)?,
            factory: Box::new(factory),
            routine: None,
            props,
            count: 0,
            data_by_id: None,
            target_data_by_id: None,
            pending_timing: (props.duration, props.delay_by_index),
            animation: None,
            events: Vec::new(),
            destroyed: false,
        })
    }

    pub fn layout(&self) -> &AttributeLayout {
        &self.layout
    }

    pub fn props(&self) -> &VisProps {
        &self.props
    }

    /// Number of points in the current draw.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn data_by_id(&self) -> Option<&HashMap<PointId, Point>> {
        self.data_by_id.as_ref()
    }

    pub fn target_data_by_id(&self) -> Option<&HashMap<PointId, TargetPoint>> {
        self.target_data_by_id.as_ref()
    }

    pub fn animation_start_time(&self) -> Option<f64> {
        self.animation.map(|clock| clock.start_time)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn has_draw(&self) -> bool {
        self.routine.is_some()
    }

    pub fn update_props(&mut self, patch: &PropsPatch) {
        self.props.merge(patch);
    }

    /// Replaces the dataset and recompiles the draw against new buffers.
    ///
    /// An in-flight animation is folded first so the next one starts from
    /// where the points were last drawn. `immediate` snaps the committed state
    /// to `points` so nothing moves.
    ///
    /// Nothing changes unless the whole update succeeds: a dataset with
    /// repeated ids, a point missing a channel or a failed compile leaves the
    /// running animation and the committed state as they were.
    pub fn update_data(&mut self, points: &[Point], immediate: bool) -> VisResult<()> {
        let by_id = index_points(points)?;
        let count = u32::try_from(points.len())
            .map_err(|_| VisError::config(format!("{} points exceed u32", points.len())))?;

        let next_committed = if self.data_by_id.is_none() || immediate {
            Some(by_id)
        } else {
            self.fold_in_flight()
        };
        let committed = next_committed.as_ref().or(self.data_by_id.as_ref());
        let attributes = self
            .layout
            .pack(points, |id| committed.and_then(|by_id| by_id.get(id)))?;

        let routine = self.factory.create_draw(DrawRequest {
            layout: &self.layout,
            attributes: &attributes,
            count,
        })?;
        tracing::trace!(count, "recompiled points draw");

        if let Some(committed) = next_committed {
            self.data_by_id = Some(committed);
        }
        self.animation = None;
        self.target_data_by_id = Some(
            points
                .iter()
                .enumerate()
                .map(|(index, point)| {
                    (
                        point.id.clone(),
                        TargetPoint {
                            index: index as u32,
                            point: point.clone(),
                        },
                    )
                })
                .collect(),
        );
        self.count = points.len();
        self.routine = Some(routine);
        Ok(())
    }

    /// Committed state as last drawn by the running animation, if one is in
    /// flight. Elapsed time is taken at the last reported tick.
    fn fold_in_flight(&self) -> Option<HashMap<PointId, Point>> {
        let clock = self.animation?;
        let targets = self.target_data_by_id.as_ref()?;
        let elapsed = ((clock.last_tick - clock.start_time) * 1000.0) as f32;

        Some(interpolate_targets(
            &self.layout,
            self.data_by_id.as_ref(),
            targets,
            elapsed,
            clock.duration,
            clock.delay_by_index,
        ))
    }

    /// Applies props and/or data, then animates or queues a one-off redraw.
    pub fn update(
        &mut self,
        data: Option<&[Point]>,
        props: Option<&PropsPatch>,
        mode: UpdateMode,
    ) -> VisResult<()> {
        if let Some(patch) = props {
            self.update_props(patch);
        }

        if let Some(points) = data {
            self.update_data(points, mode != UpdateMode::Animate)?;
        }

        match mode {
            UpdateMode::Animate => self.animate(PropsPatch::default()),
            UpdateMode::Draw => self.request_draw(DrawOverrides::immediate()),
            UpdateMode::Skip => {}
        }
        Ok(())
    }

    /// Asks the host to start ticking this object. Fields set in `overrides`
    /// win over the object's props for this animation.
    pub fn animate(&mut self, overrides: PropsPatch) {
        if self.destroyed {
            tracing::warn!("ignoring animate on a destroyed object");
            return;
        }

        let duration = overrides.duration.unwrap_or(self.props.duration);
        let delay_by_index = overrides.delay_by_index.unwrap_or(self.props.delay_by_index);
        self.pending_timing = (duration, delay_by_index);

        self.events.push(VisEvent::Start {
            max_duration: tween::max_duration_secs(duration, delay_by_index, self.count),
            props: overrides,
        });
    }

    pub fn request_draw(&mut self, overrides: DrawOverrides) {
        if self.destroyed {
            return;
        }
        self.events.push(VisEvent::Draw { overrides });
    }

    /// Runs the compiled draw once. `now` is stage-clock seconds. Without a
    /// dataset there is nothing to draw.
    pub fn draw(&self, frame: &mut F, now: f64, overrides: &DrawOverrides) -> VisResult<()> {
        let Some(routine) = &self.routine else {
            return Ok(());
        };

        let props = self.props.merged(&overrides.props);
        let elapsed = ((now - overrides.start_time.unwrap_or(0.0)) * 1000.0) as f32;
        routine.draw(frame, &DrawUniforms::from_props(&props, elapsed))
    }

    /// Ends this object's life; the host stops ticking it for good.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.events.push(VisEvent::Stop);
    }

    pub fn take_events(&mut self) -> Vec<VisEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn animation_started(&mut self, start_time: f64) {
        let (duration, delay_by_index) = self.pending_timing;
        self.animation = Some(AnimationClock {
            start_time,
            last_tick: start_time,
            duration,
            delay_by_index,
        });
    }

    pub fn animation_ticked(&mut self, now: f64) {
        if let Some(clock) = &mut self.animation {
            clock.last_tick = now;
        }
    }

    /// Destination reached: the target becomes the committed dataset.
    pub fn animation_ended(&mut self) {
        if let Some(targets) = self.target_data_by_id.take() {
            self.data_by_id = Some(
                targets
                    .into_iter()
                    .map(|(id, target)| (id, target.point))
                    .collect(),
            );
        }
        self.animation = None;
    }

    /// Folds the state drawn `elapsed` ms into the animation into
    /// `data_by_id`, using the timing the animation was started with.
    pub fn animation_interrupted(&mut self, elapsed: f32) {
        let clock = self.animation.take();
        let Some(targets) = self.target_data_by_id.take() else {
            return;
        };
        let (duration, delay_by_index) = clock
            .map(|clock| (clock.duration, clock.delay_by_index))
            .unwrap_or(self.pending_timing);

        self.data_by_id = Some(interpolate_targets(
            &self.layout,
            self.data_by_id.as_ref(),
            &targets,
            elapsed,
            duration,
            delay_by_index,
        ));
    }

    /// Points as they would be drawn `elapsed` ms into the current animation.
    /// Without an animation in flight this is the committed dataset.
    pub fn interpolated_at(&self, elapsed: f32) -> HashMap<PointId, Point> {
        match (&self.target_data_by_id, self.animation) {
            (Some(targets), Some(clock)) => interpolate_targets(
                &self.layout,
                self.data_by_id.as_ref(),
                targets,
                elapsed,
                clock.duration,
                clock.delay_by_index,
            ),
            _ => self.data_by_id.clone().unwrap_or_default(),
        }
    }
}

fn index_points(points: &[Point]) -> VisResult<HashMap<PointId, Point>> {
    let mut by_id = HashMap::with_capacity(points.len());
    for point in points {
        if by_id.insert(point.id.clone(), point.clone()).is_some() {
            tracing::warn!(id = %point.id, "rejecting dataset with duplicate point id");
            return Err(VisError::config(format!("duplicate point id {}", point.id)));
        }
    }
    Ok(by_id)
}

fn interpolate_targets(
    layout: &AttributeLayout,
    sources: Option<&HashMap<PointId, Point>>,
    targets: &HashMap<PointId, TargetPoint>,
    elapsed: f32,
    duration: f32,
    delay_by_index: f32,
) -> HashMap<PointId, Point> {
    targets
        .iter()
        .map(|(id, target)| {
            let dest = &target.point;
            let source = sources.and_then(|by_id| by_id.get(id)).unwrap_or(dest);
            let t = tween::progress(elapsed, duration, delay_by_index, target.index);

            let mut interpolated = dest.clone();
            for channel in layout.channels() {
                let Some(to) = dest.channel(&channel.key) else {
                    continue;
                };
                let from = source.channel(&channel.key).unwrap_or(to);
                let values = tween::mix(from, to, t);
                interpolated.set_channel(&channel.key, &values);
            }
            (id.clone(), interpolated)
        })
        .collect()
}
