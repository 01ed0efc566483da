use std::collections::BTreeMap;

/// Handle of an object hosted on a stage. Assigned from the stage's own
/// counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ObjectClock {
    animating: bool,
    start_time: f64,
    max_duration: f64,
}

/// Idle/animating bookkeeping for every hosted object plus the shared loop
/// flag. Holds no GPU state; times are stage-clock seconds.
#[derive(Debug, Default)]
pub struct AnimationScheduler {
    clocks: BTreeMap<ObjectId, ObjectClock>,
    animating: usize,
    looping: bool,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ObjectId) {
        self.clocks.insert(
            id,
            ObjectClock {
                animating: false,
                start_time: 0.0,
                max_duration: 0.0,
            },
        );
    }

    /// Forgets `id`; returns whether it was still animating.
    pub fn unregister(&mut self, id: ObjectId) -> bool {
        let was_animating = self.stop(id);
        self.clocks.remove(&id);
        was_animating
    }

    /// Idle -> Animating, or restarts the clock of an animating object.
    /// Returns true when this made the first object animate.
    pub fn start(&mut self, id: ObjectId, now: f64, max_duration: f64) -> bool {
        let Some(clock) = self.clocks.get_mut(&id) else {
            return false;
        };

        let newly_animating = !clock.animating;
        clock.animating = true;
        clock.start_time = now;
        clock.max_duration = max_duration;

        if newly_animating {
            self.animating += 1;
        }
        newly_animating && self.animating == 1
    }

    /// Animating -> Idle. Returns false if `id` was already idle.
    pub fn stop(&mut self, id: ObjectId) -> bool {
        match self.clocks.get_mut(&id) {
            Some(clock) if clock.animating => {
                clock.animating = false;
                self.animating = self.animating.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Animating objects whose declared duration has run out at `now`.
    pub fn expired(&self, now: f64) -> Vec<ObjectId> {
        self.clocks
            .iter()
            .filter(|(_, clock)| clock.animating && now - clock.start_time >= clock.max_duration)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn animating_ids(&self) -> Vec<ObjectId> {
        self.clocks
            .iter()
            .filter(|(_, clock)| clock.animating)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_animating(&self, id: ObjectId) -> bool {
        self.clocks.get(&id).is_some_and(|clock| clock.animating)
    }

    pub fn start_time(&self, id: ObjectId) -> Option<f64> {
        self.clocks
            .get(&id)
            .filter(|clock| clock.animating)
            .map(|clock| clock.start_time)
    }

    pub fn animating_count(&self) -> usize {
        self.animating
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Starting a running loop is a logged no-op.
    pub fn start_loop(&mut self) -> bool {
        if self.looping {
            tracing::warn!("already animating; ignoring loop start");
            return false;
        }
        tracing::debug!(animating = self.animating, "frame loop started");
        self.looping = true;
        true
    }

    pub fn stop_loop(&mut self) {
        if self.looping {
            tracing::debug!("frame loop stopped");
        }
        self.looping = false;
    }
}
