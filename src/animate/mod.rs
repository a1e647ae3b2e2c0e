//! # Display Animator
//! Pure animation math for on-screen counters.
//!
//! Two shapes:
//! - `Simple`: one ease-out tween from the current value to the target.
//! - `Staged`: ease-out to `target * fast_phase_ratio`, then a linear creep to
//!   `target` over a long window (hours). Used for cumulative counters, so with
//!   non-decreasing targets the displayed value never goes backwards.
//!
//! Every animation is a function of elapsed milliseconds; [`driver`] feeds it
//! frames. Values stay full precision here, formatting happens at render time.

pub mod driver;

use std::time::Duration;

use anyhow::{bail, Result};

/// Fast phases shorter than this are stretched (0 ms still means "skip").
pub const MIN_FAST_PHASE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimationSpec {
    Simple {
        duration: Duration,
    },
    Staged {
        fast_phase_ratio: f64,
        fast_phase_duration: Duration,
        slow_phase_duration: Duration,
    },
}

impl AnimationSpec {
    /// 1.2 s ease-out counter.
    pub fn simple() -> Self {
        AnimationSpec::Simple {
            duration: Duration::from_millis(1_200),
        }
    }

    /// 99% in 800 ms, the last 1% over eight hours.
    pub fn staged() -> Self {
        AnimationSpec::Staged {
            fast_phase_ratio: 0.99,
            fast_phase_duration: Duration::from_millis(800),
            slow_phase_duration: Duration::from_secs(8 * 3600),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let AnimationSpec::Staged {
            fast_phase_ratio, ..
        } = self
        {
            if !fast_phase_ratio.is_finite() || !(0.0..=1.0).contains(fast_phase_ratio) {
                bail!("fast_phase_ratio must be within [0, 1], got {fast_phase_ratio}");
            }
        }
        Ok(())
    }
}

/// Cubic ease-out on `t` in [0, 1].
pub fn ease_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    let inv = 1.0 - t;
    1.0 - inv * inv * inv
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

/// Clamp `v` into the span between `a` and `b`, whichever order they come in.
fn within(v: f64, a: f64, b: f64) -> f64 {
    v.max(a.min(b)).min(a.max(b))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleAnimation {
    pub from: f64,
    pub to: f64,
    pub duration_ms: f64,
}

impl SimpleAnimation {
    pub fn new(from: f64, to: f64, duration: Duration) -> Self {
        Self {
            from,
            to,
            duration_ms: ms(duration),
        }
    }

    pub fn value_at(&self, elapsed_ms: f64) -> f64 {
        if self.duration_ms <= 0.0 || elapsed_ms >= self.duration_ms {
            return self.to;
        }
        let p = ease_out(elapsed_ms.max(0.0) / self.duration_ms);
        self.from + (self.to - self.from) * p
    }

    pub fn is_done(&self, elapsed_ms: f64) -> bool {
        elapsed_ms >= self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagedAnimation {
    pub from: f64,
    /// Where the fast phase stops and the slow phase starts.
    pub fast_end: f64,
    pub target: f64,
    pub fast_ms: f64,
    pub slow_ms: f64,
}

impl StagedAnimation {
    pub fn new(
        current: f64,
        target: f64,
        fast_phase_ratio: f64,
        fast_phase_duration: Duration,
        slow_phase_duration: Duration,
    ) -> Self {
        let ratio = if fast_phase_ratio.is_nan() {
            1.0
        } else {
            fast_phase_ratio.clamp(0.0, 1.0)
        };
        // Below zero `target * ratio` lands past the target; cap it there.
        let fast_target = (target * ratio).min(target);
        let slow_ms = ms(slow_phase_duration);

        if target <= current {
            // Nothing left to climb; settle on the target.
            return Self {
                from: target,
                fast_end: target,
                target,
                fast_ms: 0.0,
                slow_ms: 0.0,
            };
        }
        if fast_phase_duration.is_zero() || current >= fast_target {
            return Self {
                from: current,
                fast_end: current,
                target,
                fast_ms: 0.0,
                slow_ms,
            };
        }
        Self {
            from: current,
            fast_end: fast_target,
            target,
            fast_ms: ms(fast_phase_duration.max(MIN_FAST_PHASE)),
            slow_ms,
        }
    }

    pub fn value_at(&self, elapsed_ms: f64) -> f64 {
        let elapsed = elapsed_ms.max(0.0);
        if elapsed < self.fast_ms {
            let p = ease_out(elapsed / self.fast_ms);
            let v = self.from + (self.fast_end - self.from) * p;
            return within(v, self.from, self.fast_end);
        }
        if self.slow_ms <= 0.0 {
            return self.target;
        }
        let p = ((elapsed - self.fast_ms) / self.slow_ms).clamp(0.0, 1.0);
        within(self.fast_end + (self.target - self.fast_end) * p, self.fast_end, self.target)
    }

    pub fn is_done(&self, elapsed_ms: f64) -> bool {
        elapsed_ms >= self.fast_ms + self.slow_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    Idle(f64),
    Simple(SimpleAnimation),
    Staged(StagedAnimation),
}

/// Stateful wrapper: owns the in-flight animation and restarts it from the
/// currently displayed value whenever a new target arrives.
#[derive(Debug, Clone)]
pub struct Animator {
    spec: AnimationSpec,
    reduced_motion: bool,
    motion: Motion,
    started_at_ms: i64,
    target: Option<f64>,
}

impl Animator {
    /// An invalid `spec` is logged and replaced by [`AnimationSpec::simple`].
    pub fn new(spec: AnimationSpec, initial: f64, reduced_motion: bool) -> Self {
        let spec = match spec.validate() {
            Ok(()) => spec,
            Err(e) => {
                tracing::warn!(error = %e, "invalid animation spec, using a simple tween");
                AnimationSpec::simple()
            }
        };
        Self {
            spec,
            reduced_motion,
            motion: Motion::Idle(initial),
            started_at_ms: 0,
            target: None,
        }
    }

    pub fn target(&self) -> Option<f64> {
        self.target
    }

    /// Cancel whatever is running and head for `target` from the value shown at `now_ms`.
    pub fn set_target(&mut self, target: f64, now_ms: i64) {
        if !target.is_finite() {
            return;
        }
        let current = self.value_at(now_ms);
        self.target = Some(target);
        self.started_at_ms = now_ms;

        if self.reduced_motion {
            self.motion = Motion::Idle(target);
            return;
        }
        self.motion = match self.spec {
            AnimationSpec::Simple { duration } => {
                Motion::Simple(SimpleAnimation::new(current, target, duration))
            }
            AnimationSpec::Staged {
                fast_phase_ratio,
                fast_phase_duration,
                slow_phase_duration,
            } => Motion::Staged(StagedAnimation::new(
                current,
                target,
                fast_phase_ratio,
                fast_phase_duration,
                slow_phase_duration,
            )),
        };
    }

    fn elapsed(&self, now_ms: i64) -> f64 {
        now_ms.saturating_sub(self.started_at_ms).max(0) as f64
    }

    pub fn value_at(&self, now_ms: i64) -> f64 {
        let elapsed = self.elapsed(now_ms);
        match &self.motion {
            Motion::Idle(v) => *v,
            Motion::Simple(a) => a.value_at(elapsed),
            Motion::Staged(a) => a.value_at(elapsed),
        }
    }

    /// True once the displayed value has reached the target.
    pub fn is_settled(&self, now_ms: i64) -> bool {
        let elapsed = self.elapsed(now_ms);
        match &self.motion {
            Motion::Idle(_) => true,
            Motion::Simple(a) => a.is_done(elapsed),
            Motion::Staged(a) => a.is_done(elapsed),
        }
    }
}
