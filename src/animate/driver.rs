// src/animate/driver.rs
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Animator;
use crate::clock::SharedClock;

/// Roughly 30 fps.
pub const DEFAULT_FRAME_PERIOD: Duration = Duration::from_millis(33);

pub struct AnimationHandle {
    frames: watch::Receiver<f64>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AnimationHandle {
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.frames.clone()
    }

    pub fn current(&self) -> f64 {
        *self.frames.borrow()
    }

    /// Stop frames; the last published value stays readable on subscribers.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "animation task panicked");
            }
        }
    }
}

/// Animate toward whatever `project` extracts from the `targets` channel.
///
/// `project` returning `None` leaves the current animation alone (feed has
/// no value yet). Frames are only produced while the animator is moving; a
/// settled animator sleeps until the next target. When the target channel
/// closes the current animation still plays out.
pub fn spawn<T, F>(
    mut animator: Animator,
    mut targets: watch::Receiver<T>,
    project: F,
    clock: SharedClock,
    frame_period: Duration,
) -> AnimationHandle
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> Option<f64> + Send + 'static,
{
    let initial = {
        let now = clock.now_ms();
        if let Some(t) = project(&*targets.borrow_and_update()) {
            animator.set_target(t, now);
        }
        animator.value_at(now)
    };
    let (tx, rx) = watch::channel(initial);
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let mut frames = time::interval(frame_period.max(Duration::from_millis(1)));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut targets_open = true;

        loop {
            // Keep ticking until the settled value itself has been published.
            let now = clock.now_ms();
            let idle = animator.is_settled(now) && *tx.borrow() == animator.value_at(now);
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                changed = targets.changed(), if targets_open => {
                    if changed.is_err() {
                        targets_open = false;
                        continue;
                    }
                    let next = project(&*targets.borrow_and_update());
                    if let Some(target) = next {
                        if animator.target() != Some(target) {
                            let now = clock.now_ms();
                            animator.set_target(target, now);
                            publish(&tx, animator.value_at(now));
                            frames.reset();
                        }
                    }
                }
                _ = frames.tick(), if !idle => {
                    publish(&tx, animator.value_at(clock.now_ms()));
                }
            }
        }
        tracing::debug!("animation stopped");
    });

    AnimationHandle {
        frames: rx,
        cancel,
        task,
    }
}

fn publish(tx: &watch::Sender<f64>, v: f64) {
    tx.send_if_modified(|cur| {
        if *cur != v {
            *cur = v;
            true
        } else {
            false
        }
    });
}
