//! Cooperative scheduling primitives.
//!
//! The browser drives everything from one `requestAnimationFrame` callback.
//! Instead of self-rescheduling closures, periodic jobs are plain state
//! machines polled with the current time.

use serde::Serialize;

/// Lifecycle of a [`RepeatingTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    Idle,
    Running,
    Paused,
    Cancelled,
}

/// A job that becomes due every `interval_ms` while running.
#[derive(Debug, Clone)]
pub struct RepeatingTask {
    interval_ms: f64,
    next_due_ms: f64,
    /// Time left until the next run, captured when paused.
    remaining_ms: f64,
    state: TaskState,
}

impl RepeatingTask {
    pub fn new(interval_ms: f64) -> Self {
        RepeatingTask {
            interval_ms: interval_ms.max(1.0),
            next_due_ms: 0.0,
            remaining_ms: 0.0,
            state: TaskState::Idle,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Start (or restart) the task; first run is one interval from `now`.
    pub fn start(&mut self, now: f64) {
        if self.state == TaskState::Cancelled {
            return;
        }
        self.next_due_ms = now + self.interval_ms;
        self.state = TaskState::Running;
    }

    pub fn pause(&mut self, now: f64) {
        if self.state == TaskState::Running {
            self.remaining_ms = (self.next_due_ms - now).max(0.0);
            self.state = TaskState::Paused;
        }
    }

    pub fn resume(&mut self, now: f64) {
        if self.state == TaskState::Paused {
            self.next_due_ms = now + self.remaining_ms;
            self.state = TaskState::Running;
        }
    }

    /// Terminal: a cancelled task never runs again.
    pub fn cancel(&mut self) {
        self.state = TaskState::Cancelled;
    }

    pub fn set_interval(&mut self, interval_ms: f64) {
        self.interval_ms = interval_ms.max(1.0);
    }

    /// Returns `true` once per elapsed interval.
    ///
    /// A task that fell more than one interval behind (tab in background)
    /// runs once and re-anchors on `now` instead of replaying every missed
    /// tick.
    pub fn poll(&mut self, now: f64) -> bool {
        if self.state != TaskState::Running || now < self.next_due_ms {
            return false;
        }
        self.next_due_ms += self.interval_ms;
        if self.next_due_ms <= now {
            self.next_due_ms = now + self.interval_ms;
        }
        true
    }
}

/// One-shot timer.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    due_ms: Option<f64>,
}

impl Deadline {
    pub fn schedule_at(&mut self, due_ms: f64) {
        self.due_ms = Some(due_ms);
    }

    pub fn cancel(&mut self) {
        self.due_ms = None;
    }

    pub fn is_pending(&self) -> bool {
        self.due_ms.is_some()
    }

    pub fn due_ms(&self) -> Option<f64> {
        self.due_ms
    }

    /// Fires at most once per `schedule_at`.
    pub fn poll(&mut self, now: f64) -> bool {
        match self.due_ms {
            Some(due) if now >= due => {
                self.due_ms = None;
                true
            }
            _ => false,
        }
    }
}

/// Limits per-frame work to a target frame rate.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    min_interval_ms: f64,
    last_ms: Option<f64>,
}

impl FrameThrottle {
    pub fn new(fps: u32) -> Self {
        FrameThrottle {
            min_interval_ms: Self::interval_for(fps),
            last_ms: None,
        }
    }

    fn interval_for(fps: u32) -> f64 {
        // Small tolerance so a 60 Hz display does not skip every other
        // frame at a 60 fps target.
        1000.0 / fps.max(1) as f64 - 1.0
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.min_interval_ms = Self::interval_for(fps);
    }

    /// Returns the elapsed milliseconds since the last accepted frame, or
    /// `None` if this frame should be skipped. The first frame reports 0.
    pub fn ready(&mut self, now: f64) -> Option<f64> {
        match self.last_ms {
            None => {
                self.last_ms = Some(now);
                Some(0.0)
            }
            Some(last) if now - last >= self.min_interval_ms => {
                self.last_ms = Some(now);
                Some(now - last)
            }
            Some(_) => None,
        }
    }

    /// Forget the last frame so a resumed loop does not see a huge delta.
    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}
