use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Minimum spacing between two accepted motion triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionDebounce {
    window: Duration,
}

impl MotionDebounce {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a trigger arriving `since_last` after the previous accepted one passes.
    ///
    /// The elapsed time must strictly exceed the window. The first trigger always passes.
    pub fn should_accept(&self, since_last: Option<Duration>) -> bool {
        since_last.map_or(true, |elapsed| elapsed > self.window)
    }

    /// Check and record a trigger at `now` in one step.
    pub fn accept(&self, last_trigger: &mut Option<Instant>, now: Instant) -> bool {
        let since_last = last_trigger.map(|last| now.saturating_duration_since(last));
        if self.should_accept(since_last) {
            *last_trigger = Some(now);
            true
        } else {
            false
        }
    }
}

impl Default for MotionDebounce {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
