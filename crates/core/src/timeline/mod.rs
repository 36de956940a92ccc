use std::{cell::Cell, rc::Rc, time::Instant};

/// Monotonic time in seconds from an arbitrary epoch.
pub trait TimeSource {
    fn now(&self) -> f64;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Shared, hand-driven clock. Clones observe the same time, which lets a
/// headless session step the audio backend and the frame loop together.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    seconds: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.set(seconds);
    }

    pub fn advance(&self, delta: f64) {
        self.seconds.set(self.seconds.get() + delta.max(0.0));
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> f64 {
        self.seconds.get()
    }
}

/// Converts successive frame timestamps into deltas.
#[derive(Debug, Default, Clone)]
pub struct FrameClock {
    last: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the previous tick, if any.
    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// Records `now` and returns the time since the previous call. The first
    /// call, a clock running backwards and non-finite input all yield zero.
    pub fn advance(&mut self, now: f64) -> f64 {
        if !now.is_finite() {
            return 0.0;
        }
        let delta = self
            .last
            .map(|last| (now - last).max(0.0))
            .unwrap_or(0.0);
        self.last = Some(now);
        delta
    }

    /// Seconds between the previous tick and `timestamp`, never negative.
    pub fn since_last(&self, timestamp: f64) -> f64 {
        match self.last {
            Some(last) if timestamp.is_finite() => (timestamp - last).max(0.0),
            _ => 0.0,
        }
    }
}
