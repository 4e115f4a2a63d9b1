//! Normalized loop time and the clocks that produce it.

use std::time::{Duration, Instant};

use crate::math::TAU;

/// Elapsed fraction of the loop, always in `[0, 1)`.
///
/// Construction wraps, so `Playhead::new(1.0)` equals `Playhead::new(0.0)`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Playhead(f32);

impl Playhead {
    pub const START: Playhead = Playhead(0.0);

    pub fn new(value: f32) -> Self {
        if !value.is_finite() {
            return Self::START;
        }
        let wrapped = value.rem_euclid(1.0);
        // rem_euclid can round up to exactly 1.0 for tiny negative inputs.
        if wrapped >= 1.0 {
            Self::START
        } else {
            Self(wrapped)
        }
    }

    /// Playhead after `elapsed` of a loop lasting `duration`.
    ///
    /// A zero loop duration pins the playhead at the start.
    pub fn from_elapsed(elapsed: Duration, duration: Duration) -> Self {
        let total = duration.as_secs_f64();
        if total <= 0.0 {
            return Self::START;
        }
        let fraction = (elapsed.as_secs_f64() / total).fract();
        Self::new(fraction as f32)
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Angle around the loop in radians, `[0, TAU)`.
    pub fn phase(self) -> f32 {
        self.0 * TAU
    }

    /// `sin(phase)`; periodic over one loop so the first and wrapped last
    /// frames agree.
    pub fn sine(self) -> f32 {
        self.phase().sin()
    }

    pub fn cosine(self) -> f32 {
        self.phase().cos()
    }

    /// Triangle wave rising from 0 to 1 at mid-loop and back to 0.
    pub fn ping_pong(self) -> f32 {
        1.0 - (2.0 * self.0 - 1.0).abs()
    }
}

/// Everything the frame driver knows about "now".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    pub playhead: Playhead,
    /// Monotonic counter for the running session.
    pub frame_index: u64,
    /// Elapsed seconds since the clock started, unwrapped.
    pub seconds: f32,
}

impl FrameTime {
    pub fn new(playhead: Playhead, frame_index: u64, seconds: f32) -> Self {
        Self {
            playhead,
            frame_index,
            seconds,
        }
    }

    pub fn at(playhead: f32) -> Self {
        Self::new(Playhead::new(playhead), 0, 0.0)
    }
}

/// Source of frame times for the render loop.
pub trait Clock: Send {
    fn reset(&mut self);
    /// Produces the time for the next frame and advances the frame counter.
    fn sample(&mut self) -> FrameTime;
}

pub type BoxedClock = Box<dyn Clock>;

/// Wall clock wrapping over a fixed loop duration.
#[derive(Debug, Clone, Copy)]
pub struct LoopClock {
    origin: Instant,
    duration: Duration,
    frame: u64,
}

impl LoopClock {
    pub fn new(duration: Duration) -> Self {
        Self {
            origin: Instant::now(),
            duration,
            frame: 0,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn sample_at(&mut self, now: Instant) -> FrameTime {
        let elapsed = now.saturating_duration_since(self.origin);
        let time = FrameTime::new(
            Playhead::from_elapsed(elapsed, self.duration),
            self.frame,
            elapsed.as_secs_f32(),
        );
        self.frame = self.frame.saturating_add(1);
        time
    }
}

impl Clock for LoopClock {
    fn reset(&mut self) {
        self.origin = Instant::now();
        self.frame = 0;
    }

    fn sample(&mut self) -> FrameTime {
        self.sample_at(Instant::now())
    }
}

/// Always reports the same playhead; used for stills.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    playhead: Playhead,
    frame: u64,
}

impl FixedClock {
    pub fn new(playhead: Playhead) -> Self {
        Self { playhead, frame: 0 }
    }
}

impl Clock for FixedClock {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> FrameTime {
        let time = FrameTime::new(self.playhead, self.frame, 0.0);
        self.frame = self.frame.saturating_add(1);
        time
    }
}

/// Deterministic clock for exports: frame `i` of `n` sits at playhead `i / n`.
///
/// After the last frame the sequence wraps back to frame zero, matching a
/// seamless loop.
#[derive(Debug, Clone, Copy)]
pub struct SteppedClock {
    frames: u64,
    duration: Duration,
    frame: u64,
}

impl SteppedClock {
    pub fn new(frames: u64, duration: Duration) -> Self {
        Self {
            frames: frames.max(1),
            duration,
            frame: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Clock for SteppedClock {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> FrameTime {
        let step = self.frame % self.frames;
        let playhead = Playhead::new(step as f32 / self.frames as f32);
        let seconds = self.duration.as_secs_f32() * playhead.value();
        let time = FrameTime::new(playhead, self.frame, seconds);
        self.frame = self.frame.saturating_add(1);
        time
    }
}
