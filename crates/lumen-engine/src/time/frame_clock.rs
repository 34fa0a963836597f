use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous frame tick, in seconds.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,

    /// Frames per second over the last completed one-second window; zero
    /// until the first window closes.
    pub fps: f32,
}

/// Frame clock producing `FrameTime` snapshots.
///
/// Delta time is clamped to avoid pathological values when the application is paused
/// by the debugger, minimized, or stalls.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,

    window_start: Instant,
    window_frames: u32,
    fps: f32,
}

impl FrameClock {
    /// Length of the window frames per second are averaged over.
    pub const FPS_WINDOW: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        let now = Instant::now();
        Self {
            last: now,
            frame_index: 0,
            dt_min,
            dt_max,
            window_start: now,
            window_frames: 0,
            fps: 0.0,
        }
    }

    /// Resets the clock baseline, e.g. after resuming from suspension.
    pub fn reset(&mut self) {
        self.last = Instant::now();
        self.window_start = self.last;
        self.window_frames = 0;
    }

    /// Advances the clock and returns a new `FrameTime`.
    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        self.window_frames += 1;
        let window = now.saturating_duration_since(self.window_start);
        if window >= Self::FPS_WINDOW {
            self.fps = self.window_frames as f32 / window.as_secs_f32();
            self.window_start = now;
            self.window_frames = 0;
        }

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
            fps: self.fps,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
