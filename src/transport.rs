use std::time::Instant;

/// Playback clock state for one session. Owned by the dispatcher thread;
/// control calls arrive as messages and are applied here between ticks, so
/// no field is ever observed half-updated.
///
/// The anchor instant never moves; seeks shift a seconds offset instead, so
/// the clock math stays pure duration arithmetic.
#[derive(Debug, Clone)]
pub struct Transport {
    anchor: Instant,
    /// Seconds between the anchor and playback position zero.
    origin: f64,
    /// Cumulative seconds spent paused.
    paused_total: f64,
    paused_at: Option<Instant>,
    pub cursor: usize,
    pub paused: bool,
    pub stopped: bool,
}

impl Transport {
    pub fn start(now: Instant) -> Self {
        Self {
            anchor: now,
            origin: 0.0,
            paused_total: 0.0,
            paused_at: None,
            cursor: 0,
            paused: false,
            stopped: false,
        }
    }

    /// Seconds of playback elapsed. Meaningful only while not paused.
    pub fn playback_time(&self, now: Instant) -> f64 {
        (now - self.anchor).as_secs_f64() - self.origin - self.paused_total
    }

    pub fn pause(&mut self, now: Instant) {
        self.paused_at = Some(now);
        self.paused = true;
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += (now - paused_at).as_secs_f64();
        }
        self.paused = false;
    }

    /// Relocates the cursor and recomputes the time origin so playback_time
    /// is continuous from `target`, honoring the current pause state. The
    /// caller must have performed a full shutdown first.
    pub fn seek(&mut self, now: Instant, target: f64, cursor: usize) {
        let target = target.max(0.0);
        let elapsed = (now - self.anchor).as_secs_f64();
        self.cursor = cursor;
        if self.paused {
            self.paused_total = 0.0;
            self.origin = elapsed - target;
            self.paused_at = Some(now);
        } else {
            self.origin = elapsed - target - self.paused_total;
        }
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        self.paused = false;
    }
}
