use std::time::{Duration, Instant};

const LATENCY_DECAY: f64 = 0.98;
const FPS_DECAY: f64 = 0.7;
const ROLLOVER: Duration = Duration::from_millis(1000);

/// Smoothed per-frame latency and frames-per-second estimates.
#[derive(Debug, Clone)]
pub struct FpsStats {
    avg_ms: f64,
    avg_fps: f64,
    count: u32,
    last_rollover: Instant,
    rollovers: u64,
}

impl FpsStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            avg_ms: 0.0,
            avg_fps: 0.0,
            count: 0,
            last_rollover: now,
            rollovers: 0,
        }
    }

    /// Fold one latency sample (milliseconds) into the moving average.
    pub fn update_avg_ms(&mut self, sample_ms: f64) -> f64 {
        self.avg_ms = LATENCY_DECAY * self.avg_ms + (1.0 - LATENCY_DECAY) * sample_ms;
        self.avg_ms
    }

    pub fn tick_fps(&mut self) -> f64 {
        self.tick_fps_at(Instant::now())
    }

    /// Count one frame; once a second has passed, fold the count into the FPS average.
    pub fn tick_fps_at(&mut self, now: Instant) -> f64 {
        self.count += 1;
        if now.saturating_duration_since(self.last_rollover) >= ROLLOVER {
            self.avg_fps = FPS_DECAY * self.avg_fps + (1.0 - FPS_DECAY) * f64::from(self.count);
            self.count = 0;
            self.last_rollover = now;
            self.rollovers += 1;
        }
        self.avg_fps
    }

    pub fn avg_ms(&self) -> f64 {
        self.avg_ms
    }

    pub fn avg_fps(&self) -> f64 {
        self.avg_fps
    }

    pub fn rollovers(&self) -> u64 {
        self.rollovers
    }
}

impl Default for FpsStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_average_uses_slow_decay() {
        let mut s = FpsStats::new();
        let v = s.update_avg_ms(100.0);
        assert!((v - 2.0).abs() < 1e-9);
        let v = s.update_avg_ms(100.0);
        assert!((v - (0.98 * 2.0 + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn latency_average_converges() {
        let mut s = FpsStats::new();
        for _ in 0..2000 {
            s.update_avg_ms(16.0);
        }
        assert!((s.avg_ms() - 16.0).abs() < 0.01);
    }

    #[test]
    fn no_rollover_within_one_second() {
        let t0 = Instant::now();
        let mut s = FpsStats::starting_at(t0);
        for i in 0..500u64 {
            s.tick_fps_at(t0 + Duration::from_millis(i));
        }
        s.tick_fps_at(t0 + Duration::from_millis(999));
        assert_eq!(s.rollovers(), 0);
        assert_eq!(s.avg_fps(), 0.0);
    }

    #[test]
    fn one_rollover_per_boundary_crossed() {
        let t0 = Instant::now();
        let mut s = FpsStats::starting_at(t0);
        for i in 0..30u64 {
            s.tick_fps_at(t0 + Duration::from_millis(i * 10));
        }
        let fps = s.tick_fps_at(t0 + Duration::from_millis(1000));
        assert_eq!(s.rollovers(), 1);
        assert!((fps - 0.3 * 31.0).abs() < 1e-9);

        // Still inside the next second: no second rollover.
        s.tick_fps_at(t0 + Duration::from_millis(1500));
        assert_eq!(s.rollovers(), 1);

        s.tick_fps_at(t0 + Duration::from_millis(2000));
        s.tick_fps_at(t0 + Duration::from_millis(3100));
        assert_eq!(s.rollovers(), 3);
    }

    #[test]
    fn long_gap_counts_once() {
        let t0 = Instant::now();
        let mut s = FpsStats::starting_at(t0);
        s.tick_fps_at(t0 + Duration::from_secs(5));
        assert_eq!(s.rollovers(), 1);
    }
}
