use crate::copter::control::rate::DEFAULT_LOOP_RATE_HZ;

/// Smallest control step (s).
pub const DT_MIN: f32 = 0.0002;

/// Largest control step (s).
pub const DT_MAX: f32 = 0.02;

/// The loop rate is only measured this long after start while armed (us).
pub const LOOP_RATE_WINDOW_US: u64 = 3_300_000;

/// Control step and loop rate bookkeeping.
#[derive(Clone, Debug)]
pub struct LoopTiming {
    task_start_us: u64,
    last_run_us: u64,
    dt_accumulator: f32,
    loop_counter: u32,
    loop_rate_hz: f32,
}

impl LoopTiming {
    pub fn new(task_start_us: u64) -> Self {
        Self {
            task_start_us,
            last_run_us: task_start_us,
            dt_accumulator: 0.,
            loop_counter: 0,
            loop_rate_hz: DEFAULT_LOOP_RATE_HZ,
        }
    }

    /// Smoothed loop rate (Hz).
    pub fn loop_rate_hz(&self) -> f32 {
        self.loop_rate_hz
    }

    /// Seconds since the last cycle, clamped to [[`DT_MIN`], [`DT_MAX`]].
    pub fn dt(&mut self, now_us: u64) -> f32 {
        let dt = now_us.saturating_sub(self.last_run_us) as f32 / 1e6;
        self.last_run_us = now_us;

        dt.max(DT_MIN).min(DT_MAX)
    }

    /// Accumulate one cycle towards the loop rate estimate.
    ///
    /// Measures only while disarmed or shortly after start, so retuning the
    /// derivative filter never disturbs a flight. Returns the new estimate once
    /// a full second has been accumulated.
    pub fn update_loop_rate(&mut self, dt: f32, armed: bool, now_us: u64) -> Option<f32> {
        if armed && now_us.saturating_sub(self.task_start_us) >= LOOP_RATE_WINDOW_US {
            return None;
        }

        self.dt_accumulator += dt;
        self.loop_counter += 1;

        if self.dt_accumulator > 1. {
            let loop_rate = self.loop_counter as f32 / self.dt_accumulator;
            self.loop_rate_hz = self.loop_rate_hz * 0.5 + loop_rate * 0.5;
            self.dt_accumulator = 0.;
            self.loop_counter = 0;
            Some(self.loop_rate_hz)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn dt_is_clamped() {
        let mut timing = LoopTiming::new(1_000);
        assert_eq!(timing.dt(1_050), DT_MIN);
        assert_relative_eq!(timing.dt(5_050), 0.004);
        assert_eq!(timing.dt(1_005_050), DT_MAX);
        // Clock going backwards
        assert_eq!(timing.dt(0), DT_MIN);
    }

    #[test]
    fn first_dt_counts_from_start() {
        let mut timing = LoopTiming::new(10_000);
        assert_relative_eq!(timing.dt(12_000), 0.002);
    }

    #[test]
    fn loop_rate_is_smoothed_each_second() {
        let mut timing = LoopTiming::new(0);
        let mut estimate = None;
        for i in 1..=501 {
            estimate = estimate.or(timing.update_loop_rate(0.002, false, i * 2_000));
        }

        // 501 cycles over 1.002 s, averaged with the initial 250 Hz
        let estimate = estimate.unwrap();
        assert_relative_eq!(estimate, 250. * 0.5 + 500. * 0.5, epsilon = 1.);
        assert_eq!(timing.loop_rate_hz(), estimate);
    }

    #[test]
    fn armed_flight_freezes_estimate() {
        let mut timing = LoopTiming::new(0);
        for i in 0..1_000 {
            let now = LOOP_RATE_WINDOW_US + i * 2_000;
            assert!(timing.update_loop_rate(0.002, true, now).is_none());
        }
        assert_eq!(timing.loop_rate_hz(), DEFAULT_LOOP_RATE_HZ);

        // Measured right after start even when armed
        let mut timing = LoopTiming::new(0);
        let updated = (0..600).filter_map(|i| timing.update_loop_rate(0.002, true, i * 2_000));
        assert_eq!(updated.count(), 1);
    }
}
