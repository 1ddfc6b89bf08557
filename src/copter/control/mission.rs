//! Scripted altitude missions for the state-space regulator.
//!
//! A mission is a list of phases flown back to back on the armed clock. Phase 0
//! always stands still on the ground. After the last phase the vehicle ramps its
//! altitude command down to the ground.

use crate::params::{MissionConfig, SingleHold};
use log::{debug, info, warn};

/// Commanded altitude below which the return ramp snaps to the ground.
pub const RETURN_FLOOR_M: f32 = 0.25;

/// Altitude below which a returning vehicle counts as on the ground.
pub const GROUND_ALTITUDE_M: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Phase {
    pub duration_s: f32,
    /// Altitude to hold, `None` to stand still with outputs off.
    pub altitude_m: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MissionPlan {
    phases: Vec<Phase>,
}

impl MissionPlan {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    /// Stand still for 5 s, then hold 1 m, 1.5 m and 2 m for 15 s each.
    pub fn steps() -> Self {
        Self::new(vec![
            Phase {
                duration_s: 5.,
                altitude_m: None,
            },
            Phase {
                duration_s: 15.,
                altitude_m: Some(1.),
            },
            Phase {
                duration_s: 15.,
                altitude_m: Some(1.5),
            },
            Phase {
                duration_s: 15.,
                altitude_m: Some(2.),
            },
        ])
    }

    pub fn single_hold(hold: &SingleHold) -> Self {
        Self::new(vec![
            Phase {
                duration_s: hold.still_s,
                altitude_m: None,
            },
            Phase {
                duration_s: hold.duration_s,
                altitude_m: Some(hold.altitude_m),
            },
        ])
    }

    /// Plan of a mission selection, `None` for 0 or an unknown preset.
    pub fn preset(config: &MissionConfig) -> Option<Self> {
        match config.select {
            1 => Some(Self::steps()),
            2 => Some(Self::single_hold(&config.single_hold)),
            _ => None,
        }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Index of the phase active at `run_t`, `None` once all phases are over.
    ///
    /// Phase `k` covers `[T_0 + .. + T_(k-1), T_0 + .. + T_k)`.
    pub fn phase_at(&self, run_t: f32) -> Option<usize> {
        let mut end = 0.;
        for (index, phase) in self.phases.iter().enumerate() {
            end += phase.duration_s;
            if run_t < end {
                return Some(index);
            }
        }
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissionState {
    /// Disarmed or nothing to fly.
    Idle,
    Holding(usize),
    /// Ramping the altitude command down after the last phase.
    Returning,
    /// Back on the ground after returning, outputs off until disarm.
    Grounded,
}

/// Result of one sequencer step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MissionStep {
    pub state: MissionState,
    pub altitude_cmd: f32,
    /// Run the state-space regulator.
    pub feedback_enabled: bool,
    /// Forward the regulator demand, otherwise emit zero.
    pub output_enabled: bool,
}

/// Seconds spent armed with rate control, restarted by every disarm.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArmedClock {
    start_us: Option<u64>,
    run_t: f32,
}

impl ArmedClock {
    pub fn update(&mut self, running: bool, now_us: u64) -> f32 {
        if running {
            let start = *self.start_us.get_or_insert(now_us);
            self.run_t = now_us.saturating_sub(start) as f32 / 1e6;
        } else {
            self.start_us = None;
            self.run_t = 0.;
        }
        self.run_t
    }

    pub fn run_t(&self) -> f32 {
        self.run_t
    }
}

#[derive(Clone, Debug)]
pub struct MissionSequencer {
    config: MissionConfig,
    plan: Option<MissionPlan>,
    state: MissionState,
    altitude_cmd: f32,
    return_aim: f32,
    return_start_t: f32,
    /// A completed plan is not flown again until the selection changes.
    completed: bool,
    safety_latched: bool,
}

impl MissionSequencer {
    pub fn new(config: MissionConfig) -> Self {
        let config = validated(config);
        Self {
            plan: MissionPlan::preset(&config),
            config,
            state: MissionState::Idle,
            altitude_cmd: 0.,
            return_aim: 0.,
            return_start_t: 0.,
            completed: false,
            safety_latched: false,
        }
    }

    /// Apply a new configuration. A changed selection loads its plan from the start.
    pub fn configure(&mut self, config: MissionConfig) {
        let config = validated(config);
        if config.select != self.config.select || config.single_hold != self.config.single_hold
        {
            self.plan = MissionPlan::preset(&config);
            self.completed = false;
            info!("mission {} selected", config.select);
        }
        self.config = config;
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn plan(&self) -> Option<&MissionPlan> {
        self.plan.as_ref()
    }

    pub fn altitude_cmd(&self) -> f32 {
        self.altitude_cmd
    }

    /// Armed time at which the return started.
    pub fn return_start_t(&self) -> f32 {
        self.return_start_t
    }

    pub fn is_safety_latched(&self) -> bool {
        self.safety_latched
    }

    /// Advance on the armed clock `run_t` with the measured `altitude` (m, up).
    pub fn update(&mut self, armed: bool, run_t: f32, altitude: f32) -> MissionStep {
        if !armed {
            self.disarm();
            return self.step(false, false);
        }

        if !self.safety_latched && run_t > self.config.safety_timeout_s {
            warn!("mission safety timeout at {:.1} s, regulator off", run_t);
            self.safety_latched = true;
        }
        if self.safety_latched {
            return self.step(false, false);
        }

        let next = self.next_state(run_t);
        if next != self.state {
            self.enter(next, run_t);
        }

        match self.state {
            MissionState::Idle => self.step(false, false),
            MissionState::Holding(index) => {
                match self.plan.as_ref().and_then(|plan| plan.phases.get(index)) {
                    Some(Phase {
                        altitude_m: Some(altitude_m),
                        ..
                    }) => {
                        self.altitude_cmd = *altitude_m;
                        self.step(true, true)
                    }
                    _ => {
                        self.altitude_cmd = 0.;
                        self.step(true, false)
                    }
                }
            }
            MissionState::Returning => {
                self.ramp_down(altitude);
                if altitude < GROUND_ALTITUDE_M {
                    info!("mission returned to ground at {:.1} s", run_t);
                    self.state = MissionState::Grounded;
                    self.step(true, false)
                } else {
                    self.step(true, true)
                }
            }
            MissionState::Grounded => self.step(true, false),
        }
    }

    /// State selected by the armed clock alone.
    fn next_state(&self, run_t: f32) -> MissionState {
        match self.state {
            MissionState::Returning | MissionState::Grounded => self.state,
            _ => match &self.plan {
                Some(plan) if !self.completed => match plan.phase_at(run_t) {
                    Some(index) => MissionState::Holding(index),
                    None => MissionState::Returning,
                },
                _ => MissionState::Idle,
            },
        }
    }

    fn enter(&mut self, state: MissionState, run_t: f32) {
        match state {
            MissionState::Holding(index) => info!("mission phase {} at {:.1} s", index, run_t),
            MissionState::Returning => {
                info!("mission complete at {:.1} s, returning", run_t);
                self.completed = true;
                self.return_start_t = run_t;
                self.return_aim = self.altitude_cmd;
            }
            _ => {}
        }
        self.state = state;
    }

    /// One geometric step of the return ramp per call, gated by the actual descent.
    fn ramp_down(&mut self, altitude: f32) {
        let rate = self.config.ramp_rate;
        if altitude * rate < self.return_aim && self.altitude_cmd >= RETURN_FLOOR_M {
            self.return_aim = altitude * rate;
            self.altitude_cmd *= rate;
            debug!("return altitude command {:.2} m", self.altitude_cmd);
        }
        if self.altitude_cmd < RETURN_FLOOR_M {
            self.altitude_cmd = 0.;
        }
    }

    fn disarm(&mut self) {
        if self.state != MissionState::Idle {
            info!("disarmed, mission idle");
        }
        self.state = MissionState::Idle;
        self.altitude_cmd = 0.;
        self.return_aim = 0.;
        self.safety_latched = false;
        if self.completed {
            self.plan = None;
        }
    }

    fn step(&self, feedback_enabled: bool, output_enabled: bool) -> MissionStep {
        MissionStep {
            state: self.state,
            altitude_cmd: self.altitude_cmd,
            feedback_enabled,
            output_enabled,
        }
    }
}

/// The return ramp only descends for a rate strictly inside (0, 1).
fn validated(mut config: MissionConfig) -> MissionConfig {
    if !(config.ramp_rate > 0. && config.ramp_rate < 1.) {
        warn!(
            "ramp rate {} outside (0, 1), using {}",
            config.ramp_rate,
            MissionConfig::RAMP_RATE
        );
        config.ramp_rate = MissionConfig::RAMP_RATE;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequencer() -> MissionSequencer {
        MissionSequencer::new(MissionConfig::default())
    }

    #[test]
    fn phase_boundaries_are_half_open() {
        let plan = MissionPlan::steps();
        assert_eq!(plan.phase_at(0.), Some(0));
        assert_eq!(plan.phase_at(4.99), Some(0));
        assert_eq!(plan.phase_at(5.), Some(1));
        assert_eq!(plan.phase_at(12.), Some(1));
        assert_eq!(plan.phase_at(20.), Some(2));
        assert_eq!(plan.phase_at(49.9), Some(3));
        assert_eq!(plan.phase_at(50.), None);
        assert_eq!(plan.phase_at(61.), None);
    }

    #[test]
    fn stand_still_suppresses_output() {
        let mut sequencer = sequencer();
        let step = sequencer.update(true, 1., 0.);
        assert_eq!(step.state, MissionState::Holding(0));
        assert!(!step.output_enabled);
        assert_eq!(step.altitude_cmd, 0.);
    }

    #[test]
    fn holds_phase_altitude() {
        let mut sequencer = sequencer();
        let step = sequencer.update(true, 12., 0.);
        assert_eq!(step.state, MissionState::Holding(1));
        assert!(step.output_enabled);
        assert_eq!(step.altitude_cmd, 1.);

        let step = sequencer.update(true, 36., 1.);
        assert_eq!(step.state, MissionState::Holding(3));
        assert_eq!(step.altitude_cmd, 2.);
    }

    #[test]
    fn returns_after_last_phase() {
        let mut sequencer = sequencer();
        sequencer.update(true, 40., 2.);
        let step = sequencer.update(true, 61., 2.);
        assert_eq!(step.state, MissionState::Returning);
        assert_eq!(sequencer.return_start_t(), 61.);
    }

    #[test]
    fn return_ramp_decreases_then_snaps_to_zero() {
        let mut sequencer = sequencer();
        sequencer.update(true, 40., 2.);

        // The vehicle follows the command down.
        let mut altitude = 2.;
        let mut last = f32::INFINITY;
        let mut t = 51.;
        while sequencer.altitude_cmd() > 0. {
            let step = sequencer.update(true, t, altitude);
            assert!(step.altitude_cmd <= last);
            if step.altitude_cmd > 0. {
                assert!(step.altitude_cmd >= RETURN_FLOOR_M * sequencer.config.ramp_rate);
            }
            last = step.altitude_cmd;
            altitude = step.altitude_cmd;
            t += 0.004;
        }
        assert_eq!(sequencer.altitude_cmd(), 0.);
        assert_eq!(sequencer.state(), MissionState::Returning);

        let step = sequencer.update(true, t, 0.1);
        assert_eq!(step.state, MissionState::Grounded);
        assert!(!step.output_enabled);

        // Grounded holds even if the altitude estimate jumps
        let step = sequencer.update(true, t + 1., 1.);
        assert_eq!(step.state, MissionState::Grounded);
    }

    #[test]
    fn out_of_range_ramp_rate_still_lands() {
        for ramp_rate in [1.1, 1., 0., -0.5, f32::NAN] {
            let mut sequencer = MissionSequencer::new(MissionConfig {
                ramp_rate,
                ..Default::default()
            });
            assert_eq!(sequencer.config.ramp_rate, MissionConfig::RAMP_RATE);
            sequencer.update(true, 40., 2.);

            let mut altitude = 2.;
            let mut last = f32::INFINITY;
            let mut t = 51.;
            for _ in 0..1_000 {
                let step = sequencer.update(true, t, altitude);
                assert!(step.altitude_cmd <= last);
                last = step.altitude_cmd;
                altitude = step.altitude_cmd;
                t += 0.004;
            }
            assert_eq!(sequencer.altitude_cmd(), 0.);
            assert_eq!(sequencer.state(), MissionState::Grounded);
        }
    }

    #[test]
    fn reconfigured_ramp_rate_is_validated() {
        let mut sequencer = sequencer();
        sequencer.configure(MissionConfig {
            ramp_rate: 1.1,
            ..Default::default()
        });
        assert_eq!(sequencer.config.ramp_rate, MissionConfig::RAMP_RATE);

        sequencer.configure(MissionConfig {
            ramp_rate: 0.5,
            ..Default::default()
        });
        assert_eq!(sequencer.config.ramp_rate, 0.5);
    }

    #[test]
    fn ramp_waits_for_descent() {
        let mut sequencer = sequencer();
        sequencer.update(true, 40., 2.);
        sequencer.update(true, 51., 2.);
        let after_first = sequencer.altitude_cmd();
        assert!(after_first < 2.);

        // Still at 2 m, the aim is not reached so the command holds.
        let step = sequencer.update(true, 51.1, 2.);
        assert_eq!(step.altitude_cmd, after_first);
    }

    #[test]
    fn safety_timeout_latches_until_disarm() {
        let mut sequencer = sequencer();
        let step = sequencer.update(true, 91., 1.);
        assert!(!step.feedback_enabled);
        assert!(sequencer.is_safety_latched());

        sequencer.update(false, 0., 0.);
        assert!(!sequencer.is_safety_latched());
    }

    #[test]
    fn completed_mission_is_not_flown_again() {
        let mut sequencer = sequencer();
        sequencer.update(true, 55., 2.);
        assert_eq!(sequencer.state(), MissionState::Returning);

        sequencer.update(false, 0., 0.);
        let step = sequencer.update(true, 10., 0.);
        assert_eq!(step.state, MissionState::Idle);
        assert!(!step.output_enabled);

        // Selecting again reloads the plan
        sequencer.configure(MissionConfig {
            select: 2,
            ..Default::default()
        });
        let step = sequencer.update(true, 10., 0.);
        assert_eq!(step.state, MissionState::Holding(1));
        assert_eq!(step.altitude_cmd, 1.);
    }

    #[test]
    fn no_selection_stays_idle() {
        let mut sequencer = MissionSequencer::new(MissionConfig {
            select: 0,
            ..Default::default()
        });
        let step = sequencer.update(true, 10., 0.);
        assert_eq!(step.state, MissionState::Idle);
        assert!(!step.feedback_enabled);
    }

    #[test]
    fn armed_clock_restarts_on_disarm() {
        let mut clock = ArmedClock::default();
        assert_eq!(clock.update(true, 1_000_000), 0.);
        assert_eq!(clock.update(true, 13_000_000), 12.);
        assert_eq!(clock.update(false, 14_000_000), 0.);
        assert_eq!(clock.update(true, 20_000_000), 0.);
    }
}
