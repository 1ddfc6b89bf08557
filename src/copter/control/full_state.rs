use super::{
    mission::{ArmedClock, MissionStep},
    rate_setpoint,
    state_space::VehicleState,
    ActuatorDemand, ControlStrategy, CycleInput, MissionSequencer, StateSpaceController, Target,
};
use crate::messages::{ControlMode, RateControllerStatus, RateSetpoint};
use crate::params::Parameters;
use nalgebra::{UnitQuaternion, Vector3};

/// State-space regulator flying the selected altitude mission.
///
/// Attitude and rate targets from the setpoint sources are not followed.
#[derive(Clone, Debug)]
pub struct FullStateControl {
    pub regulator: StateSpaceController,
    pub mission: MissionSequencer,
    clock: ArmedClock,
    last_step: Option<MissionStep>,
    demand: ActuatorDemand,
    rates: Vector3<f32>,
}

impl Default for FullStateControl {
    fn default() -> Self {
        Self::new(&Parameters::default())
    }
}

impl FullStateControl {
    pub fn new(params: &Parameters) -> Self {
        Self {
            regulator: StateSpaceController::new(params.state_space),
            mission: MissionSequencer::new(params.mission),
            clock: ArmedClock::default(),
            last_step: None,
            demand: ActuatorDemand::default(),
            rates: Vector3::zeros(),
        }
    }

    /// Seconds armed with rate control enabled.
    pub fn run_t(&self) -> f32 {
        self.clock.run_t()
    }

    pub fn last_step(&self) -> Option<MissionStep> {
        self.last_step
    }
}

impl ControlStrategy for FullStateControl {
    fn configure(&mut self, params: &Parameters) {
        self.regulator.configure(params.state_space);
        self.mission.configure(params.mission);
    }

    fn set_loop_rate(&mut self, _loop_rate_hz: f32) {}

    fn set_target(
        &mut self,
        _target: &Target,
        _attitude: &UnitQuaternion<f32>,
        _mode: &ControlMode,
    ) -> Option<RateSetpoint> {
        None
    }

    fn update(&mut self, input: &CycleInput, dt: f32) -> ActuatorDemand {
        self.rates = input.rates;

        // The mission only runs while the clock does
        let running = input.mode.armed && input.mode.rates_enabled;
        let run_t = self.clock.update(running, input.now_us);
        let altitude = -input.position.z;
        let step = self.mission.update(running, run_t, altitude);
        self.last_step = Some(step);

        self.regulator.set_altitude_cmd(step.altitude_cmd);
        if step.feedback_enabled {
            self.regulator.update(
                &VehicleState {
                    attitude: input.attitude,
                    rates: input.rates,
                    position: input.position,
                },
                dt,
            );
        }

        self.demand = if step.feedback_enabled && step.output_enabled {
            self.regulator.normalized()
        } else {
            ActuatorDemand::default()
        };
        self.demand
    }

    fn rate_setpoint(&self) -> RateSetpoint {
        rate_setpoint(Vector3::zeros(), self.demand.thrust)
    }

    fn status(&self) -> RateControllerStatus {
        RateControllerStatus {
            timestamp: 0,
            rates: self.rates,
            integrator: Vector3::zeros(),
        }
    }

    fn terminate(&mut self) {
        self.demand = ActuatorDemand::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copter::control::MissionState;
    use crate::messages::{LandDetected, LocalPosition, SaturationStatus, VehicleStatus};
    use approx::assert_relative_eq;

    fn input(armed: bool, now_us: u64, altitude: f32) -> CycleInput {
        CycleInput {
            rates: Vector3::zeros(),
            attitude: UnitQuaternion::identity(),
            mode: ControlMode {
                armed,
                rates_enabled: true,
                ..Default::default()
            },
            status: VehicleStatus::default(),
            saturation: SaturationStatus::default(),
            land: LandDetected::default(),
            position: LocalPosition {
                z: -altitude,
                ..Default::default()
            },
            now_us,
        }
    }

    #[test]
    fn stands_still_then_climbs() {
        let mut control = FullStateControl::default();

        let demand = control.update(&input(true, 1_000_000, 0.), 0.004);
        assert_eq!(demand, ActuatorDemand::default());
        assert_eq!(control.mission.state(), MissionState::Holding(0));
        assert!(control.regulator.model().is_some());

        // 12 s after arming: hold 1 m
        let demand = control.update(&input(true, 13_000_000, 0.), 0.004);
        assert_eq!(control.run_t(), 12.);
        assert_eq!(control.mission.state(), MissionState::Holding(1));
        assert!(demand.thrust > 0.5);
    }

    #[test]
    fn hover_thrust_at_target_altitude() {
        let mut control = FullStateControl::default();
        control.update(&input(true, 0, 1.), 0.004);
        let demand = control.update(&input(true, 6_000_000, 1.), 0.004);

        assert_relative_eq!(demand.thrust, 1.5 * 9.81 / 30., epsilon = 1e-5);
        assert_relative_eq!(demand.torque, Vector3::zeros(), epsilon = 1e-6);
    }

    #[test]
    fn disarm_restarts_mission_clock() {
        let mut control = FullStateControl::default();
        control.update(&input(true, 0, 0.), 0.004);
        control.update(&input(true, 8_000_000, 0.), 0.004);
        assert_eq!(control.run_t(), 8.);

        let demand = control.update(&input(false, 9_000_000, 0.), 0.004);
        assert_eq!(control.run_t(), 0.);
        assert_eq!(demand, ActuatorDemand::default());
        assert_eq!(control.mission.state(), MissionState::Idle);
    }

    #[test]
    fn rates_disabled_keeps_mission_idle() {
        let mut control = FullStateControl::default();
        let mut rates_off = input(true, 0, 0.);
        rates_off.mode.rates_enabled = false;

        for now_us in [0, 20_000_000, 60_000_000] {
            rates_off.now_us = now_us;
            let demand = control.update(&rates_off, 0.004);
            assert_eq!(control.run_t(), 0.);
            assert_eq!(control.mission.state(), MissionState::Idle);
            assert_eq!(demand, ActuatorDemand::default());
        }

        // The mission starts from phase 0 once rates are enabled
        control.update(&input(true, 61_000_000, 0.), 0.004);
        assert_eq!(control.run_t(), 0.);
        assert_eq!(control.mission.state(), MissionState::Holding(0));
    }

    #[test]
    fn ignores_external_targets() {
        let mut control = FullStateControl::default();
        let published = control.set_target(
            &Target::Rates {
                rates: Vector3::repeat(1.),
                thrust: 1.,
            },
            &UnitQuaternion::identity(),
            &ControlMode::default(),
        );
        assert!(published.is_none());
    }
}
