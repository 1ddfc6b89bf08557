use super::{
    attitude::limit_rates, rate::RateInput, rate_setpoint, ActuatorDemand, AttitudeController,
    ControlStrategy, CycleInput, RateController, Target,
};
use crate::messages::{ControlMode, RateControllerStatus, RateSetpoint};
use crate::params::{Parameters, RateLimits};
use nalgebra::{UnitQuaternion, Vector3};

/// Attitude P loop feeding the PID rate loop.
#[derive(Clone, Debug)]
pub struct CascadedControl {
    pub attitude: AttitudeController,
    pub rate: RateController,
    limits: RateLimits,
    rates_sp: Vector3<f32>,
    thrust_sp: f32,
}

impl Default for CascadedControl {
    fn default() -> Self {
        Self::new(&Parameters::default())
    }
}

impl CascadedControl {
    pub fn new(params: &Parameters) -> Self {
        Self {
            attitude: AttitudeController::new(params.attitude_p()),
            rate: RateController::new(params),
            limits: params.rate_limits(),
            rates_sp: Vector3::zeros(),
            thrust_sp: 0.,
        }
    }
}

impl ControlStrategy for CascadedControl {
    fn configure(&mut self, params: &Parameters) {
        self.attitude.gain = params.attitude_p();
        self.rate.configure(params);
        self.limits = params.rate_limits();
    }

    fn set_loop_rate(&mut self, loop_rate_hz: f32) {
        self.rate.set_loop_rate(loop_rate_hz);
    }

    fn set_target(
        &mut self,
        target: &Target,
        attitude: &UnitQuaternion<f32>,
        mode: &ControlMode,
    ) -> Option<RateSetpoint> {
        match *target {
            Target::Attitude {
                q_d,
                yaw_sp_move_rate,
                thrust,
            } => {
                let rates_sp = self
                    .attitude
                    .update(*attitude.quaternion(), q_d, yaw_sp_move_rate);
                self.rates_sp = limit_rates(rates_sp, &self.limits, mode);
                self.thrust_sp = thrust;
            }
            Target::Rates { rates, thrust } => {
                self.rates_sp = rates;
                self.thrust_sp = thrust;
            }
        }

        Some(self.rate_setpoint())
    }

    fn update(&mut self, input: &CycleInput, dt: f32) -> ActuatorDemand {
        if !input.mode.armed || !input.status.is_rotary_wing {
            self.rate.reset_integrator();
        }

        let torque = self.rate.update(
            &RateInput {
                rates: input.rates,
                rates_sp: self.rates_sp,
                thrust: self.thrust_sp,
                saturation: input.saturation,
                land: input.land,
            },
            dt,
        );

        ActuatorDemand {
            torque,
            thrust: self.thrust_sp,
        }
    }

    fn rate_setpoint(&self) -> RateSetpoint {
        rate_setpoint(self.rates_sp, self.thrust_sp)
    }

    fn status(&self) -> RateControllerStatus {
        RateControllerStatus {
            timestamp: 0,
            rates: self.rate.rates_prev(),
            integrator: self.rate.integrator(),
        }
    }

    fn terminate(&mut self) {
        self.rates_sp = Vector3::zeros();
        self.thrust_sp = 0.;
        self.rate.reset_integrator();
    }
}
