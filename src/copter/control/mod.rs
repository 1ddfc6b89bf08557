//! Control laws and the [`ControlStrategy`] seam between them and the loop.
//!
//! [`CascadedControl`] runs the quaternion attitude loop into a PID rate loop.
//! [`FullStateControl`] runs the state-space regulator on a scripted mission.
//! A [`Copter`](super::Copter) is built with exactly one of them.

use crate::messages::{
    ControlMode, LandDetected, LocalPosition, RateControllerStatus, RateSetpoint,
    SaturationStatus, VehicleStatus,
};
use crate::params::{ControlLaw, Parameters};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

pub mod attitude;
pub use attitude::AttitudeController;

mod cascaded;
pub use cascaded::CascadedControl;

mod full_state;
pub use full_state::FullStateControl;

pub mod manual;
pub use manual::ManualSetpointGenerator;

pub mod mission;
pub use mission::{MissionSequencer, MissionState};

pub mod rate;
pub use rate::RateController;

pub mod state_space;
pub use state_space::StateSpaceController;

/// Normalized torque and thrust demand.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ActuatorDemand {
    /// Roll, pitch and yaw torque, -1 ~ +1.
    pub torque: Vector3<f32>,
    /// Thrust, 0 ~ 1.
    pub thrust: f32,
}

/// What the vehicle should do, as decided by the setpoint sources.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Target {
    Attitude {
        q_d: Quaternion<f32>,
        /// Feed forward rotation rate around the world z-axis (rad/s).
        yaw_sp_move_rate: f32,
        thrust: f32,
    },
    /// Body rates (rad/s).
    Rates { rates: Vector3<f32>, thrust: f32 },
}

/// Everything a control law reads in one cycle.
#[derive(Clone, Copy, Debug)]
pub struct CycleInput {
    /// Corrected body rates (rad/s).
    pub rates: Vector3<f32>,
    pub attitude: UnitQuaternion<f32>,
    pub mode: ControlMode,
    pub status: VehicleStatus,
    pub saturation: SaturationStatus,
    pub land: LandDetected,
    pub position: LocalPosition,
    /// Scheduler time (us).
    pub now_us: u64,
}

/// A control law producing actuator demand from the cycle inputs.
pub trait ControlStrategy {
    /// Load parameters. Called at construction and on every reload.
    fn configure(&mut self, params: &Parameters);

    /// Measured control loop rate (Hz).
    fn set_loop_rate(&mut self, loop_rate_hz: f32);

    /// Take a new target. Returns the rate setpoint to publish, if any.
    fn set_target(
        &mut self,
        target: &Target,
        attitude: &UnitQuaternion<f32>,
        mode: &ControlMode,
    ) -> Option<RateSetpoint>;

    /// Run one control step.
    fn update(&mut self, input: &CycleInput, dt: f32) -> ActuatorDemand;

    /// Current rate setpoint.
    fn rate_setpoint(&self) -> RateSetpoint;

    fn status(&self) -> RateControllerStatus;

    /// Flight termination: drop setpoints, integrators and demand.
    fn terminate(&mut self);
}

fn rate_setpoint(rates: Vector3<f32>, thrust: f32) -> RateSetpoint {
    RateSetpoint {
        timestamp: 0,
        roll: rates.x,
        pitch: rates.y,
        yaw: rates.z,
        thrust_body: Vector3::new(0., 0., -thrust),
    }
}

impl<S: ControlStrategy + ?Sized> ControlStrategy for Box<S> {
    fn configure(&mut self, params: &Parameters) {
        (**self).configure(params)
    }

    fn set_loop_rate(&mut self, loop_rate_hz: f32) {
        (**self).set_loop_rate(loop_rate_hz)
    }

    fn set_target(
        &mut self,
        target: &Target,
        attitude: &UnitQuaternion<f32>,
        mode: &ControlMode,
    ) -> Option<RateSetpoint> {
        (**self).set_target(target, attitude, mode)
    }

    fn update(&mut self, input: &CycleInput, dt: f32) -> ActuatorDemand {
        (**self).update(input, dt)
    }

    fn rate_setpoint(&self) -> RateSetpoint {
        (**self).rate_setpoint()
    }

    fn status(&self) -> RateControllerStatus {
        (**self).status()
    }

    fn terminate(&mut self) {
        (**self).terminate()
    }
}

/// The control law selected by `params.control_law`.
pub fn from_parameters(params: &Parameters) -> Box<dyn ControlStrategy + Send> {
    match params.control_law {
        ControlLaw::Cascaded => Box::new(CascadedControl::new(params)),
        ControlLaw::FullState => Box::new(FullStateControl::new(params)),
    }
}
