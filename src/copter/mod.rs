//! The multicopter attitude and rate control context.
//!
//! A [`Copter`] owns every piece of mutable control state and runs one control
//! cycle per gyro sample. It reads its collaborators through [`Inputs`] and writes
//! through an [`OutputPublisher`].

pub mod control;
pub use control::{ActuatorDemand, ControlStrategy, CycleInput, Target};

mod builder;
pub use builder::Builder;

use crate::messages::{
    ActuatorControls, AttitudeEstimate, AttitudeSetpoint, BatteryStatus, ControlMode, GearState,
    GyroSample, LandDetected, LandingGear, LocalPosition, ManualControl, RateSetpoint,
    SaturationStatus, SensorBias, SensorCorrection, VehicleStatus,
};
use crate::output::OutputPublisher;
use crate::params::Parameters;
use crate::sensors::{board_rotation, SensorCorrectionPipeline};
use crate::topic::{self, Publisher, Topic};
use control::ManualSetpointGenerator;
use log::{info, warn};
use nalgebra::UnitQuaternion;

macro_rules! topics {
    ($($field:ident: $ty:ty => $name:literal),* $(,)?) => {
        /// Subscriptions read by the control loop.
        #[derive(Debug)]
        pub struct Inputs {
            $(pub $field: Topic<$ty>,)*
        }

        /// Publishing side of every [`Inputs`] topic.
        #[derive(Debug)]
        pub struct InputPublishers {
            $(pub $field: Publisher<$ty>,)*
        }

        impl Inputs {
            /// Create connected input topics. Parameters start at `params`.
            pub fn channel(params: Parameters) -> (InputPublishers, Self) {
                $(let $field = topics!(@init $field, $name, params);)*
                (
                    InputPublishers { $($field: $field.0,)* },
                    Self { $($field: $field.1,)* },
                )
            }
        }
    };
    (@init parameters, $name:literal, $params:ident) => {
        topic::channel($name, $params.clone())
    };
    (@init $field:ident, $name:literal, $params:ident) => {
        topic::channel($name, Default::default())
    };
}

topics! {
    attitude: AttitudeEstimate => "vehicle_attitude",
    attitude_setpoint: AttitudeSetpoint => "vehicle_attitude_setpoint",
    rates_setpoint: RateSetpoint => "vehicle_rates_setpoint",
    control_mode: ControlMode => "vehicle_control_mode",
    manual: ManualControl => "manual_control_setpoint",
    vehicle_status: VehicleStatus => "vehicle_status",
    saturation: SaturationStatus => "multirotor_motor_limits",
    battery: BatteryStatus => "battery_status",
    sensor_correction: SensorCorrection => "sensor_correction",
    sensor_bias: SensorBias => "sensor_bias",
    land_detected: LandDetected => "vehicle_land_detected",
    landing_gear: LandingGear => "landing_gear",
    local_position: LocalPosition => "vehicle_local_position",
    parameters: Parameters => "parameter_update",
}

/// A multicopter flown by the control law `S`.
pub struct Copter<S> {
    pub strategy: S,
    pub sensors: SensorCorrectionPipeline,
    pub manual: ManualSetpointGenerator,
    pub output: OutputPublisher,
    params: Parameters,
    inputs: Inputs,

    attitude: AttitudeEstimate,
    attitude_setpoint: AttitudeSetpoint,
    mode: ControlMode,
    manual_control: ManualControl,
    status: VehicleStatus,
    saturation: SaturationStatus,
    battery: BatteryStatus,
    land: LandDetected,
    position: LocalPosition,
    gear: GearState,

    /// Snap the manual yaw setpoint to the current heading on the next update.
    reset_yaw_sp: bool,
    /// Time since the last attitude update (s).
    attitude_dt: f32,
}

impl<S> Copter<S>
where
    S: ControlStrategy,
{
    pub fn new(
        mut strategy: S,
        params: Parameters,
        gyro_count: usize,
        inputs: Inputs,
        mut output: OutputPublisher,
    ) -> Self {
        strategy.configure(&params);
        output.configure(&params);

        let mut sensors = SensorCorrectionPipeline::new(gyro_count);
        sensors.set_board_rotation(board_rotation(params.board_rotation, params.board_offset));

        Self {
            strategy,
            sensors,
            manual: ManualSetpointGenerator::new(&params),
            output,
            params,
            inputs,
            attitude: AttitudeEstimate::default(),
            attitude_setpoint: AttitudeSetpoint::default(),
            mode: ControlMode::default(),
            manual_control: ManualControl::default(),
            status: VehicleStatus::default(),
            saturation: SaturationStatus::default(),
            battery: BatteryStatus::default(),
            land: LandDetected::default(),
            position: LocalPosition::default(),
            gear: GearState::default(),
            reset_yaw_sp: true,
            attitude_dt: 0.,
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn mode(&self) -> &ControlMode {
        &self.mode
    }

    pub fn is_armed(&self) -> bool {
        self.mode.armed
    }

    pub fn gear(&self) -> GearState {
        self.gear
    }

    /// Index of the gyro instance the loop should wait on.
    pub fn selected_gyro(&self) -> usize {
        self.sensors.selected()
    }

    /// Run one control cycle on a fresh gyro sample.
    ///
    /// Returns the actuator vector if one was published this cycle.
    pub fn cycle(&mut self, sample: &GyroSample, dt: f32, now_us: u64) -> Option<ActuatorControls> {
        let rates = self.sensors.correct(sample.rates);

        // The rate loop runs first, on the freshest gyro data
        let mut actuators = None;
        if self.mode.rates_enabled {
            let input = CycleInput {
                rates,
                attitude: UnitQuaternion::from_quaternion(self.attitude.q),
                mode: self.mode,
                status: self.status,
                saturation: self.saturation,
                land: self.land,
                position: self.position,
                now_us,
            };
            let demand = self.strategy.update(&input, dt);

            actuators = self.output.publish_actuators(
                &demand,
                self.gear,
                self.battery.scale,
                now_us,
                sample.timestamp,
            );
            self.output.publish_status(self.strategy.status(), now_us);
        }

        self.poll_inputs();
        let manual_updated = self.poll_manual();
        let attitude_updated = self.poll_attitude();
        self.attitude_dt += dt;

        // Rattitude: attitude control only while the sticks stay near center
        if self.mode.rattitude_enabled {
            let threshold = self.params.rattitude_threshold;
            self.mode.attitude_enabled = self.manual_control.x.abs() <= threshold
                && self.manual_control.y.abs() <= threshold;
        }

        let mut setpoint_generated = false;
        if self.mode.attitude_enabled && self.status.is_rotary_wing {
            if attitude_updated {
                if self.mode.manual_enabled
                    && !self.mode.altitude_enabled
                    && !self.mode.velocity_enabled
                    && !self.mode.position_enabled
                {
                    self.generate_attitude_setpoint(now_us);
                    setpoint_generated = true;
                } else if let Some(setpoint) = self.inputs.attitude_setpoint.poll() {
                    self.attitude_setpoint = setpoint;
                }

                let target = Target::Attitude {
                    q_d: self.attitude_setpoint.q_d,
                    yaw_sp_move_rate: self.attitude_setpoint.yaw_sp_move_rate,
                    thrust: -self.attitude_setpoint.thrust_body.z,
                };
                self.set_target(&target, now_us);
            }
        } else if self.mode.manual_enabled && self.status.is_rotary_wing {
            if manual_updated {
                let (rates, thrust) = self.manual.acro(&self.manual_control);
                self.set_target(&Target::Rates { rates, thrust }, now_us);
            }
        } else if let Some(setpoint) = self.inputs.rates_setpoint.poll() {
            let target = Target::Rates {
                rates: setpoint.rates(),
                thrust: setpoint.thrust(),
            };
            let attitude = UnitQuaternion::from_quaternion(self.attitude.q);
            self.strategy.set_target(&target, &attitude, &self.mode);
        }

        if self.mode.termination_enabled && !self.status.is_vtol {
            self.strategy.terminate();
            actuators = self.output.publish_actuators(
                &ActuatorDemand::default(),
                self.gear,
                self.battery.scale,
                now_us,
                sample.timestamp,
            );
        }

        if attitude_updated {
            self.reset_yaw_sp = (!setpoint_generated && !self.mode.rattitude_enabled)
                || self.land.landed
                // VTOL in fixed-wing mode
                || (self.status.is_vtol && !self.status.is_rotary_wing);
            self.attitude_dt = 0.;
        }

        actuators
    }

    /// Hand the measured loop rate to the control law.
    pub fn set_loop_rate(&mut self, loop_rate_hz: f32) {
        self.strategy.set_loop_rate(loop_rate_hz);
    }

    /// Apply a parameter update if one arrived. Returns true if applied.
    pub fn poll_parameters(&mut self) -> bool {
        match self.inputs.parameters.poll() {
            Some(params) => {
                self.apply_parameters(params);
                true
            }
            None => false,
        }
    }

    /// Reconfigure everything derived from the parameters.
    pub fn apply_parameters(&mut self, params: Parameters) {
        if params.control_law != self.params.control_law {
            warn!(
                "control law change to {:?} ignored until restart",
                params.control_law
            );
        }

        self.strategy.configure(&params);
        self.manual.configure(&params);
        self.output.configure(&params);
        self.sensors
            .set_board_rotation(board_rotation(params.board_rotation, params.board_offset));

        info!("parameters updated");
        self.params = params;
    }

    fn set_target(&mut self, target: &Target, now_us: u64) {
        let attitude = UnitQuaternion::from_quaternion(self.attitude.q);
        if let Some(setpoint) = self.strategy.set_target(target, &attitude, &self.mode) {
            self.output.publish_rates_setpoint(setpoint, now_us);
        }
    }

    fn generate_attitude_setpoint(&mut self, now_us: u64) {
        self.attitude_setpoint = self.manual.attitude_setpoint(
            &self.manual_control,
            self.attitude.q,
            self.status.is_vtol,
            self.reset_yaw_sp,
            self.attitude_dt,
        );
        self.gear = self
            .manual
            .landing_gear(self.manual_control.gear_switch, self.land.landed);

        self.output
            .publish_attitude_setpoint(self.attitude_setpoint, now_us);
        self.output.publish_landing_gear(self.gear, now_us);
    }

    fn poll_inputs(&mut self) {
        if let Some(mode) = self.inputs.control_mode.poll() {
            self.mode = mode;
        }
        if let Some(status) = self.inputs.vehicle_status.poll() {
            self.output.set_vehicle_status(&status);
            self.status = status;
        }
        if let Some(saturation) = self.inputs.saturation.poll() {
            self.saturation = saturation;
        }
        if let Some(battery) = self.inputs.battery.poll() {
            self.battery = battery;
        }
        if let Some(correction) = self.inputs.sensor_correction.poll() {
            self.sensors.update_correction(correction);
        }
        if let Some(bias) = self.inputs.sensor_bias.poll() {
            self.sensors.update_bias(bias);
        }
        if let Some(land) = self.inputs.land_detected.poll() {
            self.land = land;
        }
        if let Some(gear) = self.inputs.landing_gear.poll() {
            self.gear = gear.state;
        }
        if let Some(position) = self.inputs.local_position.poll() {
            self.position = position;
        }
    }

    fn poll_manual(&mut self) -> bool {
        match self.inputs.manual.poll() {
            Some(manual) => {
                self.manual_control = manual;
                true
            }
            None => false,
        }
    }

    fn poll_attitude(&mut self) -> bool {
        let Some(attitude) = self.inputs.attitude.poll() else {
            return false;
        };

        // An estimator heading reset moves the held yaw setpoint with it
        if attitude.quat_reset_counter != self.attitude.quat_reset_counter {
            self.manual.on_attitude_reset(attitude.delta_q_reset);
        }
        self.attitude = attitude;
        true
    }
}
