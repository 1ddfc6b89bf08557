//! Typed messages exchanged with the rest of the flight stack.
//!
//! Timestamps are microseconds of the scheduler clock.

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Estimated vehicle attitude.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttitudeEstimate {
    pub timestamp: u64,
    /// Rotation from body to NED frame. Not guaranteed to be exactly normalized.
    pub q: Quaternion<f32>,
    /// Rotation applied by the last estimator reset.
    pub delta_q_reset: Quaternion<f32>,
    /// Incremented on every discontinuous estimator reset.
    pub quat_reset_counter: u8,
}

impl Default for AttitudeEstimate {
    fn default() -> Self {
        Self {
            timestamp: 0,
            q: Quaternion::identity(),
            delta_q_reset: Quaternion::identity(),
            quat_reset_counter: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttitudeSetpoint {
    pub timestamp: u64,
    pub roll_body: f32,
    pub pitch_body: f32,
    pub yaw_body: f32,
    /// Feed-forward rotation rate around the world z-axis (rad/s).
    pub yaw_sp_move_rate: f32,
    /// Desired attitude.
    pub q_d: Quaternion<f32>,
    /// Normalized thrust in body frame, -z is up.
    pub thrust_body: Vector3<f32>,
}

impl Default for AttitudeSetpoint {
    fn default() -> Self {
        Self {
            timestamp: 0,
            roll_body: 0.,
            pitch_body: 0.,
            yaw_body: 0.,
            yaw_sp_move_rate: 0.,
            q_d: Quaternion::identity(),
            thrust_body: Vector3::zeros(),
        }
    }
}

/// Body rate setpoint (rad/s) and normalized thrust.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSetpoint {
    pub timestamp: u64,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust_body: Vector3<f32>,
}

impl RateSetpoint {
    pub fn rates(&self) -> Vector3<f32> {
        Vector3::new(self.roll, self.pitch, self.yaw)
    }

    /// Physical thrust is along the negative body z-axis.
    pub fn thrust(&self) -> f32 {
        -self.thrust_body.z
    }
}

/// Which control loops are currently engaged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMode {
    pub armed: bool,
    pub manual_enabled: bool,
    pub auto_enabled: bool,
    pub rates_enabled: bool,
    pub attitude_enabled: bool,
    pub rattitude_enabled: bool,
    pub altitude_enabled: bool,
    pub velocity_enabled: bool,
    pub position_enabled: bool,
    pub termination_enabled: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchPosition {
    #[default]
    None,
    On,
    Middle,
    Off,
}

/// Pilot stick input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualControl {
    pub timestamp: u64,
    /// Pitch stick, -1 ~ +1 (forward positive).
    pub x: f32,
    /// Roll stick, -1 ~ +1 (right positive).
    pub y: f32,
    /// Throttle stick, 0 ~ 1.
    pub z: f32,
    /// Yaw stick, -1 ~ +1.
    pub r: f32,
    pub gear_switch: SwitchPosition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleStatus {
    pub is_vtol: bool,
    pub is_rotary_wing: bool,
}

impl Default for VehicleStatus {
    fn default() -> Self {
        Self {
            is_vtol: false,
            is_rotary_wing: true,
        }
    }
}

/// Motor saturation reported by the mixer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaturationStatus {
    pub roll_pos: bool,
    pub roll_neg: bool,
    pub pitch_pos: bool,
    pub pitch_neg: bool,
    pub yaw_pos: bool,
    pub yaw_neg: bool,
}

impl SaturationStatus {
    /// Positive saturation of the roll, pitch and yaw axes.
    pub fn positive(&self) -> [bool; 3] {
        [self.roll_pos, self.pitch_pos, self.yaw_pos]
    }

    /// Negative saturation of the roll, pitch and yaw axes.
    pub fn negative(&self) -> [bool; 3] {
        [self.roll_neg, self.pitch_neg, self.yaw_neg]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Voltage compensation factor, non-positive when unknown.
    pub scale: f32,
}

/// Raw sample of one gyro instance (rad/s, sensor frame).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GyroSample {
    pub timestamp: u64,
    pub rates: Vector3<f32>,
}

/// Per-instance thermal correction published by the sensor module.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorCorrection {
    pub gyro_offset: [Vector3<f32>; 3],
    pub gyro_scale: [Vector3<f32>; 3],
    pub selected_gyro_instance: u8,
}

impl Default for SensorCorrection {
    fn default() -> Self {
        // Unity scale so an instance without a published correction passes through.
        Self {
            gyro_offset: [Vector3::zeros(); 3],
            gyro_scale: [Vector3::repeat(1.); 3],
            selected_gyro_instance: 0,
        }
    }
}

/// In-run gyro bias estimate (rad/s, body frame).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorBias {
    pub gyro_bias: Vector3<f32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandDetected {
    pub landed: bool,
    pub maybe_landed: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GearState {
    #[default]
    Down,
    Up,
}

impl GearState {
    /// Value of the landing gear actuator channel.
    pub fn actuator_value(self) -> f32 {
        match self {
            GearState::Down => -1.,
            GearState::Up => 1.,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingGear {
    pub timestamp: u64,
    pub state: GearState,
}

/// Local position estimate in NED frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalPosition {
    pub timestamp: u64,
    /// Down position (m), negative above the origin.
    pub z: f32,
    /// Down velocity (m/s).
    pub vz: f32,
}

/// Actuator group the control vector is routed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActuatorGroup {
    #[default]
    Primary,
    /// Multirotor half of a VTOL, mixed with the fixed-wing group downstream.
    VirtualMultirotor,
}

/// Normalized actuator demand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorControls {
    pub timestamp: u64,
    /// Timestamp of the gyro sample the controls were computed from.
    pub timestamp_sample: u64,
    pub group: ActuatorGroup,
    pub control: [f32; 8],
}

impl ActuatorControls {
    pub const INDEX_ROLL: usize = 0;
    pub const INDEX_PITCH: usize = 1;
    pub const INDEX_YAW: usize = 2;
    pub const INDEX_THROTTLE: usize = 3;
    pub const INDEX_LANDING_GEAR: usize = 7;
}

/// Rate controller telemetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RateControllerStatus {
    pub timestamp: u64,
    /// Body rates used by the last cycle.
    pub rates: Vector3<f32>,
    /// Rate integrator state.
    pub integrator: Vector3<f32>,
}
