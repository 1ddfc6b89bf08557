//! Pilot stick input to attitude, rate and landing gear setpoints.

use crate::messages::{AttitudeSetpoint, GearState, ManualControl, SwitchPosition};
use crate::params::{Parameters, ThrottleCurve};
use core::f32::consts::PI;
use nalgebra::{Quaternion, UnitQuaternion, Vector2, Vector3};

/// Throttle stick above which the yaw stick moves the yaw setpoint.
const YAW_STICK_MIN_THROTTLE: f32 = 0.05;

/// Wrap an angle into [-pi, pi).
pub fn wrap_pi(angle: f32) -> f32 {
    (angle + PI).rem_euclid(2. * PI) - PI
}

/// Cubic expo curve. `e` = 0 is linear, 1 is purely cubic.
pub fn expo(value: f32, e: f32) -> f32 {
    let x = value.max(-1.).min(1.);
    let e = e.max(0.).min(1.);
    (1. - e) * x + e * x * x * x
}

/// Expo with an additional curve that flattens the center further.
pub fn superexpo(value: f32, e: f32, g: f32) -> f32 {
    let x = value.max(-1.).min(1.);
    let g = g.max(0.).min(0.99);
    expo(x, e) * (1. - g) / (1. - x.abs() * g)
}

/// Maps stick input to setpoints in stabilized and acro modes.
#[derive(Clone, Debug)]
pub struct ManualSetpointGenerator {
    /// Maximum tilt (rad).
    pub tilt_max: f32,
    /// Yaw rate at full stick (rad/s).
    pub yaw_rate_scaling: f32,
    pub throttle_curve: ThrottleCurve,
    pub throttle_hover: f32,
    pub throttle_min: f32,
    pub throttle_max: f32,
    /// Roll, pitch and yaw rate at full stick in acro (rad/s).
    pub acro_rate_max: Vector3<f32>,
    pub acro_expo_rp: f32,
    pub acro_superexpo_rp: f32,
    pub acro_expo_y: f32,
    pub acro_superexpo_y: f32,

    yaw_sp: f32,
    gear_state_initialized: bool,
}

impl Default for ManualSetpointGenerator {
    fn default() -> Self {
        Self::new(&Parameters::default())
    }
}

impl ManualSetpointGenerator {
    pub fn new(params: &Parameters) -> Self {
        let mut generator = Self {
            tilt_max: 0.,
            yaw_rate_scaling: 0.,
            throttle_curve: ThrottleCurve::default(),
            throttle_hover: 0.,
            throttle_min: 0.,
            throttle_max: 0.,
            acro_rate_max: Vector3::zeros(),
            acro_expo_rp: 0.,
            acro_superexpo_rp: 0.,
            acro_expo_y: 0.,
            acro_superexpo_y: 0.,
            yaw_sp: 0.,
            gear_state_initialized: false,
        };
        generator.configure(params);
        generator
    }

    pub fn configure(&mut self, params: &Parameters) {
        self.tilt_max = params.man_tilt_max.to_radians();
        self.yaw_rate_scaling = params.man_yaw_rate.to_radians();
        self.throttle_curve = params.throttle_curve;
        self.throttle_hover = params.throttle_hover;
        self.throttle_min = params.man_throttle_min;
        self.throttle_max = params.throttle_max;
        self.acro_rate_max = params.rate_limits().acro;
        self.acro_expo_rp = params.acro_expo_rp;
        self.acro_superexpo_rp = params.acro_superexpo_rp;
        self.acro_expo_y = params.acro_expo_y;
        self.acro_superexpo_y = params.acro_superexpo_y;
    }

    /// Held yaw setpoint (rad).
    pub fn yaw_sp(&self) -> f32 {
        self.yaw_sp
    }

    /// Shift the held yaw setpoint by the heading change of an estimator reset.
    pub fn on_attitude_reset(&mut self, delta_q_reset: Quaternion<f32>) {
        let (_, _, delta_yaw) = UnitQuaternion::from_quaternion(delta_q_reset).euler_angles();
        self.yaw_sp += delta_yaw;
    }

    /// Map the throttle stick in [0, 1] to normalized thrust.
    pub fn throttle_curve(&self, stick: f32) -> f32 {
        match self.throttle_curve {
            ThrottleCurve::Linear => {
                self.throttle_min + stick * (self.throttle_max - self.throttle_min)
            }
            ThrottleCurve::RescaleToHover => {
                if stick < 0.5 {
                    (self.throttle_hover - self.throttle_min) / 0.5 * stick + self.throttle_min
                } else {
                    (self.throttle_max - self.throttle_hover) / 0.5 * (stick - 1.)
                        + self.throttle_max
                }
            }
        }
    }

    /// Stabilized mode attitude setpoint.
    ///
    /// The stick deflection sets the tilt angle and its direction, so the vehicle
    /// flies towards where the stick points and the tilt limit is a simple norm.
    pub fn attitude_setpoint(
        &mut self,
        manual: &ManualControl,
        attitude: Quaternion<f32>,
        is_vtol: bool,
        reset_yaw_sp: bool,
        dt: f32,
    ) -> AttitudeSetpoint {
        let mut setpoint = AttitudeSetpoint::default();
        let (_, _, yaw) = UnitQuaternion::from_quaternion(attitude).euler_angles();

        if reset_yaw_sp {
            self.yaw_sp = yaw;
        } else if manual.z > YAW_STICK_MIN_THROTTLE {
            setpoint.yaw_sp_move_rate = manual.r * self.yaw_rate_scaling;
            self.yaw_sp = wrap_pi(self.yaw_sp + setpoint.yaw_sp_move_rate * dt);
        }

        // Axis perpendicular to the stick direction in the horizontal plane
        let mut v = Vector2::new(manual.y * self.tilt_max, -manual.x * self.tilt_max);
        let v_norm = v.norm();
        if v_norm > self.tilt_max {
            v *= self.tilt_max / v_norm;
        }

        let (roll, pitch, yaw_offset) =
            UnitQuaternion::from_scaled_axis(Vector3::new(v.x, v.y, 0.)).euler_angles();
        setpoint.roll_body = roll;
        setpoint.pitch_body = pitch;
        // Tilting about a horizontal axis also changes yaw at large angles
        setpoint.yaw_body = self.yaw_sp + yaw_offset;

        if is_vtol {
            // Keep the pilot's roll and pitch intent relative to the desired heading
            // even with a large yaw error.
            let yaw_error = wrap_pi(setpoint.yaw_body - yaw);
            let z_roll_pitch_sp =
                UnitQuaternion::from_euler_angles(setpoint.roll_body, setpoint.pitch_body, 0.)
                    * Vector3::z();
            let z_roll_pitch_sp =
                UnitQuaternion::from_euler_angles(0., 0., -yaw_error) * z_roll_pitch_sp;

            setpoint.roll_body = -z_roll_pitch_sp.y.max(-1.).min(1.).asin();
            setpoint.pitch_body = z_roll_pitch_sp.x.atan2(z_roll_pitch_sp.z);
        }

        setpoint.q_d = *UnitQuaternion::from_euler_angles(
            setpoint.roll_body,
            setpoint.pitch_body,
            setpoint.yaw_body,
        )
        .quaternion();
        setpoint.thrust_body = Vector3::new(0., 0., -self.throttle_curve(manual.z));

        setpoint
    }

    /// Acro mode rate setpoint (rad/s) and thrust.
    pub fn acro(&self, manual: &ManualControl) -> (Vector3<f32>, f32) {
        let sticks = Vector3::new(
            superexpo(manual.y, self.acro_expo_rp, self.acro_superexpo_rp),
            superexpo(-manual.x, self.acro_expo_rp, self.acro_superexpo_rp),
            superexpo(manual.r, self.acro_expo_y, self.acro_superexpo_y),
        );
        (sticks.component_mul(&self.acro_rate_max), manual.z)
    }

    /// Logical landing gear state.
    ///
    /// After landing the gear only goes up once the switch was moved through off,
    /// so a switch left on never retracts the gear right after takeoff.
    pub fn landing_gear(&mut self, switch: SwitchPosition, landed: bool) -> GearState {
        if landed {
            self.gear_state_initialized = false;
        }

        match switch {
            SwitchPosition::On if self.gear_state_initialized => GearState::Up,
            SwitchPosition::Off => {
                self.gear_state_initialized = true;
                GearState::Down
            }
            _ => GearState::Down,
        }
    }
}
