//! Tunable parameters of the attitude and rate controllers.
//!
//! Angles and rates are stored in degrees the way they are configured; the
//! controllers read the radian conversions from [`Parameters::rate_limits`].

use crate::sensors::SensorRotation;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Value of [`Parameters::circuit_breaker_rate_ctrl`] that disables actuator output.
pub const CIRCUIT_BREAKER_RATE_CTRL_KEY: i32 = 140253;

/// Gains of one rotation axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisGains {
    /// Attitude error to rate setpoint gain.
    pub attitude_p: f32,
    pub rate_p: f32,
    pub rate_i: f32,
    pub rate_d: f32,
    pub rate_ff: f32,
    /// Absolute limit of the rate integrator.
    pub integrator_limit: f32,
}

impl AxisGains {
    pub const ROLL_PITCH: Self = Self {
        attitude_p: 6.5,
        rate_p: 0.15,
        rate_i: 0.05,
        rate_d: 0.003,
        rate_ff: 0.,
        integrator_limit: 0.3,
    };

    pub const YAW: Self = Self {
        attitude_p: 2.8,
        rate_p: 0.2,
        rate_i: 0.1,
        rate_d: 0.,
        rate_ff: 0.,
        integrator_limit: 0.3,
    };
}

/// Throttle PID attenuation of one gain channel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tpa {
    /// Thrust above which the gain starts to be attenuated.
    pub breakpoint: f32,
    /// Attenuation at full thrust.
    pub rate: f32,
}

impl Default for Tpa {
    fn default() -> Self {
        Self {
            breakpoint: 1.,
            rate: 0.,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThrottleCurve {
    /// Piecewise linear with hover throttle at half stick.
    #[default]
    RescaleToHover,
    /// Linear from minimum to maximum throttle.
    Linear,
}

/// Mass, inertia and calibration of the full-state feedback regulator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSpaceConfig {
    /// Vehicle mass (kg).
    pub mass: f32,
    /// Principal moments of inertia (kg m²).
    pub inertia: Vector3<f32>,
    /// Gravitational acceleration (m/s²).
    pub gravity: f32,
    /// Reference scale of the altitude channel.
    pub reference_scale: f32,
    /// Thrust (N) that maps to full normalized thrust.
    pub max_thrust: f32,
    /// Torques (N m) that map to full normalized roll, pitch and yaw demand.
    pub max_torque: Vector3<f32>,
    /// Drive the torque channels from the regulator, otherwise only thrust.
    pub attitude_channels: bool,
}

impl StateSpaceConfig {
    pub const MASS: f32 = 1.5;
    pub const INERTIA: Vector3<f32> = Vector3::new(0.0347, 0.0347, 0.0977);
    pub const GRAVITY: f32 = 9.81;
    pub const MAX_THRUST: f32 = 30.;
    pub const MAX_TORQUE: f32 = 1.;
}

impl Default for StateSpaceConfig {
    fn default() -> Self {
        Self {
            mass: Self::MASS,
            inertia: Self::INERTIA,
            gravity: Self::GRAVITY,
            reference_scale: 3.,
            max_thrust: Self::MAX_THRUST,
            max_torque: Vector3::repeat(Self::MAX_TORQUE),
            attitude_channels: true,
        }
    }
}

/// Single altitude hold flown by mission 2.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleHold {
    pub still_s: f32,
    pub altitude_m: f32,
    pub duration_s: f32,
}

impl Default for SingleHold {
    fn default() -> Self {
        Self {
            still_s: 5.,
            altitude_m: 1.,
            duration_s: 30.,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissionConfig {
    /// Preset to fly, 0 for none.
    pub select: u8,
    pub single_hold: SingleHold,
    /// Multiplicative step of the return ramp, in (0, 1).
    pub ramp_rate: f32,
    /// Armed time (s) after which the regulator is switched off.
    pub safety_timeout_s: f32,
}

impl MissionConfig {
    pub const RAMP_RATE: f32 = 0.9;
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            select: 1,
            single_hold: SingleHold::default(),
            ramp_rate: Self::RAMP_RATE,
            safety_timeout_s: 90.,
        }
    }
}

/// Which control law produces the actuator demand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlLaw {
    /// Attitude P loop cascaded into a PID rate loop.
    #[default]
    Cascaded,
    /// State-space regulator flying a scripted altitude mission.
    FullState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub roll: AxisGains,
    pub pitch: AxisGains,
    pub yaw: AxisGains,

    pub tpa_p: Tpa,
    pub tpa_i: Tpa,
    pub tpa_d: Tpa,

    /// Maximum roll, pitch and yaw rates in attitude modes (deg/s).
    pub rate_max: Vector3<f32>,
    /// Maximum yaw rate in auto modes (deg/s).
    pub yaw_auto_max: f32,

    /// Acro mode roll, pitch and yaw rates at full stick (deg/s).
    pub acro_max: Vector3<f32>,
    pub acro_expo_rp: f32,
    pub acro_superexpo_rp: f32,
    pub acro_expo_y: f32,
    pub acro_superexpo_y: f32,

    /// Stick deflection above which rattitude falls back to rate control.
    pub rattitude_threshold: f32,
    /// Maximum tilt in stabilized mode (deg).
    pub man_tilt_max: f32,
    /// Yaw rate at full yaw stick in stabilized mode (deg/s).
    pub man_yaw_rate: f32,

    pub throttle_curve: ThrottleCurve,
    pub throttle_hover: f32,
    pub man_throttle_min: f32,
    pub throttle_max: f32,

    /// Cutoff of the derivative low pass filter (Hz), 0 to disable.
    pub d_term_cutoff: f32,

    pub battery_scale_enabled: bool,
    pub circuit_breaker_rate_ctrl: i32,

    pub board_rotation: SensorRotation,
    /// Fine tune of the board rotation, roll/pitch/yaw (deg).
    pub board_offset: Vector3<f32>,

    pub control_law: ControlLaw,
    pub state_space: StateSpaceConfig,
    pub mission: MissionConfig,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            roll: AxisGains::ROLL_PITCH,
            pitch: AxisGains::ROLL_PITCH,
            yaw: AxisGains::YAW,
            tpa_p: Tpa::default(),
            tpa_i: Tpa::default(),
            tpa_d: Tpa::default(),
            rate_max: Vector3::new(220., 220., 200.),
            yaw_auto_max: 45.,
            acro_max: Vector3::new(720., 720., 540.),
            acro_expo_rp: 0.69,
            acro_superexpo_rp: 0.7,
            acro_expo_y: 0.69,
            acro_superexpo_y: 0.7,
            rattitude_threshold: 0.8,
            man_tilt_max: 35.,
            man_yaw_rate: 200.,
            throttle_curve: ThrottleCurve::default(),
            throttle_hover: 0.5,
            man_throttle_min: 0.08,
            throttle_max: 1.,
            d_term_cutoff: 30.,
            battery_scale_enabled: false,
            circuit_breaker_rate_ctrl: 0,
            board_rotation: SensorRotation::None,
            board_offset: Vector3::zeros(),
            control_law: ControlLaw::default(),
            state_space: StateSpaceConfig::default(),
            mission: MissionConfig::default(),
        }
    }
}

/// Rate limits in rad/s derived from [`Parameters`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimits {
    pub manual: Vector3<f32>,
    pub auto: Vector3<f32>,
    pub acro: Vector3<f32>,
}

impl Parameters {
    pub fn attitude_p(&self) -> Vector3<f32> {
        Vector3::new(self.roll.attitude_p, self.pitch.attitude_p, self.yaw.attitude_p)
    }

    pub fn rate_p(&self) -> Vector3<f32> {
        Vector3::new(self.roll.rate_p, self.pitch.rate_p, self.yaw.rate_p)
    }

    pub fn rate_i(&self) -> Vector3<f32> {
        Vector3::new(self.roll.rate_i, self.pitch.rate_i, self.yaw.rate_i)
    }

    pub fn rate_d(&self) -> Vector3<f32> {
        Vector3::new(self.roll.rate_d, self.pitch.rate_d, self.yaw.rate_d)
    }

    pub fn rate_ff(&self) -> Vector3<f32> {
        Vector3::new(self.roll.rate_ff, self.pitch.rate_ff, self.yaw.rate_ff)
    }

    pub fn integrator_limit(&self) -> Vector3<f32> {
        Vector3::new(
            self.roll.integrator_limit,
            self.pitch.integrator_limit,
            self.yaw.integrator_limit,
        )
    }

    pub fn rate_limits(&self) -> RateLimits {
        let manual = self.rate_max.map(f32::to_radians);
        let mut auto = manual;
        auto.z = self.yaw_auto_max.to_radians();

        RateLimits {
            manual,
            auto,
            acro: self.acro_max.map(f32::to_radians),
        }
    }

    pub fn is_circuit_breaker_engaged(&self) -> bool {
        self.circuit_breaker_rate_ctrl == CIRCUIT_BREAKER_RATE_CTRL_KEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn auto_limits_only_change_yaw() {
        let limits = Parameters::default().rate_limits();
        assert_relative_eq!(limits.auto.x, limits.manual.x);
        assert_relative_eq!(limits.auto.z, 45f32.to_radians());
        assert_relative_eq!(limits.manual.z, 200f32.to_radians());
    }

    #[test]
    fn circuit_breaker_needs_exact_key() {
        let mut params = Parameters::default();
        assert!(!params.is_circuit_breaker_engaged());

        params.circuit_breaker_rate_ctrl = 140252;
        assert!(!params.is_circuit_breaker_engaged());

        params.circuit_breaker_rate_ctrl = CIRCUIT_BREAKER_RATE_CTRL_KEY;
        assert!(params.is_circuit_breaker_engaged());
    }
}
