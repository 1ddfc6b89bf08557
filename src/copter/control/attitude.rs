use crate::messages::ControlMode;
use crate::params::RateLimits;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Quaternion attitude controller prioritizing roll and pitch over yaw.
///
/// Based on "Nonlinear Quadrocopter Attitude Control" (Brescianini, Hehn and
/// D'Andrea, 2013).
#[derive(Clone, Debug)]
pub struct AttitudeController {
    /// Attitude error to rate setpoint gain of roll, pitch and yaw.
    pub gain: Vector3<f32>,
}

impl Default for AttitudeController {
    fn default() -> Self {
        Self {
            gain: Vector3::new(6.5, 6.5, 2.8),
        }
    }
}

impl AttitudeController {
    pub fn new(gain: Vector3<f32>) -> Self {
        Self { gain }
    }

    /// Body rate setpoint (rad/s) to rotate from `q` towards `q_d`.
    ///
    /// `yaw_sp_move_rate` is a feed forward rotation rate around the world z-axis.
    pub fn update(
        &self,
        q: Quaternion<f32>,
        q_d: Quaternion<f32>,
        yaw_sp_move_rate: f32,
    ) -> Vector3<f32> {
        // Yaw is weighted by its gain relative to roll and pitch, then controlled
        // with the roll/pitch gain.
        let mut gain = self.gain;
        let roll_pitch_gain = (gain.x + gain.y) / 2.;
        let yaw_w = (gain.z / roll_pitch_gain).max(0.).min(1.);
        gain.z = roll_pitch_gain;

        // acos(1.00001) is NaN
        let q = UnitQuaternion::from_quaternion(q);
        let q_d = UnitQuaternion::from_quaternion(q_d);

        // Reduced attitude: only align the thrust axis
        let e_z = q * Vector3::z();
        let e_z_d = q_d * Vector3::z();
        let q_d_red = match UnitQuaternion::rotation_between(&e_z, &e_z_d) {
            Some(thrust_rotation) if e_z.dot(&e_z_d) >= -1. + 1e-5 => thrust_rotation * q,
            // Thrust axes are opposite. Full attitude control creates no yaw input
            // here anyway.
            _ => q_d,
        };

        // Mix the full and reduced desired attitude
        let mut q_mix = *(q_d_red.inverse() * q_d).quaternion();
        if q_mix.w < 0. {
            q_mix = -q_mix;
        }
        let w = q_mix.w.max(-1.).min(1.);
        let k = q_mix.k.max(-1.).min(1.);
        let q_d_mixed = q_d_red.quaternion()
            * Quaternion::new(
                (yaw_w * w.acos()).cos(),
                0.,
                0.,
                (yaw_w * k.asin()).sin(),
            );

        // Rotation from q to the mixed setpoint
        let q_e = q.inverse().quaternion() * q_d_mixed;

        // sin(alpha/2) scaled rotation axis, resolving the antipodal ambiguity
        let e_q = q_e.imag() * 2. * sign_no_zero(q_e.w);

        let mut rates_sp = e_q.component_mul(&gain);

        // World z-axis in body frame
        rates_sp += (q.inverse() * Vector3::z()) * yaw_sp_move_rate;

        rates_sp
    }
}

/// Clamp a rate setpoint to the auto or manual limits depending on `mode`.
pub fn limit_rates(rates_sp: Vector3<f32>, limits: &RateLimits, mode: &ControlMode) -> Vector3<f32> {
    let max = if (mode.velocity_enabled || mode.auto_enabled) && !mode.manual_enabled {
        limits.auto
    } else {
        limits.manual
    };
    rates_sp.zip_map(&max, |rate, max| rate.max(-max).min(max))
}

fn sign_no_zero(value: f32) -> f32 {
    if value < 0. {
        -1.
    } else {
        1.
    }
}
