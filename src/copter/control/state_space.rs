//! Full-state feedback regulator for altitude and attitude.
//!
//! The plant is a double integrator per axis: altitude, roll, pitch and yaw are
//! driven by thrust and the three body torques.

use super::ActuatorDemand;
use crate::messages::LocalPosition;
use crate::params::StateSpaceConfig;
use log::warn;
use nalgebra::{SMatrix, SVector, UnitQuaternion, Vector3};

pub type State = SVector<f32, 8>;
pub type Control = SVector<f32, 4>;
pub type Output = SVector<f32, 4>;

/// Regulator gain, rows are thrust and roll/pitch/yaw torque.
#[rustfmt::skip]
pub const GAIN: [[f32; 8]; 4] = [
    [3.,     0.,      0.,      0.,      4.,  0.,     0.,      0.     ],
    [0.,     1.48,   -0.3884, -0.3751,  0.,  0.5151, -0.0914, -0.065 ],
    [0.,     0.1841,  1.696,  -0.0133,  0.,  0.0709,  0.5454,  0.014 ],
    [0.,     0.9353,  0.6032,  5.4446,  0.,  0.0915,  0.1529,  2.1972],
];

/// Matrices of the linear model and its regulator.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSpaceModel {
    pub a: SMatrix<f32, 8, 8>,
    pub b: SMatrix<f32, 8, 4>,
    pub c: SMatrix<f32, 4, 8>,
    pub k: SMatrix<f32, 4, 8>,
    /// Reference scaling, only the altitude channel is non-zero.
    pub g: SMatrix<f32, 4, 4>,
}

impl StateSpaceModel {
    pub fn new(config: &StateSpaceConfig) -> Self {
        let mut a = SMatrix::<f32, 8, 8>::zeros();
        let mut b = SMatrix::<f32, 8, 4>::zeros();
        let mut c = SMatrix::<f32, 4, 8>::zeros();

        for axis in 0..4 {
            a[(axis, axis + 4)] = 1.;
            c[(axis, axis)] = 1.;
        }

        b[(4, 0)] = 1. / config.mass;
        b[(5, 1)] = 1. / config.inertia.x;
        b[(6, 2)] = 1. / config.inertia.y;
        b[(7, 3)] = 1. / config.inertia.z;

        let k = SMatrix::<f32, 4, 8>::from_fn(|row, col| GAIN[row][col]);

        let mut g = SMatrix::<f32, 4, 4>::zeros();
        g[(0, 0)] = config.reference_scale;

        Self { a, b, c, k, g }
    }
}

/// Measured state fed to the regulator.
#[derive(Clone, Copy, Debug)]
pub struct VehicleState {
    pub attitude: UnitQuaternion<f32>,
    /// Body rates (rad/s).
    pub rates: Vector3<f32>,
    pub position: LocalPosition,
}

impl VehicleState {
    /// `[altitude, roll, pitch, yaw, climb rate, roll rate, pitch rate, yaw rate]`
    ///
    /// Altitude and climb rate are up-positive, the position estimate is NED.
    pub fn to_state(&self) -> State {
        let (roll, pitch, yaw) = self.attitude.euler_angles();
        State::from_column_slice(&[
            -self.position.z,
            roll,
            pitch,
            yaw,
            -self.position.vz,
            self.rates.x,
            self.rates.y,
            self.rates.z,
        ])
    }
}

#[derive(Clone, Debug)]
pub struct StateSpaceController {
    config: StateSpaceConfig,
    /// Built on first activation.
    model: Option<StateSpaceModel>,
    x: State,
    r: Control,
    u: Control,
    y: Output,
    altitude_cmd: f32,
    reference_stale: bool,
}

impl StateSpaceController {
    pub fn new(config: StateSpaceConfig) -> Self {
        Self {
            config: validated(config),
            model: None,
            x: State::zeros(),
            r: Control::zeros(),
            u: Control::zeros(),
            y: Output::zeros(),
            altitude_cmd: 0.,
            reference_stale: true,
        }
    }

    /// Replace the configuration. The model is rebuilt on the next update.
    pub fn configure(&mut self, config: StateSpaceConfig) {
        let config = validated(config);
        if config != self.config {
            self.config = config;
            self.model = None;
            self.reference_stale = true;
        }
    }

    pub fn model(&self) -> Option<&StateSpaceModel> {
        self.model.as_ref()
    }

    pub fn altitude_cmd(&self) -> f32 {
        self.altitude_cmd
    }

    pub fn set_altitude_cmd(&mut self, altitude: f32) {
        if altitude != self.altitude_cmd {
            self.altitude_cmd = altitude;
            self.reference_stale = true;
        }
    }

    pub fn reference(&self) -> Control {
        self.r
    }

    /// Control demand of the last update (N and N m).
    pub fn demand(&self) -> Control {
        self.u
    }

    /// Observed output of the last update.
    pub fn output(&self) -> Output {
        self.y
    }

    pub fn state(&self) -> State {
        self.x
    }

    /// Run the regulator on the measured state and integrate the model by `dt`.
    pub fn update(&mut self, measured: &VehicleState, dt: f32) -> Control {
        let model = self
            .model
            .get_or_insert_with(|| StateSpaceModel::new(&self.config));

        if self.reference_stale {
            self.r = model.g * Control::new(self.altitude_cmd, 0., 0., 0.);
            self.reference_stale = false;
        }

        self.x = measured.to_state();
        self.u = self.r - model.k * self.x;

        let x_dot = model.a * self.x + model.b * self.u;
        self.x += x_dot * dt;
        self.y = model.c * self.x;

        self.u
    }

    /// Normalize the last demand against the calibrated maxima.
    ///
    /// Thrust is offset by the hover thrust since the regulator works around it.
    pub fn normalized(&self) -> ActuatorDemand {
        let thrust = (self.u[0] + self.config.mass * self.config.gravity) / self.config.max_thrust;
        let torque = Vector3::new(self.u[1], self.u[2], self.u[3])
            .component_div(&self.config.max_torque);

        ActuatorDemand {
            torque: if self.config.attitude_channels {
                torque
            } else {
                Vector3::zeros()
            },
            thrust,
        }
    }
}

fn validated(mut config: StateSpaceConfig) -> StateSpaceConfig {
    if !(config.max_thrust > 0.) {
        warn!(
            "non-positive max thrust {}, using {}",
            config.max_thrust,
            StateSpaceConfig::MAX_THRUST
        );
        config.max_thrust = StateSpaceConfig::MAX_THRUST;
    }

    for axis in 0..3 {
        if !(config.max_torque[axis] > 0.) {
            warn!(
                "non-positive max torque {} on axis {}, using {}",
                config.max_torque[axis],
                axis,
                StateSpaceConfig::MAX_TORQUE
            );
            config.max_torque[axis] = StateSpaceConfig::MAX_TORQUE;
        }
    }

    if !(config.mass > 0. && config.mass.is_finite()) {
        warn!("invalid mass {}, using {}", config.mass, StateSpaceConfig::MASS);
        config.mass = StateSpaceConfig::MASS;
    }

    for axis in 0..3 {
        if !(config.inertia[axis] > 0. && config.inertia[axis].is_finite()) {
            warn!(
                "invalid inertia {} on axis {}, using {}",
                config.inertia[axis],
                axis,
                StateSpaceConfig::INERTIA[axis]
            );
            config.inertia[axis] = StateSpaceConfig::INERTIA[axis];
        }
    }

    if !(config.gravity > 0. && config.gravity.is_finite()) {
        warn!("invalid gravity {}, using {}", config.gravity, StateSpaceConfig::GRAVITY);
        config.gravity = StateSpaceConfig::GRAVITY;
    }

    config
}
