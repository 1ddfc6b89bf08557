use crate::filter::LowPassFilter2pVector3;
use crate::messages::{LandDetected, SaturationStatus};
use crate::params::{Parameters, Tpa};
use nalgebra::Vector3;

/// Lowest gain factor throttle attenuation can reach.
pub const TPA_LOWER_LIMIT: f32 = 0.05;

/// Initial loop rate (Hz) assumed before one is measured.
pub const DEFAULT_LOOP_RATE_HZ: f32 = 250.;

/// Per-axis gain factors from throttle PID attenuation.
///
/// Roll and pitch are attenuated above `tpa.breakpoint`, yaw never is.
pub fn pid_attenuations(tpa: Tpa, thrust: f32) -> Vector3<f32> {
    let factor = if tpa.breakpoint < 1. {
        1. - tpa.rate * (thrust.abs() - tpa.breakpoint) / (1. - tpa.breakpoint)
    } else {
        1.
    };
    let factor = factor.min(1.).max(TPA_LOWER_LIMIT);

    Vector3::new(factor, factor, 1.)
}

/// Inputs of one rate controller step.
#[derive(Clone, Copy, Debug)]
pub struct RateInput {
    /// Corrected body rates (rad/s).
    pub rates: Vector3<f32>,
    /// Rate setpoint (rad/s).
    pub rates_sp: Vector3<f32>,
    /// Normalized thrust setpoint.
    pub thrust: f32,
    pub saturation: SaturationStatus,
    pub land: LandDetected,
}

/// PID plus feed forward on the body rate error.
#[derive(Clone, Debug)]
pub struct RateController {
    pub p: Vector3<f32>,
    pub i: Vector3<f32>,
    pub d: Vector3<f32>,
    pub ff: Vector3<f32>,
    pub integrator_limit: Vector3<f32>,
    pub tpa_p: Tpa,
    pub tpa_i: Tpa,
    pub tpa_d: Tpa,

    integrator: Vector3<f32>,
    rates_prev: Vector3<f32>,
    rates_prev_filtered: Vector3<f32>,
    d_filter: LowPassFilter2pVector3,
    d_cutoff: f32,
    loop_rate_hz: f32,
}

impl Default for RateController {
    fn default() -> Self {
        Self::new(&Parameters::default())
    }
}

impl RateController {
    pub fn new(params: &Parameters) -> Self {
        let mut controller = Self {
            p: Vector3::zeros(),
            i: Vector3::zeros(),
            d: Vector3::zeros(),
            ff: Vector3::zeros(),
            integrator_limit: Vector3::zeros(),
            tpa_p: Tpa::default(),
            tpa_i: Tpa::default(),
            tpa_d: Tpa::default(),
            integrator: Vector3::zeros(),
            rates_prev: Vector3::zeros(),
            rates_prev_filtered: Vector3::zeros(),
            d_filter: LowPassFilter2pVector3::new(DEFAULT_LOOP_RATE_HZ, params.d_term_cutoff),
            d_cutoff: params.d_term_cutoff,
            loop_rate_hz: DEFAULT_LOOP_RATE_HZ,
        };
        controller.configure(params);
        controller
    }

    /// Load gains and retune the derivative filter if its cutoff moved.
    pub fn configure(&mut self, params: &Parameters) {
        self.p = params.rate_p();
        self.i = params.rate_i();
        self.d = params.rate_d();
        self.ff = params.rate_ff();
        self.integrator_limit = params.integrator_limit();
        self.tpa_p = params.tpa_p;
        self.tpa_i = params.tpa_i;
        self.tpa_d = params.tpa_d;

        if (self.d_cutoff - params.d_term_cutoff).abs() > 0.01 {
            self.d_cutoff = params.d_term_cutoff;
            self.d_filter
                .set_cutoff_frequency(self.loop_rate_hz, self.d_cutoff);
            self.d_filter.reset(self.rates_prev);
        }
    }

    /// Retune the derivative filter for a newly measured loop rate.
    pub fn set_loop_rate(&mut self, loop_rate_hz: f32) {
        self.loop_rate_hz = loop_rate_hz;
        self.d_filter
            .set_cutoff_frequency(self.loop_rate_hz, self.d_cutoff);
    }

    pub fn loop_rate_hz(&self) -> f32 {
        self.loop_rate_hz
    }

    pub fn integrator(&self) -> Vector3<f32> {
        self.integrator
    }

    /// Unfiltered rates of the last update.
    pub fn rates_prev(&self) -> Vector3<f32> {
        self.rates_prev
    }

    pub fn reset_integrator(&mut self) {
        self.integrator = Vector3::zeros();
    }

    /// Run one step and return the normalized torque demand.
    pub fn update(&mut self, input: &RateInput, dt: f32) -> Vector3<f32> {
        let p = self.p.component_mul(&pid_attenuations(self.tpa_p, input.thrust));
        let i = self.i.component_mul(&pid_attenuations(self.tpa_i, input.thrust));
        let d = self.d.component_mul(&pid_attenuations(self.tpa_d, input.thrust));

        let mut rates_err = input.rates_sp - input.rates;

        // The filtered rates only feed the derivative
        let rates_filtered = self.d_filter.apply(input.rates);

        let torque = p.component_mul(&rates_err) + self.integrator
            - d.component_mul(&(rates_filtered - self.rates_prev_filtered)) / dt
            + self.ff.component_mul(&input.rates_sp);

        self.rates_prev = input.rates;
        self.rates_prev_filtered = rates_filtered;

        if !input.land.landed && !input.land.maybe_landed {
            let positive = input.saturation.positive();
            let negative = input.saturation.negative();

            for axis in 0..3 {
                if positive[axis] {
                    rates_err[axis] = rates_err[axis].min(0.);
                }
                if negative[axis] {
                    rates_err[axis] = rates_err[axis].max(0.);
                }

                let limit = self.integrator_limit[axis];
                let rate_i = self.integrator[axis] + i[axis] * rates_err[axis] * dt;

                // A step that leaves the valid range is dropped, not clamped.
                if rate_i.is_finite() && rate_i > -limit && rate_i < limit {
                    self.integrator[axis] = rate_i;
                }
            }
        }

        for axis in 0..3 {
            let limit = self.integrator_limit[axis];
            self.integrator[axis] = self.integrator[axis].max(-limit).min(limit);
        }

        torque
    }
}
