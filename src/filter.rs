use nalgebra::Vector3;
use num_traits::{Float, FloatConst};

/// Second order Butterworth low pass filter.
///
/// The filter is disabled (passes samples through) while the cutoff is not positive
/// or not below the Nyquist frequency.
#[derive(Clone, Copy, Debug)]
pub struct LowPassFilter2p<T> {
    cutoff_freq: T,
    sample_freq: T,
    a1: T,
    a2: T,
    b0: T,
    b1: T,
    b2: T,
    delay_element_1: T,
    delay_element_2: T,
}

impl<T: Float + FloatConst> LowPassFilter2p<T> {
    pub fn new(sample_freq: T, cutoff_freq: T) -> Self {
        let mut filter = Self {
            cutoff_freq,
            sample_freq,
            a1: T::zero(),
            a2: T::zero(),
            b0: T::one(),
            b1: T::zero(),
            b2: T::zero(),
            delay_element_1: T::zero(),
            delay_element_2: T::zero(),
        };
        filter.set_cutoff_frequency(sample_freq, cutoff_freq);
        filter
    }

    /// Recompute the coefficients. The delay elements are kept.
    pub fn set_cutoff_frequency(&mut self, sample_freq: T, cutoff_freq: T) {
        self.sample_freq = sample_freq;
        self.cutoff_freq = cutoff_freq.max(T::zero());

        let two = T::one() + T::one();
        if self.cutoff_freq <= T::zero() || self.cutoff_freq >= sample_freq / two {
            self.disable();
            return;
        }

        let fr = sample_freq / self.cutoff_freq;
        let ohm = (T::PI() / fr).tan();
        let cos_pi_4 = (T::PI() / (two + two)).cos();
        let c = T::one() + two * cos_pi_4 * ohm + ohm * ohm;

        self.b0 = ohm * ohm / c;
        self.b1 = two * self.b0;
        self.b2 = self.b0;
        self.a1 = two * (ohm * ohm - T::one()) / c;
        self.a2 = (T::one() - two * cos_pi_4 * ohm + ohm * ohm) / c;
    }

    pub fn apply(&mut self, sample: T) -> T {
        let mut delay_element_0 =
            sample - self.delay_element_1 * self.a1 - self.delay_element_2 * self.a2;

        // Restart from the input instead of latching a non-finite state.
        if !delay_element_0.is_finite() {
            delay_element_0 = sample;
        }

        let output = delay_element_0 * self.b0
            + self.delay_element_1 * self.b1
            + self.delay_element_2 * self.b2;

        self.delay_element_2 = self.delay_element_1;
        self.delay_element_1 = delay_element_0;

        output
    }

    /// Settle the filter so a constant `sample` passes unchanged.
    pub fn reset(&mut self, sample: T) -> T {
        let gain = self.b0 + self.b1 + self.b2;
        let dval = if gain.is_finite() && gain != T::zero() {
            sample / gain
        } else {
            sample
        };
        self.delay_element_1 = dval;
        self.delay_element_2 = dval;
        self.apply(sample)
    }

    pub fn cutoff_freq(&self) -> T {
        self.cutoff_freq
    }

    pub fn sample_freq(&self) -> T {
        self.sample_freq
    }

    fn disable(&mut self) {
        self.b0 = T::one();
        self.b1 = T::zero();
        self.b2 = T::zero();
        self.a1 = T::zero();
        self.a2 = T::zero();
    }
}

/// Independent [`LowPassFilter2p`] per axis of a 3D vector.
#[derive(Clone, Copy, Debug)]
pub struct LowPassFilter2pVector3 {
    axes: [LowPassFilter2p<f32>; 3],
}

impl LowPassFilter2pVector3 {
    pub fn new(sample_freq: f32, cutoff_freq: f32) -> Self {
        Self {
            axes: [LowPassFilter2p::new(sample_freq, cutoff_freq); 3],
        }
    }

    pub fn set_cutoff_frequency(&mut self, sample_freq: f32, cutoff_freq: f32) {
        for axis in &mut self.axes {
            axis.set_cutoff_frequency(sample_freq, cutoff_freq);
        }
    }

    pub fn apply(&mut self, sample: Vector3<f32>) -> Vector3<f32> {
        Vector3::new(
            self.axes[0].apply(sample.x),
            self.axes[1].apply(sample.y),
            self.axes[2].apply(sample.z),
        )
    }

    pub fn reset(&mut self, sample: Vector3<f32>) -> Vector3<f32> {
        Vector3::new(
            self.axes[0].reset(sample.x),
            self.axes[1].reset(sample.y),
            self.axes[2].reset(sample.z),
        )
    }

    pub fn cutoff_freq(&self) -> f32 {
        self.axes[0].cutoff_freq()
    }
}
