use super::control::{self, ControlStrategy};
use super::{Copter, InputPublishers, Inputs};
use crate::output::{OutputPublisher, OutputTopics};
use crate::params::Parameters;
use crate::sensors::MAX_GYRO_COUNT;

/// Builds a [`Copter`] together with the far ends of its topics.
pub struct Builder {
    params: Parameters,
    gyro_count: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            params: Parameters::default(),
            gyro_count: 1,
        }
    }
}

impl Builder {
    pub fn parameters(mut self, params: Parameters) -> Self {
        self.params = params;
        self
    }

    /// Number of gyro instances, capped to [`MAX_GYRO_COUNT`].
    pub fn gyro_count(mut self, gyro_count: usize) -> Self {
        self.gyro_count = gyro_count.clamp(1, MAX_GYRO_COUNT);
        self
    }

    /// Build with the control law selected by the parameters.
    pub fn build(
        self,
    ) -> (
        Copter<Box<dyn ControlStrategy + Send>>,
        InputPublishers,
        OutputTopics,
    ) {
        let strategy = control::from_parameters(&self.params);
        self.build_with(strategy)
    }

    pub fn build_with<S: ControlStrategy>(
        self,
        strategy: S,
    ) -> (Copter<S>, InputPublishers, OutputTopics) {
        let (publishers, inputs) = Inputs::channel(self.params.clone());
        let (output, outputs) = OutputPublisher::channel();
        let copter = Copter::new(strategy, self.params, self.gyro_count, inputs, output);
        (copter, publishers, outputs)
    }
}
