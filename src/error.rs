use embedded_time::{clock, ConversionError};
use thiserror::Error;

/// Errors raised around the control loop.
///
/// None of these stop a running loop: the scheduler logs them and degrades to
/// skipping the affected cycle.
#[derive(Debug, Error)]
pub enum Error {
    #[error("clock error: {0:?}")]
    Clock(clock::Error),

    #[error("time conversion error: {0:?}")]
    Time(ConversionError),

    /// The publisher side of a topic was dropped.
    #[error("topic `{topic}` has no publisher")]
    TopicClosed { topic: &'static str },

    #[error("at least one gyro topic is required")]
    NoGyro,
}

impl From<clock::Error> for Error {
    fn from(clock_error: clock::Error) -> Self {
        Error::Clock(clock_error)
    }
}

impl From<ConversionError> for Error {
    fn from(time_error: ConversionError) -> Self {
        Error::Time(time_error)
    }
}
