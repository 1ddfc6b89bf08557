//! # copter-attitude
//! Multicopter attitude and rate control driven by gyro samples.
//!
//! # Control loop
//! [`Scheduler`] waits on the selected gyro and runs one [`Copter`] cycle per sample:
//! sensor correction, the rate loop, input polling, setpoint selection and output.
//!
//! # Control laws
//! [`CascadedControl`](copter::control::CascadedControl) runs a quaternion attitude
//! controller into a PID rate controller with throttle PID attenuation and anti-windup.
//!
//! [`FullStateControl`](copter::control::FullStateControl) runs a state-space
//! altitude and attitude regulator on a scripted altitude mission.
//!
//! Both implement [`ControlStrategy`](copter::ControlStrategy) and are selected by
//! [`Parameters::control_law`].
//!
//! ```
//! use copter_attitude::copter::Builder;
//! use copter_attitude::messages::{ControlMode, GyroSample};
//!
//! let (mut copter, inputs, _outputs) = Builder::default().build();
//! inputs.control_mode.publish(ControlMode {
//!     armed: true,
//!     rates_enabled: true,
//!     ..Default::default()
//! });
//!
//! // Modes are read after the rate loop, so the first cycle publishes nothing
//! assert!(copter.cycle(&GyroSample::default(), 0.004, 4_000).is_none());
//! assert!(copter.cycle(&GyroSample::default(), 0.004, 8_000).is_some());
//! ```

pub mod copter;
pub use copter::{Builder, Copter};

mod error;
pub use error::Error;

pub mod filter;

pub mod messages;

pub mod output;
pub use output::OutputPublisher;

pub mod params;
pub use params::Parameters;

pub mod scheduler;
pub use scheduler::Scheduler;

pub mod sensors;

pub mod topic;
pub use topic::{Publisher, Topic};
