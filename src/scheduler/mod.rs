//! The gyro-driven control loop.
//!
//! ```ignore
//! let (copter, inputs, outputs) = Builder::default().build();
//! let (stop_tx, stop) = tokio::sync::watch::channel(false);
//!
//! let mut scheduler = Scheduler::new(StandardClock::default(), copter, vec![gyro], stop)?;
//! scheduler.run().await?;
//! ```

use crate::copter::{ControlStrategy, Copter};
use crate::messages::GyroSample;
use crate::topic::Topic;
use crate::Error;
use core::time::Duration;
use embedded_time::{
    duration::{Generic, Microseconds},
    Clock, ConversionError,
};
use log::{error, info, warn};
use tokio::sync::watch;

mod timing;
pub use timing::{LoopTiming, DT_MAX, DT_MIN, LOOP_RATE_WINDOW_US};

/// Longest wait for a gyro sample before checking for a stop request.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Runs one control cycle of a [`Copter`] per sample of the selected gyro.
pub struct Scheduler<C, S> {
    clock: C,
    copter: Copter<S>,
    gyros: Vec<Topic<GyroSample>>,
    /// Gyro topic the loop currently waits on.
    selected: usize,
    stop: watch::Receiver<bool>,
    cycles: u64,
}

impl<C, S> Scheduler<C, S>
where
    C: Clock,
    S: ControlStrategy,
    Microseconds<u64>: TryFrom<Generic<C::T>, Error = ConversionError>,
{
    /// Create a scheduler over one topic per gyro instance.
    ///
    /// The loop stops once `stop` reads true.
    pub fn new(
        clock: C,
        copter: Copter<S>,
        gyros: Vec<Topic<GyroSample>>,
        stop: watch::Receiver<bool>,
    ) -> Result<Self, Error> {
        if gyros.is_empty() {
            return Err(Error::NoGyro);
        }

        let selected = copter.selected_gyro().min(gyros.len() - 1);
        Ok(Self {
            clock,
            copter,
            gyros,
            selected,
            stop,
            cycles: 0,
        })
    }

    pub fn copter(&self) -> &Copter<S> {
        &self.copter
    }

    pub fn copter_mut(&mut self) -> &mut Copter<S> {
        &mut self.copter
    }

    pub fn into_copter(self) -> Copter<S> {
        self.copter
    }

    /// Number of completed control cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run until stopped.
    ///
    /// Only a failure to read the clock at task start is returned. Afterwards
    /// errors are logged and the affected cycle is skipped.
    pub async fn run(&mut self) -> Result<(), Error> {
        let mut timing = LoopTiming::new(self.micros_since_epoch()?);

        while !*self.stop.borrow() {
            let selected = self.select_gyro();
            let gyro = &mut self.gyros[selected];

            let sample = match tokio::time::timeout(POLL_TIMEOUT, gyro.changed()).await {
                Ok(Ok(sample)) => sample,
                Ok(Err(poll_error)) => {
                    error!("poll error: {}", poll_error);
                    tokio::time::sleep(POLL_TIMEOUT).await;
                    continue;
                }
                // Timed out, check for stop
                Err(_) => continue,
            };

            let now_us = match self.micros_since_epoch() {
                Ok(now_us) => now_us,
                Err(clock_error) => {
                    warn!("skipping cycle: {}", clock_error);
                    continue;
                }
            };
            let dt = timing.dt(now_us);

            self.copter.cycle(&sample, dt, now_us);

            if let Some(loop_rate_hz) = timing.update_loop_rate(dt, self.copter.is_armed(), now_us)
            {
                self.copter.set_loop_rate(loop_rate_hz);
            }

            self.copter.poll_parameters();
            self.cycles += 1;
        }

        Ok(())
    }

    /// Follow the copter's gyro selection.
    ///
    /// A newly selected topic starts from its next sample, never from one
    /// stored before the switch.
    fn select_gyro(&mut self) -> usize {
        let selected = self.copter.selected_gyro().min(self.gyros.len() - 1);
        if selected != self.selected {
            info!(
                "waiting on {} instance {} instead of {}",
                self.gyros[selected].name(),
                selected,
                self.selected
            );
            self.gyros[selected].mark_seen();
            self.selected = selected;
        }
        selected
    }

    fn micros_since_epoch(&self) -> Result<u64, Error> {
        let instant = self.clock.try_now()?;
        let micros = Microseconds::<u64>::try_from(instant.duration_since_epoch())?;
        Ok(micros.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copter::Builder;
    use crate::messages::SensorCorrection;
    use crate::topic;
    use std_embedded_time::StandardClock;

    #[test]
    fn switched_gyro_skips_stored_sample() {
        let (copter, inputs, _outputs) = Builder::default().gyro_count(2).build();
        let (_gyro0_tx, gyro0) = topic::channel("sensor_gyro", GyroSample::default());
        let (gyro1_tx, gyro1) = topic::channel("sensor_gyro", GyroSample::default());
        let (_stop_tx, stop) = watch::channel(false);

        let mut scheduler =
            Scheduler::new(StandardClock::default(), copter, vec![gyro0, gyro1], stop).unwrap();
        assert_eq!(scheduler.select_gyro(), 0);

        // Published long before the switch
        gyro1_tx.publish(GyroSample {
            timestamp: 1,
            ..Default::default()
        });
        inputs.sensor_correction.publish(SensorCorrection {
            selected_gyro_instance: 1,
            ..Default::default()
        });
        scheduler
            .copter_mut()
            .cycle(&GyroSample::default(), 0.004, 4_000);

        assert_eq!(scheduler.select_gyro(), 1);
        assert!(scheduler.gyros[1].poll().is_none());

        gyro1_tx.publish(GyroSample {
            timestamp: 2,
            ..Default::default()
        });
        assert_eq!(scheduler.gyros[1].poll().map(|sample| sample.timestamp), Some(2));
    }
}
