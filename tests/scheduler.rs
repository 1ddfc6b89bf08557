use copter_attitude::copter::Builder;
use copter_attitude::messages::{ControlMode, GyroSample};
use copter_attitude::topic;
use copter_attitude::{Error, Scheduler};
use embedded_time::{clock, fraction::Fraction, Clock, Instant};
use nalgebra::Vector3;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use std_embedded_time::StandardClock;
use tokio::sync::watch;
use tokio::time::timeout;

/// A microsecond clock advanced by hand.
#[derive(Clone, Debug, Default)]
struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    fn advance(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    type T = u64;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
        Ok(Instant::new(self.now_us.load(Ordering::SeqCst)))
    }
}

fn rate_mode() -> ControlMode {
    ControlMode {
        armed: true,
        rates_enabled: true,
        ..Default::default()
    }
}

#[test]
fn scheduler_requires_a_gyro() {
    let (copter, _inputs, _outputs) = Builder::default().build();
    let (_stop_tx, stop) = watch::channel(false);

    let result = Scheduler::new(ManualClock::default(), copter, Vec::new(), stop);
    assert!(matches!(result, Err(Error::NoGyro)));
}

#[tokio::test]
async fn runs_one_cycle_per_gyro_sample() {
    let clock = ManualClock::default();
    let (copter, inputs, mut outputs) = Builder::default().build();
    let (gyro_tx, gyro) = topic::channel("sensor_gyro", GyroSample::default());
    let (stop_tx, stop) = watch::channel(false);

    let mut scheduler = Scheduler::new(clock.clone(), copter, vec![gyro], stop).unwrap();

    let driver = async {
        inputs.control_mode.publish(rate_mode());

        // The first cycles only pick up the mode
        loop {
            clock.advance(4_000);
            gyro_tx.publish(GyroSample {
                timestamp: 0,
                rates: Vector3::new(0.1, 0., 0.),
            });
            if timeout(Duration::from_millis(20), outputs.status.changed())
                .await
                .is_ok()
            {
                break;
            }
        }
        // Published together with that status
        outputs.actuators.poll();

        for _ in 0..5 {
            clock.advance(4_000);
            gyro_tx.publish(GyroSample {
                timestamp: 0,
                rates: Vector3::new(0.1, 0., 0.),
            });
            let actuators = timeout(Duration::from_secs(1), outputs.actuators.changed())
                .await
                .unwrap()
                .unwrap();
            // Damping a positive roll rate
            assert!(actuators.control[0] < 0.);
        }

        stop_tx.send_replace(true);
    };

    let (result, ()) = tokio::join!(scheduler.run(), driver);
    result.unwrap();
    assert!(scheduler.cycles() >= 6);
    assert!(scheduler.copter().is_armed());
}

#[tokio::test]
async fn closed_gyro_topic_does_not_end_the_loop() {
    let (copter, _inputs, _outputs) = Builder::default().build();
    let (gyro_tx, gyro) = topic::channel("sensor_gyro", GyroSample::default());
    let (stop_tx, stop) = watch::channel(false);
    drop(gyro_tx);

    let mut scheduler = Scheduler::new(StandardClock::default(), copter, vec![gyro], stop).unwrap();

    let driver = async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        stop_tx.send_replace(true);
    };

    let (result, ()) = tokio::join!(scheduler.run(), driver);
    result.unwrap();
    assert_eq!(scheduler.cycles(), 0);
}

#[tokio::test]
async fn stops_on_request_without_samples() {
    let (copter, _inputs, _outputs) = Builder::default().build();
    let (_gyro_tx, gyro) = topic::channel("sensor_gyro", GyroSample::default());
    let (stop_tx, stop) = watch::channel(false);

    let mut scheduler = Scheduler::new(StandardClock::default(), copter, vec![gyro], stop).unwrap();
    stop_tx.send_replace(true);

    timeout(Duration::from_secs(1), scheduler.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scheduler.cycles(), 0);
}
