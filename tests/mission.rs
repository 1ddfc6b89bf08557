use approx::assert_relative_eq;
use copter_attitude::copter::Builder;
use copter_attitude::messages::{ControlMode, GyroSample, LocalPosition, RateSetpoint};
use copter_attitude::params::{ControlLaw, Parameters};
use nalgebra::Vector3;

fn full_state() -> Parameters {
    Parameters {
        control_law: ControlLaw::FullState,
        ..Default::default()
    }
}

fn armed(armed: bool) -> ControlMode {
    ControlMode {
        armed,
        rates_enabled: true,
        ..Default::default()
    }
}

fn sample(now_us: u64) -> GyroSample {
    GyroSample {
        timestamp: now_us,
        rates: Vector3::zeros(),
    }
}

#[test]
fn mission_climbs_after_standing_still() {
    let (mut copter, inputs, _outputs) = Builder::default().parameters(full_state()).build();
    inputs.control_mode.publish(armed(true));
    inputs.local_position.publish(LocalPosition::default());

    // Picks up the mode
    assert!(copter.cycle(&sample(0), 0.004, 0).is_none());

    // Mission clock starts here: standing still
    let control = copter.cycle(&sample(1_000_000), 0.004, 1_000_000).unwrap();
    assert_eq!(control.control[..4], [0.; 4]);

    // 6 s in: holding 1 m while still on the ground
    let control = copter.cycle(&sample(7_000_000), 0.004, 7_000_000).unwrap();
    let hover = 1.5 * 9.81 / 30.;
    assert!(control.control[3] > hover);
    assert!(control.control[3] <= 1.);

    inputs.control_mode.publish(armed(false));
    copter.cycle(&sample(7_004_000), 0.004, 7_004_000);
    let control = copter.cycle(&sample(7_008_000), 0.004, 7_008_000).unwrap();
    assert_eq!(control.control[..4], [0.; 4]);
}

#[test]
fn hover_at_commanded_altitude() {
    let (mut copter, inputs, _outputs) = Builder::default().parameters(full_state()).build();
    inputs.control_mode.publish(armed(true));
    inputs.local_position.publish(LocalPosition {
        z: -1.,
        ..Default::default()
    });

    copter.cycle(&sample(0), 0.004, 0);
    copter.cycle(&sample(4_000), 0.004, 4_000);
    let control = copter.cycle(&sample(6_004_000), 0.004, 6_004_000).unwrap();

    assert_relative_eq!(control.control[3], 1.5 * 9.81 / 30., epsilon = 1e-4);
    assert_relative_eq!(control.control[0], 0., epsilon = 1e-5);
}

#[test]
fn external_setpoints_do_not_steer_the_regulator() {
    let (mut copter, inputs, mut outputs) = Builder::default().parameters(full_state()).build();
    inputs.control_mode.publish(armed(true));
    inputs.rates_setpoint.publish(RateSetpoint {
        roll: 3.,
        thrust_body: Vector3::new(0., 0., -0.9),
        ..Default::default()
    });

    copter.cycle(&sample(0), 0.004, 0);
    let control = copter.cycle(&sample(4_000), 0.004, 4_000).unwrap();
    assert_eq!(control.control[..4], [0.; 4]);
    assert!(outputs.rates_setpoint.poll().is_none());
}
