//! Actuator vector assembly and the loop's published messages.

use crate::copter::control::ActuatorDemand;
use crate::messages::{
    ActuatorControls, ActuatorGroup, AttitudeSetpoint, GearState, LandingGear,
    RateControllerStatus, RateSetpoint, VehicleStatus,
};
use crate::params::Parameters;
use crate::topic::{self, Publisher, Topic};
use log::{info, warn};

/// Subscriptions to everything an [`OutputPublisher`] publishes.
#[derive(Debug)]
pub struct OutputTopics {
    pub actuators: Topic<ActuatorControls>,
    pub rates_setpoint: Topic<RateSetpoint>,
    pub status: Topic<RateControllerStatus>,
    pub attitude_setpoint: Topic<AttitudeSetpoint>,
    pub landing_gear: Topic<LandingGear>,
}

#[derive(Debug)]
pub struct OutputPublisher {
    actuators: Publisher<ActuatorControls>,
    rates_setpoint: Publisher<RateSetpoint>,
    status: Publisher<RateControllerStatus>,
    attitude_setpoint: Publisher<AttitudeSetpoint>,
    landing_gear: Publisher<LandingGear>,
    /// Fixed by the first vehicle status.
    group: Option<ActuatorGroup>,
    pub battery_scale_enabled: bool,
    pub circuit_breaker_engaged: bool,
}

impl OutputPublisher {
    pub fn channel() -> (Self, OutputTopics) {
        let (actuators, actuators_rx) = topic::channel("actuator_controls", Default::default());
        let (rates_setpoint, rates_setpoint_rx) =
            topic::channel("vehicle_rates_setpoint", Default::default());
        let (status, status_rx) = topic::channel("rate_ctrl_status", Default::default());
        let (attitude_setpoint, attitude_setpoint_rx) =
            topic::channel("vehicle_attitude_setpoint", Default::default());
        let (landing_gear, landing_gear_rx) = topic::channel("landing_gear", Default::default());

        let publisher = Self {
            actuators,
            rates_setpoint,
            status,
            attitude_setpoint,
            landing_gear,
            group: None,
            battery_scale_enabled: false,
            circuit_breaker_engaged: false,
        };
        let topics = OutputTopics {
            actuators: actuators_rx,
            rates_setpoint: rates_setpoint_rx,
            status: status_rx,
            attitude_setpoint: attitude_setpoint_rx,
            landing_gear: landing_gear_rx,
        };
        (publisher, topics)
    }

    pub fn configure(&mut self, params: &Parameters) {
        self.battery_scale_enabled = params.battery_scale_enabled;

        let engaged = params.is_circuit_breaker_engaged();
        if engaged && !self.circuit_breaker_engaged {
            warn!("rate control circuit breaker engaged, actuator output disabled");
        }
        self.circuit_breaker_engaged = engaged;
    }

    /// Route actuator output by vehicle type. Only the first status counts.
    pub fn set_vehicle_status(&mut self, status: &VehicleStatus) {
        if self.group.is_none() {
            let group = if status.is_vtol {
                ActuatorGroup::VirtualMultirotor
            } else {
                ActuatorGroup::Primary
            };
            info!("actuator group {:?}", group);
            self.group = Some(group);
        }
    }

    pub fn group(&self) -> ActuatorGroup {
        self.group.unwrap_or_default()
    }

    /// Build the actuator vector. Non-finite channels are zeroed.
    pub fn actuator_controls(
        &self,
        demand: &ActuatorDemand,
        gear: GearState,
        battery_scale: f32,
    ) -> ActuatorControls {
        let mut actuators = ActuatorControls {
            group: self.group(),
            ..Default::default()
        };

        let channels = [demand.torque.x, demand.torque.y, demand.torque.z, demand.thrust];
        for (control, value) in actuators.control.iter_mut().zip(channels) {
            *control = if value.is_finite() { value } else { 0. };
        }
        actuators.control[ActuatorControls::INDEX_LANDING_GEAR] = gear.actuator_value();

        if self.battery_scale_enabled && battery_scale > 0. {
            for control in &mut actuators.control[..4] {
                *control *= battery_scale;
            }
        }

        actuators
    }

    /// Publish the actuator vector unless the circuit breaker is engaged.
    pub fn publish_actuators(
        &self,
        demand: &ActuatorDemand,
        gear: GearState,
        battery_scale: f32,
        timestamp: u64,
        timestamp_sample: u64,
    ) -> Option<ActuatorControls> {
        if self.circuit_breaker_engaged {
            return None;
        }

        let mut actuators = self.actuator_controls(demand, gear, battery_scale);
        actuators.timestamp = timestamp;
        actuators.timestamp_sample = timestamp_sample;
        self.actuators.publish(actuators);
        Some(actuators)
    }

    pub fn publish_rates_setpoint(&self, mut setpoint: RateSetpoint, timestamp: u64) {
        setpoint.timestamp = timestamp;
        self.rates_setpoint.publish(setpoint);
    }

    pub fn publish_status(&self, mut status: RateControllerStatus, timestamp: u64) {
        status.timestamp = timestamp;
        self.status.publish(status);
    }

    pub fn publish_attitude_setpoint(&self, mut setpoint: AttitudeSetpoint, timestamp: u64) {
        setpoint.timestamp = timestamp;
        self.attitude_setpoint.publish(setpoint);
    }

    pub fn publish_landing_gear(&self, state: GearState, timestamp: u64) {
        self.landing_gear.publish(LandingGear { timestamp, state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn demand(torque: Vector3<f32>, thrust: f32) -> ActuatorDemand {
        ActuatorDemand { torque, thrust }
    }

    #[test]
    fn non_finite_channels_are_zeroed() {
        let (publisher, _topics) = OutputPublisher::channel();
        let actuators = publisher.actuator_controls(
            &demand(Vector3::new(f32::NAN, 0.2, f32::INFINITY), f32::NEG_INFINITY),
            GearState::Down,
            1.,
        );
        assert_eq!(actuators.control[..4], [0., 0.2, 0., 0.]);
        assert_eq!(actuators.control[7], -1.);
    }

    #[test]
    fn battery_scale_applies_to_primary_channels() {
        let (mut publisher, _topics) = OutputPublisher::channel();
        let input = demand(Vector3::new(0.1, 0.2, 0.3), 0.5);

        let unscaled = publisher.actuator_controls(&input, GearState::Up, 1.2);
        assert_eq!(unscaled.control[3], 0.5);

        publisher.battery_scale_enabled = true;
        let scaled = publisher.actuator_controls(&input, GearState::Up, 2.);
        assert_eq!(scaled.control[..4], [0.2, 0.4, 0.6, 1.]);
        assert_eq!(scaled.control[7], 1.);

        // Unknown scale
        let scaled = publisher.actuator_controls(&input, GearState::Up, -1.);
        assert_eq!(scaled.control[3], 0.5);
    }

    #[test]
    fn circuit_breaker_blocks_publication() {
        let (mut publisher, mut topics) = OutputPublisher::channel();
        let mut params = Parameters::default();
        params.circuit_breaker_rate_ctrl = crate::params::CIRCUIT_BREAKER_RATE_CTRL_KEY;
        publisher.configure(&params);

        let published = publisher.publish_actuators(&demand(Vector3::zeros(), 0.5), GearState::Down, 1., 1, 1);
        assert!(published.is_none());
        assert!(topics.actuators.poll().is_none());
    }

    #[test]
    fn group_is_fixed_by_first_status() {
        let (mut publisher, _topics) = OutputPublisher::channel();
        publisher.set_vehicle_status(&VehicleStatus {
            is_vtol: true,
            is_rotary_wing: true,
        });
        publisher.set_vehicle_status(&VehicleStatus::default());
        assert_eq!(publisher.group(), ActuatorGroup::VirtualMultirotor);
    }
}
