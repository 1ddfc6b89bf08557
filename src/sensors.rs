//! Gyro instance selection and correction into the body frame.

use crate::messages::{SensorBias, SensorCorrection};
use log::info;
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Maximum number of gyro instances the pipeline can select from.
pub const MAX_GYRO_COUNT: usize = 3;

/// Mounting orientation of the sensor board relative to the vehicle body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorRotation {
    #[default]
    None,
    Yaw45,
    Yaw90,
    Yaw135,
    Yaw180,
    Yaw225,
    Yaw270,
    Yaw315,
    Roll180,
    Roll180Yaw45,
    Roll180Yaw90,
    Roll180Yaw135,
    Pitch180,
    Roll180Yaw225,
    Roll180Yaw270,
    Roll180Yaw315,
    Roll90,
    Roll90Yaw45,
    Roll90Yaw90,
    Roll90Yaw135,
    Roll270,
    Roll270Yaw45,
    Roll270Yaw90,
    Roll270Yaw135,
    Pitch90,
    Pitch270,
    Pitch180Yaw90,
    Pitch180Yaw270,
    Roll90Pitch90,
    Roll180Pitch90,
    Roll270Pitch90,
    Roll90Pitch180,
    Roll270Pitch180,
    Roll90Pitch270,
    Roll180Pitch270,
    Roll270Pitch270,
    Roll90Pitch180Yaw90,
    Roll90Yaw270,
}

impl SensorRotation {
    /// Roll, pitch and yaw of this orientation in degrees.
    pub fn euler_degrees(self) -> (f32, f32, f32) {
        use SensorRotation::*;

        match self {
            None => (0., 0., 0.),
            Yaw45 => (0., 0., 45.),
            Yaw90 => (0., 0., 90.),
            Yaw135 => (0., 0., 135.),
            Yaw180 => (0., 0., 180.),
            Yaw225 => (0., 0., 225.),
            Yaw270 => (0., 0., 270.),
            Yaw315 => (0., 0., 315.),
            Roll180 => (180., 0., 0.),
            Roll180Yaw45 => (180., 0., 45.),
            Roll180Yaw90 => (180., 0., 90.),
            Roll180Yaw135 => (180., 0., 135.),
            Pitch180 => (0., 180., 0.),
            Roll180Yaw225 => (180., 0., 225.),
            Roll180Yaw270 => (180., 0., 270.),
            Roll180Yaw315 => (180., 0., 315.),
            Roll90 => (90., 0., 0.),
            Roll90Yaw45 => (90., 0., 45.),
            Roll90Yaw90 => (90., 0., 90.),
            Roll90Yaw135 => (90., 0., 135.),
            Roll270 => (270., 0., 0.),
            Roll270Yaw45 => (270., 0., 45.),
            Roll270Yaw90 => (270., 0., 90.),
            Roll270Yaw135 => (270., 0., 135.),
            Pitch90 => (0., 90., 0.),
            Pitch270 => (0., 270., 0.),
            Pitch180Yaw90 => (0., 180., 90.),
            Pitch180Yaw270 => (0., 180., 270.),
            Roll90Pitch90 => (90., 90., 0.),
            Roll180Pitch90 => (180., 90., 0.),
            Roll270Pitch90 => (270., 90., 0.),
            Roll90Pitch180 => (90., 180., 0.),
            Roll270Pitch180 => (270., 180., 0.),
            Roll90Pitch270 => (90., 270., 0.),
            Roll180Pitch270 => (180., 270., 0.),
            Roll270Pitch270 => (270., 270., 0.),
            Roll90Pitch180Yaw90 => (90., 180., 90.),
            Roll90Yaw270 => (90., 0., 270.),
        }
    }

    pub fn to_rotation(self) -> Rotation3<f32> {
        let (roll, pitch, yaw) = self.euler_degrees();
        Rotation3::from_euler_angles(roll.to_radians(), pitch.to_radians(), yaw.to_radians())
    }
}

/// Board to body rotation: the mounting rotation followed by a fine tune offset
/// given as roll, pitch and yaw in degrees.
pub fn board_rotation(rotation: SensorRotation, offset_deg: Vector3<f32>) -> Rotation3<f32> {
    let offset = Rotation3::from_euler_angles(
        offset_deg.x.to_radians(),
        offset_deg.y.to_radians(),
        offset_deg.z.to_radians(),
    );
    offset * rotation.to_rotation()
}

/// Turns raw samples of the selected gyro into body rates.
#[derive(Clone, Debug)]
pub struct SensorCorrectionPipeline {
    gyro_count: usize,
    selected: usize,
    correction: SensorCorrection,
    bias: SensorBias,
    board_rotation: Rotation3<f32>,
}

impl SensorCorrectionPipeline {
    /// Create a pipeline for `gyro_count` instances, capped to [`MAX_GYRO_COUNT`].
    pub fn new(gyro_count: usize) -> Self {
        Self {
            gyro_count: gyro_count.clamp(1, MAX_GYRO_COUNT),
            selected: 0,
            correction: SensorCorrection::default(),
            bias: SensorBias::default(),
            board_rotation: Rotation3::identity(),
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn gyro_count(&self) -> usize {
        self.gyro_count
    }

    pub fn set_board_rotation(&mut self, board_rotation: Rotation3<f32>) {
        self.board_rotation = board_rotation;
    }

    /// Store a new thermal correction.
    ///
    /// The selected instance follows the correction only when it names an
    /// available gyro. Returns the new instance if the selection changed.
    pub fn update_correction(&mut self, correction: SensorCorrection) -> Option<usize> {
        self.correction = correction;

        let requested = correction.selected_gyro_instance as usize;
        if requested < self.gyro_count && requested != self.selected {
            info!("gyro instance {} -> {}", self.selected, requested);
            self.selected = requested;
            Some(requested)
        } else {
            None
        }
    }

    pub fn update_bias(&mut self, bias: SensorBias) {
        self.bias = bias;
    }

    /// Correct a raw sample of the selected instance.
    pub fn correct(&self, raw: Vector3<f32>) -> Vector3<f32> {
        let offset = self.correction.gyro_offset[self.selected];
        let scale = self.correction.gyro_scale[self.selected];
        let corrected = (raw - offset).component_mul(&scale);

        self.board_rotation * corrected - self.bias.gyro_bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn applies_offset_scale_rotation_and_bias() {
        let mut pipeline = SensorCorrectionPipeline::new(2);
        let mut correction = SensorCorrection::default();
        correction.gyro_offset[1] = Vector3::new(0.1, 0., 0.);
        correction.gyro_scale[1] = Vector3::new(2., 1., 1.);
        correction.selected_gyro_instance = 1;
        assert_eq!(pipeline.update_correction(correction), Some(1));

        pipeline.set_board_rotation(board_rotation(SensorRotation::Yaw90, Vector3::zeros()));
        pipeline.update_bias(SensorBias {
            gyro_bias: Vector3::new(0., 0., 0.05),
        });

        // (1.1 - 0.1) * 2 = 2 on x, rotated onto y.
        let rates = pipeline.correct(Vector3::new(1.1, 0., 0.3));
        assert_relative_eq!(rates, Vector3::new(0., 2., 0.25), epsilon = 1e-5);
    }

    #[test]
    fn invalid_selection_keeps_current_instance() {
        let mut pipeline = SensorCorrectionPipeline::new(1);
        let correction = SensorCorrection {
            selected_gyro_instance: 2,
            ..Default::default()
        };
        assert_eq!(pipeline.update_correction(correction), None);
        assert_eq!(pipeline.selected(), 0);
    }

    #[test]
    fn roll_180_flips_y_and_z() {
        let rotation = SensorRotation::Roll180.to_rotation();
        assert_relative_eq!(
            rotation * Vector3::new(1., 2., 3.),
            Vector3::new(1., -2., -3.),
            epsilon = 1e-5
        );
    }

    #[test]
    fn offset_is_applied_after_mounting_rotation() {
        let rotation = board_rotation(SensorRotation::Yaw90, Vector3::new(0., 0., -90.));
        assert_relative_eq!(
            rotation * Vector3::new(1., 0., 0.),
            Vector3::new(1., 0., 0.),
            epsilon = 1e-5
        );
    }
}
