use fleet_api::messages::Location;
use glam::{DMat2, DVec2};

/// Pure geometric mapping between the fleet's reference frame and one
/// robot's local frame.
///
/// Implementations must satisfy approximate round-trip identity:
/// `backward_transform(forward_transform(x))` equals `x` within
/// floating-point tolerance for all valid inputs.
pub trait CoordinateTransformer: Send + Sync {
    /// Maps a fleet-frame location into the robot frame.
    fn forward_transform(&self, location: &Location) -> Location;

    /// Maps a robot-frame location into the fleet frame.
    fn backward_transform(&self, location: &Location) -> Location;
}

/// 2D similarity transform: scale, then rotate, then translate.
#[derive(Debug, Clone)]
pub struct FrameTransform {
    rotation: f64,
    scale: f64,
    translation: DVec2,
}

impl FrameTransform {
    /// Builds a transform from a rotation (radians), a uniform scale and a
    /// translation. The scale must be non-zero for the transform to be
    /// invertible.
    pub fn new(rotation: f64, scale: f64, translation: DVec2) -> Self {
        assert!(scale != 0.0, "FrameTransform scale must be non-zero");
        Self {
            rotation,
            scale,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 1.0, DVec2::ZERO)
    }
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl CoordinateTransformer for FrameTransform {
    fn forward_transform(&self, location: &Location) -> Location {
        let point = DVec2::new(location.x, location.y);
        let point = DMat2::from_angle(self.rotation) * (self.scale * point)
            + self.translation;
        Location {
            map_name: location.map_name.clone(),
            x: point.x,
            y: point.y,
            yaw: location.yaw + self.rotation,
        }
    }

    fn backward_transform(&self, location: &Location) -> Location {
        let point = DVec2::new(location.x, location.y);
        let point =
            DMat2::from_angle(-self.rotation) * (point - self.translation) / self.scale;
        Location {
            map_name: location.map_name.clone(),
            x: point.x,
            y: point.y,
            yaw: location.yaw - self.rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(x: f64, y: f64, yaw: f64) -> Location {
        Location {
            map_name: "L1".to_owned(),
            x,
            y,
            yaw,
        }
    }

    #[test]
    fn identity_passes_locations_through() {
        let transform = FrameTransform::identity();
        let loc = location(3.5, -2.0, 0.7);

        assert_eq!(transform.forward_transform(&loc), loc);
        assert_eq!(transform.backward_transform(&loc), loc);
    }

    #[test]
    fn round_trip_is_identity_within_tolerance() {
        let transform =
            FrameTransform::new(0.9, 2.5, DVec2::new(-17.0, 4.2));
        let samples = [
            location(0.0, 0.0, 0.0),
            location(10.0, -3.0, 1.2),
            location(-250.5, 613.0, -2.9),
            location(1e-4, 1e-4, 0.0),
        ];

        for sample in samples {
            let round_trip =
                transform.backward_transform(&transform.forward_transform(&sample));
            assert!((round_trip.x - sample.x).abs() < 1e-6);
            assert!((round_trip.y - sample.y).abs() < 1e-6);
            assert!((round_trip.yaw - sample.yaw).abs() < 1e-6);
            assert_eq!(round_trip.map_name, sample.map_name);
        }
    }

    #[test]
    fn translation_only_offsets_coordinates() {
        let transform = FrameTransform::new(0.0, 1.0, DVec2::new(5.0, -1.0));
        let robot_frame = transform.forward_transform(&location(1.0, 1.0, 0.0));

        assert!((robot_frame.x - 6.0).abs() < 1e-12);
        assert!((robot_frame.y - 0.0).abs() < 1e-12);
    }
}
