pub mod contracts;
pub mod gate;
pub mod geo;
pub mod projection;
pub mod route;
pub mod time;

#[cfg(test)]
mod tests {
    use crate::contracts::Pose;
    use crate::gate::AnchorCircleGate;
    use crate::geo::{destination_point, great_circle_distance_m, GeoCoordinate};
    use crate::projection::PoseProjector;
    use nalgebra::Vector3;

    #[test]
    fn gate_confirmation_requires_walking_around() {
        // A camera orbiting a gate placed in front of it confirms segments
        // only for the azimuths it actually visits.
        let mut gate = AnchorCircleGate::new();
        gate.set_position(&Pose::from_position(Vector3::new(0.0, 0.0, -2.0)));

        let projector =
            PoseProjector::from_camera(&Pose::identity(), std::f32::consts::FRAC_PI_3, 1.0);
        assert!(gate.is_in_frame(&projector));

        gate.highlight_segment(&Vector3::zeros());
        assert!(!gate.all_confirmed());
        assert_eq!(gate.confirmed_count(), 1);
    }

    #[test]
    fn geodesic_round_trip_stays_within_tolerance() {
        let origin = GeoCoordinate::new(48.137_154, 11.576_124, 520.0, 0.0);
        let dest = destination_point(&origin, 222.0, 4_321.0);
        let measured = great_circle_distance_m(&origin, &dest);
        assert!((measured - 4_321.0).abs() < 0.5);
    }
}
