use std::sync::{Arc, Mutex};

use nalgebra::Vector3;
use waymark_core::contracts::{Pose, TrackingProvider, TrackingQuality};
use waymark_core::geo::GeoCoordinate;

#[derive(Debug)]
struct Inner {
    camera: Pose,
    quality: TrackingQuality,
    geospatial: Option<GeoCoordinate>,
    plane_active: bool,
    placement: Option<Pose>,
}

/// Tracking provider driven by a test or replay script. Clones share state:
/// the session reads through one handle while the script mutates the other
/// between frames.
#[derive(Debug, Clone)]
pub struct ScriptedTracking {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedTracking {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                camera: Pose::identity(),
                quality: TrackingQuality {
                    horizontal_m: 100.0,
                    vertical_m: 100.0,
                    heading_degrees: 180.0,
                },
                geospatial: None,
                plane_active: false,
                placement: None,
            })),
        }
    }

    pub fn set_camera(&self, pose: Pose) {
        self.inner.lock().expect("tracking lock").camera = pose;
    }

    pub fn set_camera_position(&self, position: Vector3<f32>) {
        self.inner.lock().expect("tracking lock").camera.position = position;
    }

    pub fn set_quality(&self, quality: TrackingQuality) {
        self.inner.lock().expect("tracking lock").quality = quality;
    }

    pub fn set_geospatial(&self, geo: Option<GeoCoordinate>) {
        self.inner.lock().expect("tracking lock").geospatial = geo;
    }

    pub fn set_plane_tracking(&self, active: bool) {
        self.inner.lock().expect("tracking lock").plane_active = active;
    }

    pub fn set_placement(&self, pose: Option<Pose>) {
        self.inner.lock().expect("tracking lock").placement = pose;
    }
}

impl Default for ScriptedTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingProvider for ScriptedTracking {
    fn camera_pose(&self) -> Pose {
        self.inner.lock().expect("tracking lock").camera
    }

    fn tracking_quality(&self) -> TrackingQuality {
        self.inner.lock().expect("tracking lock").quality
    }

    fn geospatial_pose(&self) -> Option<GeoCoordinate> {
        self.inner.lock().expect("tracking lock").geospatial
    }

    fn plane_tracking_active(&self) -> bool {
        self.inner.lock().expect("tracking lock").plane_active
    }

    fn placement_pose(&self) -> Option<Pose> {
        self.inner.lock().expect("tracking lock").placement
    }
}
