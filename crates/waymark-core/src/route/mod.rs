use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of renderable marker models. The wire names are part of the
/// stored-route format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarkerKind {
    ArrowForward,
    ArrowLeft,
    ArrowRight,
    Cube,
    Anchor,
    AnchorPreview,
    AnchorPreviewArrow,
    AnchorSearchArrow,
    Target,
}

impl MarkerKind {
    /// Kinds a user can place as route markers (as opposed to scaffolding
    /// models the session places on its own).
    pub fn is_placeable(&self) -> bool {
        matches!(
            self,
            Self::ArrowForward | Self::ArrowLeft | Self::ArrowRight | Self::Cube | Self::Target
        )
    }
}

/// One placed marker, in coordinates local to the hosted anchor.
///
/// Field names serialize exactly as the stored-route JSON shape:
/// `{x, y, z, rotX, rotY, rotZ, modelName, scale}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteMarker {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(rename = "rotX")]
    pub rot_x: f32,
    #[serde(rename = "rotY")]
    pub rot_y: f32,
    #[serde(rename = "rotZ")]
    pub rot_z: f32,
    #[serde(rename = "modelName")]
    pub model: MarkerKind,
    // Writers that leave the scale at its default omit the field entirely,
    // so stored routes may not carry it.
    #[serde(default = "default_marker_scale")]
    pub scale: f32,
}

fn default_marker_scale() -> f32 {
    1.5
}

impl RouteMarker {
    pub fn new(
        position: Vector3<f32>,
        rotation_euler: Vector3<f32>,
        model: MarkerKind,
        scale: f32,
    ) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z: position.z,
            rot_x: rotation_euler.x,
            rot_y: rotation_euler.y,
            rot_z: rotation_euler.z,
            model,
            scale,
        }
    }

    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn rotation_euler(&self) -> Vector3<f32> {
        Vector3::new(self.rot_x, self.rot_y, self.rot_z)
    }
}

/// A complete navigable route: one cloud anchor id plus the ordered markers
/// attached relative to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(rename = "cloudAnchorId")]
    pub cloud_anchor_id: String,
    #[serde(rename = "pointsList")]
    pub points_list: Vec<RouteMarker>,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route blob is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("route has an empty cloud anchor id")]
    MissingAnchorId,
}

impl Route {
    /// Deserializes a stored route, rejecting malformed blobs with a typed
    /// error instead of panicking into the caller's frame loop.
    pub fn from_json(blob: &str) -> Result<Self, RouteError> {
        let route: Route = serde_json::from_str(blob)?;
        if route.cloud_anchor_id.is_empty() {
            return Err(RouteError::MissingAnchorId);
        }
        Ok(route)
    }

    pub fn to_json(&self) -> Result<String, RouteError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The route under construction: an ordered, exclusively owned marker list.
#[derive(Debug, Default, Clone)]
pub struct RouteDraft {
    markers: Vec<RouteMarker>,
}

impl RouteDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_marker(&mut self, marker: RouteMarker) {
        self.markers.push(marker);
    }

    /// LIFO pop; `None` once the draft is empty.
    pub fn remove_last(&mut self) -> Option<RouteMarker> {
        self.markers.pop()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn last(&self) -> Option<&RouteMarker> {
        self.markers.last()
    }

    pub fn markers(&self) -> &[RouteMarker] {
        &self.markers
    }

    /// Snapshot serialization against the hosted anchor's id.
    pub fn to_route(&self, cloud_anchor_id: impl Into<String>) -> Route {
        Route {
            cloud_anchor_id: cloud_anchor_id.into(),
            points_list: self.markers.clone(),
        }
    }
}
