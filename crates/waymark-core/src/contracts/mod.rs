//! Collaborator contracts the session consumes. Implementations live at the
//! platform boundary; the engine only ever sees these traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GeoCoordinate;
use crate::route::MarkerKind;

/// A rigid transform in render space. Owned transiently per frame by the
/// tracking provider; the session only reads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    pub fn from_position(position: Vector3<f32>) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::identity(),
        }
    }

    pub fn to_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    /// Up vector of this pose (plane normal for horizontal-plane hits).
    pub fn up(&self) -> Vector3<f32> {
        self.orientation * Vector3::y()
    }

    /// Forward vector; cameras look down their local -Z.
    pub fn forward(&self) -> Vector3<f32> {
        self.orientation * -Vector3::z()
    }

    /// Rotation about the world up-axis, radians, zero when facing -Z.
    pub fn yaw_radians(&self) -> f32 {
        let f = self.forward();
        (-f.x).atan2(-f.z)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Geospatial registration accuracy estimates, as reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingQuality {
    pub horizontal_m: f64,
    pub vertical_m: f64,
    pub heading_degrees: f64,
}

/// Source of per-frame camera and geospatial state. The session is polled by
/// the host at render cadence and reads the provider each frame.
pub trait TrackingProvider {
    fn camera_pose(&self) -> Pose;
    fn tracking_quality(&self) -> TrackingQuality;
    /// `None` until geospatial tracking has locked.
    fn geospatial_pose(&self) -> Option<GeoCoordinate>;
    fn plane_tracking_active(&self) -> bool;
    /// Current horizontal-plane hit under the placement reticle, if any.
    fn placement_pose(&self) -> Option<Pose>;
}

/// Cooperative cancellation for in-flight boundary operations. Cloning
/// shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Tags one async request so the session can discard completions that arrive
/// after it has already moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// One place record held by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub id: String,
    pub name: String,
    pub geo: GeoCoordinate,
    /// Serialized `Route` JSON, opaque to the store.
    pub route_blob: String,
}

/// Completion message delivered back onto the frame thread.
#[derive(Debug, Clone)]
pub enum AnchorOutcome {
    Hosted {
        request: RequestId,
        cloud_anchor_id: String,
    },
    HostFailed {
        request: RequestId,
    },
    Resolved {
        request: RequestId,
        anchor_pose: Pose,
    },
    ResolveFailed {
        request: RequestId,
    },
    PlacesFetched {
        request: RequestId,
        places: Vec<PlaceRecord>,
    },
}

/// Thread-safe producer half of the session's completion queue. Boundary
/// implementations may fire from any executor; the message is only applied
/// when the frame loop drains the queue.
#[derive(Debug, Clone)]
pub struct CompletionSink {
    tx: Sender<AnchorOutcome>,
}

impl CompletionSink {
    pub fn new(tx: Sender<AnchorOutcome>) -> Self {
        Self { tx }
    }

    pub fn push(&self, outcome: AnchorOutcome) {
        // A closed queue means the session is gone; the completion is moot.
        let _ = self.tx.send(outcome);
    }
}

/// Handle a `CloudAnchorService` uses to report a host outcome.
#[derive(Debug, Clone)]
pub struct HostCompletion {
    sink: CompletionSink,
    request: RequestId,
}

impl HostCompletion {
    pub fn new(sink: CompletionSink, request: RequestId) -> Self {
        Self { sink, request }
    }

    pub fn succeed(self, cloud_anchor_id: String) {
        self.sink.push(AnchorOutcome::Hosted {
            request: self.request,
            cloud_anchor_id,
        });
    }

    pub fn fail(self) {
        self.sink.push(AnchorOutcome::HostFailed {
            request: self.request,
        });
    }
}

/// Handle a `CloudAnchorService` uses to report a resolve outcome.
#[derive(Debug, Clone)]
pub struct ResolveCompletion {
    sink: CompletionSink,
    request: RequestId,
}

impl ResolveCompletion {
    pub fn new(sink: CompletionSink, request: RequestId) -> Self {
        Self { sink, request }
    }

    pub fn succeed(self, anchor_pose: Pose) {
        self.sink.push(AnchorOutcome::Resolved {
            request: self.request,
            anchor_pose,
        });
    }

    pub fn fail(self) {
        self.sink.push(AnchorOutcome::ResolveFailed {
            request: self.request,
        });
    }
}

/// Handle a `PlaceStore` uses to deliver a nearby-places query result.
#[derive(Debug, Clone)]
pub struct FetchCompletion {
    sink: CompletionSink,
    request: RequestId,
}

impl FetchCompletion {
    pub fn new(sink: CompletionSink, request: RequestId) -> Self {
        Self { sink, request }
    }

    pub fn deliver(self, places: Vec<PlaceRecord>) {
        self.sink.push(AnchorOutcome::PlacesFetched {
            request: self.request,
            places,
        });
    }
}

/// Black-box cloud anchor hosting/resolution. Both calls are fire-and-forget:
/// the implementation reports through the completion handle, from whatever
/// executor it runs on, and honors the cancellation token on teardown.
pub trait CloudAnchorService {
    fn host(
        &mut self,
        local_pose: Pose,
        ttl_days: u32,
        completion: HostCompletion,
        cancel: CancellationToken,
    );

    fn resolve(
        &mut self,
        cloud_anchor_id: &str,
        completion: ResolveCompletion,
        cancel: CancellationToken,
    );
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("place store unreachable: {0}")]
    Unreachable(String),
    #[error("unknown place id {0}")]
    UnknownId(String),
}

/// Remote place store. The radius query is asynchronous; mutations are thin
/// synchronous calls whose retry policy is the implementation's concern.
pub trait PlaceStore {
    fn fetch_near(
        &mut self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
        completion: FetchCompletion,
        cancel: CancellationToken,
    );

    fn upload(&mut self, place: &PlaceRecord) -> Result<(), StoreError>;
    fn update(&mut self, place: &PlaceRecord) -> Result<(), StoreError>;
    fn delete(&mut self, id: &str) -> Result<(), StoreError>;
}

/// Opaque handle to a visual node owned by the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u64);

/// Transform of a node relative to its parent (or to the world when the node
/// has no parent).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTransform {
    pub position: Vector3<f32>,
    pub rotation_euler: Vector3<f32>,
    pub scale: f32,
}

impl LocalTransform {
    pub fn at(position: Vector3<f32>) -> Self {
        Self {
            position,
            rotation_euler: Vector3::zeros(),
            scale: 1.0,
        }
    }
}

/// Rendering boundary: the session instantiates and removes visual nodes but
/// never touches pipeline internals.
pub trait RenderSurface {
    fn attach_node(
        &mut self,
        parent: Option<NodeHandle>,
        transform: LocalTransform,
        kind: MarkerKind,
    ) -> NodeHandle;

    fn detach(&mut self, handle: NodeHandle);

    fn set_visible(&mut self, handle: NodeHandle, visible: bool);
}
