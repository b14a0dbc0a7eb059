//! Notifications the session emits for the embedding UI to drain each frame.
//! This replaces ad-hoc toast/log side channels with one typed stream.

use waymark_core::projection::OffscreenDirection;

use crate::session::SessionState;

/// User-facing notices. None of these is fatal; the session stays usable
/// after every one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Geospatial registration is not accurate enough to place an anchor yet.
    GeoAccuracyTooLow,
    /// Plane tracking has not started; placement and resolving must wait.
    TrackingNotReady,
    HostSucceeded { cloud_anchor_id: String },
    HostFailed,
    HostTimedOut,
    ResolveFailed,
    ResolveTimedOut,
    RouteResolved { marker_count: usize },
    /// A fetched route blob failed to parse; the candidate was abandoned.
    MalformedRoute { place_id: String },
    /// Resolve requested in search mode with nothing visible in range.
    NoCandidatesInRange,
    /// The target place lies beyond the render distance.
    TooFarFromPlace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Where to steer the user while the navigation target is off screen.
    OffscreenIndicator(OffscreenDirection),
    Notice(SessionNotice),
}
