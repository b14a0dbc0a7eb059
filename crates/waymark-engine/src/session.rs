//! The anchor session state machine. One instance backs one AR screen for
//! its whole lifetime; the embedding host calls `on_frame` at render cadence
//! and drains events after each call.

use std::collections::VecDeque;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use nalgebra::{Point3, Vector3};

use waymark_core::contracts::{
    AnchorOutcome, CancellationToken, CloudAnchorService, CompletionSink, FetchCompletion,
    HostCompletion, LocalTransform, NodeHandle, PlaceRecord, Pose, RenderSurface, RequestId,
    ResolveCompletion, TrackingProvider,
};
use waymark_core::contracts::PlaceStore;
use waymark_core::gate::AnchorCircleGate;
use waymark_core::geo::{
    destination_point, euclidean_distance, geo_to_local_enu, great_circle_distance_m,
    GeoCoordinate,
};
use waymark_core::projection::PoseProjector;
use waymark_core::route::{MarkerKind, Route, RouteDraft, RouteMarker};
use waymark_core::time::Clock;

use crate::events::{SessionEvent, SessionNotice};
use crate::search::{AnchorCandidate, SearchIndex};

/// Every state the session can be in, across all three modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    StartingTracking,
    PlaceAnchor,
    WaitingForCircleConfirmation,
    Hosting,
    HostSuccess,
    HostFail,
    PlaceObject,
    PlaceTarget,
    TargetPlaced,
    ResolveAble,
    ResolveButNotReady,
    Resolving,
    ResolveSuccess,
    ResolveFail,
    Searching,
}

/// What the screen was opened for. Fixed for the session's lifetime.
#[derive(Debug, Clone)]
pub enum SessionMode {
    /// Author a new route: place an anchor, host it, lay markers.
    Author,
    /// Navigate one known place's route.
    Navigate { place: PlaceRecord },
    /// Browse every nearby route at once.
    Search,
}

/// Tunables grouped into one configuration structure.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Horizontal geospatial accuracy required before an anchor may be
    /// placed, meters.
    pub horizontal_accuracy_limit_m: f64,
    /// Accuracy required before search-mode fetches begin, meters.
    pub search_accuracy_limit_m: f64,
    /// Deadline raced against every cloud host/resolve call.
    pub cloud_timeout: Duration,
    pub anchor_ttl_days: u32,
    pub search_radius_m: f64,
    /// Distance the user must move before nearby places are fetched again.
    pub refetch_distance_m: f64,
    /// Candidate preview arrows are hidden closer than this, render units.
    pub preview_arrow_distance: f32,
    /// Search-mode resolve only considers candidates within this distance.
    pub max_resolve_distance: f32,
    /// Beyond this geodesic distance a "too far" notice is raised.
    pub render_distance_m: f64,
    pub default_marker_scale: f32,
    pub fov_y_radians: f32,
    pub aspect_ratio: f32,
    /// Testing override: skip the accuracy gate on placement.
    pub ignore_accuracy: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            horizontal_accuracy_limit_m: 2.5,
            search_accuracy_limit_m: 2.0,
            cloud_timeout: Duration::from_millis(12_500),
            anchor_ttl_days: 365,
            search_radius_m: 200.0,
            refetch_distance_m: 2.0,
            preview_arrow_distance: 4.0,
            max_resolve_distance: 10.0,
            render_distance_m: 200.0,
            default_marker_scale: 1.5,
            fov_y_radians: std::f32::consts::FRAC_PI_3,
            aspect_ratio: 0.75,
            ignore_accuracy: false,
        }
    }
}

/// The finished route handed to the external editor on confirm, together
/// with the geocoordinate computed for the hosted anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteHandoff {
    pub route: Route,
    pub anchor_geo: GeoCoordinate,
}

/// Frame-driven session over abstract collaborators. All mutation happens on
/// the frame thread; async completions arrive through an internal queue.
pub struct ArSession<T, C, P, R, K> {
    config: SessionConfig,
    mode: SessionMode,
    state: SessionState,

    tracking: T,
    cloud: C,
    store: P,
    surface: R,
    clock: K,

    completion_tx: Sender<AnchorOutcome>,
    completion_rx: Receiver<AnchorOutcome>,
    request_counter: u64,
    inflight_host: Option<(RequestId, Duration)>,
    inflight_resolve: Option<(RequestId, Duration)>,
    inflight_fetch: Option<RequestId>,
    host_cancel: Option<CancellationToken>,
    resolve_cancel: Option<CancellationToken>,
    fetch_cancel: Option<CancellationToken>,

    gate: Option<AnchorCircleGate>,
    anchor_pose: Option<Pose>,
    anchor_node: Option<NodeHandle>,
    anchor_geo: Option<GeoCoordinate>,
    cloud_anchor_id: Option<String>,
    draft: RouteDraft,
    marker_nodes: Vec<NodeHandle>,
    selected_model: MarkerKind,
    marker_scale: f32,

    preview_node: Option<NodeHandle>,
    preview_world: Option<Vector3<f32>>,
    too_far_notified: bool,
    pending_route: Option<Route>,

    search: SearchIndex,

    events: VecDeque<SessionEvent>,
    disposed: bool,
}

impl<T, C, P, R, K> ArSession<T, C, P, R, K>
where
    T: TrackingProvider,
    C: CloudAnchorService,
    P: PlaceStore,
    R: RenderSurface,
    K: Clock,
{
    pub fn new(mode: SessionMode, tracking: T, cloud: C, store: P, surface: R, clock: K) -> Self {
        Self::with_config(SessionConfig::default(), mode, tracking, cloud, store, surface, clock)
    }

    pub fn with_config(
        config: SessionConfig,
        mode: SessionMode,
        tracking: T,
        cloud: C,
        store: P,
        surface: R,
        clock: K,
    ) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        let marker_scale = config.default_marker_scale;
        Self {
            config,
            mode,
            state: SessionState::StartingTracking,
            tracking,
            cloud,
            store,
            surface,
            clock,
            completion_tx,
            completion_rx,
            request_counter: 0,
            inflight_host: None,
            inflight_resolve: None,
            inflight_fetch: None,
            host_cancel: None,
            resolve_cancel: None,
            fetch_cancel: None,
            gate: None,
            anchor_pose: None,
            anchor_node: None,
            anchor_geo: None,
            cloud_anchor_id: None,
            draft: RouteDraft::new(),
            marker_nodes: Vec::new(),
            selected_model: MarkerKind::ArrowForward,
            marker_scale,
            preview_node: None,
            preview_world: None,
            too_far_notified: false,
            pending_route: None,
            search: SearchIndex::new(),
            events: VecDeque::new(),
            disposed: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cloud_anchor_id(&self) -> Option<&str> {
        self.cloud_anchor_id.as_deref()
    }

    pub fn route_markers(&self) -> &[RouteMarker] {
        self.draft.markers()
    }

    pub fn candidate_count(&self) -> usize {
        self.search.len()
    }

    pub fn gate(&self) -> Option<&AnchorCircleGate> {
        self.gate.as_ref()
    }

    /// Drains every event emitted since the last poll, in order.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// One frame of work: apply async completions, enforce deadlines, then
    /// run the current state's per-frame logic.
    pub fn on_frame(&mut self) {
        if self.disposed {
            return;
        }
        // States entered during this frame stay observable until the next
        // one; only a state carried over from an earlier frame settles.
        let carried = self.state;
        self.drain_completions();
        self.check_deadlines();

        match self.state {
            SessionState::StartingTracking => self.try_leave_starting(),
            SessionState::WaitingForCircleConfirmation => self.scan_gate(),
            SessionState::HostSuccess if carried == SessionState::HostSuccess => {
                self.transition(SessionState::PlaceObject);
            }
            SessionState::ResolveButNotReady => {
                if self.tracking.plane_tracking_active() {
                    self.transition(SessionState::ResolveAble);
                }
            }
            SessionState::ResolveFail
                if carried == SessionState::ResolveFail
                    && matches!(self.mode, SessionMode::Search) =>
            {
                self.transition(SessionState::Searching);
            }
            SessionState::Searching => self.search_frame(),
            _ => {}
        }

        if matches!(self.mode, SessionMode::Navigate { .. }) {
            self.navigate_frame();
        }
    }

    /// Places whatever the current state accepts: the anchor itself, a route
    /// marker, or the target.
    pub fn place(&mut self) {
        match self.state {
            SessionState::PlaceAnchor => self.place_anchor(),
            SessionState::HostFail => {
                // Failed hosts loop back: retrying re-places the anchor.
                self.reset_placement();
                self.transition(SessionState::PlaceAnchor);
                self.place_anchor();
            }
            SessionState::PlaceObject => {
                let model = self.selected_model;
                if model == MarkerKind::Target {
                    warn!(target: "waymark_engine::session", "target selected outside PlaceTarget");
                    return;
                }
                self.place_marker(model);
            }
            SessionState::PlaceTarget => self.place_marker(MarkerKind::Target),
            other => {
                warn!(target: "waymark_engine::session", "place ignored in {other:?}");
            }
        }
    }

    /// Kicks off resolving: the known place in navigate mode, the best
    /// visible candidate in search mode.
    pub fn resolve(&mut self) {
        match self.mode.clone() {
            SessionMode::Navigate { place } => self.resolve_navigate(place),
            SessionMode::Search => self.resolve_search(),
            SessionMode::Author => {
                warn!(target: "waymark_engine::session", "resolve ignored while authoring");
            }
        }
    }

    /// LIFO removal of the most recent marker. Emptying the route resets the
    /// whole placement, gate included.
    pub fn undo(&mut self) {
        if !matches!(
            self.state,
            SessionState::PlaceObject | SessionState::PlaceTarget | SessionState::TargetPlaced
        ) {
            warn!(target: "waymark_engine::session", "undo ignored in {:?}", self.state);
            return;
        }
        let Some(popped) = self.draft.remove_last() else {
            warn!(target: "waymark_engine::session", "undo with empty route");
            return;
        };
        if let Some(node) = self.marker_nodes.pop() {
            self.surface.detach(node);
        }
        if self.draft.is_empty() {
            self.reset_placement();
            self.transition(SessionState::PlaceAnchor);
            return;
        }
        if popped.model == MarkerKind::Target && self.state == SessionState::TargetPlaced {
            self.transition(SessionState::PlaceTarget);
        }
    }

    /// Switches the marker model the next `place` will use. Selecting the
    /// target model moves into target placement and back.
    pub fn select_model(&mut self, model: MarkerKind) {
        if !model.is_placeable() {
            warn!(target: "waymark_engine::session", "{model:?} is not placeable");
            return;
        }
        self.selected_model = model;
        if model == MarkerKind::Target && self.state == SessionState::PlaceObject {
            self.transition(SessionState::PlaceTarget);
        } else if model != MarkerKind::Target && self.state == SessionState::PlaceTarget {
            self.transition(SessionState::PlaceObject);
        }
    }

    pub fn set_marker_scale(&mut self, scale: f32) {
        if scale > 0.0 {
            self.marker_scale = scale;
        }
    }

    /// Finishes authoring: snapshots the route for the external editor.
    pub fn confirm(&mut self) -> Option<RouteHandoff> {
        if self.state != SessionState::TargetPlaced {
            warn!(target: "waymark_engine::session", "confirm ignored in {:?}", self.state);
            return None;
        }
        let cloud_anchor_id = self.cloud_anchor_id.clone()?;
        let anchor_geo = self.anchor_geo?;
        Some(RouteHandoff {
            route: self.draft.to_route(cloud_anchor_id),
            anchor_geo,
        })
    }

    /// Screen teardown: cancels in-flight work and releases every node. The
    /// session is inert afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for token in [
            self.host_cancel.take(),
            self.resolve_cancel.take(),
            self.fetch_cancel.take(),
        ]
        .into_iter()
        .flatten()
        {
            token.cancel();
        }
        self.inflight_host = None;
        self.inflight_resolve = None;
        self.inflight_fetch = None;

        for node in self.marker_nodes.drain(..) {
            self.surface.detach(node);
        }
        if let Some(node) = self.anchor_node.take() {
            self.surface.detach(node);
        }
        if let Some(node) = self.preview_node.take() {
            self.surface.detach(node);
        }
        for candidate in self.search.drain() {
            self.surface.detach(candidate.arrow);
            self.surface.detach(candidate.node);
        }
        self.gate = None;
        self.disposed = true;
        debug!(target: "waymark_engine::session", "session disposed");
    }

    fn transition(&mut self, to: SessionState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        debug!(target: "waymark_engine::session", "{from:?} -> {to:?}");
        self.state = to;
        self.events.push_back(SessionEvent::StateChanged { from, to });
    }

    fn notice(&mut self, notice: SessionNotice) {
        self.events.push_back(SessionEvent::Notice(notice));
    }

    fn next_request(&mut self) -> RequestId {
        self.request_counter += 1;
        RequestId(self.request_counter)
    }

    fn sink(&self) -> CompletionSink {
        CompletionSink::new(self.completion_tx.clone())
    }

    fn projector(&self, camera: &Pose) -> PoseProjector {
        PoseProjector::from_camera(camera, self.config.fov_y_radians, self.config.aspect_ratio)
    }

    fn try_leave_starting(&mut self) {
        if !self.tracking.plane_tracking_active() {
            return;
        }
        let next = match self.mode {
            SessionMode::Author => SessionState::PlaceAnchor,
            SessionMode::Navigate { .. } => SessionState::ResolveAble,
            SessionMode::Search => SessionState::Searching,
        };
        self.transition(next);
    }

    fn place_anchor(&mut self) {
        let quality = self.tracking.tracking_quality();
        if !self.config.ignore_accuracy
            && quality.horizontal_m >= self.config.horizontal_accuracy_limit_m
        {
            debug!(
                target: "waymark_engine::session",
                "placement blocked: horizontal accuracy {:.2}m", quality.horizontal_m
            );
            self.notice(SessionNotice::GeoAccuracyTooLow);
            return;
        }
        let Some(camera_geo) = self.tracking.geospatial_pose() else {
            self.notice(SessionNotice::GeoAccuracyTooLow);
            return;
        };
        let Some(placement) = self.tracking.placement_pose() else {
            self.notice(SessionNotice::TrackingNotReady);
            return;
        };

        let camera = self.tracking.camera_pose();
        let dx = f64::from(placement.position.x - camera.position.x);
        let dz = f64::from(placement.position.z - camera.position.z);
        let planar_distance = (dx * dx + dz * dz).sqrt();
        let mut anchor_geo =
            destination_point(&camera_geo, camera_geo.heading_degrees, planar_distance);
        anchor_geo.altitude -= f64::from(camera.position.y - placement.position.y);

        let mut gate = AnchorCircleGate::new();
        gate.set_position(&placement);
        self.gate = Some(gate);
        self.anchor_pose = Some(placement);
        self.anchor_geo = Some(anchor_geo);
        self.anchor_node = Some(self.surface.attach_node(
            None,
            LocalTransform::at(placement.position),
            MarkerKind::Anchor,
        ));
        self.transition(SessionState::WaitingForCircleConfirmation);
    }

    fn scan_gate(&mut self) {
        let camera = self.tracking.camera_pose();
        let projector = self.projector(&camera);
        let all_confirmed = match self.gate.as_mut() {
            Some(gate) => {
                if gate.is_in_frame(&projector) {
                    gate.highlight_segment(&camera.position);
                }
                gate.all_confirmed()
            }
            None => {
                warn!(target: "waymark_engine::session", "confirmation state without a gate");
                false
            }
        };
        if all_confirmed && self.tracking.plane_tracking_active() {
            self.begin_host();
        }
    }

    fn begin_host(&mut self) {
        let Some(anchor_pose) = self.anchor_pose else {
            warn!(target: "waymark_engine::session", "host requested without an anchor pose");
            return;
        };
        let request = self.next_request();
        let token = CancellationToken::new();
        let deadline = self.clock.now() + self.config.cloud_timeout;
        self.cloud.host(
            anchor_pose,
            self.config.anchor_ttl_days,
            HostCompletion::new(self.sink(), request),
            token.clone(),
        );
        self.inflight_host = Some((request, deadline));
        self.host_cancel = Some(token);
        self.transition(SessionState::Hosting);
    }

    fn place_marker(&mut self, model: MarkerKind) {
        let Some(anchor_pose) = self.anchor_pose else {
            warn!(target: "waymark_engine::session", "marker placement without an anchor");
            return;
        };
        let Some(anchor_node) = self.anchor_node else {
            warn!(target: "waymark_engine::session", "marker placement without an anchor node");
            return;
        };
        let Some(placement) = self.tracking.placement_pose() else {
            self.notice(SessionNotice::TrackingNotReady);
            return;
        };

        // Markers live in anchor-local coordinates so resolved routes track
        // the anchor, not the original device's world frame.
        let local = anchor_pose.to_isometry().inverse_transform_point(&Point3::from(placement.position));
        let camera = self.tracking.camera_pose();
        let rotation = Vector3::new(0.0, camera.yaw_radians().to_degrees(), 0.0);
        let marker = RouteMarker::new(local.coords, rotation, model, self.marker_scale);

        self.draft.add_marker(marker);
        let node = self.surface.attach_node(
            Some(anchor_node),
            LocalTransform {
                position: marker.position(),
                rotation_euler: marker.rotation_euler(),
                scale: marker.scale,
            },
            model,
        );
        self.marker_nodes.push(node);

        if model == MarkerKind::Target {
            self.transition(SessionState::TargetPlaced);
        }
    }

    fn resolve_navigate(&mut self, place: PlaceRecord) {
        if !matches!(
            self.state,
            SessionState::StartingTracking
                | SessionState::ResolveAble
                | SessionState::ResolveButNotReady
                | SessionState::ResolveFail
        ) {
            warn!(target: "waymark_engine::session", "resolve ignored in {:?}", self.state);
            return;
        }
        if !self.tracking.plane_tracking_active() {
            self.notice(SessionNotice::TrackingNotReady);
            self.transition(SessionState::ResolveButNotReady);
            return;
        }
        let route = match Route::from_json(&place.route_blob) {
            Ok(route) => route,
            Err(err) => {
                warn!(target: "waymark_engine::session", "route for {} unreadable: {err}", place.id);
                self.notice(SessionNotice::MalformedRoute { place_id: place.id });
                return;
            }
        };
        self.begin_resolve(route);
    }

    fn resolve_search(&mut self) {
        if !matches!(
            self.state,
            SessionState::Searching | SessionState::ResolveFail
        ) {
            warn!(target: "waymark_engine::session", "resolve ignored in {:?}", self.state);
            return;
        }
        let camera = self.tracking.camera_pose();
        let projector = self.projector(&camera);
        let selected = self
            .search
            .nearest_visible(&projector, &camera.position, self.config.max_resolve_distance)
            .map(|candidate| candidate.place.clone());
        let Some(place) = selected else {
            self.notice(SessionNotice::NoCandidatesInRange);
            return;
        };
        let route = match Route::from_json(&place.route_blob) {
            Ok(route) => route,
            Err(err) => {
                warn!(target: "waymark_engine::session", "route for {} unreadable: {err}", place.id);
                if let Some(candidate) = self.search.remove(&place.id) {
                    self.surface.detach(candidate.arrow);
                    self.surface.detach(candidate.node);
                }
                self.notice(SessionNotice::MalformedRoute { place_id: place.id });
                return;
            }
        };
        self.begin_resolve(route);
    }

    fn begin_resolve(&mut self, route: Route) {
        let request = self.next_request();
        let token = CancellationToken::new();
        let deadline = self.clock.now() + self.config.cloud_timeout;
        self.cloud.resolve(
            &route.cloud_anchor_id,
            ResolveCompletion::new(self.sink(), request),
            token.clone(),
        );
        self.pending_route = Some(route);
        self.inflight_resolve = Some((request, deadline));
        self.resolve_cancel = Some(token);
        self.transition(SessionState::Resolving);
    }

    fn drain_completions(&mut self) {
        let outcomes: Vec<AnchorOutcome> = self.completion_rx.try_iter().collect();
        for outcome in outcomes {
            self.apply_outcome(outcome);
        }
    }

    fn apply_outcome(&mut self, outcome: AnchorOutcome) {
        match outcome {
            AnchorOutcome::Hosted {
                request,
                cloud_anchor_id,
            } => {
                if !self.matches_host(request) {
                    debug!(target: "waymark_engine::session", "stale host success dropped");
                    return;
                }
                self.inflight_host = None;
                self.host_cancel = None;
                self.cloud_anchor_id = Some(cloud_anchor_id.clone());
                if let Some(gate) = self.gate.as_mut() {
                    gate.highlight_all();
                }
                self.notice(SessionNotice::HostSucceeded { cloud_anchor_id });
                self.transition(SessionState::HostSuccess);
            }
            AnchorOutcome::HostFailed { request } => {
                if !self.matches_host(request) {
                    debug!(target: "waymark_engine::session", "stale host failure dropped");
                    return;
                }
                self.inflight_host = None;
                self.host_cancel = None;
                self.notice(SessionNotice::HostFailed);
                self.transition(SessionState::HostFail);
            }
            AnchorOutcome::Resolved {
                request,
                anchor_pose,
            } => {
                if !self.matches_resolve(request) {
                    debug!(target: "waymark_engine::session", "stale resolve success dropped");
                    return;
                }
                self.inflight_resolve = None;
                self.resolve_cancel = None;
                self.finish_resolve(anchor_pose);
            }
            AnchorOutcome::ResolveFailed { request } => {
                if !self.matches_resolve(request) {
                    debug!(target: "waymark_engine::session", "stale resolve failure dropped");
                    return;
                }
                self.inflight_resolve = None;
                self.resolve_cancel = None;
                self.pending_route = None;
                self.notice(SessionNotice::ResolveFailed);
                self.transition(SessionState::ResolveFail);
            }
            AnchorOutcome::PlacesFetched { request, places } => {
                if self.inflight_fetch != Some(request) {
                    debug!(target: "waymark_engine::session", "stale fetch result dropped");
                    return;
                }
                self.inflight_fetch = None;
                self.fetch_cancel = None;
                for place in places {
                    self.materialize_place(place);
                }
            }
        }
    }

    fn matches_host(&self, request: RequestId) -> bool {
        matches!(self.inflight_host, Some((id, _)) if id == request)
    }

    fn matches_resolve(&self, request: RequestId) -> bool {
        matches!(self.inflight_resolve, Some((id, _)) if id == request)
    }

    fn check_deadlines(&mut self) {
        let now = self.clock.now();
        if let Some((_, deadline)) = self.inflight_host {
            if now >= deadline {
                self.inflight_host = None;
                if let Some(token) = self.host_cancel.take() {
                    token.cancel();
                }
                warn!(target: "waymark_engine::session", "host timed out");
                self.notice(SessionNotice::HostTimedOut);
                self.transition(SessionState::HostFail);
            }
        }
        if let Some((_, deadline)) = self.inflight_resolve {
            if now >= deadline {
                self.inflight_resolve = None;
                if let Some(token) = self.resolve_cancel.take() {
                    token.cancel();
                }
                self.pending_route = None;
                warn!(target: "waymark_engine::session", "resolve timed out");
                self.notice(SessionNotice::ResolveTimedOut);
                self.transition(SessionState::ResolveFail);
            }
        }
    }

    fn finish_resolve(&mut self, anchor_pose: Pose) {
        let Some(route) = self.pending_route.take() else {
            warn!(target: "waymark_engine::session", "resolve completion without a pending route");
            return;
        };
        for candidate in self.search.drain() {
            self.surface.detach(candidate.arrow);
            self.surface.detach(candidate.node);
        }
        if let Some(node) = self.preview_node.take() {
            self.surface.detach(node);
        }

        let anchor_node = self.surface.attach_node(
            None,
            LocalTransform::at(anchor_pose.position),
            MarkerKind::Anchor,
        );
        for marker in &route.points_list {
            let node = self.surface.attach_node(
                Some(anchor_node),
                LocalTransform {
                    position: marker.position(),
                    rotation_euler: marker.rotation_euler(),
                    scale: marker.scale,
                },
                marker.model,
            );
            self.marker_nodes.push(node);
        }
        self.anchor_node = Some(anchor_node);
        self.anchor_pose = Some(anchor_pose);
        self.cloud_anchor_id = Some(route.cloud_anchor_id.clone());
        self.notice(SessionNotice::RouteResolved {
            marker_count: route.points_list.len(),
        });
        self.transition(SessionState::ResolveSuccess);
    }

    fn search_frame(&mut self) {
        let Some(camera_geo) = self.tracking.geospatial_pose() else {
            return;
        };
        let quality = self.tracking.tracking_quality();
        let accurate = self.config.ignore_accuracy
            || quality.horizontal_m < self.config.search_accuracy_limit_m;
        if accurate
            && self.inflight_fetch.is_none()
            && self
                .search
                .should_refetch(&camera_geo, self.config.refetch_distance_m)
        {
            let request = self.next_request();
            let token = CancellationToken::new();
            self.store.fetch_near(
                camera_geo.latitude,
                camera_geo.longitude,
                self.config.search_radius_m,
                FetchCompletion::new(self.sink(), request),
                token.clone(),
            );
            self.inflight_fetch = Some(request);
            self.fetch_cancel = Some(token);
            self.search.record_fetch(camera_geo);
        }

        // Arrows only help from a distance; up close they obscure the anchor.
        let camera = self.tracking.camera_pose();
        let arrows: Vec<(NodeHandle, bool)> = self
            .search
            .iter()
            .map(|candidate| {
                let distance = euclidean_distance(&camera.position, &candidate.world_position);
                (candidate.arrow, distance >= self.config.preview_arrow_distance)
            })
            .collect();
        for (arrow, visible) in arrows {
            self.surface.set_visible(arrow, visible);
        }
    }

    fn materialize_place(&mut self, place: PlaceRecord) {
        if self.search.contains(&place.id) {
            return;
        }
        let Some(camera_geo) = self.tracking.geospatial_pose() else {
            return;
        };
        let camera = self.tracking.camera_pose();
        let world_position = camera.position + geo_to_local_enu(&camera_geo, &place.geo);
        let node = self.surface.attach_node(
            None,
            LocalTransform::at(world_position),
            MarkerKind::AnchorPreview,
        );
        let arrow = self.surface.attach_node(
            Some(node),
            LocalTransform::at(Vector3::new(0.0, 2.0, 0.0)),
            MarkerKind::AnchorSearchArrow,
        );
        debug!(target: "waymark_engine::session", "materialized candidate {}", place.id);
        self.search.insert(AnchorCandidate {
            place,
            node,
            arrow,
            world_position,
        });
    }

    fn navigate_frame(&mut self) {
        if !matches!(
            self.state,
            SessionState::ResolveAble
                | SessionState::ResolveButNotReady
                | SessionState::Resolving
                | SessionState::ResolveFail
        ) {
            return;
        }
        let SessionMode::Navigate { place } = &self.mode else {
            return;
        };
        let target_geo = place.geo;

        if let Some(camera_geo) = self.tracking.geospatial_pose() {
            if self.preview_node.is_none() {
                let quality = self.tracking.tracking_quality();
                let accurate = self.config.ignore_accuracy
                    || quality.horizontal_m < self.config.horizontal_accuracy_limit_m;
                if accurate {
                    let camera = self.tracking.camera_pose();
                    let world = camera.position + geo_to_local_enu(&camera_geo, &target_geo);
                    let preview = self.surface.attach_node(
                        None,
                        LocalTransform::at(world),
                        MarkerKind::AnchorPreview,
                    );
                    // Floating arrow above the preview so it reads from afar.
                    self.surface.attach_node(
                        Some(preview),
                        LocalTransform::at(Vector3::new(0.0, 2.0, 0.0)),
                        MarkerKind::AnchorPreviewArrow,
                    );
                    self.preview_node = Some(preview);
                    self.preview_world = Some(world);
                }
            }
            if !self.too_far_notified
                && great_circle_distance_m(&camera_geo, &target_geo) > self.config.render_distance_m
            {
                self.too_far_notified = true;
                self.notice(SessionNotice::TooFarFromPlace);
            }
        }

        if let Some(world) = self.preview_world {
            let camera = self.tracking.camera_pose();
            let direction = self.projector(&camera).offscreen_direction(&Point3::from(world));
            self.events
                .push_back(SessionEvent::OffscreenIndicator(direction));
        }
    }

    fn reset_placement(&mut self) {
        for node in self.marker_nodes.drain(..) {
            self.surface.detach(node);
        }
        if let Some(node) = self.anchor_node.take() {
            self.surface.detach(node);
        }
        if let Some(token) = self.host_cancel.take() {
            token.cancel();
        }
        self.inflight_host = None;
        self.gate = None;
        self.anchor_pose = None;
        self.anchor_geo = None;
        self.cloud_anchor_id = None;
        self.draft.clear();
    }
}
