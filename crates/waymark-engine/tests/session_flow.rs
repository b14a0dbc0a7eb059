//! End-to-end session scenarios against the scripted providers: authoring a
//! route from scan to confirm, navigating a stored one, and browsing nearby
//! routes in search mode.

use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};

use waymark_core::contracts::{PlaceRecord, PlaceStore, Pose, TrackingQuality};
use waymark_core::geo::{destination_point, GeoCoordinate};
use waymark_core::projection::OffscreenDirection;
use waymark_core::route::{MarkerKind, Route, RouteMarker};
use waymark_engine::{
    ArSession, SessionConfig, SessionEvent, SessionMode, SessionNotice, SessionState,
};
use waymark_providers::{
    ManualClock, MemoryPlaceStore, RecordingSurface, ScriptedCloudAnchors, ScriptedOutcome,
    ScriptedTracking,
};

type TestSession = ArSession<
    ScriptedTracking,
    ScriptedCloudAnchors,
    MemoryPlaceStore,
    RecordingSurface,
    ManualClock,
>;

struct Rig {
    session: TestSession,
    tracking: ScriptedTracking,
    cloud: ScriptedCloudAnchors,
    store: MemoryPlaceStore,
    surface: RecordingSurface,
    clock: ManualClock,
}

fn rig(mode: SessionMode, config: SessionConfig) -> Rig {
    let tracking = ScriptedTracking::new();
    let cloud = ScriptedCloudAnchors::new();
    let store = MemoryPlaceStore::new();
    let surface = RecordingSurface::new();
    let clock = ManualClock::new();
    let session = ArSession::with_config(
        config,
        mode,
        tracking.clone(),
        cloud.clone(),
        store.clone(),
        surface.clone(),
        clock.clone(),
    );
    Rig {
        session,
        tracking,
        cloud,
        store,
        surface,
        clock,
    }
}

fn good_quality() -> TrackingQuality {
    TrackingQuality {
        horizontal_m: 1.0,
        vertical_m: 1.0,
        heading_degrees: 5.0,
    }
}

fn home_geo() -> GeoCoordinate {
    GeoCoordinate::new(40.416_775, -3.703_790, 650.0, 0.0)
}

fn camera_looking_at(position: Vector3<f32>, target: Vector3<f32>) -> Pose {
    // Cameras look down -Z, so the local z axis points away from the target.
    let orientation = UnitQuaternion::face_towards(&(position - target), &Vector3::y());
    Pose {
        position,
        orientation,
    }
}

fn route_json(cloud_anchor_id: &str) -> String {
    Route {
        cloud_anchor_id: cloud_anchor_id.to_string(),
        points_list: vec![
            RouteMarker::new(
                Vector3::new(1.0, 0.0, -1.0),
                Vector3::new(0.0, 90.0, 0.0),
                MarkerKind::ArrowForward,
                1.5,
            ),
            RouteMarker::new(
                Vector3::new(2.0, 0.0, -2.0),
                Vector3::zeros(),
                MarkerKind::Target,
                1.5,
            ),
        ],
    }
    .to_json()
    .unwrap()
}

fn place_record(id: &str, geo: GeoCoordinate, route_blob: String) -> PlaceRecord {
    PlaceRecord {
        id: id.to_string(),
        name: format!("place {id}"),
        geo,
        route_blob,
    }
}

fn has_notice(events: &[SessionEvent], pred: impl Fn(&SessionNotice) -> bool) -> bool {
    events
        .iter()
        .any(|event| matches!(event, SessionEvent::Notice(notice) if pred(notice)))
}

/// Readies an author session: plane tracking on, good accuracy, a placement
/// hit two meters in front of the camera.
fn ready_author(rig: &Rig) -> Vector3<f32> {
    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));
    let placement = Vector3::new(0.0, 0.0, -2.0);
    rig.tracking.set_placement(Some(Pose::from_position(placement)));
    placement
}

/// Walks the camera around the scan ring until every segment confirms. Ends
/// with the host request issued.
fn walk_the_circle(rig: &mut Rig, center: Vector3<f32>) {
    for step in 0..10 {
        let angle = std::f32::consts::TAU * (step as f32 + 0.5) / 10.0;
        let position = Vector3::new(
            center.x + 2.0 * angle.cos(),
            center.y,
            center.z - 2.0 * angle.sin(),
        );
        rig.tracking.set_camera(camera_looking_at(position, center));
        rig.session.on_frame();
    }
}

#[test]
fn poor_accuracy_blocks_anchor_placement() {
    let mut rig = rig(SessionMode::Author, SessionConfig::default());
    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_geospatial(Some(home_geo()));
    rig.tracking
        .set_placement(Some(Pose::from_position(Vector3::new(0.0, 0.0, -2.0))));
    // Default scripted quality is far worse than the 2.5 m gate.

    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::PlaceAnchor);

    rig.session.place();
    assert_eq!(rig.session.state(), SessionState::PlaceAnchor);
    let events = rig.session.poll_events();
    assert!(has_notice(&events, |n| matches!(
        n,
        SessionNotice::GeoAccuracyTooLow
    )));
}

#[test]
fn ignore_accuracy_overrides_the_gate() {
    let config = SessionConfig {
        ignore_accuracy: true,
        ..SessionConfig::default()
    };
    let mut rig = rig(SessionMode::Author, config);
    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_geospatial(Some(home_geo()));
    rig.tracking
        .set_placement(Some(Pose::from_position(Vector3::new(0.0, 0.0, -2.0))));

    rig.session.on_frame();
    rig.session.place();
    assert_eq!(
        rig.session.state(),
        SessionState::WaitingForCircleConfirmation
    );
}

#[test]
fn authoring_flow_reaches_confirm() {
    let mut rig = rig(SessionMode::Author, SessionConfig::default());
    let placement = ready_author(&rig);

    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::PlaceAnchor);

    rig.session.place();
    assert_eq!(
        rig.session.state(),
        SessionState::WaitingForCircleConfirmation
    );

    walk_the_circle(&mut rig, placement);
    assert_eq!(rig.session.state(), SessionState::Hosting);

    // Scripted host succeeds immediately; the completion applies next frame.
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::HostSuccess);
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::PlaceObject);
    assert_eq!(rig.session.cloud_anchor_id(), Some("scripted-cloud-1"));

    rig.session.place();
    rig.session.select_model(MarkerKind::Target);
    assert_eq!(rig.session.state(), SessionState::PlaceTarget);
    rig.session.place();
    assert_eq!(rig.session.state(), SessionState::TargetPlaced);

    let handoff = rig.session.confirm().unwrap();
    assert_eq!(handoff.route.cloud_anchor_id, "scripted-cloud-1");
    assert_eq!(handoff.route.points_list.len(), 2);
    assert_eq!(handoff.route.points_list[1].model, MarkerKind::Target);
    // The anchor geo sits two meters from the camera's geospatial fix.
    let distance =
        waymark_core::geo::great_circle_distance_m(&home_geo(), &handoff.anchor_geo);
    assert!((distance - 2.0).abs() < 0.1, "anchor {distance}m away");

    let events = rig.session.poll_events();
    assert!(has_notice(&events, |n| matches!(
        n,
        SessionNotice::HostSucceeded { .. }
    )));
}

#[test]
fn host_timeout_fails_and_suppresses_late_success() {
    let mut rig = rig(SessionMode::Author, SessionConfig::default());
    let placement = ready_author(&rig);
    rig.cloud.set_host_outcome(ScriptedOutcome::Pending);

    rig.session.on_frame();
    rig.session.place();
    walk_the_circle(&mut rig, placement);
    assert_eq!(rig.session.state(), SessionState::Hosting);

    rig.clock.advance(Duration::from_millis(12_600));
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::HostFail);
    let events = rig.session.poll_events();
    assert!(has_notice(&events, |n| matches!(n, SessionNotice::HostTimedOut)));
    assert!(rig.cloud.last_cancel_token().unwrap().is_cancelled());

    // The cloud callback still fires after the deadline; it must not flip the
    // session back to success.
    rig.cloud.release_next_host(true);
    rig.session.on_frame();
    assert_ne!(rig.session.state(), SessionState::HostSuccess);
    assert_eq!(rig.session.cloud_anchor_id(), None);

    // Retrying re-places the anchor from scratch.
    rig.cloud.set_host_outcome(ScriptedOutcome::Succeed);
    rig.session.place();
    assert_eq!(
        rig.session.state(),
        SessionState::WaitingForCircleConfirmation
    );
}

#[test]
fn undo_walks_back_through_target_and_resets() {
    let mut rig = rig(SessionMode::Author, SessionConfig::default());
    let placement = ready_author(&rig);

    rig.session.on_frame();
    rig.session.place();
    walk_the_circle(&mut rig, placement);
    rig.session.on_frame();
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::PlaceObject);

    rig.session.place();
    rig.session.place();
    rig.session.select_model(MarkerKind::Target);
    rig.session.place();
    assert_eq!(rig.session.state(), SessionState::TargetPlaced);
    assert_eq!(rig.session.route_markers().len(), 3);

    rig.session.undo();
    assert_eq!(rig.session.state(), SessionState::PlaceTarget);
    assert_eq!(rig.session.route_markers().len(), 2);

    rig.session.undo();
    assert_eq!(rig.session.state(), SessionState::PlaceTarget);
    assert_eq!(rig.session.route_markers().len(), 1);

    rig.session.undo();
    assert_eq!(rig.session.state(), SessionState::PlaceAnchor);
    assert!(rig.session.route_markers().is_empty());
    assert_eq!(rig.session.cloud_anchor_id(), None);
    assert_eq!(rig.surface.live_count(), 0);
}

#[test]
fn navigate_resolves_a_stored_route() {
    let target_geo = destination_point(&home_geo(), 90.0, 10.0);
    let place = place_record("p-1", target_geo, route_json("ca-1"));
    let mut rig = rig(
        SessionMode::Navigate {
            place: place.clone(),
        },
        SessionConfig::default(),
    );

    // Resolve before plane tracking starts is deferred, not failed.
    rig.session.resolve();
    assert_eq!(rig.session.state(), SessionState::ResolveButNotReady);
    let events = rig.session.poll_events();
    assert!(has_notice(&events, |n| matches!(
        n,
        SessionNotice::TrackingNotReady
    )));

    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::ResolveAble);

    // The preview sits 10 m east with its arrow floating above; the camera
    // faces -Z, so the indicator steers right.
    rig.session.on_frame();
    assert_eq!(rig.surface.live_count_of(MarkerKind::AnchorPreview), 1);
    assert_eq!(rig.surface.live_count_of(MarkerKind::AnchorPreviewArrow), 1);
    let events = rig.session.poll_events();
    assert!(events.contains(&SessionEvent::OffscreenIndicator(
        OffscreenDirection::Right
    )));

    rig.session.resolve();
    assert_eq!(rig.session.state(), SessionState::Resolving);
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::ResolveSuccess);
    assert_eq!(rig.session.cloud_anchor_id(), Some("ca-1"));
    assert_eq!(rig.surface.live_count_of(MarkerKind::AnchorPreview), 0);
    assert_eq!(rig.surface.live_count_of(MarkerKind::AnchorPreviewArrow), 0);
    assert_eq!(rig.surface.live_count_of(MarkerKind::Anchor), 1);
    assert_eq!(rig.surface.live_count_of(MarkerKind::ArrowForward), 1);
    assert_eq!(rig.surface.live_count_of(MarkerKind::Target), 1);

    let events = rig.session.poll_events();
    assert!(has_notice(&events, |n| matches!(
        n,
        SessionNotice::RouteResolved { marker_count: 2 }
    )));
}

#[test]
fn resolve_timeout_is_retryable() {
    let target_geo = destination_point(&home_geo(), 90.0, 10.0);
    let place = place_record("p-1", target_geo, route_json("ca-1"));
    let mut rig = rig(SessionMode::Navigate { place }, SessionConfig::default());
    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));
    rig.cloud.set_resolve_outcome(ScriptedOutcome::Pending);

    rig.session.on_frame();
    rig.session.resolve();
    assert_eq!(rig.session.state(), SessionState::Resolving);

    rig.clock.advance(Duration::from_millis(12_600));
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::ResolveFail);
    let events = rig.session.poll_events();
    assert!(has_notice(&events, |n| matches!(
        n,
        SessionNotice::ResolveTimedOut
    )));

    // The stale completion from the first attempt must not resolve anything.
    rig.cloud.release_next_resolve(true);
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::ResolveFail);
    assert_eq!(rig.surface.live_count_of(MarkerKind::Anchor), 0);

    rig.cloud.set_resolve_outcome(ScriptedOutcome::Succeed);
    rig.session.resolve();
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::ResolveSuccess);
}

#[test]
fn malformed_route_is_surfaced_not_fatal() {
    let place = place_record("p-bad", home_geo(), "not a route".to_string());
    let mut rig = rig(SessionMode::Navigate { place }, SessionConfig::default());
    rig.tracking.set_plane_tracking(true);
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::ResolveAble);

    rig.session.resolve();
    assert_eq!(rig.session.state(), SessionState::ResolveAble);
    let events = rig.session.poll_events();
    assert!(has_notice(&events, |n| matches!(
        n,
        SessionNotice::MalformedRoute { place_id } if place_id == "p-bad"
    )));
}

#[test]
fn navigate_warns_once_beyond_render_distance() {
    let target_geo = destination_point(&home_geo(), 90.0, 500.0);
    let place = place_record("p-far", target_geo, route_json("ca-1"));
    let mut rig = rig(SessionMode::Navigate { place }, SessionConfig::default());
    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));

    rig.session.on_frame();
    rig.session.on_frame();
    let events = rig.session.poll_events();
    let count = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Notice(SessionNotice::TooFarFromPlace)))
        .count();
    assert_eq!(count, 1);

    rig.session.on_frame();
    let events = rig.session.poll_events();
    assert!(!has_notice(&events, |n| matches!(
        n,
        SessionNotice::TooFarFromPlace
    )));
}

#[test]
fn search_resolves_the_nearest_visible_candidate() {
    let mut rig = rig(SessionMode::Search, SessionConfig::default());
    let near = place_record(
        "near",
        destination_point(&home_geo(), 90.0, 5.0),
        route_json("ca-near"),
    );
    let far = place_record(
        "far",
        destination_point(&home_geo(), 90.0, 8.0),
        route_json("ca-far"),
    );
    rig.store.upload(&near).unwrap();
    rig.store.upload(&far).unwrap();

    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));
    // Both candidates materialize east of the camera; face them.
    rig.tracking.set_camera(camera_looking_at(
        Vector3::zeros(),
        Vector3::new(5.0, 0.0, 0.0),
    ));

    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::Searching);
    // One frame issues the fetch, the next drains its completion.
    rig.session.on_frame();
    rig.session.on_frame();
    assert_eq!(rig.session.candidate_count(), 2);
    assert_eq!(rig.surface.live_count_of(MarkerKind::AnchorPreview), 2);

    rig.session.resolve();
    assert_eq!(rig.session.state(), SessionState::Resolving);
    rig.session.on_frame();
    assert_eq!(rig.session.state(), SessionState::ResolveSuccess);
    // The nearest candidate won, and every preview was discarded.
    assert_eq!(rig.session.cloud_anchor_id(), Some("ca-near"));
    assert_eq!(rig.session.candidate_count(), 0);
    assert_eq!(rig.surface.live_count_of(MarkerKind::AnchorPreview), 0);
    assert_eq!(rig.surface.live_count_of(MarkerKind::AnchorSearchArrow), 0);
    assert_eq!(rig.surface.live_count_of(MarkerKind::Anchor), 1);
}

#[test]
fn search_arrow_hides_up_close() {
    let mut rig = rig(SessionMode::Search, SessionConfig::default());
    let close = place_record(
        "close",
        destination_point(&home_geo(), 90.0, 2.0),
        route_json("ca-close"),
    );
    let distant = place_record(
        "distant",
        destination_point(&home_geo(), 90.0, 9.0),
        route_json("ca-distant"),
    );
    rig.store.upload(&close).unwrap();
    rig.store.upload(&distant).unwrap();

    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));

    rig.session.on_frame();
    rig.session.on_frame();
    rig.session.on_frame();
    assert_eq!(rig.session.candidate_count(), 2);
    // The 2 m candidate's arrow is hidden; the 9 m one still shows.
    assert_eq!(rig.surface.live_count_of(MarkerKind::AnchorSearchArrow), 2);
    assert_eq!(rig.surface.visible_count_of(MarkerKind::AnchorSearchArrow), 1);
}

#[test]
fn search_with_nothing_in_range_is_informational() {
    let mut rig = rig(SessionMode::Search, SessionConfig::default());
    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));

    rig.session.on_frame();
    rig.session.resolve();
    assert_eq!(rig.session.state(), SessionState::Searching);
    let events = rig.session.poll_events();
    assert!(has_notice(&events, |n| matches!(
        n,
        SessionNotice::NoCandidatesInRange
    )));
}

#[test]
fn search_abandons_a_malformed_candidate() {
    let mut rig = rig(SessionMode::Search, SessionConfig::default());
    let broken = place_record(
        "broken",
        destination_point(&home_geo(), 90.0, 5.0),
        "{\"cloudAnchorId\": 42}".to_string(),
    );
    rig.store.upload(&broken).unwrap();

    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));
    rig.tracking.set_camera(camera_looking_at(
        Vector3::zeros(),
        Vector3::new(5.0, 0.0, 0.0),
    ));

    rig.session.on_frame();
    rig.session.on_frame();
    rig.session.on_frame();
    assert_eq!(rig.session.candidate_count(), 1);

    rig.session.resolve();
    assert_eq!(rig.session.state(), SessionState::Searching);
    assert_eq!(rig.session.candidate_count(), 0);
    assert_eq!(rig.surface.live_count_of(MarkerKind::AnchorPreview), 0);
    let events = rig.session.poll_events();
    assert!(has_notice(&events, |n| matches!(
        n,
        SessionNotice::MalformedRoute { place_id } if place_id == "broken"
    )));
}

#[test]
fn moving_refetches_and_never_duplicates_candidates() {
    let mut rig = rig(SessionMode::Search, SessionConfig::default());
    let nearby = place_record(
        "nearby",
        destination_point(&home_geo(), 90.0, 5.0),
        route_json("ca-a"),
    );
    // Out of the 200 m radius from home, inside it after walking east.
    let beyond = place_record(
        "beyond",
        destination_point(&home_geo(), 90.0, 210.0),
        route_json("ca-b"),
    );
    rig.store.upload(&nearby).unwrap();
    rig.store.upload(&beyond).unwrap();

    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));

    rig.session.on_frame();
    rig.session.on_frame();
    rig.session.on_frame();
    assert_eq!(rig.session.candidate_count(), 1);

    // More frames in place must not refetch into duplicates.
    rig.session.on_frame();
    rig.session.on_frame();
    assert_eq!(rig.session.candidate_count(), 1);

    let walked = destination_point(&home_geo(), 90.0, 15.0);
    rig.tracking.set_geospatial(Some(walked));
    rig.tracking
        .set_camera_position(Vector3::new(15.0, 0.0, 0.0));
    rig.session.on_frame();
    rig.session.on_frame();
    assert_eq!(rig.session.candidate_count(), 2);
}

#[test]
fn dispose_cancels_in_flight_work_and_clears_the_scene() {
    let target_geo = destination_point(&home_geo(), 90.0, 10.0);
    let place = place_record("p-1", target_geo, route_json("ca-1"));
    let mut rig = rig(SessionMode::Navigate { place }, SessionConfig::default());
    rig.tracking.set_plane_tracking(true);
    rig.tracking.set_quality(good_quality());
    rig.tracking.set_geospatial(Some(home_geo()));
    rig.cloud.set_resolve_outcome(ScriptedOutcome::Pending);

    rig.session.on_frame();
    rig.session.on_frame();
    // Preview node plus its floating arrow.
    assert_eq!(rig.surface.live_count(), 2);
    rig.session.resolve();
    assert_eq!(rig.session.state(), SessionState::Resolving);

    rig.session.dispose();
    assert!(rig.cloud.last_cancel_token().unwrap().is_cancelled());
    assert_eq!(rig.surface.live_count(), 0);

    // A disposed session ignores further frames.
    rig.cloud.release_next_resolve(true);
    rig.session.on_frame();
    assert_eq!(rig.surface.live_count(), 0);
}
