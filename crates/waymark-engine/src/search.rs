//! Candidate bookkeeping for search mode: every nearby place gets a preview
//! anchor in the world, and the session picks the best one to resolve.

use nalgebra::{Point3, Vector3};

use waymark_core::contracts::{NodeHandle, PlaceRecord};
use waymark_core::geo::{great_circle_distance_m, euclidean_distance, GeoCoordinate};
use waymark_core::projection::PoseProjector;

/// One materialized nearby place: its record, its preview nodes, and where
/// the preview sits in render space.
#[derive(Debug, Clone)]
pub struct AnchorCandidate {
    pub place: PlaceRecord,
    /// Preview anchor model.
    pub node: NodeHandle,
    /// Arrow child pointing the user at the preview; hidden up close.
    pub arrow: NodeHandle,
    pub world_position: Vector3<f32>,
}

/// The set of live candidates plus the fetch origin that produced them.
#[derive(Debug, Default)]
pub struct SearchIndex {
    candidates: Vec<AnchorCandidate>,
    last_fetch_origin: Option<GeoCoordinate>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, place_id: &str) -> bool {
        self.candidates.iter().any(|c| c.place.id == place_id)
    }

    pub fn insert(&mut self, candidate: AnchorCandidate) {
        self.candidates.push(candidate);
    }

    pub fn remove(&mut self, place_id: &str) -> Option<AnchorCandidate> {
        let index = self.candidates.iter().position(|c| c.place.id == place_id)?;
        Some(self.candidates.remove(index))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnchorCandidate> {
        self.candidates.iter()
    }

    /// Removes and returns every candidate, e.g. when one of them resolves
    /// and the rest must be torn down.
    pub fn drain(&mut self) -> Vec<AnchorCandidate> {
        std::mem::take(&mut self.candidates)
    }

    /// The nearest candidate that is both inside the camera frustum and
    /// within `max_distance`. Ties go to the earlier-fetched candidate, which
    /// is acceptable nondeterminism at float granularity.
    pub fn nearest_visible(
        &self,
        projector: &PoseProjector,
        camera_position: &Vector3<f32>,
        max_distance: f32,
    ) -> Option<&AnchorCandidate> {
        let mut best: Option<(&AnchorCandidate, f32)> = None;
        for candidate in &self.candidates {
            if !projector.is_in_frustum(&Point3::from(candidate.world_position)) {
                continue;
            }
            let distance = euclidean_distance(camera_position, &candidate.world_position);
            if distance > max_distance {
                continue;
            }
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((candidate, distance)),
            }
        }
        best.map(|(candidate, _)| candidate)
    }

    pub fn record_fetch(&mut self, origin: GeoCoordinate) {
        self.last_fetch_origin = Some(origin);
    }

    /// True until a fetch has happened, then again once the user has moved
    /// far enough from the last fetch origin.
    pub fn should_refetch(&self, current: &GeoCoordinate, refetch_distance_m: f64) -> bool {
        match &self.last_fetch_origin {
            Some(origin) => great_circle_distance_m(origin, current) > refetch_distance_m,
            None => true,
        }
    }
}
