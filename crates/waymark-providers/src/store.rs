use std::sync::{Arc, Mutex};

use log::debug;
use waymark_core::contracts::{
    CancellationToken, FetchCompletion, PlaceRecord, PlaceStore, StoreError,
};
use waymark_core::geo::{great_circle_distance_m, GeoCoordinate};

#[derive(Debug, Default)]
struct Inner {
    places: Vec<PlaceRecord>,
    defer_fetches: bool,
    pending: Vec<(FetchCompletion, Vec<PlaceRecord>)>,
    last_cancel: Option<CancellationToken>,
}

/// In-memory place store with real radius filtering. Fetches complete
/// immediately by default; `set_defer_fetches` parks them for tests that
/// need delivery at a chosen moment.
#[derive(Debug, Clone)]
pub struct MemoryPlaceStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryPlaceStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn with_places(places: Vec<PlaceRecord>) -> Self {
        let store = Self::new();
        store.inner.lock().expect("store lock").places = places;
        store
    }

    pub fn set_defer_fetches(&self, defer: bool) {
        self.inner.lock().expect("store lock").defer_fetches = defer;
    }

    pub fn release_next_fetch(&self) {
        let entry = {
            let mut inner = self.inner.lock().expect("store lock");
            if inner.pending.is_empty() {
                None
            } else {
                Some(inner.pending.remove(0))
            }
        };
        if let Some((completion, places)) = entry {
            completion.deliver(places);
        }
    }

    pub fn last_cancel_token(&self) -> Option<CancellationToken> {
        self.inner.lock().expect("store lock").last_cancel.clone()
    }

    pub fn place_count(&self) -> usize {
        self.inner.lock().expect("store lock").places.len()
    }
}

impl Default for MemoryPlaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaceStore for MemoryPlaceStore {
    fn fetch_near(
        &mut self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
        completion: FetchCompletion,
        cancel: CancellationToken,
    ) {
        let mut inner = self.inner.lock().expect("store lock");
        inner.last_cancel = Some(cancel);
        let origin = GeoCoordinate::new(latitude, longitude, 0.0, 0.0);
        let nearby: Vec<PlaceRecord> = inner
            .places
            .iter()
            .filter(|place| great_circle_distance_m(&origin, &place.geo) <= radius_m)
            .cloned()
            .collect();
        debug!(
            target: "waymark_providers::store",
            "fetch_near ({latitude:.5}, {longitude:.5}) r={radius_m}m -> {} places",
            nearby.len()
        );
        if inner.defer_fetches {
            inner.pending.push((completion, nearby));
        } else {
            drop(inner);
            completion.deliver(nearby);
        }
    }

    fn upload(&mut self, place: &PlaceRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.places.push(place.clone());
        Ok(())
    }

    fn update(&mut self, place: &PlaceRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        match inner.places.iter_mut().find(|p| p.id == place.id) {
            Some(existing) => {
                *existing = place.clone();
                Ok(())
            }
            None => Err(StoreError::UnknownId(place.id.clone())),
        }
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        let before = inner.places.len();
        inner.places.retain(|p| p.id != id);
        if inner.places.len() == before {
            return Err(StoreError::UnknownId(id.to_string()));
        }
        Ok(())
    }
}
