//! Reference implementations of the collaborator contracts, used by the
//! engine's tests and by replay tooling. Real deployments substitute the
//! platform's AR runtime, cloud anchor API, and HTTP place store.

mod clock;
mod cloud;
mod store;
mod surface;
mod tracking;

pub use clock::ManualClock;
pub use cloud::{ScriptedCloudAnchors, ScriptedOutcome};
pub use store::MemoryPlaceStore;
pub use surface::{NodeRecord, RecordingSurface};
pub use tracking::ScriptedTracking;
