//! Frame-driven anchor session: the state machine that takes a user from
//! "scanning the floor" to a hosted, shareable route, and back again from a
//! stored route to markers overlaid on the camera feed.
//!
//! The session is polled once per rendered frame by the embedding screen. All
//! state lives on that frame thread; asynchronous boundary work (cloud anchor
//! hosting/resolving, place fetches) reports back through a thread-safe queue
//! the frame loop drains.

pub mod events;
pub mod search;
pub mod session;

pub use events::{SessionEvent, SessionNotice};
pub use search::{AnchorCandidate, SearchIndex};
pub use session::{ArSession, RouteHandoff, SessionConfig, SessionMode, SessionState};
