//! Domain layer - pure types and rules with no I/O.
//!
//! - `session_state` - session lifecycle state machine
//! - `event_filter` - which event types are dispatched
//! - `delivery` - one inbound delivery and the headers it arrives with
//! - `github_event` - typed view over payloads for collaborators
//! - `signature` - HMAC-SHA256 delivery verification

pub mod delivery;
pub mod event_filter;
pub mod github_event;
pub mod session_state;
pub mod signature;

pub use delivery::{Delivery, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER};
pub use event_filter::{EventFilter, WILDCARD};
pub use github_event::GitHubEvent;
pub use session_state::{InvalidTransition, SessionState, SessionTransition};
pub use signature::{DeliveryVerifier, VerificationError};
