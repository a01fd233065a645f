//! Event bus and listener primitives.
//!
//! # Responsibility
//! - Decouple producers of notification-worthy events from consumers.
//! - Provide the listener registry reused by bridge and identity channels.
//!
//! # Invariants
//! - Delivery is synchronous; `publish` returns after every listener ran.
//! - Listener panics never reach the publisher or sibling listeners.

pub mod bus;
pub mod listeners;

pub use bus::{BusEvent, EventBus, EventKind, EventPayload};
pub use listeners::{DispatchReport, ListenerSet, Subscription};
