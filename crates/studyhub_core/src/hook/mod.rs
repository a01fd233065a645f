//! Notification state hook.
//!
//! # Responsibility
//! - Own the client-observed `NotificationState` and its lifecycle.
//! - Compose bridge, push registration, scheduler and bus behind one surface.
//!
//! # Invariants
//! - State changes only through `state::reduce`.
//! - Sign-out clears the token and permission flag after server cleanup.

pub mod center;
pub mod deep_link;
pub mod state;

pub use center::{CenterDeps, NotificationCenter};
pub use deep_link::{parse_deep_link, DeepLink};
pub use state::{reduce, Interaction, LastNotification, NotificationAction, NotificationState};
