//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the persistence contracts the reminder scheduler depends on.
//! - Isolate SQLite query details from scheduling logic.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod reminder_store;
