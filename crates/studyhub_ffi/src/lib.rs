//! Flutter-facing FFI surface of the StudyHub reminder core.

pub mod api;
