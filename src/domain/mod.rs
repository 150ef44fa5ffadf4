//! Domain layer types and invariants.

pub mod error;
pub mod projects;
pub mod users;
