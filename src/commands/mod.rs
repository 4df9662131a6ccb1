//! CLI command implementations.

pub mod build;
pub mod setup;
pub mod sync;
