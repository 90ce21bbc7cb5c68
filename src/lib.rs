//! Library crate for pp-recalc, exposing the recalculation pipeline to the binary and tests.

/// Runtime configuration.
pub mod config;
/// Storage backends and the domain model.
pub mod dao;
/// Errors of a unit of recalculation work.
pub mod error;
/// Recalculation services.
pub mod services;
/// Shared application state.
pub mod state;

#[cfg(test)]
mod testing;
