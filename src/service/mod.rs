//! Service layer for the rating service
//!
//! Wires configuration, storage, the rating model and the pipeline together.

pub mod app;

pub use app::{AppState, ServiceError};
