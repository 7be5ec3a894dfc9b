//! Shared error types for AuthBroker

pub mod errors;

pub use errors::{AppError, AppResult};
