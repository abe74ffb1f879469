//! Shared error types for Songbar

pub mod errors;

pub use errors::{AppError, AppResult};
