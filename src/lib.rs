//! False alarm classifier for child-protection signalements.
//!
//! Trains a random forest over text, categorical and score features, persists
//! the fitted pipeline, and serves predictions over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod observability;

pub use error::{AppError, Result};
