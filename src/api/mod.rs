pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::ml::PredictorService;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<PredictorService>,
}

impl AppState {
    pub fn new(predictor: Arc<PredictorService>) -> Self {
        Self { predictor }
    }
}
