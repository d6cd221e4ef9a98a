//! Request-level failures and their mapping onto response envelopes.

use crate::model::PredictionError;
use crate::response::{self, Envelope};
use crate::scoring::ScoreError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("ID: {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Upstream(#[from] StoreError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::Validation(_) => 400,
            ApiError::Upstream(_) | ApiError::Prediction(_) => 500,
        }
    }

    /// Logs at the level the failure deserves and renders it.
    pub fn into_envelope(self, operation: &'static str) -> Envelope {
        match &self {
            ApiError::NotFound(id) => tracing::info!(operation, id = %id, "record not found"),
            ApiError::Validation(reason) => {
                tracing::warn!(operation, reason = %reason, "rejected request")
            }
            ApiError::Upstream(e) => tracing::error!(operation, error = %e, "store unavailable"),
            ApiError::Prediction(e) => tracing::error!(operation, error = %e, "prediction failed"),
        }
        response::message(self.status_code(), &self.to_string())
    }
}

impl From<ScoreError> for ApiError {
    fn from(e: ScoreError) -> Self {
        match e {
            ScoreError::InvalidBody | ScoreError::MissingField(_) => {
                ApiError::Validation(e.to_string())
            }
            ScoreError::Prediction(e) => ApiError::Prediction(e),
            ScoreError::Store(e) => ApiError::Upstream(e),
        }
    }
}
