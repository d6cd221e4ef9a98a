//! Survival classifier and the cold-start loader that pulls it from S3.
//!
//! The artifact is a JSON logistic-regression export: the feature names in
//! the order the coefficients expect them, one coefficient per feature and
//! an intercept.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("failed to fetch s3://{bucket}/{key}: {message}")]
    Fetch { bucket: String, key: String, message: String },
    #[error("scratch file {path}: {source}")]
    Scratch { path: String, source: std::io::Error },
    #[error("model artifact is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("model artifact rejected: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PredictionError {
    #[error("expected {expected} features, got {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("feature {field} is not numeric")]
    NonNumeric { field: String },
    #[error("model produced a non-finite score")]
    NonFinite,
}

/// A loaded classifier. Declares the feature names it expects, in order.
pub trait Predictor: Send + Sync {
    fn feature_names(&self) -> &[String];

    /// Probability of the positive class (survival).
    fn predict_probability(&self, features: &[f64]) -> Result<f64, PredictionError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    feature_names: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticModel {
    pub fn new(
        feature_names: Vec<String>,
        coefficients: Vec<f64>,
        intercept: f64,
    ) -> Result<Self, ModelLoadError> {
        let model = LogisticModel { feature_names, coefficients, intercept };
        model.validate()?;
        Ok(model)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelLoadError> {
        let raw: LogisticModel = serde_json::from_slice(bytes)?;
        Self::new(raw.feature_names, raw.coefficients, raw.intercept)
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        if self.feature_names.is_empty() {
            return Err(ModelLoadError::Invalid("no features declared".into()));
        }
        if self.coefficients.len() != self.feature_names.len() {
            return Err(ModelLoadError::Invalid(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                self.feature_names.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.feature_names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(ModelLoadError::Invalid(format!("duplicate feature {dup}")));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelLoadError::Invalid("non-finite parameter".into()));
        }
        Ok(())
    }
}

impl Predictor for LogisticModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_probability(&self, features: &[f64]) -> Result<f64, PredictionError> {
        if features.len() != self.coefficients.len() {
            return Err(PredictionError::Arity {
                expected: self.coefficients.len(),
                actual: features.len(),
            });
        }
        let z = self.intercept
            + self.coefficients.iter().zip(features).map(|(w, x)| w * x).sum::<f64>();
        if !z.is_finite() {
            return Err(PredictionError::NonFinite);
        }
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

/// Where model artifacts come from.
#[async_trait]
pub trait BlobSource: Send + Sync {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ModelLoadError>;
}

pub struct S3BlobSource {
    client: aws_sdk_s3::Client,
}

impl S3BlobSource {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        S3BlobSource { client }
    }
}

#[async_trait]
impl BlobSource for S3BlobSource {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ModelLoadError> {
        let fetch_error = |message: String| ModelLoadError::Fetch {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        };

        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| fetch_error(aws_sdk_s3::error::DisplayErrorContext(e).to_string()))?;

        let bytes = object.body.collect().await.map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }
}

/// Downloads the artifact to `scratch`, overwriting any previous copy, then
/// deserializes it from there. Safe to call again after a failure.
pub async fn load_predictor(
    source: &dyn BlobSource,
    bucket: &str,
    key: &str,
    scratch: &Path,
) -> Result<Arc<dyn Predictor>, ModelLoadError> {
    let scratch_error = |e: std::io::Error| ModelLoadError::Scratch {
        path: scratch.display().to_string(),
        source: e,
    };

    let bytes = source.fetch(bucket, key).await?;
    tokio::fs::write(scratch, &bytes).await.map_err(scratch_error)?;
    let stored = tokio::fs::read(scratch).await.map_err(scratch_error)?;

    let model = LogisticModel::from_json(&stored)?;
    tracing::info!(bucket, key, features = model.feature_names.len(), "model loaded");
    Ok(Arc::new(model))
}
