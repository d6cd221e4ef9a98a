use std::env;
use std::path::PathBuf;

const DEFAULT_SCRATCH_PATH: &str = "/tmp/model.json";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
}

// Resolved once per Lambda container at cold start
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub table_name: String,
    pub bucket_name: String,
    pub model_key: String,
    pub scratch_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    // Each setting has a primary name and the name older deployments used
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |primary: &'static str, fallback: &str| {
            lookup(primary)
                .or_else(|| lookup(fallback))
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(primary))
        };

        Ok(Config {
            table_name: required("TABLE_NAME", "DYNAMODB_TABLE")?,
            bucket_name: required("BUCKET_NAME", "S3_BUCKET_NAME")?,
            model_key: required("MODEL_KEY", "S3_MODEL_KEY")?,
            scratch_path: lookup("MODEL_SCRATCH_PATH")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_PATH)),
        })
    }
}
