//! Persistence of scored passengers, keyed by passenger id.

mod dynamo;
#[cfg(test)]
pub mod memory;

pub use dynamo::DynamoStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{operation} failed: {message}")]
    Unavailable { operation: &'static str, message: String },
    #[error("stored item {id} is malformed: {message}")]
    Decode { id: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerRecord {
    pub id: String,
    /// The scoring request exactly as submitted.
    pub features: Value,
    #[serde(with = "rust_decimal::serde::float")]
    pub prediction: Decimal,
}

/// One page of a table scan. `next` is the id to resume after.
#[derive(Debug, Default)]
pub struct ScanPage {
    pub records: Vec<PassengerRecord>,
    pub next: Option<String>,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<PassengerRecord>, StoreError>;

    /// Overwrites any record with the same id.
    async fn put(&self, record: &PassengerRecord) -> Result<(), StoreError>;

    /// Returns the removed record, or `None` if nothing was stored under `id`.
    async fn delete(&self, id: &str) -> Result<Option<PassengerRecord>, StoreError>;

    async fn scan_page(&self, cursor: Option<String>) -> Result<ScanPage, StoreError>;

    /// Follows continuation tokens until the store reports no more pages.
    async fn scan_all(&self) -> Result<Vec<PassengerRecord>, StoreError> {
        let mut records = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.scan_page(cursor).await?;
            records.extend(page.records);
            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(records),
            }
        }
    }
}
