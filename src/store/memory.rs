use super::{PassengerRecord, RecordStore, ScanPage, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process stand-in for the table. Scans are paged like DynamoDB's.
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, PassengerRecord>>,
    page_size: usize,
    unavailable: AtomicBool,
    scan_calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_page_size(100)
    }
}

impl MemoryStore {
    pub fn with_page_size(page_size: usize) -> Self {
        MemoryStore {
            records: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            unavailable: AtomicBool::new(false),
            scan_calls: AtomicUsize::new(0),
        }
    }

    /// Makes every following call fail as if the table were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable { operation, message: "connection refused".into() });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<PassengerRecord>, StoreError> {
        self.check("GetItem")?;
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    async fn put(&self, record: &PassengerRecord) -> Result<(), StoreError> {
        self.check("PutItem")?;
        self.records.lock().unwrap().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<Option<PassengerRecord>, StoreError> {
        self.check("DeleteItem")?;
        Ok(self.records.lock().unwrap().remove(id))
    }

    async fn scan_page(&self, cursor: Option<String>) -> Result<ScanPage, StoreError> {
        self.check("Scan")?;
        self.scan_calls.fetch_add(1, Ordering::SeqCst);

        let records = self.records.lock().unwrap();
        let lower = match &cursor {
            Some(after) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };
        let page: Vec<PassengerRecord> = records
            .range((lower, Bound::Unbounded))
            .take(self.page_size)
            .map(|(_, record)| record.clone())
            .collect();

        // DynamoDB hands back a key whenever the page filled up, even if nothing follows
        let next = (page.len() == self.page_size).then(|| page[page.len() - 1].id.clone());
        Ok(ScanPage { records: page, next })
    }
}
