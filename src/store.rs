use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    /// Automatic delivery failed; an administrator has to hand the kit out.
    ManualReview { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    /// Opaque order id, usually the payment id from the store front.
    pub id: String,
    pub destination: String,
    pub kit: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
}

impl DeliveryRecord {
    pub fn new(id: &str, destination: &str, kit: &str) -> Self {
        DeliveryRecord {
            id: id.to_owned(),
            destination: destination.to_owned(),
            kit: kit.to_owned(),
            status: DeliveryStatus::Pending,
            attempts: 0,
        }
    }
}

/// Persistence for delivery outcomes. Implementations must be safe to share
/// between concurrent deliveries.
pub trait DeliveryStore: Send + Sync {
    fn get(&self, id: &str) -> Option<DeliveryRecord>;
    fn put(&self, record: DeliveryRecord);
    fn delete(&self, id: &str) -> Option<DeliveryRecord>;
}

/// Keeps everything in memory. Good enough for tests and single-process
/// setups that don't care about restarts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, DeliveryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records waiting for an administrator.
    pub fn manual_review(&self) -> Vec<DeliveryRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<_> = records
            .values()
            .filter(|r| matches!(r.status, DeliveryStatus::ManualReview { .. }))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending
    }
}

impl DeliveryStore for MemoryStore {
    fn get(&self, id: &str) -> Option<DeliveryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn put(&self, record: DeliveryRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
    }

    fn delete(&self, id: &str) -> Option<DeliveryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}
