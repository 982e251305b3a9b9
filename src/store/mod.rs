use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::errors::{AppError, Result};
use crate::models::donation::{Donation, DonationStatus};

/// Keyed collection of donation records. The only mutation path after insert
/// is `compare_and_transition`, which must be atomic per donation id so the
/// webhook and sync paths cannot both win the pending -> paid flip.
#[async_trait]
pub trait DonationStore: Send + Sync {
    async fn insert(&self, donation: Donation) -> Result<()>;

    async fn get(&self, id: &str) -> Option<Donation>;

    async fn get_by_transaction_id(&self, transaction_id: &str) -> Option<Donation>;

    /// Flips `id` from `expected` to `new` and reports whether the flip was
    /// applied. Returns false when the record is missing or already past
    /// `expected`. Flipping to `Paid` stamps `paid_at`.
    async fn compare_and_transition(
        &self,
        id: &str,
        expected: DonationStatus,
        new: DonationStatus,
    ) -> bool;
}

#[derive(Default)]
struct Inner {
    donations: HashMap<String, Donation>,
    // transaction id -> donation id
    transaction_index: HashMap<String, String>,
}

/// Volatile in-memory store. A single RwLock serializes mutations; it is held
/// only around the map operations themselves, never across I/O.
#[derive(Default)]
pub struct InMemoryDonationStore {
    inner: RwLock<Inner>,
}

impl InMemoryDonationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DonationStore for InMemoryDonationStore {
    async fn insert(&self, donation: Donation) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.transaction_index.contains_key(&donation.transaction_id) {
            return Err(AppError::DuplicateTransaction(donation.transaction_id));
        }
        if inner.donations.contains_key(&donation.id) {
            return Err(AppError::DuplicateTransaction(donation.id));
        }
        inner
            .transaction_index
            .insert(donation.transaction_id.clone(), donation.id.clone());
        inner.donations.insert(donation.id.clone(), donation);
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<Donation> {
        self.inner.read().unwrap().donations.get(id).cloned()
    }

    async fn get_by_transaction_id(&self, transaction_id: &str) -> Option<Donation> {
        let inner = self.inner.read().unwrap();
        let id = inner.transaction_index.get(transaction_id)?;
        inner.donations.get(id).cloned()
    }

    async fn compare_and_transition(
        &self,
        id: &str,
        expected: DonationStatus,
        new: DonationStatus,
    ) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.donations.get_mut(id) {
            Some(donation) if donation.status == expected => {
                donation.status = new;
                if new == DonationStatus::Paid {
                    donation.paid_at = Some(Utc::now());
                }
                true
            }
            _ => false,
        }
    }
}
