//! Repository interfaces consumed by the engine.
//!
//! Persistence itself is a collaborator: the engine only needs these narrow
//! traits. `MemoryStore` is the reference implementation backing the test
//! suite, with the same visibility semantics a database would provide.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;

use crate::errors::Result;
use crate::model::{Mortgage, MortgagePayment, MortgageTerm, PrimeRateEntry};
use crate::types::{MortgageId, PaymentId, TermId, UserId};

/// mortgage records
pub trait MortgageStore: Send + Sync {
    fn find_by_id(&self, id: MortgageId) -> Result<Option<Mortgage>>;
    fn find_by_user(&self, user_id: UserId) -> Result<Vec<Mortgage>>;
    fn insert(&self, mortgage: Mortgage) -> Result<()>;
    fn update(&self, mortgage: &Mortgage) -> Result<()>;
    fn delete(&self, id: MortgageId) -> Result<()>;
}

/// term records
pub trait TermStore: Send + Sync {
    fn find_by_id(&self, id: TermId) -> Result<Option<MortgageTerm>>;
    fn find_by_mortgage(&self, mortgage_id: MortgageId) -> Result<Vec<MortgageTerm>>;
    /// every term across every mortgage, for the prime-rate fan-out
    fn find_all(&self) -> Result<Vec<MortgageTerm>>;
    fn insert(&self, term: MortgageTerm) -> Result<()>;
    fn update(&self, term: &MortgageTerm) -> Result<()>;
    fn delete(&self, id: TermId) -> Result<()>;
    fn delete_by_mortgage(&self, mortgage_id: MortgageId) -> Result<()>;
}

/// payment records (append-only)
pub trait PaymentStore: Send + Sync {
    fn find_by_mortgage(&self, mortgage_id: MortgageId) -> Result<Vec<MortgagePayment>>;
    fn find_by_term(&self, term_id: TermId) -> Result<Vec<MortgagePayment>>;
    fn insert(&self, payment: MortgagePayment) -> Result<()>;
    /// all-or-nothing batch insert; implementations must not commit partially
    fn insert_many(&self, payments: Vec<MortgagePayment>) -> Result<()>;
    fn delete_by_term(&self, term_id: TermId) -> Result<()>;
    fn delete_by_mortgage(&self, mortgage_id: MortgageId) -> Result<()>;
}

/// prime rate history (append-only, at most one entry per effective date)
pub trait PrimeRateStore: Send + Sync {
    fn find_latest(&self) -> Result<Option<PrimeRateEntry>>;
    fn exists_for_date(&self, effective_date: NaiveDate) -> Result<bool>;
    fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PrimeRateEntry>>;
    fn insert(&self, entry: PrimeRateEntry) -> Result<()>;
}

/// in-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    mortgages: RwLock<HashMap<MortgageId, Mortgage>>,
    terms: RwLock<HashMap<TermId, MortgageTerm>>,
    payments: RwLock<HashMap<PaymentId, MortgagePayment>>,
    prime_rates: RwLock<Vec<PrimeRateEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
        lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
        lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MortgageStore for MemoryStore {
    fn find_by_id(&self, id: MortgageId) -> Result<Option<Mortgage>> {
        Ok(Self::read(&self.mortgages).get(&id).cloned())
    }

    fn find_by_user(&self, user_id: UserId) -> Result<Vec<Mortgage>> {
        Ok(Self::read(&self.mortgages)
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    fn insert(&self, mortgage: Mortgage) -> Result<()> {
        Self::write(&self.mortgages).insert(mortgage.id, mortgage);
        Ok(())
    }

    fn update(&self, mortgage: &Mortgage) -> Result<()> {
        Self::write(&self.mortgages).insert(mortgage.id, mortgage.clone());
        Ok(())
    }

    fn delete(&self, id: MortgageId) -> Result<()> {
        Self::write(&self.mortgages).remove(&id);
        Ok(())
    }
}

impl TermStore for MemoryStore {
    fn find_by_id(&self, id: TermId) -> Result<Option<MortgageTerm>> {
        Ok(Self::read(&self.terms).get(&id).cloned())
    }

    fn find_by_mortgage(&self, mortgage_id: MortgageId) -> Result<Vec<MortgageTerm>> {
        let mut terms: Vec<_> = Self::read(&self.terms)
            .values()
            .filter(|t| t.mortgage_id == mortgage_id)
            .cloned()
            .collect();
        terms.sort_by_key(|t| t.start_date);
        Ok(terms)
    }

    fn find_all(&self) -> Result<Vec<MortgageTerm>> {
        Ok(Self::read(&self.terms).values().cloned().collect())
    }

    fn insert(&self, term: MortgageTerm) -> Result<()> {
        Self::write(&self.terms).insert(term.id, term);
        Ok(())
    }

    fn update(&self, term: &MortgageTerm) -> Result<()> {
        Self::write(&self.terms).insert(term.id, term.clone());
        Ok(())
    }

    fn delete(&self, id: TermId) -> Result<()> {
        Self::write(&self.terms).remove(&id);
        Ok(())
    }

    fn delete_by_mortgage(&self, mortgage_id: MortgageId) -> Result<()> {
        Self::write(&self.terms).retain(|_, t| t.mortgage_id != mortgage_id);
        Ok(())
    }
}

impl PaymentStore for MemoryStore {
    fn find_by_mortgage(&self, mortgage_id: MortgageId) -> Result<Vec<MortgagePayment>> {
        let mut payments: Vec<_> = Self::read(&self.payments)
            .values()
            .filter(|p| p.mortgage_id == mortgage_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.payment_date);
        Ok(payments)
    }

    fn find_by_term(&self, term_id: TermId) -> Result<Vec<MortgagePayment>> {
        let mut payments: Vec<_> = Self::read(&self.payments)
            .values()
            .filter(|p| p.term_id == term_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.payment_date);
        Ok(payments)
    }

    fn insert(&self, payment: MortgagePayment) -> Result<()> {
        Self::write(&self.payments).insert(payment.id, payment);
        Ok(())
    }

    fn insert_many(&self, payments: Vec<MortgagePayment>) -> Result<()> {
        // single write guard held across the whole batch: all or nothing
        let mut map = Self::write(&self.payments);
        for payment in payments {
            map.insert(payment.id, payment);
        }
        Ok(())
    }

    fn delete_by_term(&self, term_id: TermId) -> Result<()> {
        Self::write(&self.payments).retain(|_, p| p.term_id != term_id);
        Ok(())
    }

    fn delete_by_mortgage(&self, mortgage_id: MortgageId) -> Result<()> {
        Self::write(&self.payments).retain(|_, p| p.mortgage_id != mortgage_id);
        Ok(())
    }
}

impl PrimeRateStore for MemoryStore {
    fn find_latest(&self) -> Result<Option<PrimeRateEntry>> {
        Ok(Self::read(&self.prime_rates)
            .iter()
            .max_by_key(|e| e.effective_date)
            .cloned())
    }

    fn exists_for_date(&self, effective_date: NaiveDate) -> Result<bool> {
        Ok(Self::read(&self.prime_rates)
            .iter()
            .any(|e| e.effective_date == effective_date))
    }

    fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PrimeRateEntry>> {
        let mut entries: Vec<_> = Self::read(&self.prime_rates)
            .iter()
            .filter(|e| e.effective_date >= start && e.effective_date <= end)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.effective_date);
        Ok(entries)
    }

    fn insert(&self, entry: PrimeRateEntry) -> Result<()> {
        Self::write(&self.prime_rates).push(entry);
        Ok(())
    }
}
