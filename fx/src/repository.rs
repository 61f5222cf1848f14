//! Durable-store trait and in-memory test implementation.
//!
//! Persistence is an external collaborator. The engine reads history and
//! pegged-currency definitions from it at startup, reloads from it before
//! going to a provider, and writes every ingested batch back to it.

use async_trait::async_trait;
use chrono::NaiveDate;

use crossrate_common::{PeggedCurrency, RateRecord};

use crate::error::FxResult;

/// Trait for the durable rate store.
#[async_trait]
pub trait RateRepository: Send + Sync {
    /// Query rates with `from` inclusive and `to` exclusive.
    async fn rates_in_range(&self, from: NaiveDate, to: NaiveDate) -> FxResult<Vec<RateRecord>>;

    /// Persist a batch of rates; idempotent on the exact tuple.
    async fn save_rates(&self, records: &[RateRecord]) -> FxResult<()>;

    /// List the configured pegged-currency definitions.
    async fn pegged_currencies(&self) -> FxResult<Vec<PeggedCurrency>>;
}

/// In-memory repository for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MemoryRateRepository {
    rates: dashmap::DashMap<RecordKey, RateRecord>,
    pegged: parking_lot::RwLock<Vec<PeggedCurrency>>,
    saves: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
type RecordKey = (
    crossrate_common::SourceId,
    crossrate_common::Frequency,
    crossrate_common::Currency,
    NaiveDate,
);

#[cfg(any(test, feature = "test-utils"))]
impl MemoryRateRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            rates: dashmap::DashMap::new(),
            pegged: parking_lot::RwLock::new(Vec::new()),
            saves: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Create a repository with pegged-currency definitions.
    pub fn with_pegged(pegged: Vec<PeggedCurrency>) -> Self {
        let repo = Self::new();
        *repo.pegged.write() = pegged;
        repo
    }

    /// Seed records directly, bypassing the save counter.
    pub fn seed(&self, records: Vec<RateRecord>) {
        for record in records {
            self.rates.insert(Self::key(&record), record);
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Check if the repository holds no records.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Number of `save_rates` calls observed.
    pub fn saves(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn key(record: &RateRecord) -> RecordKey {
        (
            record.source.clone(),
            record.frequency,
            record.currency.clone(),
            record.date,
        )
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MemoryRateRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateRepository for MemoryRateRepository {
    async fn rates_in_range(&self, from: NaiveDate, to: NaiveDate) -> FxResult<Vec<RateRecord>> {
        Ok(self
            .rates
            .iter()
            .filter(|e| e.date >= from && e.date < to)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn save_rates(&self, records: &[RateRecord]) -> FxResult<()> {
        self.saves
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        for record in records {
            self.rates.insert(Self::key(record), record.clone());
        }
        Ok(())
    }

    async fn pegged_currencies(&self) -> FxResult<Vec<PeggedCurrency>> {
        Ok(self.pegged.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossrate_common::{Currency, Frequency, SourceId};
    use rust_decimal_macros::dec;

    fn record(day: u32) -> RateRecord {
        RateRecord::new(
            SourceId::new("ECB"),
            Frequency::Daily,
            Currency::usd(),
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            dec!(1.0856),
        )
    }

    #[tokio::test]
    async fn test_range_bounds_are_half_open() {
        let repo = MemoryRateRepository::new();
        repo.seed(vec![record(10), record(15), record(20)]);

        let hits = repo
            .rates_in_range(
                NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
            )
            .await
            .unwrap();

        // Lower bound inclusive, upper bound exclusive.
        let mut days: Vec<u32> = hits.iter().map(|r| chrono::Datelike::day(&r.date)).collect();
        days.sort_unstable();
        assert_eq!(days, vec![10, 15]);
    }

    #[tokio::test]
    async fn test_save_is_idempotent_on_exact_tuple() {
        let repo = MemoryRateRepository::new();
        repo.save_rates(&[record(10)]).await.unwrap();
        repo.save_rates(&[record(10)]).await.unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.saves(), 2);
    }
}
