//! Rate provider trait and test implementation.
//!
//! Providers are external collaborators: per-bank clients that publish a
//! descriptor (base currency, quote convention, supported cadences) and
//! fetch batches of rate records. The engine only ever talks to this
//! trait.

use async_trait::async_trait;
use chrono::NaiveDate;

use crossrate_common::{Frequency, ProviderDescriptor, RateRecord};

use crate::error::FxResult;

/// Trait for upstream rate providers.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Identity and capabilities of this provider.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Fetch the most recent batch for a cadence (a short rolling window,
    /// e.g. the last few days for a daily source).
    ///
    /// An empty batch is a legitimate "nothing new" result here.
    async fn fetch_latest(&self, frequency: Frequency) -> FxResult<Vec<RateRecord>>;

    /// Fetch the historical batch for `[from, to]`, both inclusive.
    ///
    /// An empty batch is a legitimate "no data in this range" result at
    /// this level; the orchestrator decides what that means for a targeted
    /// fetch.
    async fn fetch_range(
        &self,
        frequency: Frequency,
        from: NaiveDate,
        to: NaiveDate,
    ) -> FxResult<Vec<RateRecord>>;
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    descriptor: ProviderDescriptor,
    historical: dashmap::DashMap<Frequency, Vec<RateRecord>>,
    latest: dashmap::DashMap<Frequency, Vec<RateRecord>>,
    failing: std::sync::atomic::AtomicBool,
    range_calls: std::sync::atomic::AtomicUsize,
    latest_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self {
            descriptor,
            historical: dashmap::DashMap::new(),
            latest: dashmap::DashMap::new(),
            failing: std::sync::atomic::AtomicBool::new(false),
            range_calls: std::sync::atomic::AtomicUsize::new(0),
            latest_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Add records to the historical pool served by `fetch_range`.
    pub fn add_historical(&self, frequency: Frequency, records: Vec<RateRecord>) {
        self.historical.entry(frequency).or_default().extend(records);
    }

    /// Set the batch served by `fetch_latest`.
    pub fn set_latest(&self, frequency: Frequency, records: Vec<RateRecord>) {
        self.latest.insert(frequency, records);
    }

    /// Make every fetch fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of `fetch_range` calls observed.
    pub fn range_calls(&self) -> usize {
        self.range_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of `fetch_latest` calls observed.
    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn check_failing(&self) -> FxResult<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::FxError::Provider {
                source: self.descriptor.source.clone(),
                message: "mock provider failure".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn fetch_latest(&self, frequency: Frequency) -> FxResult<Vec<RateRecord>> {
        self.latest_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.check_failing()?;

        Ok(self
            .latest
            .get(&frequency)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn fetch_range(
        &self,
        frequency: Frequency,
        from: NaiveDate,
        to: NaiveDate,
    ) -> FxResult<Vec<RateRecord>> {
        self.range_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.check_failing()?;

        Ok(self
            .historical
            .get(&frequency)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.date >= from && r.date <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossrate_common::{Currency, QuoteType, SourceId};
    use rust_decimal_macros::dec;

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor::new(
            SourceId::new("ECB"),
            Currency::eur(),
            QuoteType::Indirect,
            [Frequency::Daily],
        )
    }

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
    async fn test_fetch_range_filters_by_window() {
        let provider = MockRateProvider::new(descriptor());
        provider.add_historical(Frequency::Daily, vec![record(5), record(15), record(25)]);

        let batch = provider
            .fetch_range(
                Frequency::Daily,
                NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(provider.range_calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_provider() {
        let provider = MockRateProvider::new(descriptor());
        provider.set_failing(true);

        assert!(provider.fetch_latest(Frequency::Daily).await.is_err());

        provider.set_failing(false);
        assert!(provider.fetch_latest(Frequency::Daily).await.is_ok());
    }
}
