//! Reactive rate ingestion.
//!
//! The orchestrator guarantees that, before resolution is attempted or
//! retried, the rate store covers the requested date for the requested
//! (source, frequency) pairs. It prefers a cheap reload from the durable
//! store, falls back to a provider fetch, and on every ingested batch
//! updates the store, the durable store and the monthly cache.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crossrate_common::{today, Frequency, RateRecord, SourceId};

use crate::cache::{MonthKey, MonthlyCache};
use crate::error::{FxError, FxResult};
use crate::provider::RateProvider;
use crate::repository::RateRepository;
use crate::store::{PairKey, RateStore};

/// Outcome of a best-effort latest-batch refresh across all sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// (source, frequency) pairs refreshed successfully.
    pub refreshed: usize,
    /// Pairs whose refresh failed; logged, never fatal for the others.
    pub failed: usize,
}

/// Orchestrates provider fetches, persistence and cache population.
pub(crate) struct Ingestor {
    store: Arc<RateStore>,
    cache: Arc<MonthlyCache>,
    repository: Arc<dyn RateRepository>,
    providers: HashMap<SourceId, Arc<dyn RateProvider>>,
    inflight: DashMap<PairKey, Arc<Mutex<()>>>,
}

impl Ingestor {
    pub(crate) fn new(
        store: Arc<RateStore>,
        cache: Arc<MonthlyCache>,
        repository: Arc<dyn RateRepository>,
        providers: HashMap<SourceId, Arc<dyn RateProvider>>,
    ) -> Self {
        Self {
            store,
            cache,
            repository,
            providers,
            inflight: DashMap::new(),
        }
    }

    /// Ensure every targeted (source, frequency) pair covers `min_date`.
    ///
    /// Returns true iff every targeted pair's floor now reaches the
    /// target. Provider failures and empty historical batches abort with
    /// an error: a caller is waiting on a specific answer here.
    pub(crate) async fn ensure_minimum_date_range(
        &self,
        min_date: NaiveDate,
        sources: Option<&[SourceId]>,
    ) -> FxResult<bool> {
        let targets: Vec<Arc<dyn RateProvider>> = match sources {
            Some(subset) => subset
                .iter()
                .map(|source| {
                    self.providers
                        .get(source)
                        .cloned()
                        .ok_or_else(|| FxError::UnknownSource(source.clone()))
                })
                .collect::<FxResult<_>>()?,
            None => self.providers.values().cloned().collect(),
        };

        let mut covered = true;
        for provider in targets {
            let frequencies: Vec<Frequency> =
                provider.descriptor().frequencies.iter().copied().collect();
            for frequency in frequencies {
                covered &= self.ensure_pair(&provider, frequency, min_date).await?;
            }
        }
        Ok(covered)
    }

    /// Ensure one pair covers `min_date`, single-flight per pair.
    async fn ensure_pair(
        &self,
        provider: &Arc<dyn RateProvider>,
        frequency: Frequency,
        min_date: NaiveDate,
    ) -> FxResult<bool> {
        let source = provider.descriptor().source.clone();
        if self.covers(&source, frequency, min_date) {
            return Ok(true);
        }

        let lock = self
            .inflight
            .entry((source.clone(), frequency))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent caller may have ingested while we waited; reuse its
        // result instead of issuing a duplicate provider call.
        if self.covers(&source, frequency, min_date) {
            return Ok(true);
        }

        // Cheap reload from the durable store first.
        let upper = self
            .store
            .tracked_min_date(&source, frequency)
            .or_else(|| today().succ_opt())
            .unwrap_or_else(today);
        let loaded = self.repository.rates_in_range(min_date, upper).await?;
        if !loaded.is_empty() {
            debug!(%source, %frequency, records = loaded.len(), "Reloaded rates from repository");
            self.apply_records(&loaded, false).await?;
        }
        if self.covers(&source, frequency, min_date) {
            return Ok(true);
        }

        // The durable store was not enough; go to the provider.
        let floor = self.store.tracked_min_date(&source, frequency);
        let (from, to) = match floor {
            Some(floor) => (min_date.min(floor), min_date.max(floor)),
            None => (min_date, today()),
        };

        let records = provider.fetch_range(frequency, from, to).await?;
        if records.is_empty() {
            return Err(FxError::EmptyBatch {
                source,
                frequency,
                from,
                to,
            });
        }

        self.apply_records(&records, true).await?;
        info!(
            %source,
            %frequency,
            records = records.len(),
            %from,
            %to,
            "Historical range ingested"
        );

        Ok(self.covers(&source, frequency, min_date))
    }

    /// Fetch the most recent batch for every source and cadence.
    ///
    /// A failure for one source is logged and does not block the others.
    pub(crate) async fn refresh_latest(&self) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::default();

        for (source, provider) in &self.providers {
            let frequencies: Vec<Frequency> =
                provider.descriptor().frequencies.iter().copied().collect();
            for frequency in frequencies {
                match self.refresh_pair(provider, frequency).await {
                    Ok(records) => {
                        debug!(%source, %frequency, records, "Latest batch refreshed");
                        outcome.refreshed += 1;
                    }
                    Err(e) => {
                        warn!(%source, %frequency, error = %e, "Latest-batch refresh failed");
                        outcome.failed += 1;
                    }
                }
            }
        }

        outcome
    }

    async fn refresh_pair(
        &self,
        provider: &Arc<dyn RateProvider>,
        frequency: Frequency,
    ) -> FxResult<usize> {
        let records = provider.fetch_latest(frequency).await?;
        if records.is_empty() {
            // Nothing new is a legitimate latest-batch result.
            return Ok(0);
        }
        self.apply_records(&records, true).await?;
        Ok(records.len())
    }

    /// Atomically correct a single rate in store, durable store and cache.
    pub(crate) async fn correct_rate(&self, record: &RateRecord) -> FxResult<()> {
        self.store.correct(record)?;
        self.store
            .lower_min_date(&record.source, record.frequency, record.date);
        self.repository
            .save_rates(std::slice::from_ref(record))
            .await?;

        let mut cached = record.clone();
        cached.value = self.store.normalize(cached.value);
        self.cache.upsert(&cached);

        info!(record = %record, "Single rate corrected");
        Ok(())
    }

    /// Replay records from the durable store without re-persisting them.
    pub(crate) async fn reload_from_repository(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> FxResult<usize> {
        let records = self.repository.rates_in_range(from, to).await?;
        if !records.is_empty() {
            self.apply_records(&records, false).await?;
        }
        Ok(records.len())
    }

    /// Replay a batch through the store, optionally persist it, and
    /// populate the monthly cache.
    async fn apply_records(&self, records: &[RateRecord], persist: bool) -> FxResult<()> {
        let outcome = self.store.put_batch(records);
        for conflict in &outcome.conflicts {
            warn!(error = %conflict, "Conflicting rate in ingested batch");
        }
        debug!(
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            conflicts = outcome.conflicts.len(),
            "Batch replayed through store"
        );

        if persist {
            self.repository.save_rates(records).await?;
        }

        self.populate_cache(records);
        Ok(())
    }

    /// Group a batch by (currency, year, month) and feed the cache.
    ///
    /// Months already cached are patched day-by-day so a partial batch
    /// never erases cached days; uncached months are stored whole.
    fn populate_cache(&self, records: &[RateRecord]) {
        let mut groups: HashMap<MonthKey, Vec<RateRecord>> = HashMap::new();
        for record in records {
            let mut normalized = record.clone();
            normalized.value = self.store.normalize(normalized.value);
            let key = MonthKey::for_date(
                &normalized.source,
                normalized.frequency,
                &normalized.currency,
                normalized.date,
            );
            groups.entry(key).or_default().push(normalized);
        }

        for (key, group) in groups {
            if self
                .cache
                .is_month_cached(&key.currency, key.year, key.month, &key.source, key.frequency)
            {
                for record in &group {
                    self.cache.upsert(record);
                }
            } else {
                self.cache.store_month(
                    &group,
                    &key.currency,
                    key.year,
                    key.month,
                    &key.source,
                    key.frequency,
                );
            }
        }
    }

    fn covers(&self, source: &SourceId, frequency: Frequency, min_date: NaiveDate) -> bool {
        self.store
            .tracked_min_date(source, frequency)
            .is_some_and(|floor| floor <= min_date)
    }
}
