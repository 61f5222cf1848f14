//! Main FX engine implementation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crossrate_common::{
    today, Currency, Frequency, ProviderDescriptor, RateRecord, SourceId,
};

use crate::cache::{CacheStats, MonthlyCache, MonthlyCacheConfig};
use crate::error::{FxError, FxResult};
use crate::ingest::{Ingestor, RefreshOutcome};
use crate::pegged::PeggedCurrencies;
use crate::provider::RateProvider;
use crate::repository::RateRepository;
use crate::resolver::{Resolution, Resolver};
use crate::store::{RateStore, RateStoreConfig, RateStoreStats};

/// Configuration for the FX engine.
#[derive(Debug, Clone)]
pub struct FxEngineConfig {
    /// Margin subtracted from a missed request date before the engine
    /// expands history and retries resolution.
    pub lookback_days: u32,
    /// How far back the startup bulk load reads from the durable store.
    pub preload_days: u32,
    /// Rate store configuration.
    pub store: RateStoreConfig,
    /// Monthly cache configuration.
    pub cache: MonthlyCacheConfig,
}

impl Default for FxEngineConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            preload_days: 366,
            store: RateStoreConfig::default(),
            cache: MonthlyCacheConfig::default(),
        }
    }
}

/// The main FX engine.
///
/// Owns the in-memory rate store, the monthly cache and the pegged table,
/// and orchestrates reactive ingestion through the provider and
/// durable-store collaborators.
pub struct FxEngine {
    store: Arc<RateStore>,
    cache: Arc<MonthlyCache>,
    pegged: PeggedCurrencies,
    descriptors: HashMap<SourceId, ProviderDescriptor>,
    ingestor: Ingestor,
    config: FxEngineConfig,
}

impl FxEngine {
    /// Build the engine: register providers, load the pegged table and
    /// bulk-load recent history from the durable store.
    pub async fn load(
        providers: Vec<Arc<dyn RateProvider>>,
        repository: Arc<dyn RateRepository>,
        config: FxEngineConfig,
    ) -> FxResult<Self> {
        let mut descriptors = HashMap::new();
        let mut by_source: HashMap<SourceId, Arc<dyn RateProvider>> = HashMap::new();
        for provider in providers {
            let descriptor = provider.descriptor().clone();
            let source = descriptor.source.clone();
            if descriptors.insert(source.clone(), descriptor).is_some() {
                return Err(FxError::DuplicateSource(source));
            }
            by_source.insert(source, provider);
        }

        let store = Arc::new(RateStore::with_config(config.store.clone()));
        let cache = Arc::new(MonthlyCache::with_config(config.cache.clone()));
        let pegged = PeggedCurrencies::from_defs(repository.pegged_currencies().await?)?;
        let ingestor = Ingestor::new(store.clone(), cache.clone(), repository, by_source);

        let engine = Self {
            store,
            cache,
            pegged,
            descriptors,
            ingestor,
            config,
        };

        let from = today() - Duration::days(engine.config.preload_days as i64);
        let to = today().succ_opt().unwrap_or_else(today);
        let loaded = engine.ingestor.reload_from_repository(from, to).await?;
        info!(
            sources = engine.descriptors.len(),
            pegs = engine.pegged.len(),
            preloaded = loaded,
            "FX engine loaded"
        );

        Ok(engine)
    }

    /// Resolve a rate, ingesting missing history on demand.
    ///
    /// Returns `Ok(None)` when no rate is available even after the single
    /// ingest-and-retry pass; faults (malformed input, conflicting data,
    /// broken bookkeeping) are errors, never conflated with absence.
    #[instrument(skip(self), fields(%from, %to, %date, %source, %frequency))]
    pub async fn get_rate(
        &self,
        from: &Currency,
        to: &Currency,
        date: NaiveDate,
        source: &SourceId,
        frequency: Frequency,
    ) -> FxResult<Option<Decimal>> {
        match self.resolver().resolve(from, to, date, source, frequency)? {
            Resolution::Found(rate) => Ok(Some(rate)),
            miss => {
                debug!(?miss, "Resolution miss, expanding history");
                let target = date - Duration::days(self.config.lookback_days as i64);
                match self
                    .ingestor
                    .ensure_minimum_date_range(target, Some(std::slice::from_ref(source)))
                    .await
                {
                    Ok(_) => {}
                    // Upstream-data conditions leave us with whatever is
                    // already stored; bookkeeping faults still propagate.
                    Err(e)
                        if matches!(
                            e,
                            FxError::EmptyBatch { .. } | FxError::Provider { .. }
                        ) =>
                    {
                        warn!(error = %e, "History expansion failed");
                    }
                    Err(e) => return Err(e),
                }

                match self.resolver().resolve(from, to, date, source, frequency)? {
                    Resolution::Found(rate) => Ok(Some(rate)),
                    miss => {
                        info!(?miss, "No rate available after retry");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// [`FxEngine::get_rate`] over raw currency codes.
    ///
    /// Malformed codes fail fast with a distinct fault instead of reading
    /// as "no rate found".
    pub async fn get_rate_by_code(
        &self,
        from: &str,
        to: &str,
        date: NaiveDate,
        source: &SourceId,
        frequency: Frequency,
    ) -> FxResult<Option<Decimal>> {
        let from = Currency::parse(from)?;
        let to = Currency::parse(to)?;
        self.get_rate(&from, &to, date, source, frequency).await
    }

    /// Refresh the latest batch for every known source and cadence.
    ///
    /// Per-source failures are logged and do not block the others.
    #[instrument(skip(self))]
    pub async fn update_rates(&self) -> RefreshOutcome {
        self.ingestor.refresh_latest().await
    }

    /// Ensure the targeted sources cover `min_date` for every cadence they
    /// support.
    ///
    /// Returns true iff every targeted (source, frequency) pair now covers
    /// the date. Failures abort and are reported: a caller is waiting on a
    /// specific answer.
    #[instrument(skip(self), fields(%min_date))]
    pub async fn ensure_minimum_date_range(
        &self,
        min_date: NaiveDate,
        sources: Option<&[SourceId]>,
    ) -> FxResult<bool> {
        self.ingestor.ensure_minimum_date_range(min_date, sources).await
    }

    /// Atomically correct a single rate in the store, the durable store
    /// and the cached month, leaving every other day untouched.
    #[instrument(skip(self), fields(record = %record))]
    pub async fn update_single_rate(&self, record: RateRecord) -> FxResult<()> {
        let descriptor = self
            .descriptors
            .get(&record.source)
            .ok_or_else(|| FxError::UnknownSource(record.source.clone()))?;
        if !descriptor.supports(record.frequency) {
            return Err(FxError::FrequencyNotSupported {
                source: record.source.clone(),
                frequency: record.frequency,
            });
        }

        self.ingestor.correct_rate(&record).await
    }

    /// Get engine statistics.
    pub fn stats(&self) -> FxEngineStats {
        FxEngineStats {
            store: self.store.stats(),
            cache: self.cache.stats(),
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.store, &self.cache, &self.pegged, &self.descriptors)
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Copy)]
pub struct FxEngineStats {
    pub store: RateStoreStats,
    pub cache: CacheStats,
}
