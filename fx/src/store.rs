//! In-memory rate store with per-pair minimum-date bookkeeping.
//!
//! The store is the authoritative, process-lifetime index of ingested
//! rates. Each (source, frequency) pair owns an independent series guarded
//! by its own lock, so mutations for a pair are serialized while lookups
//! for other pairs proceed untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::debug;

use crossrate_common::{Currency, Frequency, RateRecord, SourceId};

use crate::error::{FxError, FxResult};

/// Key of an independent rate series.
pub type PairKey = (SourceId, Frequency);

/// Configuration for the rate store.
#[derive(Debug, Clone)]
pub struct RateStoreConfig {
    /// Decimal places kept for stored rate values.
    pub value_precision: u32,
    /// Decimal places at which two candidate values are compared when
    /// deciding whether a re-ingested tuple agrees with the stored one.
    pub compare_precision: u32,
}

impl Default for RateStoreConfig {
    fn default() -> Self {
        Self {
            value_precision: 5,
            compare_precision: 10,
        }
    }
}

/// Outcome of inserting a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The tuple was absent and is now stored.
    Inserted,
    /// The tuple was already stored with an agreeing value; nothing changed.
    Duplicate,
}

/// Outcome of replaying a batch of records through the store.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Records newly inserted.
    pub inserted: usize,
    /// Records already present with agreeing values.
    pub duplicates: usize,
    /// Conflict faults collected along the way; the batch never aborts.
    pub conflicts: Vec<FxError>,
}

/// Rate series for one (source, frequency) pair.
#[derive(Default)]
struct PairSeries {
    rates: HashMap<Currency, BTreeMap<NaiveDate, Decimal>>,
    min_date: Option<NaiveDate>,
}

/// Authoritative in-memory rate index.
pub struct RateStore {
    pairs: DashMap<PairKey, Arc<RwLock<PairSeries>>>,
    config: RateStoreConfig,
}

impl RateStore {
    /// Create a new, empty rate store with default configuration.
    pub fn new() -> Self {
        Self::with_config(RateStoreConfig::default())
    }

    /// Create a new, empty rate store with custom configuration.
    pub fn with_config(config: RateStoreConfig) -> Self {
        Self {
            pairs: DashMap::new(),
            config,
        }
    }

    fn series(&self, source: &SourceId, frequency: Frequency) -> Arc<RwLock<PairSeries>> {
        self.pairs
            .entry((source.clone(), frequency))
            .or_default()
            .clone()
    }

    /// Insert a record if its (source, frequency, currency, date) tuple is
    /// absent.
    ///
    /// A re-ingested tuple whose value agrees with the stored one (at the
    /// configured comparison precision) is a no-op reported as
    /// [`PutOutcome::Duplicate`]; a disagreeing value is a conflict fault
    /// and leaves the stored value untouched.
    pub fn put(&self, record: &RateRecord) -> FxResult<PutOutcome> {
        if record.value <= Decimal::ZERO {
            return Err(FxError::InvalidRate {
                currency: record.currency.clone(),
                date: record.date,
                value: record.value,
            });
        }

        let value = record.value.round_dp(self.config.value_precision);
        let series = self.series(&record.source, record.frequency);
        let mut series = series.write();

        let days = series.rates.entry(record.currency.clone()).or_default();
        match days.get(&record.date) {
            Some(existing) => {
                let cmp = self.config.compare_precision;
                if existing.round_dp(cmp) == value.round_dp(cmp) {
                    Ok(PutOutcome::Duplicate)
                } else {
                    Err(FxError::RateConflict {
                        source: record.source.clone(),
                        frequency: record.frequency,
                        currency: record.currency.clone(),
                        date: record.date,
                        existing: *existing,
                        incoming: value,
                    })
                }
            }
            None => {
                days.insert(record.date, value);
                Ok(PutOutcome::Inserted)
            }
        }
    }

    /// Unconditionally overwrite the value for a record's exact tuple.
    ///
    /// This is the single mutation allowed to replace a stored value; it
    /// backs the explicit correction operation and bypasses conflict
    /// detection.
    pub fn correct(&self, record: &RateRecord) -> FxResult<()> {
        if record.value <= Decimal::ZERO {
            return Err(FxError::InvalidRate {
                currency: record.currency.clone(),
                date: record.date,
                value: record.value,
            });
        }

        let value = record.value.round_dp(self.config.value_precision);
        let series = self.series(&record.source, record.frequency);
        let mut series = series.write();
        series
            .rates
            .entry(record.currency.clone())
            .or_default()
            .insert(record.date, value);

        debug!(record = %record, "Rate corrected in store");
        Ok(())
    }

    /// Replay a batch of records through [`RateStore::put`].
    ///
    /// Conflicts are collected, not fatal, and the floor of every touched
    /// pair is lowered to the earliest date seen for it.
    pub fn put_batch(&self, records: &[RateRecord]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for record in records {
            match self.put(record) {
                Ok(PutOutcome::Inserted) => outcome.inserted += 1,
                Ok(PutOutcome::Duplicate) => outcome.duplicates += 1,
                Err(e) => outcome.conflicts.push(e),
            }
            // Any record, duplicate or conflicting, proves data exists at
            // its date.
            self.lower_min_date(&record.source, record.frequency, record.date);
        }

        outcome
    }

    /// Look up the stored value for an exact tuple.
    pub fn get(
        &self,
        source: &SourceId,
        frequency: Frequency,
        currency: &Currency,
        date: NaiveDate,
    ) -> Option<Decimal> {
        let series = self.pairs.get(&(source.clone(), frequency))?;
        let series = series.read();
        series.rates.get(currency)?.get(&date).copied()
    }

    /// Check whether the pair holds any rates at all for a currency.
    pub fn has_currency(
        &self,
        source: &SourceId,
        frequency: Frequency,
        currency: &Currency,
    ) -> bool {
        self.pairs
            .get(&(source.clone(), frequency))
            .map(|series| {
                series
                    .read()
                    .rates
                    .get(currency)
                    .is_some_and(|days| !days.is_empty())
            })
            .unwrap_or(false)
    }

    /// The tracked minimum date for a pair.
    ///
    /// Asking for an untracked pair is a caller fault: resolution only
    /// reaches the date walk once the pair demonstrably holds data, at
    /// which point ingestion must have set the floor.
    pub fn min_date(&self, source: &SourceId, frequency: Frequency) -> FxResult<NaiveDate> {
        self.tracked_min_date(source, frequency)
            .ok_or_else(|| FxError::MinDateMissing {
                source: source.clone(),
                frequency,
            })
    }

    /// The tracked minimum date for a pair, if any.
    pub fn tracked_min_date(&self, source: &SourceId, frequency: Frequency) -> Option<NaiveDate> {
        self.pairs
            .get(&(source.clone(), frequency))
            .and_then(|series| series.read().min_date)
    }

    /// Lower the pair's floor to `candidate` if it precedes the current one.
    pub fn lower_min_date(&self, source: &SourceId, frequency: Frequency, candidate: NaiveDate) {
        let series = self.series(source, frequency);
        let mut series = series.write();
        match series.min_date {
            Some(current) if current <= candidate => {}
            _ => series.min_date = Some(candidate),
        }
    }

    /// Round a value to the stored precision.
    ///
    /// Lets derived views (the monthly cache) hold exactly what the store
    /// holds.
    pub fn normalize(&self, value: Decimal) -> Decimal {
        value.round_dp(self.config.value_precision)
    }

    /// Get store statistics.
    pub fn stats(&self) -> RateStoreStats {
        let mut stats = RateStoreStats::default();
        for entry in self.pairs.iter() {
            let series = entry.value().read();
            stats.pairs += 1;
            stats.currencies += series.rates.len();
            stats.rates += series.rates.values().map(BTreeMap::len).sum::<usize>();
        }
        stats
    }
}

impl Default for RateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateStoreStats {
    /// Tracked (source, frequency) pairs.
    pub pairs: usize,
    /// Currency series across all pairs.
    pub currencies: usize,
    /// Total stored rate points.
    pub rates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ecb() -> SourceId {
        SourceId::new("ECB")
    }

    fn record(currency: &str, day: u32, value: Decimal) -> RateRecord {
        RateRecord::new(
            ecb(),
            Frequency::Daily,
            Currency::new(currency),
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            value,
        )
    }

    #[test]
    fn test_put_and_get() {
        let store = RateStore::new();
        let r = record("USD", 15, dec!(1.0856));

        assert_eq!(store.put(&r).unwrap(), PutOutcome::Inserted);
        assert_eq!(
            store.get(&ecb(), Frequency::Daily, &Currency::usd(), r.date),
            Some(dec!(1.0856))
        );
        assert!(store.has_currency(&ecb(), Frequency::Daily, &Currency::usd()));
        assert!(!store.has_currency(&ecb(), Frequency::Daily, &Currency::gbp()));
    }

    #[test]
    fn test_put_is_idempotent_for_agreeing_values() {
        let store = RateStore::new();
        let r = record("USD", 15, dec!(1.0856));

        assert_eq!(store.put(&r).unwrap(), PutOutcome::Inserted);
        assert_eq!(store.put(&r).unwrap(), PutOutcome::Duplicate);
        assert_eq!(store.stats().rates, 1);
    }

    #[test]
    fn test_put_reports_conflicts() {
        let store = RateStore::new();
        store.put(&record("USD", 15, dec!(1.0856))).unwrap();

        let result = store.put(&record("USD", 15, dec!(1.0999)));
        assert!(matches!(result, Err(FxError::RateConflict { .. })));

        // Stored value untouched.
        assert_eq!(
            store.get(
                &ecb(),
                Frequency::Daily,
                &Currency::usd(),
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
            ),
            Some(dec!(1.0856))
        );
    }

    #[test]
    fn test_values_agreeing_within_stored_precision_are_duplicates() {
        let store = RateStore::new();
        store.put(&record("USD", 15, dec!(1.0856))).unwrap();

        // Differs only past the 5th decimal place; rounds to the same
        // stored value.
        let outcome = store.put(&record("USD", 15, dec!(1.0856004))).unwrap();
        assert_eq!(outcome, PutOutcome::Duplicate);
    }

    #[test]
    fn test_put_rejects_non_positive_values() {
        let store = RateStore::new();
        assert!(matches!(
            store.put(&record("USD", 15, dec!(0))),
            Err(FxError::InvalidRate { .. })
        ));
        assert!(matches!(
            store.put(&record("USD", 15, dec!(-1.2))),
            Err(FxError::InvalidRate { .. })
        ));
    }

    #[test]
    fn test_correct_bypasses_conflict_detection() {
        let store = RateStore::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        store.put(&record("USD", 15, dec!(1.0856))).unwrap();

        store.correct(&record("USD", 15, dec!(1.0999))).unwrap();
        assert_eq!(
            store.get(&ecb(), Frequency::Daily, &Currency::usd(), date),
            Some(dec!(1.0999))
        );
    }

    #[test]
    fn test_min_date_untracked_is_a_fault() {
        let store = RateStore::new();
        assert!(matches!(
            store.min_date(&ecb(), Frequency::Daily),
            Err(FxError::MinDateMissing { .. })
        ));
        assert_eq!(store.tracked_min_date(&ecb(), Frequency::Daily), None);
    }

    #[test]
    fn test_lower_min_date_only_lowers() {
        let store = RateStore::new();
        let jan10 = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let jan20 = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();

        store.lower_min_date(&ecb(), Frequency::Daily, jan20);
        assert_eq!(store.min_date(&ecb(), Frequency::Daily).unwrap(), jan20);

        store.lower_min_date(&ecb(), Frequency::Daily, jan10);
        assert_eq!(store.min_date(&ecb(), Frequency::Daily).unwrap(), jan10);

        // Raising is a no-op.
        store.lower_min_date(&ecb(), Frequency::Daily, jan20);
        assert_eq!(store.min_date(&ecb(), Frequency::Daily).unwrap(), jan10);
    }

    #[test]
    fn test_put_batch_collects_conflicts_and_lowers_floor() {
        let store = RateStore::new();
        store.put(&record("USD", 15, dec!(1.0856))).unwrap();

        let batch = vec![
            record("USD", 10, dec!(1.0901)),
            record("USD", 15, dec!(9.9999)), // conflicting
            record("GBP", 12, dec!(0.8601)),
            record("USD", 10, dec!(1.0901)), // duplicate
        ];

        let outcome = store.put_batch(&batch);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.conflicts.len(), 1);

        assert_eq!(
            store.min_date(&ecb(), Frequency::Daily).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
        );
    }

    #[test]
    fn test_pairs_are_independent() {
        let store = RateStore::new();
        store.put(&record("USD", 15, dec!(1.0856))).unwrap();

        let monthly = RateRecord::new(
            ecb(),
            Frequency::Monthly,
            Currency::usd(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            dec!(1.1),
        );
        store.put(&monthly).unwrap();

        assert_eq!(
            store.get(
                &ecb(),
                Frequency::Monthly,
                &Currency::usd(),
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
            ),
            None
        );
        assert_eq!(store.stats().pairs, 2);
    }
}
