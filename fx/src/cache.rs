//! Month-granular rate caching with sliding expiry.
//!
//! The cache is a derived, disposable view over the rate store: losing an
//! entry never loses data, it only costs a slower lookup. Entries expire
//! after a continuous period of no access and are evicted lazily, on the
//! next access to their key; there is no background sweep.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDate};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;

use crossrate_common::{month_of, Currency, Frequency, RateRecord, SourceId};

/// Configuration for the monthly cache.
#[derive(Debug, Clone)]
pub struct MonthlyCacheConfig {
    /// Sliding inactivity window after which a month is treated as absent.
    pub ttl: Duration,
}

impl Default for MonthlyCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Key of one cached month of rates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonthKey {
    pub source: SourceId,
    pub frequency: Frequency,
    pub currency: Currency,
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    /// Key for the month a date falls in.
    pub fn for_date(
        source: &SourceId,
        frequency: Frequency,
        currency: &Currency,
        date: NaiveDate,
    ) -> Self {
        let (year, month) = month_of(date);
        Self {
            source: source.clone(),
            frequency,
            currency: currency.clone(),
            year,
            month,
        }
    }
}

/// Cached month entry: day-indexed rates plus the last-access timestamp
/// that drives sliding expiry.
struct MonthEntry {
    days: BTreeMap<u32, Decimal>,
    last_access: Instant,
}

impl MonthEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_access.elapsed() > ttl
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
    }
}

/// Thread-safe month-granular rate cache.
pub struct MonthlyCache {
    months: DashMap<MonthKey, MonthEntry>,
    config: MonthlyCacheConfig,
}

impl MonthlyCache {
    /// Create a new cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(MonthlyCacheConfig::default())
    }

    /// Create a new cache with custom configuration.
    pub fn with_config(config: MonthlyCacheConfig) -> Self {
        Self {
            months: DashMap::new(),
            config,
        }
    }

    /// Get the cached rate for a day, refreshing the month's last-access
    /// time.
    ///
    /// Absent if the month is not cached, has expired, or holds no value
    /// for that day.
    pub fn get(
        &self,
        currency: &Currency,
        date: NaiveDate,
        source: &SourceId,
        frequency: Frequency,
    ) -> Option<Decimal> {
        let key = MonthKey::for_date(source, frequency, currency, date);

        if let Some(mut entry) = self.months.get_mut(&key) {
            if entry.is_expired(self.config.ttl) {
                drop(entry);
                self.months.remove(&key);
                debug!(currency = %currency, year = key.year, month = key.month, "Cached month expired");
                return None;
            }
            entry.touch();
            return entry.days.get(&date.day()).copied();
        }

        None
    }

    /// Check whether a month is cached and unexpired, refreshing its
    /// last-access time.
    pub fn is_month_cached(
        &self,
        currency: &Currency,
        year: i32,
        month: u32,
        source: &SourceId,
        frequency: Frequency,
    ) -> bool {
        let key = MonthKey {
            source: source.clone(),
            frequency,
            currency: currency.clone(),
            year,
            month,
        };

        if let Some(mut entry) = self.months.get_mut(&key) {
            if entry.is_expired(self.config.ttl) {
                drop(entry);
                self.months.remove(&key);
                return false;
            }
            entry.touch();
            return true;
        }

        false
    }

    /// Replace the entire cached month with the given records.
    pub fn store_month(
        &self,
        records: &[RateRecord],
        currency: &Currency,
        year: i32,
        month: u32,
        source: &SourceId,
        frequency: Frequency,
    ) {
        let key = MonthKey {
            source: source.clone(),
            frequency,
            currency: currency.clone(),
            year,
            month,
        };

        let days: BTreeMap<u32, Decimal> = records
            .iter()
            .map(|r| (r.date.day(), r.value))
            .collect();

        debug!(
            currency = %currency,
            year,
            month,
            days = days.len(),
            "Cached month stored"
        );

        self.months.insert(
            key,
            MonthEntry {
                days,
                last_access: Instant::now(),
            },
        );
    }

    /// Insert or overwrite exactly the day matching the record's date,
    /// leaving the rest of the month untouched.
    pub fn upsert(&self, record: &RateRecord) {
        let key = MonthKey::for_date(
            &record.source,
            record.frequency,
            &record.currency,
            record.date,
        );

        let mut entry = self.months.entry(key).or_insert_with(|| MonthEntry {
            days: BTreeMap::new(),
            last_access: Instant::now(),
        });
        entry.days.insert(record.date.day(), record.value);
        entry.touch();
    }

    /// Evict every expired month.
    ///
    /// Expiry stays lazy; this is for callers that want an explicit sweep.
    pub fn evict_expired(&self) {
        self.months
            .retain(|_, entry| !entry.is_expired(self.config.ttl));
    }

    /// Clear all cached months.
    pub fn clear(&self) {
        self.months.clear();
    }

    /// Number of cached months, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.months.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let total = self.months.len();
        let expired = self
            .months
            .iter()
            .filter(|e| e.is_expired(self.config.ttl))
            .count();

        CacheStats {
            total_months: total,
            live_months: total - expired,
            expired_months: expired,
        }
    }
}

impl Default for MonthlyCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub total_months: usize,
    pub live_months: usize,
    pub expired_months: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::thread::sleep;

    fn ecb() -> SourceId {
        SourceId::new("ECB")
    }

    fn record(day: u32, value: Decimal) -> RateRecord {
        RateRecord::new(
            ecb(),
            Frequency::Daily,
            Currency::usd(),
            NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            value,
        )
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_store_month_and_get() {
        let cache = MonthlyCache::new();
        let records = vec![record(10, dec!(1.0901)), record(11, dec!(1.0856))];
        cache.store_month(&records, &Currency::usd(), 2024, 1, &ecb(), Frequency::Daily);

        assert_eq!(
            cache.get(&Currency::usd(), date(10), &ecb(), Frequency::Daily),
            Some(dec!(1.0901))
        );
        // Day not in the cached month.
        assert_eq!(
            cache.get(&Currency::usd(), date(12), &ecb(), Frequency::Daily),
            None
        );
        assert!(cache.is_month_cached(&Currency::usd(), 2024, 1, &ecb(), Frequency::Daily));
        assert!(!cache.is_month_cached(&Currency::usd(), 2024, 2, &ecb(), Frequency::Daily));
    }

    #[test]
    fn test_store_month_replaces_whole_month() {
        let cache = MonthlyCache::new();
        cache.store_month(
            &[record(10, dec!(1.0901)), record(11, dec!(1.0856))],
            &Currency::usd(),
            2024,
            1,
            &ecb(),
            Frequency::Daily,
        );

        cache.store_month(
            &[record(11, dec!(1.0999))],
            &Currency::usd(),
            2024,
            1,
            &ecb(),
            Frequency::Daily,
        );

        assert_eq!(
            cache.get(&Currency::usd(), date(11), &ecb(), Frequency::Daily),
            Some(dec!(1.0999))
        );
        // Day 10 was dropped by the replacement.
        assert_eq!(
            cache.get(&Currency::usd(), date(10), &ecb(), Frequency::Daily),
            None
        );
    }

    #[test]
    fn test_upsert_touches_only_its_day() {
        let cache = MonthlyCache::new();
        cache.store_month(
            &[
                record(9, dec!(1.0777)),
                record(10, dec!(1.0901)),
                record(11, dec!(1.0856)),
            ],
            &Currency::usd(),
            2024,
            1,
            &ecb(),
            Frequency::Daily,
        );

        cache.upsert(&record(10, dec!(1.2000)));

        assert_eq!(
            cache.get(&Currency::usd(), date(10), &ecb(), Frequency::Daily),
            Some(dec!(1.2000))
        );
        assert_eq!(
            cache.get(&Currency::usd(), date(9), &ecb(), Frequency::Daily),
            Some(dec!(1.0777))
        );
        assert_eq!(
            cache.get(&Currency::usd(), date(11), &ecb(), Frequency::Daily),
            Some(dec!(1.0856))
        );
    }

    #[test]
    fn test_upsert_creates_month_if_absent() {
        let cache = MonthlyCache::new();
        cache.upsert(&record(10, dec!(1.0901)));

        assert_eq!(
            cache.get(&Currency::usd(), date(10), &ecb(), Frequency::Daily),
            Some(dec!(1.0901))
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sliding_expiry() {
        let cache = MonthlyCache::with_config(MonthlyCacheConfig {
            ttl: Duration::from_millis(50),
        });
        cache.store_month(
            &[record(10, dec!(1.0901))],
            &Currency::usd(),
            2024,
            1,
            &ecb(),
            Frequency::Daily,
        );

        sleep(Duration::from_millis(60));

        // Expired and evicted on access, even though the data was never
        // removed explicitly.
        assert_eq!(
            cache.get(&Currency::usd(), date(10), &ecb(), Frequency::Daily),
            None
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_access_resets_the_window() {
        let cache = MonthlyCache::with_config(MonthlyCacheConfig {
            ttl: Duration::from_millis(80),
        });
        cache.store_month(
            &[record(10, dec!(1.0901))],
            &Currency::usd(),
            2024,
            1,
            &ecb(),
            Frequency::Daily,
        );

        // Keep touching the entry inside the window; it must outlive
        // several multiples of the ttl.
        for _ in 0..4 {
            sleep(Duration::from_millis(40));
            assert_eq!(
                cache.get(&Currency::usd(), date(10), &ecb(), Frequency::Daily),
                Some(dec!(1.0901))
            );
        }

        sleep(Duration::from_millis(90));
        assert_eq!(
            cache.get(&Currency::usd(), date(10), &ecb(), Frequency::Daily),
            None
        );
    }

    #[test]
    fn test_evict_expired_sweeps() {
        let cache = MonthlyCache::with_config(MonthlyCacheConfig {
            ttl: Duration::from_millis(30),
        });
        cache.upsert(&record(10, dec!(1.0901)));
        sleep(Duration::from_millis(40));

        assert_eq!(cache.stats().expired_months, 1);
        cache.evict_expired();
        assert!(cache.is_empty());
    }
}
