//! Rate records, publication cadence and provider descriptors.

use crate::{Currency, SourceId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Publication cadence of a rate series.
///
/// A weekly, bi-weekly or monthly rate applies uniformly to every day in
/// its period; lookups fall back to the most recent published day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    /// Published every business day.
    Daily,
    /// Published once per week.
    Weekly,
    /// Published every two weeks.
    BiWeekly,
    /// Published once per month.
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::BiWeekly => "BI_WEEKLY",
            Frequency::Monthly => "MONTHLY",
        };
        write!(f, "{}", s)
    }
}

/// How a source quotes its rates against its base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteType {
    /// Foreign currency per unit of the source's base currency.
    Direct,
    /// Base currency per unit of the foreign currency.
    Indirect,
}

impl fmt::Display for QuoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuoteType::Direct => "DIRECT",
            QuoteType::Indirect => "INDIRECT",
        };
        write!(f, "{}", s)
    }
}

/// A single published exchange rate observation.
///
/// Dates carry day granularity only; time-of-day is never significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    /// Source that published the rate.
    pub source: SourceId,
    /// Publication cadence of the series this rate belongs to.
    pub frequency: Frequency,
    /// Quoted currency (against the source's base currency).
    pub currency: Currency,
    /// Day the rate applies to.
    pub date: NaiveDate,
    /// Quoted value.
    pub value: Decimal,
}

impl RateRecord {
    /// Create a new rate record.
    pub fn new(
        source: SourceId,
        frequency: Frequency,
        currency: Currency,
        date: NaiveDate,
        value: Decimal,
    ) -> Self {
        Self {
            source,
            frequency,
            currency,
            date,
            value,
        }
    }
}

impl fmt::Display for RateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {} {} = {}",
            self.source, self.frequency, self.currency, self.date, self.value
        )
    }
}

/// A currency whose rate to one anchor currency is fixed by policy.
///
/// One unit of `currency` is worth `rate` units of `anchor`. Loaded once at
/// startup and immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeggedCurrency {
    /// The pegged currency.
    pub currency: Currency,
    /// The anchor currency the peg is expressed against.
    pub anchor: Currency,
    /// Fixed units of anchor per unit of currency.
    pub rate: Decimal,
}

impl PeggedCurrency {
    /// Create a new pegged-currency definition.
    pub fn new(currency: Currency, anchor: Currency, rate: Decimal) -> Self {
        Self {
            currency,
            anchor,
            rate,
        }
    }
}

/// Identity and capabilities of a rate provider.
///
/// Callers branch on the declared frequency set, never on provider type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Source this provider serves.
    pub source: SourceId,
    /// Currency the source quotes all other currencies against.
    pub base_currency: Currency,
    /// Quote convention of the source.
    pub quote_type: QuoteType,
    /// Cadences the provider can fetch.
    pub frequencies: BTreeSet<Frequency>,
}

impl ProviderDescriptor {
    /// Create a new descriptor.
    pub fn new(
        source: SourceId,
        base_currency: Currency,
        quote_type: QuoteType,
        frequencies: impl IntoIterator<Item = Frequency>,
    ) -> Self {
        Self {
            source,
            base_currency,
            quote_type,
            frequencies: frequencies.into_iter().collect(),
        }
    }

    /// Check whether the provider publishes at the given cadence.
    pub fn supports(&self, frequency: Frequency) -> bool {
        self.frequencies.contains(&frequency)
    }
}
