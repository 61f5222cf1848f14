//! Cross-rate resolution.
//!
//! Resolution combines four mechanisms, in order: identity, triangulation
//! over the source's base currency, pegged-currency recursion, and a
//! backward day-by-day walk bounded by the pair's tracked minimum date.
//! The walk consults the monthly cache first and falls back to the rate
//! store, which stays authoritative.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::trace;

use crossrate_common::{Currency, Frequency, ProviderDescriptor, QuoteType, SourceId};

use crate::cache::MonthlyCache;
use crate::error::{FxError, FxResult};
use crate::pegged::PeggedCurrencies;
use crate::store::RateStore;

/// Outcome of a resolution attempt.
///
/// The two misses are expected, data-dependent outcomes; callers decide
/// whether to ingest and retry. Faults travel as errors instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A rate was resolved.
    Found(Decimal),
    /// The date walk exhausted the window without a hit.
    NotFound,
    /// The lookup currency has no rates and no peg.
    UnsupportedCurrency(Currency),
}

impl Resolution {
    /// The resolved rate, if any.
    pub fn rate(&self) -> Option<Decimal> {
        match self {
            Resolution::Found(rate) => Some(*rate),
            _ => None,
        }
    }
}

/// Borrowing view over the engine state needed to resolve one request.
pub(crate) struct Resolver<'a> {
    store: &'a RateStore,
    cache: &'a MonthlyCache,
    pegged: &'a PeggedCurrencies,
    descriptors: &'a HashMap<SourceId, ProviderDescriptor>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        store: &'a RateStore,
        cache: &'a MonthlyCache,
        pegged: &'a PeggedCurrencies,
        descriptors: &'a HashMap<SourceId, ProviderDescriptor>,
    ) -> Self {
        Self {
            store,
            cache,
            pegged,
            descriptors,
        }
    }

    /// Resolve a rate for the requested pair, date, source and cadence.
    pub(crate) fn resolve(
        &self,
        from: &Currency,
        to: &Currency,
        date: NaiveDate,
        source: &SourceId,
        frequency: Frequency,
    ) -> FxResult<Resolution> {
        let mut visited = HashSet::new();
        self.resolve_guarded(from, to, date, source, frequency, &mut visited)
    }

    /// Recursive resolution with a visited-currency guard.
    ///
    /// Triangulation and pegged recursion both re-enter this function; the
    /// guard holds the pegged currencies on the current call stack so a
    /// cyclic peg configuration fails deterministically instead of
    /// recursing without bound.
    fn resolve_guarded(
        &self,
        from: &Currency,
        to: &Currency,
        date: NaiveDate,
        source: &SourceId,
        frequency: Frequency,
        visited: &mut HashSet<Currency>,
    ) -> FxResult<Resolution> {
        if from == to {
            return Ok(Resolution::Found(Decimal::ONE));
        }

        let descriptor = self
            .descriptors
            .get(source)
            .ok_or_else(|| FxError::UnknownSource(source.clone()))?;
        if !descriptor.supports(frequency) {
            return Err(FxError::FrequencyNotSupported {
                source: source.clone(),
                frequency,
            });
        }
        let base = &descriptor.base_currency;

        // Neither side is the source's base: compose both legs through it.
        if from != base && to != base {
            let leg_a = match self.resolve_guarded(from, base, date, source, frequency, visited)? {
                Resolution::Found(rate) => rate,
                miss => return Ok(miss),
            };
            let leg_b = match self.resolve_guarded(base, to, date, source, frequency, visited)? {
                Resolution::Found(rate) => rate,
                miss => return Ok(miss),
            };
            trace!(%from, %to, %base, "Triangulated rate");
            return Ok(Resolution::Found(leg_a * leg_b));
        }

        let lookup = if from == base { to } else { from };

        // No rates at all for the lookup currency: only a peg can help.
        if !self.store.has_currency(source, frequency, lookup) {
            let Some(peg) = self.pegged.get(lookup) else {
                return Ok(Resolution::UnsupportedCurrency(lookup.clone()));
            };

            if !visited.insert(lookup.clone()) {
                return Err(FxError::CyclicReference(lookup.clone()));
            }
            let leg =
                self.resolve_guarded(base, &peg.anchor, date, source, frequency, visited)?;
            visited.remove(lookup);

            let leg = match leg {
                Resolution::Found(rate) => rate,
                miss => return Ok(miss),
            };
            let rate = if to == base {
                peg.rate / leg
            } else {
                leg / peg.rate
            };
            trace!(%lookup, anchor = %peg.anchor, "Resolved via peg");
            return Ok(Resolution::Found(rate));
        }

        // Walk backward from the requested date down to the pair's floor.
        let floor = self.store.min_date(source, frequency)?;
        let mut day = date;
        while day >= floor {
            let value = self
                .cache
                .get(lookup, day, source, frequency)
                .or_else(|| self.store.get(source, frequency, lookup, day));

            if let Some(value) = value {
                let rate = match (descriptor.quote_type, from == base) {
                    (QuoteType::Direct, false) => value,
                    (QuoteType::Direct, true) => Decimal::ONE / value,
                    (QuoteType::Indirect, true) => value,
                    (QuoteType::Indirect, false) => Decimal::ONE / value,
                };
                return Ok(Resolution::Found(rate));
            }

            match day.pred_opt() {
                Some(previous) => day = previous,
                None => break,
            }
        }

        Ok(Resolution::NotFound)
    }
}
