//! FX engine error types.
//!
//! Faults only. The two data-dependent outcomes of resolution ("no rate in
//! the window", "currency has no rates and no peg") are values of
//! [`crate::resolver::Resolution`], not errors: they are handled by
//! ingest-and-retry and surface to callers as an absent rate.

use chrono::NaiveDate;
use crossrate_common::{Currency, Frequency, InvalidCurrencyCode, SourceId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in the FX engine.
#[derive(Debug, Error)]
pub enum FxError {
    /// Malformed currency code in caller input.
    #[error(transparent)]
    InvalidCurrency(#[from] InvalidCurrencyCode),

    /// No provider registered for the requested source.
    #[error("unknown source: {0}")]
    UnknownSource(SourceId),

    /// Two providers registered for the same source.
    #[error("duplicate provider for source: {0}")]
    DuplicateSource(SourceId),

    /// The source does not publish at the requested cadence.
    #[error("source {source} does not support frequency {frequency}")]
    FrequencyNotSupported {
        source: SourceId,
        frequency: Frequency,
    },

    /// Min-date bookkeeping missing for a pair the caller assumed tracked.
    #[error("no minimum date tracked for {source}/{frequency}")]
    MinDateMissing {
        source: SourceId,
        frequency: Frequency,
    },

    /// A second, disagreeing value was ingested for an existing tuple.
    #[error(
        "conflicting rate for {currency} ({source}/{frequency}) on {date}: \
         stored {existing}, incoming {incoming}"
    )]
    RateConflict {
        source: SourceId,
        frequency: Frequency,
        currency: Currency,
        date: NaiveDate,
        existing: Decimal,
        incoming: Decimal,
    },

    /// A rate value that cannot be used (zero or negative).
    #[error("invalid rate value {value} for {currency} on {date}")]
    InvalidRate {
        currency: Currency,
        date: NaiveDate,
        value: Decimal,
    },

    /// Pegged-currency configuration loops back onto itself.
    #[error("cyclic currency reference while resolving {0}")]
    CyclicReference(Currency),

    /// A targeted historical fetch returned no records at all.
    #[error("provider {source} returned no {frequency} rates for [{from}, {to}]")]
    EmptyBatch {
        source: SourceId,
        frequency: Frequency,
        from: NaiveDate,
        to: NaiveDate,
    },

    /// Provider-side failure (unreachable, malformed payload, ...).
    #[error("provider {source} failed: {message}")]
    Provider { source: SourceId, message: String },

    /// Durable-store failure.
    #[error("repository error: {0}")]
    Repository(String),
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
