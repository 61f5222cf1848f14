//! Crossrate FX Engine
//!
//! Exchange-rate resolution and ingestion for arbitrary currency pairs,
//! dates, sources and publication cadences.
//!
//! # Features
//!
//! - Cross-rate resolution with triangulation over a source's base
//!   currency and pegged-currency recursion
//! - Backward date fallback bounded by per-pair minimum-date bookkeeping
//! - Reactive, single-flight ingestion from rate providers on a miss
//! - Month-granular cache with sliding expiry and single-day correction
//!
//! # Example
//!
//! ```rust,ignore
//! use crossrate_fx::{FxEngine, FxEngineConfig};
//! use crossrate_common::{Currency, Frequency, SourceId};
//!
//! let engine = FxEngine::load(providers, repository, FxEngineConfig::default()).await?;
//!
//! // Resolve a rate, ingesting history on demand.
//! let rate = engine
//!     .get_rate(&Currency::eur(), &Currency::usd(), date, &SourceId::new("ECB"), Frequency::Daily)
//!     .await?;
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod pegged;
pub mod provider;
pub mod repository;
pub mod resolver;
pub mod store;

pub use cache::{MonthlyCache, MonthlyCacheConfig};
pub use engine::{FxEngine, FxEngineConfig};
pub use error::{FxError, FxResult};
pub use ingest::RefreshOutcome;
pub use pegged::PeggedCurrencies;
pub use provider::RateProvider;
pub use repository::RateRepository;
pub use resolver::Resolution;
pub use store::{PutOutcome, RateStore, RateStoreConfig};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use repository::MemoryRateRepository;
