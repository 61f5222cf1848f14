//! Crossrate Common Types
//!
//! This crate contains shared types used across the Crossrate engine:
//! currency codes, source identifiers, rate records, pegged-currency
//! definitions and provider descriptors.

pub mod currency;
pub mod identifiers;
pub mod rate;
pub mod time;

pub use currency::*;
pub use identifiers::*;
pub use rate::*;
pub use time::*;
