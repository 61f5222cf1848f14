//! Pegged-currency lookup table.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::debug;

use crossrate_common::{Currency, PeggedCurrency};

use crate::error::{FxError, FxResult};

/// Read-only mapping from a currency to its fixed peg.
///
/// Populated once from the durable store at startup; there is no mutation
/// path afterwards.
pub struct PeggedCurrencies {
    pegs: HashMap<Currency, PeggedCurrency>,
}

impl PeggedCurrencies {
    /// Build the table from loaded definitions.
    ///
    /// A peg with a non-positive rate is a configuration fault.
    pub fn from_defs(defs: Vec<PeggedCurrency>) -> FxResult<Self> {
        let mut pegs = HashMap::with_capacity(defs.len());
        for def in defs {
            if def.rate <= Decimal::ZERO {
                return Err(FxError::InvalidRate {
                    currency: def.currency,
                    date: crossrate_common::today(),
                    value: def.rate,
                });
            }
            pegs.insert(def.currency.clone(), def);
        }

        debug!(pegs = pegs.len(), "Pegged-currency table loaded");
        Ok(Self { pegs })
    }

    /// Build an empty table (no pegged currencies configured).
    pub fn empty() -> Self {
        Self {
            pegs: HashMap::new(),
        }
    }

    /// Look up the peg for a currency, if it has one.
    pub fn get(&self, currency: &Currency) -> Option<&PeggedCurrency> {
        self.pegs.get(currency)
    }

    /// Number of configured pegs.
    pub fn len(&self) -> usize {
        self.pegs.len()
    }

    /// Check if no pegs are configured.
    pub fn is_empty(&self) -> bool {
        self.pegs.is_empty()
    }
}
