// ============================================================================
// Exchange Configuration
// ============================================================================

use super::TraderId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Reservation Policy
// ============================================================================

/// How much currency a buy order takes from the buyer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReservationPolicy {
    /// Debit `amount × limit` up front and never reconcile it.
    /// Matching below the limit leaves the difference with the exchange.
    #[default]
    FullLimit,

    /// Debit what the matched quantity actually settled for, plus
    /// `remainder × limit` for the part that rests in the book.
    /// Funds are still checked against `amount × limit`.
    SettledPrice,
}

// ============================================================================
// Exchange Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExchangeConfig {
    /// Identity the exchange holds external assets under
    pub custodian: TraderId,

    /// When set, only this trader may register assets
    pub registrar: Option<TraderId>,

    pub reservation: ReservationPolicy,

    /// Longest accepted asset symbol
    pub max_symbol_len: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            custodian: TraderId::from("exchange"),
            registrar: None,
            reservation: ReservationPolicy::FullLimit,
            max_symbol_len: 8,
        }
    }
}

impl ExchangeConfig {
    pub fn new(custodian: impl Into<TraderId>) -> Self {
        Self {
            custodian: custodian.into(),
            ..Self::default()
        }
    }

    /// Builder method: restrict asset registration to one trader
    pub fn with_registrar(mut self, registrar: impl Into<TraderId>) -> Self {
        self.registrar = Some(registrar.into());
        self
    }

    /// Builder method: set the buy-side reservation policy
    pub fn with_reservation(mut self, reservation: ReservationPolicy) -> Self {
        self.reservation = reservation;
        self
    }

    /// Builder method: set the maximum symbol length
    pub fn with_max_symbol_len(mut self, len: usize) -> Self {
        self.max_symbol_len = len;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.custodian.as_str().is_empty() {
            return Err("Custodian cannot be empty".to_string());
        }

        if self.max_symbol_len == 0 {
            return Err("Maximum symbol length must be positive".to_string());
        }

        if let Some(registrar) = &self.registrar {
            if registrar.as_str().is_empty() {
                return Err("Registrar cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(json).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Preset Configurations (Factory Methods)
// ============================================================================

impl ExchangeConfig {
    /// Buyers pay `amount × limit` up front, price improvement retained
    pub fn strict_reservation() -> Self {
        Self::default().with_reservation(ReservationPolicy::FullLimit)
    }

    /// Buyers pay the settled price for what matches on submission
    pub fn settled_price() -> Self {
        Self::default().with_reservation(ReservationPolicy::SettledPrice)
    }
}
