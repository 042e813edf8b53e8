// ============================================================================
// Asset Registry
// Symbol -> (contract, index) bijection; index 0 is never handed out
// ============================================================================

use crate::error::{ExchangeError, ExchangeResult};
use crate::interfaces::AssetContract;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable registration index of an asset, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AssetIndex(u32);

impl AssetIndex {
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AssetIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered asset
#[derive(Clone)]
pub struct Asset {
    pub symbol: String,
    pub index: AssetIndex,
    pub contract: Arc<dyn AssetContract>,
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("symbol", &self.symbol)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct AssetRegistry {
    /// Registered assets in index order (`assets[i]` has index `i + 1`)
    assets: Vec<Asset>,
    by_symbol: HashMap<String, AssetIndex>,
    max_symbol_len: usize,
}

impl AssetRegistry {
    pub fn new(max_symbol_len: usize) -> Self {
        Self {
            assets: Vec::new(),
            by_symbol: HashMap::new(),
            max_symbol_len,
        }
    }

    /// Bind `symbol` to `contract` under the next free index
    pub fn register(
        &mut self,
        symbol: &str,
        contract: Arc<dyn AssetContract>,
    ) -> ExchangeResult<AssetIndex> {
        self.validate_symbol(symbol)?;
        if self.by_symbol.contains_key(symbol) {
            return Err(ExchangeError::AlreadyRegistered {
                symbol: symbol.to_string(),
            });
        }

        let raw = u32::try_from(self.assets.len() + 1).map_err(|_| ExchangeError::Overflow)?;
        let index = AssetIndex(raw);
        self.assets.push(Asset {
            symbol: symbol.to_string(),
            index,
            contract,
        });
        self.by_symbol.insert(symbol.to_string(), index);
        Ok(index)
    }

    pub fn is_registered(&self, symbol: &str) -> bool {
        self.by_symbol.contains_key(symbol)
    }

    pub fn resolve(&self, symbol: &str) -> ExchangeResult<&Asset> {
        self.by_symbol
            .get(symbol)
            .and_then(|index| self.get(*index))
            .ok_or_else(|| ExchangeError::UnknownAsset {
                symbol: symbol.to_string(),
            })
    }

    pub fn get(&self, index: AssetIndex) -> Option<&Asset> {
        (index.0 as usize)
            .checked_sub(1)
            .and_then(|i| self.assets.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn validate_symbol(&self, symbol: &str) -> ExchangeResult<()> {
        let reason = if symbol.is_empty() {
            "symbol is empty"
        } else if symbol.len() > self.max_symbol_len {
            "symbol is too long"
        } else if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            "symbol must be ASCII alphanumeric"
        } else {
            return Ok(());
        };

        Err(ExchangeError::InvalidSymbol {
            symbol: symbol.to_string(),
            reason,
        })
    }
}
