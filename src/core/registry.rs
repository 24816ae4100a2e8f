//! Chain/token address tables and token prices.
//!
//! Both are plain data handed to the engine at construction, so tests can
//! substitute fixtures.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::PayoutItem;

use super::error::PayoutError;

/// One supported chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Display name
    pub name: String,

    /// Token symbol → contract address
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

/// Chain id → chain info
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainRegistry {
    chains: BTreeMap<u64, ChainInfo>,
}

impl ChainRegistry {
    pub fn new(chains: BTreeMap<u64, ChainInfo>) -> Self {
        Self { chains }
    }

    /// USDC on Base, Arbitrum, Polygon, Optimism and the Base/Arbitrum Sepolia testnets
    pub fn defaults() -> Self {
        let entries = [
            (8453, "Base", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            (42161, "Arbitrum", "0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
            (137, "Polygon", "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
            (10, "Optimism", "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
            (84532, "Base Sepolia", "0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            (421614, "Arbitrum Sepolia", "0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d"),
        ];

        let chains = entries
            .into_iter()
            .map(|(id, name, usdc)| {
                let mut tokens = BTreeMap::new();
                tokens.insert("USDC".to_string(), usdc.to_string());
                (
                    id,
                    ChainInfo {
                        name: name.to_string(),
                        tokens,
                    },
                )
            })
            .collect();

        Self { chains }
    }

    /// Add or replace a chain
    pub fn insert(&mut self, chain_id: u64, info: ChainInfo) {
        self.chains.insert(chain_id, info);
    }

    /// Overlay `other` on top of this registry
    pub fn extend(&mut self, other: ChainRegistry) {
        self.chains.extend(other.chains);
    }

    pub fn is_supported(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainInfo> {
        self.chains.get(&chain_id)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.chains.keys().copied()
    }

    /// Contract address of `symbol` on `chain_id` (symbol compared case-insensitively)
    pub fn token_address(&self, chain_id: u64, symbol: &str) -> Option<&str> {
        self.chains.get(&chain_id).and_then(|chain| {
            chain
                .tokens
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(symbol))
                .map(|(_, address)| address.as_str())
        })
    }

    /// Source and destination token addresses for an item
    pub fn resolve_pair(&self, item: &PayoutItem) -> Result<(String, String), PayoutError> {
        let from = self
            .token_address(item.source.chain_id, &item.source.token)
            .ok_or_else(|| PayoutError::UnsupportedToken {
                chain_id: item.source.chain_id,
                token: item.source.token.clone(),
            })?;
        let to = self
            .token_address(item.recipient.chain_id, &item.recipient.token)
            .ok_or_else(|| PayoutError::UnsupportedToken {
                chain_id: item.recipient.chain_id,
                token: item.recipient.token.clone(),
            })?;
        Ok((from.to_string(), to.to_string()))
    }
}

/// Token symbol → USD price. Unknown tokens are priced at parity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    prices: HashMap<String, Decimal>,
}

impl PriceTable {
    pub fn new(prices: HashMap<String, Decimal>) -> Self {
        Self {
            prices: prices
                .into_iter()
                .map(|(token, price)| (token.to_ascii_uppercase(), price))
                .collect(),
        }
    }

    /// Configured price, if any
    pub fn get(&self, token: &str) -> Option<Decimal> {
        self.prices.get(&token.to_ascii_uppercase()).copied()
    }

    /// Configured price, or 1 for unknown tokens
    pub fn price_or_parity(&self, token: &str) -> Decimal {
        self.get(token).unwrap_or(Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Recipient, Source};
    use alloy_primitives::U256;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn item(dest_chain: u64, dest_token: &str) -> PayoutItem {
        PayoutItem::new(
            Uuid::nil(),
            0,
            Recipient {
                address: "0x6666666666666666666666666666666666666666".to_string(),
                chain_id: dest_chain,
                token: dest_token.to_string(),
            },
            Source {
                chain_id: 8453,
                token: "USDC".to_string(),
                amount: U256::from(1u64),
            },
            String::new(),
        )
    }

    #[test]
    fn test_default_table() {
        let registry = ChainRegistry::defaults();
        assert!(registry.is_supported(42161));
        assert!(!registry.is_supported(1));
        assert_eq!(
            registry.token_address(10, "usdc"),
            Some("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85")
        );
        assert_eq!(registry.chain_ids().count(), 6);
    }

    #[test]
    fn test_resolve_pair() {
        let registry = ChainRegistry::defaults();
        let (from, to) = registry.resolve_pair(&item(137, "USDC")).unwrap();
        assert_eq!(from, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
        assert_eq!(to, "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359");
    }

    #[test]
    fn test_unsupported_token() {
        let registry = ChainRegistry::defaults();
        let err = registry.resolve_pair(&item(137, "WBTC")).unwrap_err();
        assert!(matches!(
            err,
            PayoutError::UnsupportedToken { chain_id: 137, ref token } if token == "WBTC"
        ));
        assert!(registry.resolve_pair(&item(1, "USDC")).is_err());
    }

    #[test]
    fn test_registry_from_yaml() {
        let yaml = "1:\n  name: Ethereum\n  tokens:\n    USDC: '0xA0b8'\n";
        let registry: ChainRegistry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(registry.token_address(1, "USDC"), Some("0xA0b8"));
    }

    #[test]
    fn test_price_table() {
        let prices = PriceTable::new([("weth".to_string(), dec!(3000))].into_iter().collect());
        assert_eq!(prices.get("WETH"), Some(dec!(3000)));
        assert_eq!(prices.get("USDC"), None);
        assert_eq!(prices.price_or_parity("USDC"), Decimal::ONE);
    }
}
