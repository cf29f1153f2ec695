//! Stable symbol partitioning across processes

use sha2::{Digest, Sha256};

use crate::error::ShardError;

/// First 8 bytes of SHA-256(symbol) as a big-endian integer.
///
/// Stable across processes and restarts.
pub fn symbol_hash(symbol: &str) -> u64 {
    let digest = Sha256::digest(symbol.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Whether `symbol` belongs to `shard_id` out of `shard_count`.
/// A zero shard count owns nothing.
pub fn owns(symbol: &str, shard_id: u32, shard_count: u32) -> bool {
    if shard_count == 0 {
        return false;
    }
    symbol_hash(symbol) % u64::from(shard_count) == u64::from(shard_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    shard_id: u32,
    shard_count: u32,
}

impl ShardRouter {
    pub fn new(shard_id: u32, shard_count: u32) -> Result<Self, ShardError> {
        if shard_count == 0 {
            return Err(ShardError::ZeroShards);
        }
        if shard_id >= shard_count {
            return Err(ShardError::ShardOutOfRange {
                shard_id,
                shard_count,
            });
        }
        Ok(Self {
            shard_id,
            shard_count,
        })
    }

    /// Owns every symbol
    pub fn single() -> Self {
        Self {
            shard_id: 0,
            shard_count: 1,
        }
    }

    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn owns_symbol(&self, symbol: &str) -> bool {
        owns(symbol, self.shard_id, self.shard_count)
    }
}

impl Default for ShardRouter {
    fn default() -> Self {
        Self::single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYMBOLS: [&str; 8] = ["BTCUSDT", "ETHUSDT", "AAPL", "MSFT", "SPY", "QQQ", "NVDA", "TSLA"];

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(symbol_hash("AAPL"), symbol_hash("AAPL"));
        assert_ne!(symbol_hash("AAPL"), symbol_hash("MSFT"));
    }

    #[test]
    fn test_exactly_one_owner() {
        for count in 1..=5 {
            for symbol in SYMBOLS {
                let owners = (0..count).filter(|id| owns(symbol, *id, count)).count();
                assert_eq!(owners, 1, "{symbol} with {count} shards");
            }
        }
    }

    #[test]
    fn test_single_owns_all() {
        let router = ShardRouter::single();
        assert!(SYMBOLS.iter().all(|s| router.owns_symbol(s)));
    }

    #[test]
    fn test_invalid_params() {
        assert_eq!(ShardRouter::new(0, 0), Err(ShardError::ZeroShards));
        assert_eq!(
            ShardRouter::new(3, 3),
            Err(ShardError::ShardOutOfRange {
                shard_id: 3,
                shard_count: 3
            })
        );
        assert!(!owns("AAPL", 0, 0));
        assert!(ShardRouter::new(2, 3).is_ok());
    }
}
