//! Chain identifiers and the per-chain constants the pipeline needs.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// EVM chain identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

pub const MAINNET: ChainId = ChainId(1);
pub const OPTIMISM: ChainId = ChainId(10);
pub const POLYGON: ChainId = ChainId(137);
pub const BASE: ChainId = ChainId(8453);
pub const ARBITRUM: ChainId = ChainId(42161);

impl ChainId {
	/// Whether the quote API can route trades on this chain.
	pub fn is_supported(self) -> bool {
		matches!(self, MAINNET | OPTIMISM | POLYGON | BASE | ARBITRUM)
	}

	pub fn is_l2(self) -> bool {
		matches!(self, OPTIMISM | POLYGON | BASE | ARBITRUM)
	}

	/// Address of the wrapped form of the chain's native asset.
	pub fn wrapped_native(self) -> Option<Address> {
		match self {
			MAINNET => Some(address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2")),
			OPTIMISM | BASE => Some(address!("4200000000000000000000000000000000000006")),
			POLYGON => Some(address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270")),
			ARBITRUM => Some(address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1")),
			ChainId(_) => None,
		}
	}

	/// Receipt/oracle polling cadence. L2 blocks land in a couple of
	/// seconds, L1 every twelve, so the interval follows the block time.
	pub fn poll_interval(self) -> Duration {
		if self.is_l2() {
			Duration::from_secs(3)
		} else {
			Duration::from_secs(12)
		}
	}
}

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<u64> for ChainId {
	fn from(id: u64) -> Self {
		ChainId(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn l2_polls_faster_than_l1() {
		assert!(BASE.poll_interval() < MAINNET.poll_interval());
	}

	#[test]
	fn unknown_chain_is_unsupported() {
		assert!(!ChainId(999_999).is_supported());
		assert!(ChainId(999_999).wrapped_native().is_none());
	}
}
