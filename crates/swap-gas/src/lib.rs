//! Gas fee estimation for the swap pipeline.
//!
//! A [`GasFeeService`] polls a gas-price oracle per configured chain, on an
//! interval keyed to the chain's block time, and keeps the latest result in
//! a lock-free slot. A failed fetch degrades the slot (error flag set, old
//! estimate retained) instead of clearing it, so consumers always have a
//! displayable fee.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use swap_types::{ChainId, ConfigSchema, GasFeeEstimate, GasFeeResult};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub mod implementations {
	pub mod http;
}

#[derive(Debug, Error)]
pub enum GasError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Malformed oracle response: {0}")]
	Parse(String),
	#[error("Chain {0} is not configured for gas estimation")]
	UnknownChain(ChainId),
}

#[async_trait]
pub trait GasOracleInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn fetch(&self, chain_id: ChainId) -> Result<GasFeeEstimate, GasError>;
}

pub struct GasFeeService {
	oracle: Arc<dyn GasOracleInterface>,
	slots: HashMap<ChainId, Arc<ArcSwapOption<GasFeeResult>>>,
}

impl GasFeeService {
	pub fn new(oracle: Arc<dyn GasOracleInterface>, chains: impl IntoIterator<Item = ChainId>) -> Self {
		let slots = chains
			.into_iter()
			.map(|chain| (chain, Arc::new(ArcSwapOption::from(None))))
			.collect();
		Self { oracle, slots }
	}

	/// Latest known result for the chain, if any reading has completed.
	pub fn latest(&self, chain_id: ChainId) -> Option<Arc<GasFeeResult>> {
		self.slots.get(&chain_id).and_then(|slot| slot.load_full())
	}

	/// Fetches once and updates the chain's slot. Oracle failures degrade
	/// the slot rather than erroring: the previous estimate is kept with
	/// the failure message attached.
	pub async fn refresh(&self, chain_id: ChainId) -> Result<Arc<GasFeeResult>, GasError> {
		let slot = self
			.slots
			.get(&chain_id)
			.ok_or(GasError::UnknownChain(chain_id))?;

		let result = match self.oracle.fetch(chain_id).await {
			Ok(estimate) => {
				debug!(chain = %chain_id, "Gas estimate refreshed");
				GasFeeResult::fresh(estimate)
			}
			Err(e) => {
				warn!(chain = %chain_id, error = %e, "Gas oracle fetch failed, keeping last estimate");
				let previous = slot.load_full().and_then(|r| r.estimate.clone());
				GasFeeResult::degraded(previous, e.to_string())
			}
		};

		let result = Arc::new(result);
		slot.store(Some(result.clone()));
		Ok(result)
	}

	/// Spawns one polling task per configured chain. The interval follows
	/// the chain's block time, so L2 estimates refresh faster than L1.
	pub fn spawn_polling(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
		self.slots
			.keys()
			.copied()
			.map(|chain_id| {
				let service = Arc::clone(self);
				tokio::spawn(async move {
					let mut interval = tokio::time::interval(chain_id.poll_interval());
					loop {
						interval.tick().await;
						// UnknownChain is impossible here; the chain came
						// from our own slot map.
						let _ = service.refresh(chain_id).await;
					}
				})
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicBool, Ordering};
	use swap_types::{FeeParams, GasSpeed, MAINNET};

	struct FlakyOracle {
		fail: AtomicBool,
	}

	#[async_trait]
	impl GasOracleInterface for FlakyOracle {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not used in tests")
		}

		async fn fetch(&self, _chain_id: ChainId) -> Result<GasFeeEstimate, GasError> {
			if self.fail.load(Ordering::SeqCst) {
				return Err(GasError::Network("oracle down".to_string()));
			}
			let mut fees = HashMap::new();
			fees.insert(
				GasSpeed::Urgent,
				FeeParams::Eip1559 {
					max_fee_per_gas: 40_000_000_000,
					max_priority_fee_per_gas: 2_000_000_000,
				},
			);
			fees.insert(
				GasSpeed::Normal,
				FeeParams::Eip1559 {
					max_fee_per_gas: 30_000_000_000,
					max_priority_fee_per_gas: 1_000_000_000,
				},
			);
			Ok(GasFeeEstimate {
				fees,
				gas_limit: 210_000,
			})
		}
	}

	#[tokio::test]
	async fn failure_keeps_last_known_good() {
		let oracle = Arc::new(FlakyOracle {
			fail: AtomicBool::new(false),
		});
		let service = GasFeeService::new(oracle.clone(), [MAINNET]);

		let fresh = service.refresh(MAINNET).await.unwrap();
		assert!(fresh.error.is_none());
		assert!(fresh.estimate.is_some());

		oracle.fail.store(true, Ordering::SeqCst);
		let degraded = service.refresh(MAINNET).await.unwrap();
		assert!(degraded.error.is_some());
		let estimate = degraded.estimate.as_ref().unwrap();
		assert_eq!(estimate.gas_limit, 210_000);
		assert!(estimate.params(GasSpeed::Urgent).is_some());
	}

	#[tokio::test]
	async fn unknown_chain_is_rejected() {
		let oracle = Arc::new(FlakyOracle {
			fail: AtomicBool::new(false),
		});
		let service = GasFeeService::new(oracle, [MAINNET]);
		assert!(matches!(
			service.refresh(ChainId(999)).await,
			Err(GasError::UnknownChain(_))
		));
	}
}
