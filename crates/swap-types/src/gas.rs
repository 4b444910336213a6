//! Speed-tiered gas fee estimates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::transaction::TxType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasSpeed {
	Normal,
	Urgent,
}

/// Fee parameters in one of the two gas-pricing schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeParams {
	Legacy {
		gas_price: u128,
	},
	Eip1559 {
		max_fee_per_gas: u128,
		max_priority_fee_per_gas: u128,
	},
}

impl FeeParams {
	pub fn tx_type(&self) -> TxType {
		match self {
			FeeParams::Legacy { .. } => TxType::Legacy,
			FeeParams::Eip1559 { .. } => TxType::Eip1559,
		}
	}
}

/// One oracle reading: fee parameters per speed tier plus a gas limit
/// suggestion. All tiers of a single estimate share one pricing scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasFeeEstimate {
	pub fees: HashMap<GasSpeed, FeeParams>,
	pub gas_limit: u64,
}

impl GasFeeEstimate {
	pub fn params(&self, speed: GasSpeed) -> Option<FeeParams> {
		self.fees.get(&speed).copied()
	}
}

/// Latest known gas state for a chain. A fetch failure keeps the previous
/// estimate and sets `error`, so a displayable fee always survives outages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasFeeResult {
	pub estimate: Option<GasFeeEstimate>,
	pub error: Option<String>,
	pub as_of: DateTime<Utc>,
}

impl GasFeeResult {
	pub fn fresh(estimate: GasFeeEstimate) -> Self {
		Self {
			estimate: Some(estimate),
			error: None,
			as_of: Utc::now(),
		}
	}

	pub fn degraded(previous: Option<GasFeeEstimate>, error: impl Into<String>) -> Self {
		Self {
			estimate: previous,
			error: Some(error.into()),
			as_of: Utc::now(),
		}
	}
}
