//! Transaction requests and per-transaction lifecycle state.
//!
//! A request carries at most one gas-pricing scheme, matching its declared
//! type; [`TransactionRequest::clean_gas_fields`] enforces that once a type
//! is set. Lifecycle status changes go through an explicit transition table
//! so a transaction can only ever finalize once.

use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::chain::ChainId;

#[derive(Debug, Error)]
pub enum StateError {
	#[error("Invalid status transition: {from:?} -> {to:?}")]
	InvalidTransition {
		from: TransactionStatus,
		to: TransactionStatus,
	},
}

/// EVM transaction envelope type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
	Legacy,
	Eip2930,
	Eip1559,
}

/// A signable transaction request. Gas fields are optional so an
/// unpopulated request can be left for the chain client to fill; once
/// `tx_type` is set, [`Self::clean_gas_fields`] strips the mismatched
/// scheme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
	pub to: Option<Address>,
	pub data: Bytes,
	pub value: U256,
	pub chain_id: Option<ChainId>,
	pub nonce: Option<u64>,
	pub gas_limit: Option<u64>,
	pub tx_type: Option<TxType>,
	pub gas_price: Option<u128>,
	pub max_fee_per_gas: Option<u128>,
	pub max_priority_fee_per_gas: Option<u128>,
}

impl TransactionRequest {
	/// Strips gas fields that do not belong to the declared transaction
	/// type. Requests without a declared type are returned unchanged so
	/// the chain client can still infer capabilities.
	pub fn clean_gas_fields(mut self) -> Self {
		match self.tx_type {
			None => self,
			Some(TxType::Legacy) | Some(TxType::Eip2930) => {
				self.max_fee_per_gas = None;
				self.max_priority_fee_per_gas = None;
				self
			}
			Some(TxType::Eip1559) => {
				self.gas_price = None;
				self
			}
		}
	}
}

/// Raw signed transaction bytes plus the hash they commit to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
	pub raw: Bytes,
	pub hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub hash: B256,
	pub block_number: u64,
	pub success: bool,
}

/// What a tracked transaction is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
	Approve,
	Wrap,
	Unwrap,
	Swap,
	Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
	Pending,
	Cancelling,
	Success,
	Failed,
	Cancelled,
}

impl TransactionStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Success | Self::Failed | Self::Cancelled)
	}

	/// Legal transitions: `Pending -> {Success, Failed, Cancelling}` and
	/// `Cancelling -> {Cancelled, Success, Failed}`. A cancelling
	/// transaction may still land as the original outcome if the
	/// replacement loses the race.
	pub fn can_transition(self, next: TransactionStatus) -> bool {
		match self {
			Self::Pending => matches!(next, Self::Success | Self::Failed | Self::Cancelling),
			Self::Cancelling => matches!(next, Self::Cancelled | Self::Success | Self::Failed),
			Self::Success | Self::Failed | Self::Cancelled => false,
		}
	}
}

/// Locally assigned identifier for a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(Uuid);

impl TrackingId {
	#[allow(clippy::new_without_default)]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl fmt::Display for TrackingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for TrackingId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// A submitted transaction under lifecycle tracking. Created at submission
/// time, mutated only by the confirmation watcher, immutable once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedTransaction {
	pub id: TrackingId,
	pub chain_id: ChainId,
	pub from: Address,
	pub kind: TransactionKind,
	pub status: TransactionStatus,
	pub tx_hash: B256,
	pub nonce: u64,
	pub submitted_at: DateTime<Utc>,
	pub confirmed_at: Option<DateTime<Utc>>,
	/// Hash of the fee-bumped replacement when a cancellation is in flight.
	pub replaced_by: Option<B256>,
}

impl TrackedTransaction {
	pub fn new(
		chain_id: ChainId,
		from: Address,
		kind: TransactionKind,
		tx_hash: B256,
		nonce: u64,
	) -> Self {
		Self {
			id: TrackingId::new(),
			chain_id,
			from,
			kind,
			status: TransactionStatus::Pending,
			tx_hash,
			nonce,
			submitted_at: Utc::now(),
			confirmed_at: None,
			replaced_by: None,
		}
	}

	pub fn transition(&mut self, next: TransactionStatus) -> Result<(), StateError> {
		if !self.status.can_transition(next) {
			return Err(StateError::InvalidTransition {
				from: self.status,
				to: next,
			});
		}
		self.status = next;
		if next.is_terminal() {
			self.confirmed_at = Some(Utc::now());
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request() -> TransactionRequest {
		TransactionRequest {
			to: Some(Address::ZERO),
			chain_id: Some(ChainId(1)),
			gas_price: Some(30_000_000_000),
			max_fee_per_gas: Some(40_000_000_000),
			max_priority_fee_per_gas: Some(2_000_000_000),
			..Default::default()
		}
	}

	#[test]
	fn eip1559_request_drops_gas_price() {
		let cleaned = TransactionRequest {
			tx_type: Some(TxType::Eip1559),
			..request()
		}
		.clean_gas_fields();
		assert_eq!(cleaned.gas_price, None);
		assert_eq!(cleaned.max_fee_per_gas, Some(40_000_000_000));
		assert_eq!(cleaned.max_priority_fee_per_gas, Some(2_000_000_000));
	}

	#[test]
	fn legacy_request_drops_fee_market_fields() {
		let cleaned = TransactionRequest {
			tx_type: Some(TxType::Legacy),
			..request()
		}
		.clean_gas_fields();
		assert_eq!(cleaned.gas_price, Some(30_000_000_000));
		assert_eq!(cleaned.max_fee_per_gas, None);
		assert_eq!(cleaned.max_priority_fee_per_gas, None);
	}

	#[test]
	fn untyped_request_is_untouched() {
		let original = request();
		let cleaned = original.clone().clean_gas_fields();
		assert_eq!(cleaned, original);
	}

	#[test]
	fn terminal_states_are_sticky() {
		let mut tx = TrackedTransaction::new(
			ChainId(1),
			Address::ZERO,
			TransactionKind::Swap,
			B256::ZERO,
			7,
		);
		tx.transition(TransactionStatus::Success).unwrap();
		assert!(tx.confirmed_at.is_some());
		assert!(tx.transition(TransactionStatus::Failed).is_err());
	}

	#[test]
	fn cancelling_may_still_succeed() {
		let mut tx = TrackedTransaction::new(
			ChainId(1),
			Address::ZERO,
			TransactionKind::Swap,
			B256::ZERO,
			7,
		);
		tx.transition(TransactionStatus::Cancelling).unwrap();
		assert!(tx
			.status
			.can_transition(TransactionStatus::Cancelled));
		tx.transition(TransactionStatus::Success).unwrap();
		assert!(tx.status.is_terminal());
	}
}
