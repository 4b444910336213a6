//! Currency descriptors and exact base-unit amounts.
//!
//! Amounts are raw integers scaled by the currency's decimals. All arithmetic
//! is checked integer arithmetic between amounts of the same currency;
//! nothing in this module touches floating point.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ChainId;

#[derive(Debug, Error)]
pub enum AmountError {
	#[error("Currency mismatch: {expected} vs {actual}")]
	CurrencyMismatch { expected: String, actual: String },
	#[error("Amount overflow")]
	Overflow,
}

/// Native asset or an ERC-20 token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrencyKind {
	Native,
	Token(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
	pub chain_id: ChainId,
	pub kind: CurrencyKind,
	pub decimals: u8,
	pub symbol: String,
}

impl Currency {
	pub fn native(chain_id: ChainId, symbol: impl Into<String>) -> Self {
		Self {
			chain_id,
			kind: CurrencyKind::Native,
			decimals: 18,
			symbol: symbol.into(),
		}
	}

	pub fn token(
		chain_id: ChainId,
		address: Address,
		decimals: u8,
		symbol: impl Into<String>,
	) -> Self {
		Self {
			chain_id,
			kind: CurrencyKind::Token(address),
			decimals,
			symbol: symbol.into(),
		}
	}

	pub fn is_native(&self) -> bool {
		matches!(self.kind, CurrencyKind::Native)
	}

	/// Address the quote API expects: zero for the native asset.
	pub fn address_for_api(&self) -> Address {
		match self.kind {
			CurrencyKind::Native => Address::ZERO,
			CurrencyKind::Token(address) => address,
		}
	}

	/// Address used for identity comparisons. The native asset compares by
	/// its wrapped form so that e.g. ETH and WETH match, mirroring how
	/// quotes for native input are routed through the wrapped token.
	pub fn wrapped_address(&self) -> Option<Address> {
		match self.kind {
			CurrencyKind::Native => self.chain_id.wrapped_native(),
			CurrencyKind::Token(address) => Some(address),
		}
	}

	/// Identity match across the native/wrapped boundary.
	pub fn matches(&self, other: &Currency) -> bool {
		self.chain_id == other.chain_id
			&& match (self.wrapped_address(), other.wrapped_address()) {
				(Some(a), Some(b)) => a == b,
				_ => false,
			}
	}
}

/// A raw integer amount of a specific currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyAmount {
	pub currency: Currency,
	pub raw: U256,
}

impl CurrencyAmount {
	pub fn from_raw(currency: Currency, raw: U256) -> Self {
		Self { currency, raw }
	}

	pub fn zero(currency: Currency) -> Self {
		Self {
			currency,
			raw: U256::ZERO,
		}
	}

	pub fn is_zero(&self) -> bool {
		self.raw.is_zero()
	}

	pub fn checked_add(&self, other: &CurrencyAmount) -> Result<CurrencyAmount, AmountError> {
		self.require_same_currency(other)?;
		let raw = self
			.raw
			.checked_add(other.raw)
			.ok_or(AmountError::Overflow)?;
		Ok(CurrencyAmount::from_raw(self.currency.clone(), raw))
	}

	pub fn checked_sub(&self, other: &CurrencyAmount) -> Result<CurrencyAmount, AmountError> {
		self.require_same_currency(other)?;
		let raw = self
			.raw
			.checked_sub(other.raw)
			.ok_or(AmountError::Overflow)?;
		Ok(CurrencyAmount::from_raw(self.currency.clone(), raw))
	}

	fn require_same_currency(&self, other: &CurrencyAmount) -> Result<(), AmountError> {
		if self.currency != other.currency {
			return Err(AmountError::CurrencyMismatch {
				expected: self.currency.symbol.clone(),
				actual: other.currency.symbol.clone(),
			});
		}
		Ok(())
	}

	/// Decimal rendering with the currency's full precision, e.g. a raw
	/// 3000000000 with 6 decimals renders as "3000.000000". Pure integer
	/// division; no rounding can occur.
	pub fn to_exact(&self) -> String {
		let decimals = self.currency.decimals as usize;
		if decimals == 0 {
			return self.raw.to_string();
		}
		let scale = U256::from(10u64).pow(U256::from(decimals));
		let whole = self.raw / scale;
		let frac = self.raw % scale;
		format!("{}.{:0>width$}", whole, frac.to_string(), width = decimals)
	}
}
