//! Exact rational arithmetic for exchange-rate comparisons.
//!
//! Rates are compared by 512-bit cross multiplication so that two quotes are
//! only ever reported as "changed" when their exact rationals differ.

use alloy::primitives::{U256, U512};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

fn widen(x: U256) -> U512 {
	U512::from_be_slice(&x.to_be_bytes::<32>())
}

/// A non-negative rational with a non-zero denominator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fraction {
	numerator: U256,
	denominator: U256,
}

impl Fraction {
	pub fn new(numerator: U256, denominator: U256) -> Option<Self> {
		if denominator.is_zero() {
			return None;
		}
		Some(Self {
			numerator,
			denominator,
		})
	}

	pub fn numerator(&self) -> U256 {
		self.numerator
	}

	pub fn denominator(&self) -> U256 {
		self.denominator
	}

	pub fn is_zero(&self) -> bool {
		self.numerator.is_zero()
	}
}

impl PartialEq for Fraction {
	fn eq(&self, other: &Self) -> bool {
		widen(self.numerator) * widen(other.denominator)
			== widen(other.numerator) * widen(self.denominator)
	}
}

impl Eq for Fraction {}

impl PartialOrd for Fraction {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Fraction {
	fn cmp(&self, other: &Self) -> Ordering {
		let lhs = widen(self.numerator) * widen(other.denominator);
		let rhs = widen(other.numerator) * widen(self.denominator);
		lhs.cmp(&rhs)
	}
}

/// Relative shortfall of `execution` against `nominal`, in signed basis
/// points: `(nominal - execution) / nominal`. Negative when the execution
/// rate is better than the nominal rate. Exact integer math throughout.
pub fn rate_impact_bps(nominal: Fraction, execution: Fraction) -> i64 {
	let n = widen(nominal.numerator) * widen(execution.denominator);
	let e = widen(execution.numerator) * widen(nominal.denominator);
	if n.is_zero() {
		return 0;
	}
	let bps_scale = U512::from(10_000u64);
	if e <= n {
		let diff = n - e;
		let bps = diff.checked_mul(bps_scale).unwrap_or(U512::MAX) / n;
		bps.saturating_to::<u64>() as i64
	} else {
		let diff = e - n;
		let bps = diff.checked_mul(bps_scale).unwrap_or(U512::MAX) / n;
		-(bps.saturating_to::<u64>().min(i64::MAX as u64) as i64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn frac(n: u64, d: u64) -> Fraction {
		Fraction::new(U256::from(n), U256::from(d)).unwrap()
	}

	#[test]
	fn compares_without_division() {
		assert_eq!(frac(1, 3), frac(2, 6));
		assert!(frac(1, 3) < frac(1, 2));
		assert!(frac(7, 2) > frac(10, 3));
	}

	#[test]
	fn rejects_zero_denominator() {
		assert!(Fraction::new(U256::from(1u64), U256::ZERO).is_none());
	}

	#[test]
	fn impact_is_signed_and_exact() {
		// Execution 2% worse than nominal.
		assert_eq!(rate_impact_bps(frac(100, 1), frac(98, 1)), 200);
		// Execution better than nominal goes negative, unclamped.
		assert_eq!(rate_impact_bps(frac(100, 1), frac(101, 1)), -100);
		assert_eq!(rate_impact_bps(frac(3, 7), frac(3, 7)), 0);
	}

	#[test]
	fn impact_survives_wei_scale_values() {
		// 1 ETH -> 3000 USDC expressed in base units (1e18 vs 3e9).
		let nominal = Fraction::new(
			U256::from(3_000_000_000u64),
			U256::from(10u64).pow(U256::from(18u64)),
		)
		.unwrap();
		let execution = Fraction::new(
			U256::from(2_994_000_000u64),
			U256::from(10u64).pow(U256::from(18u64)),
		)
		.unwrap();
		assert_eq!(rate_impact_bps(nominal, execution), 20);
	}
}
