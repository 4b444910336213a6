//! Validated trades ready for execution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::{Currency, CurrencyAmount};
use crate::fraction::Fraction;
use crate::quote::{ApiGasInfo, SwapTransactionFields, TradeType, TypedDataPayload};

/// Order-style settlement flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
	UniswapX,
	Rfq,
}

/// Variant-specific payload of a validated trade. Consumers match
/// exhaustively; there are no runtime shape probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeVariant {
	Classic {
		swap: SwapTransactionFields,
		gas: Option<ApiGasInfo>,
		gas_fee_usd: Option<Decimal>,
		/// The route is expressed in the wrapped token while the user pays
		/// native, so a wrap step must precede the swap.
		needs_wrapped_input: bool,
	},
	Order {
		kind: OrderKind,
		payload: TypedDataPayload,
	},
	Wrap,
	Unwrap,
}

/// A typed-data order signed by the account, ready for off-chain
/// submission to the pricing API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedOrder {
	pub quote_id: String,
	pub payload: TypedDataPayload,
	pub signature: Vec<u8>,
}

/// A validated, typed trade derived from a quote response. Superseded by the
/// next completed quote and discarded when it no longer matches form state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
	pub quote_id: String,
	pub trade_type: TradeType,
	pub input: CurrencyAmount,
	pub output: CurrencyAmount,
	pub slippage_bps: u16,
	pub deadline: Option<u64>,
	/// Fractional price impact (0.002 = 0.2%). May be negative for
	/// order-style routes; `None` when it cannot be derived.
	pub price_impact: Option<Decimal>,
	pub permit: Option<TypedDataPayload>,
	pub variant: TradeVariant,
}

impl Trade {
	/// Execution rate as an exact rational (output per unit input).
	pub fn execution_rate(&self) -> Option<Fraction> {
		Fraction::new(self.output.raw, self.input.raw)
	}

	/// Whether the trade still refers to the given currency pair. Native
	/// and wrapped forms compare equal, mirroring how quotes are routed.
	pub fn matches_currencies(&self, input: &Currency, output: &Currency) -> bool {
		self.input.currency.matches(input) && self.output.currency.matches(output)
	}

	/// Whether the swap needs the native asset wrapped before execution:
	/// the user pays native but the route settles in the wrapped token.
	pub fn requires_wrap(&self) -> bool {
		matches!(
			self.variant,
			TradeVariant::Classic {
				needs_wrapped_input: true,
				..
			}
		) && self.input.currency.is_native()
	}
}
