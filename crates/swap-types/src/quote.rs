//! Quote request/response model for the pricing API.
//!
//! Responses are a tagged union on `routing` so that every consumer matches
//! exhaustively on the trade variant instead of probing fields at runtime.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::currency::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeType {
	ExactInput,
	ExactOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Protocol {
	V2,
	V3,
	UniswapX,
	Rfq,
}

pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

/// Raw user-input view of the swap form. Everything is optional; the
/// pipeline derives a [`QuoteRequest`] from it once the form is complete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteForm {
	pub input: Option<Currency>,
	pub output: Option<Currency>,
	pub exact_amount: Option<U256>,
	pub trade_type: Option<TradeType>,
	pub slippage_bps: Option<u16>,
	pub protocols: Vec<Protocol>,
}

impl QuoteForm {
	/// Derives the immutable request for the current form state, or `None`
	/// ("skip") when a required field is missing, the amount is zero, or
	/// the input chain is unsupported. A skip must never reach the network.
	pub fn to_request(&self) -> Option<QuoteRequest> {
		let input = self.input.clone()?;
		let output = self.output.clone()?;
		let amount = self.exact_amount?;
		if amount.is_zero() {
			return None;
		}
		if !input.chain_id.is_supported() {
			return None;
		}
		Some(QuoteRequest {
			chain_id: input.chain_id,
			input,
			output,
			amount,
			trade_type: self.trade_type.unwrap_or(TradeType::ExactInput),
			slippage_bps: self.slippage_bps.unwrap_or(DEFAULT_SLIPPAGE_BPS),
			protocols: self.protocols.clone(),
		})
	}
}

/// Immutable quote request. Any input change produces a new request.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
	pub chain_id: ChainId,
	pub input: Currency,
	pub output: Currency,
	pub amount: U256,
	pub trade_type: TradeType,
	pub slippage_bps: u16,
	pub protocols: Vec<Protocol>,
}

/// Token/amount pair as the API sends it: address string plus a raw
/// base-unit amount in decimal string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTokenAmount {
	pub token: Address,
	pub amount: String,
}

/// Gas shape the quote indicates for the swap transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGasInfo {
	pub supports_eip1559: bool,
	pub gas_limit: Option<u64>,
}

/// Prepared swap call fields returned with a classic quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransactionFields {
	pub to: Option<Address>,
	pub data: String,
	pub value: Option<String>,
}

/// EIP-712 payload for a permit or an off-chain order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataPayload {
	pub domain: serde_json::Value,
	pub types: serde_json::Value,
	pub primary_type: String,
	pub message: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassicQuote {
	pub quote_id: String,
	pub chain_id: u64,
	pub token_in: ApiTokenAmount,
	pub token_out: ApiTokenAmount,
	/// Pool-level price impact in percent, when the router reports one.
	pub price_impact: Option<Decimal>,
	/// Output at the route's spot price for the same input, used to derive
	/// impact when the router does not report one.
	pub mid_amount_out: Option<String>,
	pub gas_fee_usd: Option<Decimal>,
	pub gas: Option<ApiGasInfo>,
	pub swap: Option<SwapTransactionFields>,
	pub permit: Option<TypedDataPayload>,
	pub deadline: Option<u64>,
}

/// Quote for an order-style route (auction or RFQ). Settlement happens via
/// a signed off-chain order, so USD value estimates stand in for pool-level
/// pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuote {
	pub quote_id: String,
	pub chain_id: u64,
	pub token_in: ApiTokenAmount,
	pub token_out: ApiTokenAmount,
	pub input_usd: Option<Decimal>,
	pub output_usd: Option<Decimal>,
	pub gas_fee_usd: Option<Decimal>,
	pub swap_fee_usd: Option<Decimal>,
	pub order: TypedDataPayload,
	pub deadline: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapQuote {
	pub quote_id: String,
	pub chain_id: u64,
	pub amount: String,
	pub gas_fee_usd: Option<Decimal>,
}

/// Pricing API response, discriminated by routing variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "routing")]
pub enum QuoteResponse {
	#[serde(rename = "classic")]
	Classic(ClassicQuote),
	#[serde(rename = "uniswapX")]
	UniswapX(OrderQuote),
	#[serde(rename = "rfq")]
	Rfq(OrderQuote),
	#[serde(rename = "wrap")]
	Wrap(WrapQuote),
	#[serde(rename = "unwrap")]
	Unwrap(WrapQuote),
}

impl QuoteResponse {
	pub fn quote_id(&self) -> &str {
		match self {
			QuoteResponse::Classic(q) => &q.quote_id,
			QuoteResponse::UniswapX(q) | QuoteResponse::Rfq(q) => &q.quote_id,
			QuoteResponse::Wrap(q) | QuoteResponse::Unwrap(q) => &q.quote_id,
		}
	}

	pub fn chain_id(&self) -> ChainId {
		match self {
			QuoteResponse::Classic(q) => ChainId(q.chain_id),
			QuoteResponse::UniswapX(q) | QuoteResponse::Rfq(q) => ChainId(q.chain_id),
			QuoteResponse::Wrap(q) | QuoteResponse::Unwrap(q) => ChainId(q.chain_id),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::chain::MAINNET;
	use alloy::primitives::address;

	fn form() -> QuoteForm {
		QuoteForm {
			input: Some(Currency::native(MAINNET, "ETH")),
			output: Some(Currency::token(
				MAINNET,
				address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
				6,
				"USDC",
			)),
			exact_amount: Some(U256::from(10u64).pow(U256::from(18u64))),
			trade_type: Some(TradeType::ExactInput),
			slippage_bps: None,
			protocols: vec![Protocol::V3],
		}
	}

	#[test]
	fn complete_form_yields_request() {
		let request = form().to_request().unwrap();
		assert_eq!(request.chain_id, MAINNET);
		assert_eq!(request.slippage_bps, DEFAULT_SLIPPAGE_BPS);
	}

	#[test]
	fn zero_amount_and_missing_fields_skip() {
		let mut zero = form();
		zero.exact_amount = Some(U256::ZERO);
		assert!(zero.to_request().is_none());

		let mut missing = form();
		missing.output = None;
		assert!(missing.to_request().is_none());
	}

	#[test]
	fn unsupported_chain_skips() {
		let mut f = form();
		f.input = Some(Currency::native(ChainId(424242), "XYZ"));
		assert!(f.to_request().is_none());
	}

	#[test]
	fn routing_tag_roundtrips() {
		let json = serde_json::json!({
			"routing": "wrap",
			"quoteId": "q-1",
			"chainId": 1,
			"amount": "1000",
		});
		let parsed: QuoteResponse = serde_json::from_value(json).unwrap();
		assert!(matches!(parsed, QuoteResponse::Wrap(_)));
	}
}
