//! Quote-to-trade transformation and validation.
//!
//! A raw quote response becomes a typed [`Trade`] only if it still matches
//! the request that produced it; anything mismatched (fast user edits racing
//! slow responses, chain switches mid-flight) is dropped as stale rather
//! than surfaced as an error.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;
use swap_types::{
	rate_impact_bps, Currency, CurrencyAmount, Fraction, OrderKind, OrderQuote, QuoteRequest,
	QuoteResponse, Trade, TradeVariant,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TradeError {
	#[error("Malformed quote amount '{0}'")]
	MalformedAmount(String),
}

fn parse_amount(raw: &str) -> Result<U256, TradeError> {
	U256::from_str(raw).map_err(|_| TradeError::MalformedAmount(raw.to_string()))
}

/// Fractional price impact for order-style routes, derived from USD values:
/// `(input - output - gas - fee) / input`. The result is intentionally
/// unclamped (a favorable auction yields a negative impact) and `None`
/// whenever input, output, or the gas estimate is missing. A missing
/// protocol fee counts as zero.
pub fn order_price_impact(
	input_usd: Option<Decimal>,
	output_usd: Option<Decimal>,
	gas_fee_usd: Option<Decimal>,
	swap_fee_usd: Option<Decimal>,
) -> Option<Decimal> {
	let input = input_usd?;
	let output = output_usd?;
	let gas = gas_fee_usd?;
	let fee = swap_fee_usd.unwrap_or(Decimal::ZERO);
	if input.is_zero() {
		return None;
	}
	Some((input - output - gas - fee) / input)
}

/// Whether the quoted token is an acceptable representation of the
/// requested currency: the literal API address (zero for native) or the
/// wrapped form.
fn token_matches(quoted: alloy::primitives::Address, requested: &Currency) -> bool {
	quoted == requested.address_for_api() || Some(quoted) == requested.wrapped_address()
}

fn order_kind(response: &QuoteResponse) -> Option<OrderKind> {
	match response {
		QuoteResponse::UniswapX(_) => Some(OrderKind::UniswapX),
		QuoteResponse::Rfq(_) => Some(OrderKind::Rfq),
		QuoteResponse::Classic(_) | QuoteResponse::Wrap(_) | QuoteResponse::Unwrap(_) => None,
	}
}

/// Converts a quote response into a [`Trade`], or `None` when the response
/// no longer matches the request ("stale trade"). Only malformed payloads
/// are errors.
pub fn transform_quote_response(
	request: &QuoteRequest,
	response: &QuoteResponse,
) -> Result<Option<Trade>, TradeError> {
	if response.chain_id() != request.chain_id {
		warn!(
			requested = %request.chain_id,
			quoted = %response.chain_id(),
			"Dropping quote from a different chain"
		);
		return Ok(None);
	}

	match response {
		QuoteResponse::Classic(quote) => {
			if !token_matches(quote.token_in.token, &request.input)
				|| !token_matches(quote.token_out.token, &request.output)
			{
				warn!(quote_id = %quote.quote_id, "Dropping classic quote with mismatched tokens");
				return Ok(None);
			}

			let input_raw = parse_amount(&quote.token_in.amount)?;
			let output_raw = parse_amount(&quote.token_out.amount)?;

			let price_impact = match quote.price_impact {
				// The router's own impact figure, in percent.
				Some(percent) => Some(percent / Decimal::ONE_HUNDRED),
				None => classic_impact_from_mid(quote.mid_amount_out.as_deref(), input_raw, output_raw)?,
			};

			// A native input routed through the wrapped token needs an
			// explicit wrap step ahead of the swap.
			let needs_wrapped_input = request.input.is_native()
				&& Some(quote.token_in.token) == request.input.wrapped_address();

			Ok(Some(Trade {
				quote_id: quote.quote_id.clone(),
				trade_type: request.trade_type,
				input: CurrencyAmount::from_raw(request.input.clone(), input_raw),
				output: CurrencyAmount::from_raw(request.output.clone(), output_raw),
				slippage_bps: request.slippage_bps,
				deadline: quote.deadline,
				price_impact,
				permit: quote.permit.clone(),
				variant: TradeVariant::Classic {
					swap: quote.swap.clone().unwrap_or(swap_types::SwapTransactionFields {
						to: None,
						data: String::new(),
						value: None,
					}),
					gas: quote.gas.clone(),
					gas_fee_usd: quote.gas_fee_usd,
					needs_wrapped_input,
				},
			}))
		}
		QuoteResponse::UniswapX(quote) | QuoteResponse::Rfq(quote) => {
			// Order-style quotes always express the input in wrapped form;
			// reject anything else outright.
			if Some(quote.token_in.token) != request.input.wrapped_address()
				|| !token_matches(quote.token_out.token, &request.output)
			{
				warn!(quote_id = %quote.quote_id, "Dropping order quote with mismatched tokens");
				return Ok(None);
			}

			let kind = match order_kind(response) {
				Some(kind) => kind,
				None => return Ok(None),
			};

			Ok(Some(order_trade(request, quote, kind)?))
		}
		QuoteResponse::Wrap(quote) | QuoteResponse::Unwrap(quote) => {
			let amount = parse_amount(&quote.amount)?;
			let variant = if matches!(response, QuoteResponse::Wrap(_)) {
				TradeVariant::Wrap
			} else {
				TradeVariant::Unwrap
			};
			Ok(Some(Trade {
				quote_id: quote.quote_id.clone(),
				trade_type: request.trade_type,
				input: CurrencyAmount::from_raw(request.input.clone(), amount),
				output: CurrencyAmount::from_raw(request.output.clone(), amount),
				slippage_bps: request.slippage_bps,
				deadline: None,
				price_impact: None,
				permit: None,
				variant,
			}))
		}
	}
}

fn order_trade(
	request: &QuoteRequest,
	quote: &OrderQuote,
	kind: OrderKind,
) -> Result<Trade, TradeError> {
	let input_raw = parse_amount(&quote.token_in.amount)?;
	let output_raw = parse_amount(&quote.token_out.amount)?;

	Ok(Trade {
		quote_id: quote.quote_id.clone(),
		trade_type: request.trade_type,
		input: CurrencyAmount::from_raw(request.input.clone(), input_raw),
		output: CurrencyAmount::from_raw(request.output.clone(), output_raw),
		slippage_bps: request.slippage_bps,
		deadline: quote.deadline,
		price_impact: order_price_impact(
			quote.input_usd,
			quote.output_usd,
			quote.gas_fee_usd,
			quote.swap_fee_usd,
		),
		permit: None,
		variant: TradeVariant::Order {
			kind,
			payload: quote.order.clone(),
		},
	})
}

/// Impact fallback from the route's spot output: the fractional shortfall
/// of the executed rate against the spot rate, exact to a basis point.
fn classic_impact_from_mid(
	mid_amount_out: Option<&str>,
	input_raw: U256,
	output_raw: U256,
) -> Result<Option<Decimal>, TradeError> {
	let Some(mid) = mid_amount_out else {
		return Ok(None);
	};
	let mid_raw = parse_amount(mid)?;
	let (Some(nominal), Some(execution)) = (
		Fraction::new(mid_raw, input_raw),
		Fraction::new(output_raw, input_raw),
	) else {
		return Ok(None);
	};
	let bps = rate_impact_bps(nominal, execution);
	Ok(Some(Decimal::new(bps, 4)))
}

/// The trade object must keep matching the live form values; a mismatch
/// means the user edited the form while a quote was in flight, and the
/// trade must not be surfaced, let alone submitted.
pub fn validate_trade(
	trade: Option<&Trade>,
	input: Option<&Currency>,
	output: Option<&Currency>,
	exact_amount: Option<U256>,
) -> Option<Trade> {
	let trade = trade?;
	let input = input?;
	let output = output?;
	exact_amount?;

	if !trade.matches_currencies(input, output) {
		warn!(
			quote_id = %trade.quote_id,
			"Mismatched currencies in trade; discarding as stale"
		);
		return None;
	}

	Some(trade.clone())
}

/// Whether a newly validated trade differs from the installed one in any
/// way the user can observe. The rate is compared as an exact rational so
/// re-quotes at identical terms never read as a change.
pub fn trade_changed(current: Option<&Trade>, next: &Trade) -> bool {
	match current {
		None => true,
		Some(current) => {
			current.input != next.input
				|| current.output != next.output
				|| current.execution_rate() != next.execution_rate()
				|| current.price_impact != next.price_impact
		}
	}
}
