//! Transaction construction for validated trades.
//!
//! The builder is pure over its inputs: given a trade, the current token
//! allowance and a gas estimate, it produces an ordered [`SwapFlow`] of
//! transaction requests with relative nonce offsets (wrap and approve steps
//! ahead of the swap). Chain reads and nonce assignment belong to the
//! engine, not here. Order-style trades never become chain transactions;
//! they are signed as EIP-712 payloads instead.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::str::FromStr;
use swap_account::{AccountError, AccountService, Signature};
use swap_types::{
	ChainId, FeeParams, GasFeeEstimate, GasSpeed, SignedOrder, Trade, TradeVariant,
	TransactionKind, TransactionRequest, TxType,
};
use thiserror::Error;
use tracing::debug;

sol! {
	function deposit() payable;
	function withdraw(uint256 wad);
	function approve(address spender, uint256 amount) returns (bool);
}

/// Gas ceilings for the fixed-shape pre-steps. The swap step's limit comes
/// from the quote or the estimator.
const WRAP_GAS_LIMIT: u64 = 60_000;
const APPROVE_GAS_LIMIT: u64 = 60_000;

#[derive(Debug, Error)]
pub enum BuildError {
	#[error("Swap request missing required field '{0}'")]
	MissingField(&'static str),
	#[error("Chain {0} has no wrapped native token configured")]
	UnsupportedChain(ChainId),
	#[error("No gas parameters available for speed {0:?}")]
	MissingGasParams(GasSpeed),
	#[error("Gas scheme mismatch: quote indicates {expected:?}, estimate provides {actual:?}")]
	GasSchemeMismatch { expected: TxType, actual: TxType },
	#[error("Malformed swap field: {0}")]
	Malformed(String),
	#[error("Trade variant does not produce this artifact")]
	WrongVariant,
	#[error(transparent)]
	Account(#[from] AccountError),
}

/// One transaction of a multi-step flow. `nonce_offset` is relative to the
/// account's pending nonce at dispatch time; the swap step of a
/// wrap-then-swap flow carries offset 1.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStep {
	pub kind: TransactionKind,
	pub request: TransactionRequest,
	pub nonce_offset: u64,
}

/// An ordered set of transaction requests implementing one trade, plus the
/// permit signature when one was pre-signed.
#[derive(Debug, Clone)]
pub struct SwapFlow {
	pub steps: Vec<FlowStep>,
	pub permit_signature: Option<Signature>,
}

pub struct TransactionBuilder {
	speed: GasSpeed,
	permit_signing_enabled: bool,
}

impl TransactionBuilder {
	pub fn new(speed: GasSpeed, permit_signing_enabled: bool) -> Self {
		Self {
			speed,
			permit_signing_enabled,
		}
	}

	/// Builds the transaction flow for a chain-settled trade.
	///
	/// `allowance` is the router's current allowance for the input token;
	/// `None` means the input is native and no allowance applies.
	pub async fn build_flow(
		&self,
		trade: &Trade,
		account: &AccountService,
		allowance: Option<U256>,
		gas: &GasFeeEstimate,
	) -> Result<SwapFlow, BuildError> {
		match &trade.variant {
			TradeVariant::Classic {
				swap,
				gas: gas_hint,
				..
			} => {
				let chain_id = trade.input.currency.chain_id;
				let to = swap.to.ok_or(BuildError::MissingField("to"))?;

				let expected_type = match gas_hint {
					Some(hint) if !hint.supports_eip1559 => TxType::Legacy,
					_ => TxType::Eip1559,
				};
				let fees = self.fee_params(gas, expected_type)?;

				let mut steps = Vec::new();

				if trade.requires_wrap() {
					steps.push(FlowStep {
						kind: TransactionKind::Wrap,
						request: wrap_request(chain_id, trade.input.raw, fees)?,
						nonce_offset: steps.len() as u64,
					});
				}

				let permit_signature = if self.permit_signing_enabled {
					match &trade.permit {
						Some(payload) => Some(account.sign_typed_data(payload).await?),
						None => None,
					}
				} else {
					None
				};

				// An ERC-20 input needs an on-chain approval unless a
				// permit covers the spend.
				if let Some(current) = allowance {
					if current < trade.input.raw && permit_signature.is_none() {
						let token = trade
							.input
							.currency
							.wrapped_address()
							.ok_or(BuildError::UnsupportedChain(chain_id))?;
						steps.push(FlowStep {
							kind: TransactionKind::Approve,
							request: approve_request(chain_id, token, to, trade.input.raw, fees),
							nonce_offset: steps.len() as u64,
						});
					}
				}

				let value = match &swap.value {
					Some(raw) => U256::from_str(raw)
						.map_err(|_| BuildError::Malformed(format!("value '{}'", raw)))?,
					None => U256::ZERO,
				};

				let swap_request = TransactionRequest {
					to: Some(to),
					data: decode_calldata(&swap.data)?,
					value,
					chain_id: Some(chain_id),
					nonce: None,
					// Left open when the quote has no hint; the engine
					// estimates against the node before dispatch.
					gas_limit: gas_hint.as_ref().and_then(|hint| hint.gas_limit),
					tx_type: Some(expected_type),
					gas_price: None,
					max_fee_per_gas: None,
					max_priority_fee_per_gas: None,
				};
				let swap_request = apply_fees(swap_request, fees).clean_gas_fields();

				steps.push(FlowStep {
					kind: TransactionKind::Swap,
					request: swap_request,
					nonce_offset: steps.len() as u64,
				});

				debug!(
					steps = steps.len(),
					permit = permit_signature.is_some(),
					"Built swap flow"
				);

				Ok(SwapFlow {
					steps,
					permit_signature,
				})
			}
			TradeVariant::Wrap => {
				let chain_id = trade.input.currency.chain_id;
				let fees = self.fee_params(gas, TxType::Eip1559)?;
				Ok(SwapFlow {
					steps: vec![FlowStep {
						kind: TransactionKind::Wrap,
						request: wrap_request(chain_id, trade.input.raw, fees)?,
						nonce_offset: 0,
					}],
					permit_signature: None,
				})
			}
			TradeVariant::Unwrap => {
				let chain_id = trade.input.currency.chain_id;
				let fees = self.fee_params(gas, TxType::Eip1559)?;
				let wrapped = chain_id
					.wrapped_native()
					.ok_or(BuildError::UnsupportedChain(chain_id))?;
				let request = TransactionRequest {
					to: Some(wrapped),
					data: Bytes::from(
						withdrawCall {
							wad: trade.input.raw,
						}
						.abi_encode(),
					),
					value: U256::ZERO,
					chain_id: Some(chain_id),
					nonce: None,
					gas_limit: Some(WRAP_GAS_LIMIT),
					tx_type: Some(fees.tx_type()),
					gas_price: None,
					max_fee_per_gas: None,
					max_priority_fee_per_gas: None,
				};
				Ok(SwapFlow {
					steps: vec![FlowStep {
						kind: TransactionKind::Unwrap,
						request: apply_fees(request, fees).clean_gas_fields(),
						nonce_offset: 0,
					}],
					permit_signature: None,
				})
			}
			TradeVariant::Order { .. } => Err(BuildError::WrongVariant),
		}
	}

	/// Signs an order-style trade's EIP-712 payload for off-chain
	/// submission.
	pub async fn build_order(
		&self,
		trade: &Trade,
		account: &AccountService,
	) -> Result<SignedOrder, BuildError> {
		let TradeVariant::Order { payload, .. } = &trade.variant else {
			return Err(BuildError::WrongVariant);
		};

		let signature = account.sign_typed_data(payload).await?;
		Ok(SignedOrder {
			quote_id: trade.quote_id.clone(),
			payload: payload.clone(),
			signature: signature.0,
		})
	}

	fn fee_params(
		&self,
		gas: &GasFeeEstimate,
		expected: TxType,
	) -> Result<FeeParams, BuildError> {
		let params = gas
			.params(self.speed)
			.ok_or(BuildError::MissingGasParams(self.speed))?;
		if params.tx_type() != expected {
			return Err(BuildError::GasSchemeMismatch {
				expected,
				actual: params.tx_type(),
			});
		}
		Ok(params)
	}
}

fn decode_calldata(data: &str) -> Result<Bytes, BuildError> {
	let stripped = data.strip_prefix("0x").unwrap_or(data);
	hex::decode(stripped)
		.map(Bytes::from)
		.map_err(|e| BuildError::Malformed(format!("calldata: {}", e)))
}

fn apply_fees(mut request: TransactionRequest, fees: FeeParams) -> TransactionRequest {
	match fees {
		FeeParams::Legacy { gas_price } => {
			request.gas_price = Some(gas_price);
		}
		FeeParams::Eip1559 {
			max_fee_per_gas,
			max_priority_fee_per_gas,
		} => {
			request.max_fee_per_gas = Some(max_fee_per_gas);
			request.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
		}
	}
	request
}

fn wrap_request(
	chain_id: ChainId,
	amount: U256,
	fees: FeeParams,
) -> Result<TransactionRequest, BuildError> {
	let wrapped = chain_id
		.wrapped_native()
		.ok_or(BuildError::UnsupportedChain(chain_id))?;
	let request = TransactionRequest {
		to: Some(wrapped),
		data: Bytes::from(depositCall {}.abi_encode()),
		value: amount,
		chain_id: Some(chain_id),
		nonce: None,
		gas_limit: Some(WRAP_GAS_LIMIT),
		tx_type: Some(fees.tx_type()),
		gas_price: None,
		max_fee_per_gas: None,
		max_priority_fee_per_gas: None,
	};
	Ok(apply_fees(request, fees).clean_gas_fields())
}

fn approve_request(
	chain_id: ChainId,
	token: Address,
	spender: Address,
	amount: U256,
	fees: FeeParams,
) -> TransactionRequest {
	let request = TransactionRequest {
		to: Some(token),
		data: Bytes::from(approveCall { spender, amount }.abi_encode()),
		value: U256::ZERO,
		chain_id: Some(chain_id),
		nonce: None,
		gas_limit: Some(APPROVE_GAS_LIMIT),
		tx_type: Some(fees.tx_type()),
		gas_price: None,
		max_fee_per_gas: None,
		max_priority_fee_per_gas: None,
	};
	apply_fees(request, fees).clean_gas_fields()
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::address;
	use async_trait::async_trait;
	use std::collections::HashMap;
	use swap_account::AccountInterface;
	use swap_types::{
		ApiGasInfo, ConfigSchema, Currency, CurrencyAmount, SignedTransaction,
		SwapTransactionFields, TradeType, TypedDataPayload, MAINNET,
	};

	const ROUTER: Address = address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45");
	const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

	struct StubAccount;

	#[async_trait]
	impl AccountInterface for StubAccount {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not used in tests")
		}

		async fn address(&self) -> Result<Address, AccountError> {
			Ok(Address::repeat_byte(0x11))
		}

		async fn sign_transaction(
			&self,
			_request: &TransactionRequest,
		) -> Result<SignedTransaction, AccountError> {
			unimplemented!("not used in tests")
		}

		async fn sign_typed_data(
			&self,
			_payload: &TypedDataPayload,
		) -> Result<Signature, AccountError> {
			Ok(Signature(vec![0xab; 65]))
		}
	}

	fn account() -> AccountService {
		AccountService::new(Box::new(StubAccount))
	}

	fn estimate_1559() -> GasFeeEstimate {
		let mut fees = HashMap::new();
		fees.insert(
			GasSpeed::Urgent,
			FeeParams::Eip1559 {
				max_fee_per_gas: 40_000_000_000,
				max_priority_fee_per_gas: 2_000_000_000,
			},
		);
		GasFeeEstimate {
			fees,
			gas_limit: 250_000,
		}
	}

	fn estimate_legacy() -> GasFeeEstimate {
		let mut fees = HashMap::new();
		fees.insert(
			GasSpeed::Urgent,
			FeeParams::Legacy {
				gas_price: 30_000_000_000,
			},
		);
		GasFeeEstimate {
			fees,
			gas_limit: 250_000,
		}
	}

	fn classic_trade(input: Currency, needs_wrapped_input: bool) -> Trade {
		let amount = U256::from(10u64).pow(U256::from(18u64));
		Trade {
			quote_id: "q-1".to_string(),
			trade_type: TradeType::ExactInput,
			input: CurrencyAmount::from_raw(input, amount),
			output: CurrencyAmount::from_raw(
				Currency::token(MAINNET, USDC, 6, "USDC"),
				U256::from(3_000_000_000u64),
			),
			slippage_bps: 50,
			deadline: None,
			price_impact: None,
			permit: None,
			variant: TradeVariant::Classic {
				swap: SwapTransactionFields {
					to: Some(ROUTER),
					data: "0x1234".to_string(),
					value: None,
				},
				gas: None,
				gas_fee_usd: None,
				needs_wrapped_input,
			},
		}
	}

	fn builder() -> TransactionBuilder {
		TransactionBuilder::new(GasSpeed::Urgent, true)
	}

	#[tokio::test]
	async fn wrap_then_swap_offsets_nonce_by_one() {
		let trade = classic_trade(Currency::native(MAINNET, "ETH"), true);
		let flow = builder()
			.build_flow(&trade, &account(), None, &estimate_1559())
			.await
			.unwrap();

		assert_eq!(flow.steps.len(), 2);
		assert_eq!(flow.steps[0].kind, TransactionKind::Wrap);
		assert_eq!(flow.steps[0].nonce_offset, 0);
		assert_eq!(flow.steps[1].kind, TransactionKind::Swap);
		assert_eq!(flow.steps[1].nonce_offset, flow.steps[0].nonce_offset + 1);

		// The wrap carries the full input as native value.
		assert_eq!(flow.steps[0].request.value, trade.input.raw);
	}

	#[tokio::test]
	async fn insufficient_allowance_inserts_approve() {
		let trade = classic_trade(Currency::token(MAINNET, USDC, 6, "USDC"), false);
		let flow = builder()
			.build_flow(&trade, &account(), Some(U256::ZERO), &estimate_1559())
			.await
			.unwrap();

		assert_eq!(flow.steps.len(), 2);
		assert_eq!(flow.steps[0].kind, TransactionKind::Approve);
		assert_eq!(flow.steps[0].request.to, Some(USDC));
		assert_eq!(flow.steps[1].nonce_offset, 1);
	}

	#[tokio::test]
	async fn sufficient_allowance_skips_approve() {
		let trade = classic_trade(Currency::token(MAINNET, USDC, 6, "USDC"), false);
		let flow = builder()
			.build_flow(&trade, &account(), Some(U256::MAX), &estimate_1559())
			.await
			.unwrap();

		assert_eq!(flow.steps.len(), 1);
		assert_eq!(flow.steps[0].kind, TransactionKind::Swap);
	}

	#[tokio::test]
	async fn permit_replaces_approve_step() {
		let mut trade = classic_trade(Currency::token(MAINNET, USDC, 6, "USDC"), false);
		trade.permit = Some(TypedDataPayload {
			domain: serde_json::json!({"name": "Permit2"}),
			types: serde_json::json!({}),
			primary_type: "PermitSingle".to_string(),
			message: serde_json::json!({}),
		});

		let flow = builder()
			.build_flow(&trade, &account(), Some(U256::ZERO), &estimate_1559())
			.await
			.unwrap();

		assert_eq!(flow.steps.len(), 1);
		assert!(flow.permit_signature.is_some());
	}

	#[tokio::test]
	async fn missing_to_is_fatal() {
		let mut trade = classic_trade(Currency::native(MAINNET, "ETH"), false);
		if let TradeVariant::Classic { swap, .. } = &mut trade.variant {
			swap.to = None;
		}
		let result = builder()
			.build_flow(&trade, &account(), None, &estimate_1559())
			.await;
		assert!(matches!(result, Err(BuildError::MissingField("to"))));
	}

	#[tokio::test]
	async fn legacy_hint_uses_gas_price_only() {
		let mut trade = classic_trade(Currency::native(MAINNET, "ETH"), false);
		if let TradeVariant::Classic { gas, .. } = &mut trade.variant {
			*gas = Some(ApiGasInfo {
				supports_eip1559: false,
				gas_limit: Some(180_000),
			});
		}

		let flow = builder()
			.build_flow(&trade, &account(), None, &estimate_legacy())
			.await
			.unwrap();

		let swap = &flow.steps[0].request;
		assert_eq!(swap.tx_type, Some(TxType::Legacy));
		assert_eq!(swap.gas_price, Some(30_000_000_000));
		assert_eq!(swap.max_fee_per_gas, None);
		assert_eq!(swap.gas_limit, Some(180_000));
	}

	#[tokio::test]
	async fn scheme_mismatch_is_rejected() {
		let mut trade = classic_trade(Currency::native(MAINNET, "ETH"), false);
		if let TradeVariant::Classic { gas, .. } = &mut trade.variant {
			*gas = Some(ApiGasInfo {
				supports_eip1559: false,
				gas_limit: None,
			});
		}

		let result = builder()
			.build_flow(&trade, &account(), None, &estimate_1559())
			.await;
		assert!(matches!(
			result,
			Err(BuildError::GasSchemeMismatch { .. })
		));
	}

	#[tokio::test]
	async fn order_trade_signs_typed_data() {
		let trade = Trade {
			quote_id: "q-x".to_string(),
			trade_type: TradeType::ExactInput,
			input: CurrencyAmount::from_raw(
				Currency::native(MAINNET, "ETH"),
				U256::from(1u64),
			),
			output: CurrencyAmount::from_raw(
				Currency::token(MAINNET, USDC, 6, "USDC"),
				U256::from(1u64),
			),
			slippage_bps: 50,
			deadline: None,
			price_impact: None,
			permit: None,
			variant: TradeVariant::Order {
				kind: swap_types::OrderKind::UniswapX,
				payload: TypedDataPayload {
					domain: serde_json::json!({"name": "Reactor"}),
					types: serde_json::json!({}),
					primary_type: "Order".to_string(),
					message: serde_json::json!({"witness": 1}),
				},
			},
		};

		let order = builder().build_order(&trade, &account()).await.unwrap();
		assert_eq!(order.signature.len(), 65);
		assert!(matches!(
			builder()
				.build_flow(&trade, &account(), None, &estimate_1559())
				.await,
			Err(BuildError::WrongVariant)
		));
	}
}
