//! Alloy HTTP chain client.

use crate::{ChainClientInterface, DeliveryError};
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionInput, TransactionRequest as AlloyTransactionRequest};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use swap_types::{
	ChainId, ConfigSchema, Field, FieldType, Schema, TransactionReceipt, TransactionRequest,
	ValidationError,
};

sol! {
	function allowance(address owner, address spender) view returns (uint256);
}

/// HTTP JSON-RPC client for one chain.
pub struct RpcChainClient {
	provider: Box<dyn Provider>,
	chain_id: ChainId,
}

impl RpcChainClient {
	pub fn new(rpc_url: &str, chain_id: ChainId) -> Result<Self, DeliveryError> {
		let url = rpc_url
			.parse()
			.map_err(|e| DeliveryError::Network(format!("Invalid RPC URL: {}", e)))?;
		let provider = ProviderBuilder::new().connect_http(url);
		Ok(Self {
			provider: Box::new(provider),
			chain_id,
		})
	}
}

fn to_alloy_request(request: &TransactionRequest) -> AlloyTransactionRequest {
	AlloyTransactionRequest {
		to: request.to.map(TxKind::Call),
		chain_id: request.chain_id.map(|c| c.0),
		nonce: request.nonce,
		gas: request.gas_limit,
		gas_price: request.gas_price,
		max_fee_per_gas: request.max_fee_per_gas,
		max_priority_fee_per_gas: request.max_priority_fee_per_gas,
		value: Some(request.value),
		input: TransactionInput::new(request.data.clone()),
		..Default::default()
	}
}

pub struct RpcChainClientSchema;

impl ConfigSchema for RpcChainClientSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					let url = value.as_str().unwrap_or_default();
					if url.starts_with("http://") || url.starts_with("https://") {
						Ok(())
					} else {
						Err("RPC URL must start with http:// or https://".to_string())
					}
				}),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl ChainClientInterface for RpcChainClient {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RpcChainClientSchema)
	}

	fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	async fn pending_nonce(&self, address: Address) -> Result<u64, DeliveryError> {
		self.provider
			.get_transaction_count(address)
			.pending()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get nonce: {}", e)))
	}

	async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, DeliveryError> {
		let call = AlloyTransactionRequest {
			to: Some(TxKind::Call(token)),
			input: TransactionInput::new(Bytes::from(
				allowanceCall { owner, spender }.abi_encode(),
			)),
			..Default::default()
		};

		let result = self
			.provider
			.call(call)
			.await
			.map_err(|e| DeliveryError::Network(format!("Allowance call failed: {}", e)))?;

		if result.len() < 32 {
			return Err(DeliveryError::Network(
				"Allowance call returned short data".to_string(),
			));
		}
		Ok(U256::from_be_slice(&result[..32]))
	}

	async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, DeliveryError> {
		self.provider
			.estimate_gas(to_alloy_request(request))
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to estimate gas: {}", e)))
	}

	async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, DeliveryError> {
		let pending = self
			.provider
			.send_raw_transaction(raw)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to send transaction: {}", e)))?;
		Ok(*pending.tx_hash())
	}

	async fn transaction_receipt(
		&self,
		hash: B256,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let receipt = self
			.provider
			.get_transaction_receipt(hash)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get receipt: {}", e)))?;

		Ok(receipt.map(|r| TransactionReceipt {
			hash: r.transaction_hash,
			block_number: r.block_number.unwrap_or(0),
			success: r.status(),
		}))
	}

	async fn block_number(&self) -> Result<u64, DeliveryError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get block number: {}", e)))
	}
}

/// Factory for an HTTP chain client. Required parameters: `rpc_url` and
/// `chain_id`.
pub fn create_rpc_client(config: &toml::Value) -> Box<dyn ChainClientInterface> {
	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.expect("rpc_url is required");

	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.expect("chain_id is required") as u64;

	Box::new(
		RpcChainClient::new(rpc_url, ChainId(chain_id)).expect("Failed to create chain client"),
	)
}
