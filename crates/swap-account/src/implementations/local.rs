//! Local private-key signer backed by Alloy.

use crate::{AccountError, AccountInterface, Signature};
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::dyn_abi::TypedData;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSigner;
use alloy::primitives::{Address, Bytes, TxKind};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use swap_types::{
	ConfigSchema, Field, FieldType, Schema, SignedTransaction, TransactionRequest,
	TypedDataPayload, TxType, ValidationError,
};

/// Wallet holding a private key in memory. Suitable for development and
/// service deployments where an external signer is not available.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self { signer })
	}
}

pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or_default();
					let key_without_prefix = key.strip_prefix("0x").unwrap_or(key);

					if key_without_prefix.len() != 64 {
						return Err("Private key must be 64 hex characters (32 bytes)".to_string());
					}

					if hex::decode(key_without_prefix).is_err() {
						return Err("Private key must be valid hexadecimal".to_string());
					}

					Ok(())
				}),
			],
			vec![],
		);

		schema.validate(config)
	}
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, AccountError> {
	value.ok_or(AccountError::IncompleteRequest(field))
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_transaction(
		&self,
		request: &TransactionRequest,
	) -> Result<SignedTransaction, AccountError> {
		let to = TxKind::Call(require(request.to, "to")?);
		let chain_id = require(request.chain_id, "chain_id")?.0;
		let nonce = require(request.nonce, "nonce")?;
		let gas_limit = require(request.gas_limit, "gas_limit")?;
		let data = Bytes::copy_from_slice(&request.data);

		let envelope: TxEnvelope = match require(request.tx_type, "tx_type")? {
			TxType::Legacy | TxType::Eip2930 => {
				let mut tx = TxLegacy {
					chain_id: Some(chain_id),
					nonce,
					gas_price: require(request.gas_price, "gas_price")?,
					gas_limit,
					to,
					value: request.value,
					input: data,
				};
				let signature = self
					.signer
					.sign_transaction(&mut tx)
					.await
					.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
				tx.into_signed(signature).into()
			}
			TxType::Eip1559 => {
				let mut tx = TxEip1559 {
					chain_id,
					nonce,
					gas_limit,
					max_fee_per_gas: require(request.max_fee_per_gas, "max_fee_per_gas")?,
					max_priority_fee_per_gas: require(
						request.max_priority_fee_per_gas,
						"max_priority_fee_per_gas",
					)?,
					to,
					value: request.value,
					access_list: Default::default(),
					input: data,
				};
				let signature = self
					.signer
					.sign_transaction(&mut tx)
					.await
					.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
				tx.into_signed(signature).into()
			}
		};

		Ok(SignedTransaction {
			raw: Bytes::from(envelope.encoded_2718()),
			hash: *envelope.tx_hash(),
		})
	}

	async fn sign_typed_data(
		&self,
		payload: &TypedDataPayload,
	) -> Result<Signature, AccountError> {
		let typed: TypedData = serde_json::from_value(serde_json::json!({
			"types": payload.types,
			"primaryType": payload.primary_type,
			"domain": payload.domain,
			"message": payload.message,
		}))
		.map_err(|e| AccountError::SigningFailed(format!("Malformed typed data: {}", e)))?;

		let signature = self
			.signer
			.sign_dynamic_typed_data(&typed)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;

		Ok(Signature(signature.as_bytes().to_vec()))
	}
}

/// Factory for the local wallet account provider.
pub fn create_account(config: &toml::Value) -> Box<dyn AccountInterface> {
	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.expect("private_key is required for local wallet");

	Box::new(LocalWallet::new(private_key).expect("Failed to create wallet"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{Address, U256};
	use swap_types::ChainId;

	const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

	fn request() -> TransactionRequest {
		TransactionRequest {
			to: Some(Address::repeat_byte(0x11)),
			data: Bytes::new(),
			value: U256::from(1u64),
			chain_id: Some(ChainId(1)),
			nonce: Some(0),
			gas_limit: Some(21_000),
			tx_type: Some(TxType::Eip1559),
			gas_price: None,
			max_fee_per_gas: Some(40_000_000_000),
			max_priority_fee_per_gas: Some(2_000_000_000),
		}
	}

	#[tokio::test]
	async fn signs_eip1559_request() {
		let wallet = LocalWallet::new(TEST_KEY).unwrap();
		let signed = wallet.sign_transaction(&request()).await.unwrap();
		assert!(!signed.raw.is_empty());
	}

	#[tokio::test]
	async fn refuses_incomplete_request() {
		let wallet = LocalWallet::new(TEST_KEY).unwrap();
		let mut incomplete = request();
		incomplete.nonce = None;
		let result = wallet.sign_transaction(&incomplete).await;
		assert!(matches!(
			result,
			Err(AccountError::IncompleteRequest("nonce"))
		));
	}

	#[test]
	fn schema_rejects_short_key() {
		let config: toml::Value = toml::from_str(r#"private_key = "0xabc""#).unwrap();
		assert!(LocalWalletSchema.validate(&config).is_err());
	}
}
