use alloy::primitives::Address;
use async_trait::async_trait;
use swap_types::{ConfigSchema, SignedTransaction, TransactionRequest, TypedDataPayload};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Incomplete transaction request: missing {0}")]
	IncompleteRequest(&'static str),
}

/// 65-byte r || s || v signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

/// Signer boundary. The pipeline never touches key material; it hands fully
/// populated requests or EIP-712 payloads to an implementation of this
/// trait.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a typed, fully populated transaction request and returns the
	/// raw encoded transaction plus its hash.
	async fn sign_transaction(
		&self,
		request: &TransactionRequest,
	) -> Result<SignedTransaction, AccountError>;

	/// Signs an EIP-712 payload (permits, off-chain orders).
	async fn sign_typed_data(&self, payload: &TypedDataPayload)
		-> Result<Signature, AccountError>;
}

pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub async fn address(&self) -> Result<Address, AccountError> {
		self.provider.address().await
	}

	pub async fn sign(
		&self,
		request: &TransactionRequest,
	) -> Result<SignedTransaction, AccountError> {
		self.provider.sign_transaction(request).await
	}

	pub async fn sign_typed_data(
		&self,
		payload: &TypedDataPayload,
	) -> Result<Signature, AccountError> {
		self.provider.sign_typed_data(payload).await
	}
}
