//! Transaction submission and lifecycle tracking.
//!
//! Every submitted transaction gets a local tracking id and a watcher task
//! that polls for its receipt on the chain's block cadence. Outcomes go
//! through the [`TransactionStatus`] transition table, which is what makes
//! the terminal `Finalized` event exactly-once: a second transition attempt
//! fails and publishes nothing. Cancellation is a fee-bumped no-op at the
//! same nonce; whichever transaction lands decides the final status.

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use swap_account::{AccountError, AccountService};
use swap_types::{
	ChainId, ConfigSchema, EventBus, PipelineEvent, StateError, TrackedTransaction,
	TrackingId, TransactionEvent, TransactionKind, TransactionReceipt, TransactionRequest,
	TransactionStatus,
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod implementations {
	pub mod rpc;
}

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("No chain client configured for chain {0}")]
	UnsupportedChain(ChainId),
	#[error("Unknown transaction {0}")]
	UnknownTransaction(TrackingId),
	#[error("Transaction cannot be cancelled: {0}")]
	NotCancellable(String),
	#[error(transparent)]
	Account(#[from] AccountError),
	#[error(transparent)]
	State(#[from] StateError),
}

/// Chain RPC boundary used for submission and confirmation.
#[async_trait]
pub trait ChainClientInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	fn chain_id(&self) -> ChainId;

	/// Next nonce including pending transactions.
	async fn pending_nonce(&self, address: Address) -> Result<u64, DeliveryError>;

	/// ERC-20 allowance of `spender` over `owner`'s `token` balance.
	async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<alloy::primitives::U256, DeliveryError>;

	async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, DeliveryError>;

	async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, DeliveryError>;

	async fn transaction_receipt(
		&self,
		hash: B256,
	) -> Result<Option<TransactionReceipt>, DeliveryError>;

	async fn block_number(&self) -> Result<u64, DeliveryError>;
}

/// Fee bump applied to a cancellation replacement: +12.5% (two base-fee
/// steps), minimum one wei so the replacement always outbids the original.
fn bump_fee(fee: u128) -> u128 {
	fee + (fee / 8).max(1)
}

struct TrackedEntry {
	tx: TrackedTransaction,
	request: TransactionRequest,
}

pub struct DeliveryService {
	clients: HashMap<ChainId, Arc<dyn ChainClientInterface>>,
	account: Arc<AccountService>,
	events: EventBus,
	tracked: Arc<DashMap<TrackingId, TrackedEntry>>,
	confirmations: u64,
}

impl DeliveryService {
	pub fn new(
		clients: Vec<Arc<dyn ChainClientInterface>>,
		account: Arc<AccountService>,
		events: EventBus,
		confirmations: u64,
	) -> Arc<Self> {
		let clients = clients
			.into_iter()
			.map(|client| (client.chain_id(), client))
			.collect();
		Arc::new(Self {
			clients,
			account,
			events,
			tracked: Arc::new(DashMap::new()),
			confirmations: confirmations.max(1),
		})
	}

	fn client(&self, chain_id: ChainId) -> Result<Arc<dyn ChainClientInterface>, DeliveryError> {
		self.clients
			.get(&chain_id)
			.cloned()
			.ok_or(DeliveryError::UnsupportedChain(chain_id))
	}

	pub fn supports_chain(&self, chain_id: ChainId) -> bool {
		self.clients.contains_key(&chain_id)
	}

	pub async fn pending_nonce(
		&self,
		chain_id: ChainId,
		address: Address,
	) -> Result<u64, DeliveryError> {
		self.client(chain_id)?.pending_nonce(address).await
	}

	pub async fn allowance(
		&self,
		chain_id: ChainId,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<alloy::primitives::U256, DeliveryError> {
		self.client(chain_id)?
			.allowance(token, owner, spender)
			.await
	}

	pub async fn estimate_gas(
		&self,
		chain_id: ChainId,
		request: &TransactionRequest,
	) -> Result<u64, DeliveryError> {
		self.client(chain_id)?.estimate_gas(request).await
	}

	/// Current snapshot of a tracked transaction.
	pub fn transaction(&self, id: TrackingId) -> Option<TrackedTransaction> {
		self.tracked.get(&id).map(|entry| entry.tx.clone())
	}

	/// Signs and submits a fully populated request, registers it for
	/// tracking, and starts its confirmation watcher.
	pub async fn submit(
		self: &Arc<Self>,
		kind: TransactionKind,
		request: TransactionRequest,
	) -> Result<TrackedTransaction, DeliveryError> {
		let chain_id = request
			.chain_id
			.ok_or(DeliveryError::Network("request missing chain_id".to_string()))?;
		let nonce = request
			.nonce
			.ok_or(DeliveryError::Network("request missing nonce".to_string()))?;
		let client = self.client(chain_id)?;
		let from = self.account.address().await?;

		let signed = self.account.sign(&request).await?;
		let tx_hash = client.send_raw_transaction(&signed.raw).await?;

		let tx = TrackedTransaction::new(chain_id, from, kind, tx_hash, nonce);
		let id = tx.id;
		info!(%id, kind = ?kind, tx_hash = %short_hash(&tx_hash), "Submitted transaction");

		self.tracked.insert(
			id,
			TrackedEntry {
				tx: tx.clone(),
				request,
			},
		);
		self.events
			.publish(PipelineEvent::Transaction(TransactionEvent::Submitted {
				id,
				kind,
				tx_hash,
			}))
			.ok();

		self.spawn_watcher(id, client);
		Ok(tx)
	}

	/// Requests cancellation of a pending transaction by submitting a
	/// zero-value self-transfer at the same nonce with bumped fees. The
	/// chain decides which transaction lands; the watcher reports the
	/// outcome.
	pub async fn cancel(self: &Arc<Self>, id: TrackingId) -> Result<B256, DeliveryError> {
		let (chain_id, original) = {
			let entry = self
				.tracked
				.get(&id)
				.ok_or(DeliveryError::UnknownTransaction(id))?;
			if entry.tx.status != TransactionStatus::Pending {
				return Err(DeliveryError::NotCancellable(format!(
					"status is {:?}",
					entry.tx.status
				)));
			}
			(entry.tx.chain_id, entry.request.clone())
		};

		let client = self.client(chain_id)?;
		let from = self.account.address().await?;

		let replacement = TransactionRequest {
			to: Some(from),
			data: Bytes::new(),
			value: alloy::primitives::U256::ZERO,
			chain_id: Some(chain_id),
			nonce: original.nonce,
			gas_limit: Some(21_000),
			tx_type: original.tx_type,
			gas_price: original.gas_price.map(bump_fee),
			max_fee_per_gas: original.max_fee_per_gas.map(bump_fee),
			max_priority_fee_per_gas: original.max_priority_fee_per_gas.map(bump_fee),
		}
		.clean_gas_fields();

		let signed = self.account.sign(&replacement).await?;
		let replacement_hash = client.send_raw_transaction(&signed.raw).await?;

		{
			let mut entry = self
				.tracked
				.get_mut(&id)
				.ok_or(DeliveryError::UnknownTransaction(id))?;
			entry.tx.transition(TransactionStatus::Cancelling)?;
			entry.tx.replaced_by = Some(replacement_hash);
		}

		info!(%id, replacement = %short_hash(&replacement_hash), "Cancellation submitted");
		self.events
			.publish(PipelineEvent::Transaction(
				TransactionEvent::CancellationSubmitted {
					id,
					replacement_hash,
				},
			))
			.ok();

		Ok(replacement_hash)
	}

	/// Applies a terminal status and publishes the one `Finalized` event.
	/// A transition rejected by the state table means the transaction
	/// already finalized, and nothing is published.
	fn finalize(
		&self,
		id: TrackingId,
		status: TransactionStatus,
		receipt: Option<TransactionReceipt>,
	) {
		let Some(mut entry) = self.tracked.get_mut(&id) else {
			return;
		};
		match entry.tx.transition(status) {
			Ok(()) => {
				info!(%id, status = ?status, "Transaction finalized");
				self.events
					.publish(PipelineEvent::Transaction(TransactionEvent::Finalized {
						id,
						status,
						receipt,
					}))
					.ok();
			}
			Err(e) => {
				debug!(%id, error = %e, "Skipping duplicate finalization");
			}
		}
	}

	/// Polls for the original's receipt (and the replacement's, once a
	/// cancellation is in flight) until one of them finalizes the
	/// transaction. There is no timeout: a transaction that never mines
	/// stays pending until it terminates or is cancelled.
	fn spawn_watcher(self: &Arc<Self>, id: TrackingId, client: Arc<dyn ChainClientInterface>) {
		let service = Arc::clone(self);
		tokio::spawn(async move {
			let poll = client.chain_id().poll_interval();
			loop {
				let Some((tx_hash, replaced_by, status)) =
					service.tracked.get(&id).map(|entry| {
						(entry.tx.tx_hash, entry.tx.replaced_by, entry.tx.status)
					})
				else {
					break;
				};
				if status.is_terminal() {
					break;
				}

				// A landed replacement means the original can no longer
				// mine at this nonce.
				if let Some(replacement_hash) = replaced_by {
					match client.transaction_receipt(replacement_hash).await {
						Ok(Some(receipt)) if receipt.success => {
							service.finalize(
								id,
								TransactionStatus::Cancelled,
								Some(receipt),
							);
							break;
						}
						Ok(_) => {}
						Err(e) => {
							warn!(%id, error = %e, "Replacement receipt lookup failed");
						}
					}
				}

				match client.transaction_receipt(tx_hash).await {
					Ok(Some(receipt)) => {
						match service.confirmed(&client, &receipt).await {
							Ok(true) => {
								let status = if receipt.success {
									TransactionStatus::Success
								} else {
									TransactionStatus::Failed
								};
								service.finalize(id, status, Some(receipt));
								break;
							}
							Ok(false) => {
								debug!(%id, "Awaiting confirmations");
							}
							Err(e) => {
								warn!(%id, error = %e, "Block number lookup failed");
							}
						}
					}
					Ok(None) => {
						debug!(%id, "Transaction not yet mined");
					}
					Err(e) => {
						// Transient RPC trouble; confirmation timeouts are
						// not failures, keep polling.
						warn!(%id, error = %e, "Receipt lookup failed");
					}
				}

				tokio::time::sleep(poll).await;
			}
		});
	}

	async fn confirmed(
		&self,
		client: &Arc<dyn ChainClientInterface>,
		receipt: &TransactionReceipt,
	) -> Result<bool, DeliveryError> {
		if self.confirmations <= 1 {
			return Ok(true);
		}
		let current = client.block_number().await?;
		Ok(current.saturating_sub(receipt.block_number) + 1 >= self.confirmations)
	}
}

fn short_hash(hash: &B256) -> String {
	let hex = hex::encode(hash.0);
	format!("{}..", &hex[..8])
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{keccak256, U256};
	use swap_account::AccountInterface;
	use swap_types::{SignedTransaction, TypedDataPayload, TxType, MAINNET};

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
			request: &TransactionRequest,
		) -> Result<SignedTransaction, AccountError> {
			let raw = serde_json::to_vec(request)
				.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
			let hash = keccak256(&raw);
			Ok(SignedTransaction {
				raw: Bytes::from(raw),
				hash,
			})
		}

		async fn sign_typed_data(
			&self,
			_payload: &TypedDataPayload,
		) -> Result<swap_account::Signature, AccountError> {
			Ok(swap_account::Signature(vec![0xab; 65]))
		}
	}

	#[derive(Default)]
	struct MockChainClient {
		receipts: DashMap<B256, TransactionReceipt>,
		sent: DashMap<B256, TransactionRequest>,
	}

	#[async_trait]
	impl ChainClientInterface for MockChainClient {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not used in tests")
		}

		fn chain_id(&self) -> ChainId {
			MAINNET
		}

		async fn pending_nonce(&self, _address: Address) -> Result<u64, DeliveryError> {
			Ok(7)
		}

		async fn allowance(
			&self,
			_token: Address,
			_owner: Address,
			_spender: Address,
		) -> Result<U256, DeliveryError> {
			Ok(U256::MAX)
		}

		async fn estimate_gas(
			&self,
			_request: &TransactionRequest,
		) -> Result<u64, DeliveryError> {
			Ok(21_000)
		}

		async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, DeliveryError> {
			let hash = keccak256(raw);
			let request: TransactionRequest =
				serde_json::from_slice(raw).map_err(|e| DeliveryError::Network(e.to_string()))?;
			self.sent.insert(hash, request);
			Ok(hash)
		}

		async fn transaction_receipt(
			&self,
			hash: B256,
		) -> Result<Option<TransactionReceipt>, DeliveryError> {
			Ok(self.receipts.get(&hash).map(|r| r.clone()))
		}

		async fn block_number(&self) -> Result<u64, DeliveryError> {
			Ok(100)
		}
	}

	fn request(nonce: u64) -> TransactionRequest {
		TransactionRequest {
			to: Some(Address::repeat_byte(0x22)),
			data: Bytes::new(),
			value: U256::ZERO,
			chain_id: Some(MAINNET),
			nonce: Some(nonce),
			gas_limit: Some(21_000),
			tx_type: Some(TxType::Eip1559),
			gas_price: None,
			max_fee_per_gas: Some(40_000_000_000),
			max_priority_fee_per_gas: Some(2_000_000_000),
		}
	}

	fn service(
		client: Arc<MockChainClient>,
		events: EventBus,
	) -> Arc<DeliveryService> {
		DeliveryService::new(
			vec![client as Arc<dyn ChainClientInterface>],
			Arc::new(AccountService::new(Box::new(StubAccount))),
			events,
			1,
		)
	}

	async fn next_finalized(
		receiver: &mut tokio::sync::broadcast::Receiver<PipelineEvent>,
	) -> (TrackingId, TransactionStatus) {
		loop {
			match receiver.recv().await.unwrap() {
				PipelineEvent::Transaction(TransactionEvent::Finalized {
					id, status, ..
				}) => return (id, status),
				_ => continue,
			}
		}
	}

	#[tokio::test(start_paused = true)]
	async fn confirmed_transaction_finalizes_exactly_once() {
		let client = Arc::new(MockChainClient::default());
		let events = EventBus::new(64);
		let mut receiver = events.subscribe();
		let service = service(client.clone(), events);

		let tx = service
			.submit(TransactionKind::Swap, request(7))
			.await
			.unwrap();
		client.receipts.insert(
			tx.tx_hash,
			TransactionReceipt {
				hash: tx.tx_hash,
				block_number: 90,
				success: true,
			},
		);

		let (id, status) = next_finalized(&mut receiver).await;
		assert_eq!(id, tx.id);
		assert_eq!(status, TransactionStatus::Success);

		// Give the watcher room to misbehave; no second terminal event
		// may appear.
		tokio::time::sleep(std::time::Duration::from_secs(60)).await;
		loop {
			match receiver.try_recv() {
				Ok(PipelineEvent::Transaction(TransactionEvent::Finalized { .. })) => {
					panic!("duplicate finalization")
				}
				Ok(_) => continue,
				Err(_) => break,
			}
		}

		assert_eq!(
			service.transaction(tx.id).unwrap().status,
			TransactionStatus::Success
		);
	}

	#[tokio::test(start_paused = true)]
	async fn reverted_transaction_fails() {
		let client = Arc::new(MockChainClient::default());
		let events = EventBus::new(64);
		let mut receiver = events.subscribe();
		let service = service(client.clone(), events);

		let tx = service
			.submit(TransactionKind::Approve, request(7))
			.await
			.unwrap();
		client.receipts.insert(
			tx.tx_hash,
			TransactionReceipt {
				hash: tx.tx_hash,
				block_number: 91,
				success: false,
			},
		);

		let (_, status) = next_finalized(&mut receiver).await;
		assert_eq!(status, TransactionStatus::Failed);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_replaces_at_same_nonce_with_bumped_fees() {
		let client = Arc::new(MockChainClient::default());
		let events = EventBus::new(64);
		let mut receiver = events.subscribe();
		let service = service(client.clone(), events);

		let tx = service
			.submit(TransactionKind::Swap, request(7))
			.await
			.unwrap();

		let replacement_hash = service.cancel(tx.id).await.unwrap();
		let replacement = client.sent.get(&replacement_hash).unwrap().clone();
		assert_eq!(replacement.nonce, Some(7));
		assert_eq!(replacement.to, Some(Address::repeat_byte(0x11)));
		assert_eq!(replacement.max_fee_per_gas, Some(bump_fee(40_000_000_000)));

		assert_eq!(
			service.transaction(tx.id).unwrap().status,
			TransactionStatus::Cancelling
		);

		// The replacement lands; the original resolves as cancelled.
		client.receipts.insert(
			replacement_hash,
			TransactionReceipt {
				hash: replacement_hash,
				block_number: 95,
				success: true,
			},
		);

		let (id, status) = next_finalized(&mut receiver).await;
		assert_eq!(id, tx.id);
		assert_eq!(status, TransactionStatus::Cancelled);

		// Cancelling twice is rejected.
		assert!(matches!(
			service.cancel(tx.id).await,
			Err(DeliveryError::NotCancellable(_))
		));
	}

	#[test]
	fn fee_bump_is_at_least_one_wei() {
		assert_eq!(bump_fee(0), 1);
		assert_eq!(bump_fee(8), 9);
		assert_eq!(bump_fee(40_000_000_000), 45_000_000_000);
	}
}
