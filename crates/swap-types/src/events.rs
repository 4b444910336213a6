//! Pipeline lifecycle events.
//!
//! Consumers subscribe to the broadcast [`EventBus`]; the delivery layer
//! guarantees exactly one `Finalized` event per tracking id.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use alloy::primitives::B256;

use crate::transaction::{
	TransactionKind, TransactionReceipt, TransactionStatus, TrackingId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
	Quote(QuoteEvent),
	Transaction(TransactionEvent),
	Flow(FlowEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuoteEvent {
	/// A freshly validated trade replaced the installed one.
	TradeInstalled { generation: u64, quote_id: String },
	/// The form emptied out; any installed trade was dropped.
	TradeCleared { generation: u64 },
	/// The pricing API failed; the previous trade (if any) is retained.
	QuoteFailed { generation: u64, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactionEvent {
	Submitted {
		id: TrackingId,
		kind: TransactionKind,
		tx_hash: B256,
	},
	CancellationSubmitted {
		id: TrackingId,
		replacement_hash: B256,
	},
	/// Terminal outcome; published exactly once per tracking id.
	Finalized {
		id: TrackingId,
		status: TransactionStatus,
		receipt: Option<TransactionReceipt>,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlowEvent {
	/// A step failed to submit, so the remaining steps were never sent.
	Aborted {
		step: TransactionKind,
		reason: String,
	},
}

pub struct EventBus {
	sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
		self.sender.subscribe()
	}

	pub fn publish(
		&self,
		event: PipelineEvent,
	) -> Result<(), broadcast::error::SendError<PipelineEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
