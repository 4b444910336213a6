//! Debounced, cancelable quote fetching.
//!
//! A [`QuoteSession`] owns the derived trade state for one open swap form.
//! Every form change bumps a generation counter; whichever fetch holds the
//! latest generation is the only one allowed to install its result, so a
//! slow response can never clobber state derived from a newer edit. An
//! emptied amount bypasses the debounce entirely and clears the installed
//! trade with no latency.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swap_trade::transform_quote_response;
use swap_types::{
	ConfigSchema, EventBus, PipelineEvent, QuoteEvent, QuoteForm, QuoteRequest, QuoteResponse,
	SignedOrder, Trade,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub mod implementations {
	pub mod http;
}

#[derive(Debug, Error)]
pub enum QuoteError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Pricing API error (status {status}): {message}")]
	Api { status: u16, message: String },
	#[error("Malformed quote response: {0}")]
	Parse(String),
}

/// Pricing API boundary: quote retrieval plus off-chain order submission.
#[async_trait]
pub trait QuoteApiInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, QuoteError>;

	/// Submits a signed order for auction/RFQ settlement; returns the
	/// API-assigned order hash.
	async fn submit_order(&self, order: &SignedOrder) -> Result<String, QuoteError>;
}

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Quote state for one form session. Cheap to share; all interior state is
/// atomics and lock-free slots.
pub struct QuoteSession {
	api: Arc<dyn QuoteApiInterface>,
	events: EventBus,
	debounce: Duration,
	generation: AtomicU64,
	installed: ArcSwapOption<Trade>,
}

impl QuoteSession {
	pub fn new(api: Arc<dyn QuoteApiInterface>, events: EventBus, debounce: Duration) -> Self {
		Self {
			api,
			events,
			debounce,
			generation: AtomicU64::new(0),
			installed: ArcSwapOption::from(None),
		}
	}

	/// The currently installed trade, if the last completed fetch produced
	/// one that is still current.
	pub fn installed_trade(&self) -> Option<Arc<Trade>> {
		self.installed.load_full()
	}

	pub fn current_generation(&self) -> u64 {
		self.generation.load(Ordering::SeqCst)
	}

	/// Starts a new generation, invalidating every in-flight fetch.
	fn begin(&self) -> u64 {
		self.generation.fetch_add(1, Ordering::SeqCst) + 1
	}

	fn is_current(&self, generation: u64) -> bool {
		self.generation.load(Ordering::SeqCst) == generation
	}

	/// Installs a trade iff the given generation is still the latest.
	/// Returns whether the install happened; a superseded result is
	/// dropped on the floor.
	fn install(&self, generation: u64, trade: Trade) -> bool {
		if !self.is_current(generation) {
			debug!(generation, "Dropping superseded quote result");
			return false;
		}
		let quote_id = trade.quote_id.clone();
		self.installed.store(Some(Arc::new(trade)));
		self.events
			.publish(PipelineEvent::Quote(QuoteEvent::TradeInstalled {
				generation,
				quote_id,
			}))
			.ok();
		true
	}

	fn clear(&self, generation: u64) {
		self.installed.store(None);
		self.events
			.publish(PipelineEvent::Quote(QuoteEvent::TradeCleared { generation }))
			.ok();
	}

	/// Handles a form change. Returns the installed trade, `None` for a
	/// skip (incomplete form) or a superseded/stale result.
	pub async fn update(&self, form: &QuoteForm) -> Result<Option<Arc<Trade>>, QuoteError> {
		let generation = self.begin();

		let Some(request) = form.to_request() else {
			// No quoteable input. Clear immediately, skipping the
			// debounce, so the UI never shows a stale trade while empty.
			self.clear(generation);
			return Ok(None);
		};

		tokio::time::sleep(self.debounce).await;
		if !self.is_current(generation) {
			return Ok(None);
		}

		self.fetch_and_install(generation, &request).await
	}

	/// One polling refresh of an unchanged form. Reuses the session's
	/// current generation so a concurrent user edit still wins.
	pub async fn poll_once(&self, form: &QuoteForm) -> Result<Option<Arc<Trade>>, QuoteError> {
		let generation = self.current_generation();
		let Some(request) = form.to_request() else {
			return Ok(None);
		};
		self.fetch_and_install(generation, &request).await
	}

	async fn fetch_and_install(
		&self,
		generation: u64,
		request: &QuoteRequest,
	) -> Result<Option<Arc<Trade>>, QuoteError> {
		let response = match self.api.fetch_quote(request).await {
			Ok(response) => response,
			Err(e) => {
				// Recoverable: the previous trade stays installed and
				// polling keeps going.
				self.events
					.publish(PipelineEvent::Quote(QuoteEvent::QuoteFailed {
						generation,
						reason: e.to_string(),
					}))
					.ok();
				return Err(e);
			}
		};

		if !self.is_current(generation) {
			return Ok(None);
		}

		let trade = transform_quote_response(request, &response)
			.map_err(|e| QuoteError::Parse(e.to_string()))?;

		match trade {
			Some(trade) => {
				if self.install(generation, trade) {
					Ok(self.installed_trade())
				} else {
					Ok(None)
				}
			}
			// Stale or chain-mismatched response: discard quietly.
			None => Ok(None),
		}
	}

	/// Keeps an unchanged form fresh: re-issues the same request on a fixed
	/// interval until the form changes (generation moves on). Fetches run
	/// sequentially, so polling is naturally paused while one is in flight.
	pub fn spawn_polling(self: Arc<Self>, form: QuoteForm, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let generation = self.current_generation();
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			// The first tick completes immediately; the form was just
			// quoted, so skip it.
			ticker.tick().await;
			loop {
				ticker.tick().await;
				if self.current_generation() != generation {
					break;
				}
				if let Err(e) = self.poll_once(&form).await {
					warn!(error = %e, "Quote poll failed; retaining previous trade");
				}
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{address, U256};
	use std::sync::atomic::AtomicUsize;
	use swap_types::{
		ApiTokenAmount, ClassicQuote, Currency, SwapTransactionFields, TradeType, MAINNET,
	};

	struct CountingApi {
		calls: AtomicUsize,
	}

	impl CountingApi {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				calls: AtomicUsize::new(0),
			})
		}
	}

	#[async_trait]
	impl QuoteApiInterface for CountingApi {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not used in tests")
		}

		async fn fetch_quote(
			&self,
			request: &QuoteRequest,
		) -> Result<QuoteResponse, QuoteError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(QuoteResponse::Classic(ClassicQuote {
				quote_id: format!("q-{}", self.calls.load(Ordering::SeqCst)),
				chain_id: request.chain_id.0,
				token_in: ApiTokenAmount {
					token: request.input.address_for_api(),
					amount: request.amount.to_string(),
				},
				token_out: ApiTokenAmount {
					token: request.output.address_for_api(),
					amount: "3000000000".to_string(),
				},
				price_impact: None,
				mid_amount_out: None,
				gas_fee_usd: None,
				gas: None,
				swap: Some(SwapTransactionFields {
					to: Some(address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45")),
					data: "0x00".to_string(),
					value: None,
				}),
				permit: None,
				deadline: None,
			}))
		}

		async fn submit_order(&self, _order: &SignedOrder) -> Result<String, QuoteError> {
			Ok("order-hash".to_string())
		}
	}

	fn usdc() -> Currency {
		Currency::token(
			MAINNET,
			address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
			6,
			"USDC",
		)
	}

	fn form(amount: Option<U256>) -> QuoteForm {
		QuoteForm {
			input: Some(Currency::native(MAINNET, "ETH")),
			output: Some(usdc()),
			exact_amount: amount,
			trade_type: Some(TradeType::ExactInput),
			slippage_bps: None,
			protocols: vec![],
		}
	}

	fn session(api: Arc<CountingApi>) -> QuoteSession {
		QuoteSession::new(api, EventBus::new(16), Duration::from_millis(1))
	}

	fn sample_trade(quote_id: &str) -> Trade {
		let request = form(Some(U256::from(10u64).pow(U256::from(18u64))))
			.to_request()
			.unwrap();
		Trade {
			quote_id: quote_id.to_string(),
			trade_type: TradeType::ExactInput,
			input: swap_types::CurrencyAmount::from_raw(request.input, request.amount),
			output: swap_types::CurrencyAmount::from_raw(
				request.output,
				U256::from(3_000_000_000u64),
			),
			slippage_bps: 50,
			deadline: None,
			price_impact: None,
			permit: None,
			variant: swap_types::TradeVariant::Wrap,
		}
	}

	#[tokio::test]
	async fn zero_amount_skips_without_network_call() {
		let api = CountingApi::new();
		let s = session(api.clone());

		let result = s.update(&form(Some(U256::ZERO))).await.unwrap();
		assert!(result.is_none());
		assert_eq!(api.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn empty_amount_clears_installed_trade_immediately() {
		let api = CountingApi::new();
		let s = session(api.clone());

		let amount = U256::from(10u64).pow(U256::from(18u64));
		s.update(&form(Some(amount))).await.unwrap();
		assert!(s.installed_trade().is_some());

		s.update(&form(None)).await.unwrap();
		assert!(s.installed_trade().is_none());
		assert_eq!(api.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn late_result_from_older_generation_is_dropped() {
		let api = CountingApi::new();
		let s = session(api);

		// Two rapid edits: the older fetch resolves after the newer one.
		let older = s.begin();
		let newer = s.begin();

		assert!(s.install(newer, sample_trade("newer")));
		assert!(!s.install(older, sample_trade("older")));

		let installed = s.installed_trade().unwrap();
		assert_eq!(installed.quote_id, "newer");
	}

	#[tokio::test]
	async fn fetch_installs_trade_end_to_end() {
		let api = CountingApi::new();
		let s = session(api.clone());

		let amount = U256::from(10u64).pow(U256::from(18u64));
		let trade = s.update(&form(Some(amount))).await.unwrap().unwrap();
		assert_eq!(trade.output.to_exact(), "3000.000000");
		assert_eq!(api.calls.load(Ordering::SeqCst), 1);

		// An unchanged form polls with the same generation and refreshes
		// in place.
		let refreshed = s.poll_once(&form(Some(amount))).await.unwrap().unwrap();
		assert_eq!(refreshed.quote_id, "q-2");
	}
}
