//! The swap engine: quote retrieval, flow construction, sequenced
//! submission.
//!
//! The engine owns dependency-injected client instances (pricing API, gas
//! oracle, signer, chain clients) handed in through [`EngineBuilder`]
//! factory closures; nothing here reaches for ambient globals. Multi-step
//! trades run through [`FlowRunner`], which reads the account's pending
//! nonce exactly once per flow, assigns consecutive nonces, and dispatches
//! steps in order without awaiting confirmations in between.

use alloy::primitives::{Address, B256};
use std::collections::HashMap;
use std::sync::Arc;
use swap_account::{AccountError, AccountInterface, AccountService};
use swap_builder::{BuildError, SwapFlow, TransactionBuilder};
use swap_config::Config;
use swap_delivery::{ChainClientInterface, DeliveryError, DeliveryService};
use swap_gas::{GasFeeService, GasOracleInterface};
use swap_quoter::{QuoteApiInterface, QuoteError, QuoteSession, DEFAULT_DEBOUNCE};
use swap_types::{
	ChainId, EventBus, FlowEvent, GasFeeEstimate, GasSpeed, PipelineEvent, QuoteForm, Trade,
	TradeVariant, TrackedTransaction, TrackingId,
};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("No gas estimate available for chain {0}")]
	NoGasEstimate(ChainId),
	#[error(transparent)]
	Quote(#[from] QuoteError),
	#[error(transparent)]
	Gas(#[from] swap_gas::GasError),
	#[error(transparent)]
	Build(#[from] BuildError),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error(transparent)]
	Account(#[from] AccountError),
}

/// What a submission produced: chain transactions under tracking, or an
/// off-chain order accepted by the API.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
	Transactions { steps: Vec<TrackedTransaction> },
	Order { order_hash: String },
}

impl SubmitOutcome {
	/// Tracking id of the swap step, when the outcome is transactional.
	pub fn tracking_id(&self) -> Option<TrackingId> {
		match self {
			SubmitOutcome::Transactions { steps } => steps.last().map(|tx| tx.id),
			SubmitOutcome::Order { .. } => None,
		}
	}
}

/// Sequential step runner. Nonces are assigned from one authoritative read
/// per flow; a step that fails to submit aborts everything after it.
struct FlowRunner<'a> {
	delivery: &'a Arc<DeliveryService>,
	events: &'a EventBus,
}

impl FlowRunner<'_> {
	async fn run(
		&self,
		chain_id: ChainId,
		from: Address,
		flow: SwapFlow,
	) -> Result<Vec<TrackedTransaction>, EngineError> {
		// One nonce read per flow; later steps offset locally. A new flow
		// always re-reads, so nothing is shared across flows.
		let base_nonce = self.delivery.pending_nonce(chain_id, from).await?;

		let mut submitted = Vec::with_capacity(flow.steps.len());
		for step in flow.steps {
			let mut request = step.request;
			request.nonce = Some(base_nonce + step.nonce_offset);

			// A quote without a gas hint leaves the limit open; size it
			// against the node before dispatch.
			if request.gas_limit.is_none() {
				request.gas_limit =
					Some(self.delivery.estimate_gas(chain_id, &request).await?);
			}

			match self.delivery.submit(step.kind, request).await {
				Ok(tx) => {
					info!(kind = ?step.kind, nonce = tx.nonce, "Flow step submitted");
					submitted.push(tx);
				}
				Err(e) => {
					error!(kind = ?step.kind, error = %e, "Flow step failed; aborting remainder");
					self.events
						.publish(PipelineEvent::Flow(FlowEvent::Aborted {
							step: step.kind,
							reason: e.to_string(),
						}))
						.ok();
					return Err(e.into());
				}
			}
		}

		Ok(submitted)
	}
}

pub struct SwapEngine {
	quoter: Arc<QuoteSession>,
	quote_api: Arc<dyn QuoteApiInterface>,
	builder: TransactionBuilder,
	gas: Arc<GasFeeService>,
	account: Arc<AccountService>,
	delivery: Arc<DeliveryService>,
	events: EventBus,
}

impl SwapEngine {
	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn quote_session(&self) -> Arc<QuoteSession> {
		Arc::clone(&self.quoter)
	}

	pub fn gas_service(&self) -> Arc<GasFeeService> {
		Arc::clone(&self.gas)
	}

	/// Derives a fresh trade for the given form state, or `None` when the
	/// form is incomplete or the result went stale underway.
	pub async fn request_quote(
		&self,
		form: &QuoteForm,
	) -> Result<Option<Arc<Trade>>, EngineError> {
		Ok(self.quoter.update(form).await?)
	}

	pub fn transaction(&self, id: TrackingId) -> Option<TrackedTransaction> {
		self.delivery.transaction(id)
	}

	pub async fn cancel_transaction(&self, id: TrackingId) -> Result<B256, EngineError> {
		Ok(self.delivery.cancel(id).await?)
	}

	/// Executes a validated trade: signs and posts an off-chain order for
	/// order-style routes, otherwise builds and dispatches the
	/// wrap/approve/swap transaction flow.
	pub async fn submit_swap(&self, trade: &Trade) -> Result<SubmitOutcome, EngineError> {
		match &trade.variant {
			TradeVariant::Order { .. } => {
				let order = self.builder.build_order(trade, &self.account).await?;
				let order_hash = self.quote_api.submit_order(&order).await?;
				info!(quote_id = %trade.quote_id, order_hash = %order_hash, "Order submitted");
				Ok(SubmitOutcome::Order { order_hash })
			}
			TradeVariant::Classic { swap, .. } => {
				let chain_id = trade.input.currency.chain_id;
				let from = self.account.address().await?;
				let gas = self.gas_estimate(chain_id).await?;

				// Allowance only applies to ERC-20 inputs; the spender is
				// the router the quote targets.
				let allowance = match (&trade.input.currency.kind, swap.to) {
					(swap_types::CurrencyKind::Token(token), Some(spender)) => Some(
						self.delivery
							.allowance(chain_id, *token, from, spender)
							.await?,
					),
					_ => None,
				};

				let flow = self
					.builder
					.build_flow(trade, &self.account, allowance, &gas)
					.await?;

				let runner = FlowRunner {
					delivery: &self.delivery,
					events: &self.events,
				};
				let steps = runner.run(chain_id, from, flow).await?;
				Ok(SubmitOutcome::Transactions { steps })
			}
			TradeVariant::Wrap | TradeVariant::Unwrap => {
				let chain_id = trade.input.currency.chain_id;
				let from = self.account.address().await?;
				let gas = self.gas_estimate(chain_id).await?;

				let flow = self
					.builder
					.build_flow(trade, &self.account, None, &gas)
					.await?;

				let runner = FlowRunner {
					delivery: &self.delivery,
					events: &self.events,
				};
				let steps = runner.run(chain_id, from, flow).await?;
				Ok(SubmitOutcome::Transactions { steps })
			}
		}
	}

	async fn gas_estimate(&self, chain_id: ChainId) -> Result<GasFeeEstimate, EngineError> {
		if let Some(result) = self.gas.latest(chain_id) {
			if let Some(estimate) = &result.estimate {
				return Ok(estimate.clone());
			}
		}
		// No polling result yet; fetch once on demand.
		let result = self.gas.refresh(chain_id).await?;
		result
			.estimate
			.clone()
			.ok_or(EngineError::NoGasEstimate(chain_id))
	}

	/// Starts the background gas pollers. Quote polling is started per
	/// form session via [`Self::start_quote_polling`].
	pub fn start_polling(&self) {
		self.gas.spawn_polling();
	}

	/// Keeps an open, unchanged form's quote fresh on the input chain's
	/// block cadence. The task ends on its own once the form changes.
	pub fn start_quote_polling(&self, form: QuoteForm) -> Option<tokio::task::JoinHandle<()>> {
		let chain_id = form.input.as_ref()?.chain_id;
		Some(
			self.quote_session()
				.spawn_polling(form, chain_id.poll_interval()),
		)
	}
}

type AccountFactory = Box<dyn Fn(&toml::Value) -> Box<dyn AccountInterface> + Send>;
type QuoteApiFactory = Box<dyn Fn(&toml::Value) -> Box<dyn QuoteApiInterface> + Send>;
type GasOracleFactory = Box<dyn Fn(&toml::Value) -> Box<dyn GasOracleInterface> + Send>;
type ChainClientFactory = Box<dyn Fn(&toml::Value) -> Box<dyn ChainClientInterface> + Send>;

/// Factory-based engine assembly from configuration, one closure per
/// boundary interface.
pub struct EngineBuilder {
	config: Config,
	account_factory: Option<AccountFactory>,
	quote_api_factories: HashMap<String, QuoteApiFactory>,
	gas_oracle_factories: HashMap<String, GasOracleFactory>,
	chain_client_factory: Option<ChainClientFactory>,
	gas_speed: GasSpeed,
	permit_signing: bool,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			account_factory: None,
			quote_api_factories: HashMap::new(),
			gas_oracle_factories: HashMap::new(),
			chain_client_factory: None,
			gas_speed: GasSpeed::Urgent,
			permit_signing: true,
		}
	}

	pub fn with_account_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn AccountInterface> + Send + 'static,
	{
		self.account_factory = Some(Box::new(factory));
		self
	}

	pub fn with_quote_api_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn QuoteApiInterface> + Send + 'static,
	{
		self.quote_api_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_gas_oracle_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn GasOracleInterface> + Send + 'static,
	{
		self.gas_oracle_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_chain_client_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn ChainClientInterface> + Send + 'static,
	{
		self.chain_client_factory = Some(Box::new(factory));
		self
	}

	pub fn with_gas_speed(mut self, speed: GasSpeed) -> Self {
		self.gas_speed = speed;
		self
	}

	pub fn with_permit_signing(mut self, enabled: bool) -> Self {
		self.permit_signing = enabled;
		self
	}

	pub fn build(self) -> Result<SwapEngine, EngineError> {
		let events = EventBus::new(1000);

		let account_factory = self
			.account_factory
			.ok_or_else(|| EngineError::Config("Account factory not provided".into()))?;
		let account = Arc::new(AccountService::new(account_factory(
			&self.config.account.config,
		)));

		let quote_api_factory = self
			.quote_api_factories
			.get(&self.config.quoter.implementation)
			.ok_or_else(|| {
				EngineError::Config(format!(
					"No quote API factory for implementation '{}'",
					self.config.quoter.implementation
				))
			})?;
		let quote_api: Arc<dyn QuoteApiInterface> =
			Arc::from(quote_api_factory(&self.config.quoter.config));

		let gas_oracle_factory = self
			.gas_oracle_factories
			.get(&self.config.gas.implementation)
			.ok_or_else(|| {
				EngineError::Config(format!(
					"No gas oracle factory for implementation '{}'",
					self.config.gas.implementation
				))
			})?;
		let gas_oracle: Arc<dyn GasOracleInterface> =
			Arc::from(gas_oracle_factory(&self.config.gas.config));

		let chain_client_factory = self
			.chain_client_factory
			.ok_or_else(|| EngineError::Config("Chain client factory not provided".into()))?;

		let mut chain_ids = Vec::new();
		let mut clients: Vec<Arc<dyn ChainClientInterface>> = Vec::new();
		for (key, value) in &self.config.delivery.chains {
			let chain_id: u64 = key
				.parse()
				.map_err(|_| EngineError::Config(format!("Bad chain key '{}'", key)))?;
			let value = with_chain_id(value, chain_id);
			chain_ids.push(ChainId(chain_id));
			clients.push(Arc::from(chain_client_factory(&value)));
		}
		if clients.is_empty() {
			return Err(EngineError::Config("No chain clients configured".into()));
		}

		let gas = Arc::new(GasFeeService::new(gas_oracle, chain_ids));
		let delivery = DeliveryService::new(
			clients,
			Arc::clone(&account),
			events.clone(),
			self.config.delivery.confirmations,
		);

		let quoter = Arc::new(QuoteSession::new(
			Arc::clone(&quote_api),
			events.clone(),
			DEFAULT_DEBOUNCE,
		));

		Ok(SwapEngine {
			quoter,
			quote_api,
			builder: TransactionBuilder::new(self.gas_speed, self.permit_signing),
			gas,
			account,
			delivery,
			events,
		})
	}
}

/// Injects the map key's chain id into a chain section that doesn't carry
/// one of its own.
fn with_chain_id(value: &toml::Value, chain_id: u64) -> toml::Value {
	let mut value = value.clone();
	if let Some(table) = value.as_table_mut() {
		table
			.entry("chain_id".to_string())
			.or_insert(toml::Value::Integer(chain_id as i64));
	}
	value
}

