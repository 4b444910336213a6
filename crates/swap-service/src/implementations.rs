//! Wires concrete implementations into the engine's factory slots.

use swap_account::implementations::local::{create_account, LocalWalletSchema};
use swap_config::Config;
use swap_core::{EngineBuilder, EngineError, SwapEngine};
use swap_delivery::implementations::rpc::{create_rpc_client, RpcChainClientSchema};
use swap_gas::implementations::http::{create_http_oracle, HttpGasOracleSchema};
use swap_quoter::implementations::http::{create_http_quote_api, HttpQuoteApiSchema};
use swap_types::ConfigSchema;

pub fn build_engine(config: Config) -> Result<SwapEngine, EngineError> {
	EngineBuilder::new(config)
		.with_account_factory(create_account)
		.with_quote_api_factory("http", create_http_quote_api)
		.with_gas_oracle_factory("http", create_http_oracle)
		.with_chain_client_factory(create_rpc_client)
		.build()
}

/// Checks every implementation section against its schema before anything
/// is constructed, so `swapd validate` catches bad config without touching
/// the network.
pub fn validate_implementations(config: &Config) -> anyhow::Result<()> {
	LocalWalletSchema
		.validate(&config.account.config)
		.map_err(|e| anyhow::anyhow!("[account] {}", e))?;

	HttpQuoteApiSchema
		.validate(&config.quoter.config)
		.map_err(|e| anyhow::anyhow!("[quoter] {}", e))?;

	HttpGasOracleSchema
		.validate(&config.gas.config)
		.map_err(|e| anyhow::anyhow!("[gas] {}", e))?;

	for (chain, value) in &config.delivery.chains {
		// The engine builder injects the map key as chain_id; mirror that
		// here so the schema sees the same section it will be built from.
		let mut value = value.clone();
		if let Some(table) = value.as_table_mut() {
			let chain_id: i64 = chain.parse().map_err(|_| {
				anyhow::anyhow!("[delivery.chains.{}] key is not a chain id", chain)
			})?;
			table
				.entry("chain_id".to_string())
				.or_insert(toml::Value::Integer(chain_id));
		}
		RpcChainClientSchema
			.validate(&value)
			.map_err(|e| anyhow::anyhow!("[delivery.chains.{}] {}", chain, e))?;
	}

	Ok(())
}
