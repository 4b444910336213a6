//! HTTP gas-price oracle client.

use crate::{GasError, GasOracleInterface};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use swap_types::{
	ChainId, ConfigSchema, FeeParams, Field, FieldType, GasFeeEstimate, GasSpeed, Schema,
	ValidationError,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GasApiTier {
	gas_price: Option<String>,
	max_fee_per_gas: Option<String>,
	max_priority_fee_per_gas: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GasApiResponse {
	supports_eip1559: bool,
	gas_limit: u64,
	normal: GasApiTier,
	urgent: GasApiTier,
}

fn parse_wei(value: &Option<String>, field: &str) -> Result<u128, GasError> {
	value
		.as_deref()
		.ok_or_else(|| GasError::Parse(format!("missing {}", field)))?
		.parse::<u128>()
		.map_err(|e| GasError::Parse(format!("bad {}: {}", field, e)))
}

fn tier_params(tier: &GasApiTier, use_eip1559: bool) -> Result<FeeParams, GasError> {
	if use_eip1559 {
		Ok(FeeParams::Eip1559 {
			max_fee_per_gas: parse_wei(&tier.max_fee_per_gas, "maxFeePerGas")?,
			max_priority_fee_per_gas: parse_wei(
				&tier.max_priority_fee_per_gas,
				"maxPriorityFeePerGas",
			)?,
		})
	} else {
		Ok(FeeParams::Legacy {
			gas_price: parse_wei(&tier.gas_price, "gasPrice")?,
		})
	}
}

/// Gas oracle speaking a REST endpoint: `GET {endpoint}/v1/gas/{chain_id}`.
pub struct HttpGasOracle {
	client: reqwest::Client,
	endpoint: String,
}

impl HttpGasOracle {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			endpoint: endpoint.into(),
		}
	}
}

pub struct HttpGasOracleSchema;

impl ConfigSchema for HttpGasOracleSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("endpoint", FieldType::String).with_validator(|value| {
				let url = value.as_str().unwrap_or_default();
				if url.starts_with("http://") || url.starts_with("https://") {
					Ok(())
				} else {
					Err("Endpoint must start with http:// or https://".to_string())
				}
			})],
			vec![],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl GasOracleInterface for HttpGasOracle {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpGasOracleSchema)
	}

	async fn fetch(&self, chain_id: ChainId) -> Result<GasFeeEstimate, GasError> {
		let url = format!("{}/v1/gas/{}", self.endpoint, chain_id);
		let response = self
			.client
			.get(&url)
			.send()
			.await
			.map_err(|e| GasError::Network(e.to_string()))?
			.error_for_status()
			.map_err(|e| GasError::Network(e.to_string()))?;

		let body: GasApiResponse = response
			.json()
			.await
			.map_err(|e| GasError::Parse(e.to_string()))?;

		let mut fees = HashMap::new();
		fees.insert(
			GasSpeed::Normal,
			tier_params(&body.normal, body.supports_eip1559)?,
		);
		fees.insert(
			GasSpeed::Urgent,
			tier_params(&body.urgent, body.supports_eip1559)?,
		);

		Ok(GasFeeEstimate {
			fees,
			gas_limit: body.gas_limit,
		})
	}
}

/// Factory for the HTTP gas oracle.
pub fn create_http_oracle(config: &toml::Value) -> Box<dyn GasOracleInterface> {
	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.expect("endpoint is required for the gas oracle");

	Box::new(HttpGasOracle::new(endpoint))
}
