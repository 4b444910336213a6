//! HTTP client for the pricing API.

use crate::{QuoteApiInterface, QuoteError};
use async_trait::async_trait;
use serde::Serialize;
use swap_types::{
	ConfigSchema, Field, FieldType, Protocol, QuoteRequest, QuoteResponse, Schema, SignedOrder,
	TradeType, ValidationError,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteApiRequest {
	chain_id: u64,
	token_in: String,
	token_out: String,
	amount: String,
	#[serde(rename = "type")]
	trade_type: TradeType,
	slippage_tolerance_bps: u16,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	protocols: Vec<Protocol>,
}

impl From<&QuoteRequest> for QuoteApiRequest {
	fn from(request: &QuoteRequest) -> Self {
		Self {
			chain_id: request.chain_id.0,
			token_in: request.input.address_for_api().to_string(),
			token_out: request.output.address_for_api().to_string(),
			amount: request.amount.to_string(),
			trade_type: request.trade_type,
			slippage_tolerance_bps: request.slippage_bps,
			protocols: request.protocols.clone(),
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderSubmission<'a> {
	quote_id: &'a str,
	order: &'a serde_json::Value,
	signature: String,
}

/// Pricing API client: `POST {endpoint}/v1/quote` and
/// `POST {endpoint}/v1/order`.
pub struct HttpQuoteApi {
	client: reqwest::Client,
	endpoint: String,
	api_key: Option<String>,
}

impl HttpQuoteApi {
	pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
		Self {
			client: reqwest::Client::new(),
			endpoint: endpoint.into(),
			api_key,
		}
	}

	fn request(&self, url: String) -> reqwest::RequestBuilder {
		let mut builder = self.client.post(url);
		if let Some(key) = &self.api_key {
			builder = builder.header("x-api-key", key);
		}
		builder
	}
}

pub struct HttpQuoteApiSchema;

impl ConfigSchema for HttpQuoteApiSchema {
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
			vec![Field::new("api_key", FieldType::String)],
		);

		schema.validate(config)
	}
}

async fn read_error(response: reqwest::Response) -> QuoteError {
	let status = response.status().as_u16();
	let message = response.text().await.unwrap_or_default();
	QuoteError::Api { status, message }
}

#[async_trait]
impl QuoteApiInterface for HttpQuoteApi {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpQuoteApiSchema)
	}

	async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, QuoteError> {
		let url = format!("{}/v1/quote", self.endpoint);
		let response = self
			.request(url)
			.json(&QuoteApiRequest::from(request))
			.send()
			.await
			.map_err(|e| QuoteError::Network(e.to_string()))?;

		if !response.status().is_success() {
			return Err(read_error(response).await);
		}

		response
			.json()
			.await
			.map_err(|e| QuoteError::Parse(e.to_string()))
	}

	async fn submit_order(&self, order: &SignedOrder) -> Result<String, QuoteError> {
		let url = format!("{}/v1/order", self.endpoint);
		let body = OrderSubmission {
			quote_id: &order.quote_id,
			order: &order.payload.message,
			signature: format!("0x{}", hex::encode(&order.signature)),
		};

		let response = self
			.request(url)
			.json(&body)
			.send()
			.await
			.map_err(|e| QuoteError::Network(e.to_string()))?;

		if !response.status().is_success() {
			return Err(read_error(response).await);
		}

		#[derive(serde::Deserialize)]
		#[serde(rename_all = "camelCase")]
		struct OrderResponse {
			order_hash: String,
		}

		let parsed: OrderResponse = response
			.json()
			.await
			.map_err(|e| QuoteError::Parse(e.to_string()))?;
		Ok(parsed.order_hash)
	}
}

/// Factory for the HTTP pricing API client.
pub fn create_http_quote_api(config: &toml::Value) -> Box<dyn QuoteApiInterface> {
	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.expect("endpoint is required for the quote API");

	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.map(str::to_string);

	Box::new(HttpQuoteApi::new(endpoint, api_key))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_requires_http_endpoint() {
		let bad: toml::Value = toml::from_str(r#"endpoint = "ftp://quotes""#).unwrap();
		assert!(HttpQuoteApiSchema.validate(&bad).is_err());

		let good: toml::Value =
			toml::from_str(r#"endpoint = "https://quotes.example.org""#).unwrap();
		assert!(HttpQuoteApiSchema.validate(&good).is_ok());
	}
}
