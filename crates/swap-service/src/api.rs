//! HTTP API exposing the pipeline's inbound contract.

use alloy::primitives::U256;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use swap_builder::BuildError;
use swap_core::{EngineError, SubmitOutcome, SwapEngine};
use swap_delivery::DeliveryError;
use swap_types::{Currency, Protocol, QuoteForm, Trade, TrackedTransaction, TrackingId, TradeType};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

struct ApiError(EngineError);

impl From<EngineError> for ApiError {
	fn from(e: EngineError) -> Self {
		Self(e)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = match &self.0 {
			EngineError::Build(BuildError::MissingField(_))
			| EngineError::Build(BuildError::Malformed(_))
			| EngineError::Build(BuildError::WrongVariant) => StatusCode::BAD_REQUEST,
			EngineError::Delivery(DeliveryError::UnknownTransaction(_)) => StatusCode::NOT_FOUND,
			EngineError::Delivery(DeliveryError::NotCancellable(_)) => StatusCode::CONFLICT,
			EngineError::Quote(_) => StatusCode::BAD_GATEWAY,
			EngineError::NoGasEstimate(_) => StatusCode::SERVICE_UNAVAILABLE,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};
		let body = Json(serde_json::json!({ "error": self.0.to_string() }));
		(status, body).into_response()
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteFormBody {
	input: Option<Currency>,
	output: Option<Currency>,
	exact_amount: Option<String>,
	trade_type: Option<TradeType>,
	slippage_bps: Option<u16>,
	#[serde(default)]
	protocols: Vec<Protocol>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponseBody {
	trade: Option<Trade>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", untagged)]
enum SwapResponseBody {
	Transactions {
		tracking_id: String,
		steps: Vec<TrackedTransaction>,
	},
	Order {
		order_hash: String,
	},
}

pub fn router(engine: Arc<SwapEngine>) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/quote", post(quote))
		.route("/swap", post(swap))
		.route("/transactions/{id}", get(transaction))
		.route("/transactions/{id}/cancel", post(cancel))
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
		.with_state(engine)
}

pub async fn serve(engine: Arc<SwapEngine>, port: u16) -> anyhow::Result<()> {
	let app = router(engine);
	let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
	info!("HTTP API listening on port {}", port);
	axum::serve(listener, app).await?;
	Ok(())
}

async fn health() -> Json<serde_json::Value> {
	Json(serde_json::json!({ "status": "ok" }))
}

async fn quote(
	State(engine): State<Arc<SwapEngine>>,
	Json(body): Json<QuoteFormBody>,
) -> Result<Json<QuoteResponseBody>, ApiError> {
	let exact_amount = match body.exact_amount.as_deref() {
		Some(raw) => Some(U256::from_str(raw).map_err(|_| {
			ApiError(EngineError::Build(BuildError::Malformed(format!(
				"exactAmount '{}'",
				raw
			))))
		})?),
		None => None,
	};

	let form = QuoteForm {
		input: body.input,
		output: body.output,
		exact_amount,
		trade_type: body.trade_type,
		slippage_bps: body.slippage_bps,
		protocols: body.protocols,
	};

	let trade = engine.request_quote(&form).await?;
	Ok(Json(QuoteResponseBody {
		trade: trade.map(|t| (*t).clone()),
	}))
}

async fn swap(
	State(engine): State<Arc<SwapEngine>>,
	Json(trade): Json<Trade>,
) -> Result<Json<SwapResponseBody>, ApiError> {
	let outcome = engine.submit_swap(&trade).await?;
	let body = match outcome {
		SubmitOutcome::Transactions { steps } => {
			let tracking_id = steps
				.last()
				.map(|tx| tx.id.to_string())
				.unwrap_or_default();
			SwapResponseBody::Transactions { tracking_id, steps }
		}
		SubmitOutcome::Order { order_hash } => SwapResponseBody::Order { order_hash },
	};
	Ok(Json(body))
}

async fn transaction(
	State(engine): State<Arc<SwapEngine>>,
	Path(id): Path<String>,
) -> Result<Json<TrackedTransaction>, StatusCode> {
	let id = TrackingId::from_str(&id).map_err(|_| StatusCode::BAD_REQUEST)?;
	engine
		.transaction(id)
		.map(Json)
		.ok_or(StatusCode::NOT_FOUND)
}

async fn cancel(
	State(engine): State<Arc<SwapEngine>>,
	Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let id = TrackingId::from_str(&id).map_err(|_| {
		ApiError(EngineError::Build(BuildError::Malformed(
			"tracking id".to_string(),
		)))
	})?;
	let replacement = engine.cancel_transaction(id).await?;
	Ok(Json(serde_json::json!({
		"replacementHash": format!("{replacement}"),
	})))
}
