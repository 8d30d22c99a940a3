//! Fee endpoints.

use super::{engine_error, json_rejection, query_rejection};
use crate::server::AppState;
use axum::{
	extract::{
		rejection::{JsonRejection, QueryRejection},
		Query, State,
	},
	Json,
};
use relay_types::{APIError, FeePayment, FeeQuote, FeeQuoteQuery, FeeReceipt};

/// Handles GET /api/fees/quote requests.
///
/// The quote comes from the configured oracle and is passed through after
/// non-nullity checks on the collector and token.
pub async fn get_quote(
	State(state): State<AppState>,
	query: Result<Query<FeeQuoteQuery>, QueryRejection>,
) -> Result<Json<FeeQuote>, APIError> {
	let Query(query) = query.map_err(query_rejection)?;
	state
		.relay
		.quote_fee(query.token, query.gas_limit)
		.await
		.map(Json)
		.map_err(|e| {
			tracing::warn!("Fee quote failed: {}", e);
			engine_error(e)
		})
}

/// Handles POST /api/fees/settle requests.
pub async fn settle(
	State(state): State<AppState>,
	payment: Result<Json<FeePayment>, JsonRejection>,
) -> Result<Json<FeeReceipt>, APIError> {
	let Json(payment) = payment.map_err(json_rejection)?;
	state
		.relay
		.settle_fee(&payment)
		.await
		.map(Json)
		.map_err(|e| {
			tracing::warn!(payer = %payment.payer, reason = e.name(), "Fee settlement failed: {}", e);
			engine_error(e)
		})
}
