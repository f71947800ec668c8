use axum::extract::{Json, State};
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::info;

use crate::app_state::AppState;
use crate::services::payment::dto::{RefundOutcome, RefundRequest};
use crate::utils::error::{ApiResponse, GatewayError};

// 发起退款，支持部分退款
pub async fn create_refund(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefundRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RefundOutcome>>), GatewayError> {
    info!(
        "API: refund request of {} against {}",
        payload.amount, payload.reference
    );

    let outcome = state.payment_service.process_refund(payload).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}
