use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::info;

use crate::api::models::{
    CardPaymentPayload, InquiryPayload, TransactionResponse, WalletPaymentPayload,
};
use crate::app_state::AppState;
use crate::domain::entities::Subject;
use crate::services::payment::dto::{
    CardFormDescriptor, CardPaymentRequest, InquiryOutcome, InquiryRequest, WalletPaymentOutcome,
    WalletPaymentRequest,
};
use crate::utils::error::{ApiResponse, GatewayError};

// 发起钱包直扣支付
pub async fn initiate_wallet_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WalletPaymentPayload>,
) -> Result<(StatusCode, Json<ApiResponse<WalletPaymentOutcome>>), GatewayError> {
    info!(
        "API: wallet payment request for {} {}",
        payload.subject_kind, payload.subject_id
    );

    let request = WalletPaymentRequest {
        subject: Subject {
            kind: payload.subject_kind,
            id: payload.subject_id,
        },
        amount: payload.amount,
        mobile_number: payload.mobile_number,
        cnic_last6: payload.cnic_last6,
        description: payload.description,
        registration_id: payload.registration_id,
    };

    let outcome = state.payment_service.initiate_wallet_payment(request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

// 准备卡支付表单
pub async fn prepare_card_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CardPaymentPayload>,
) -> Result<(StatusCode, Json<ApiResponse<CardFormDescriptor>>), GatewayError> {
    info!(
        "API: card payment request for {} {}",
        payload.subject_kind, payload.subject_id
    );

    let request = CardPaymentRequest {
        subject: Subject {
            kind: payload.subject_kind,
            id: payload.subject_id,
        },
        amount: payload.amount,
        description: payload.description,
        registration_id: payload.registration_id,
    };

    let form = state.payment_service.prepare_card_form(request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(form))))
}

// 查询交易详情
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionResponse>>), GatewayError> {
    let txn = state
        .transaction_repository
        .find_by_reference(&reference)
        .await?
        .ok_or_else(|| GatewayError::not_found(format!("transaction {}", reference)))?;

    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(TransactionResponse::from(txn))),
    ))
}

// 向网关对账查询交易状态
pub async fn inquire_status(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
    payload: Option<Json<InquiryPayload>>,
) -> Result<(StatusCode, Json<ApiResponse<InquiryOutcome>>), GatewayError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let outcome = state
        .payment_service
        .inquire_status(InquiryRequest {
            reference,
            requested_by: payload.requested_by,
        })
        .await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(outcome))))
}
