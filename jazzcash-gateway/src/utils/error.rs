use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::error;

use crate::domain::enums::TransactionStatus;

// API响应结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "0".to_string(),
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            success: false,
            code: code.to_string(),
            message: message.to_string(),
            data: None,
        }
    }
}

// 业务错误代码枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // 系统错误 (1xxx)
    InternalServerError = 1000,
    DatabaseError = 1001,
    ConfigError = 1003,

    // 请求错误 (3xxx)
    ResourceNotFound = 3002,

    // 业务错误 (4xxx)
    ValidationFailed = 4000,
    InvalidSignature = 4001,
    DuplicateReference = 4005,
    RefundNotAllowed = 4006,
    RefundExceedsAvailable = 4007,
    IllegalTransition = 4008,
    VerificationFailed = 4010,

    // 网关侧错误 (5xxx)
    GatewayNetworkError = 5001,
    GatewayIndeterminate = 5003,
}

impl ErrorCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

// 应用错误类型
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Signature mismatch: expected {expected}, received {received}")]
    SignatureMismatch { expected: String, received: String },

    #[error("Security verification failed for transaction {0}")]
    SecurityVerificationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate transaction reference: {0}")]
    DuplicateReference(String),

    #[error("Transaction {0} is not refundable: {1}")]
    NotRefundable(String, String),

    #[error("Refund amount {requested} exceeds available {available}")]
    AmountExceedsAvailable {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Gateway network error: {0}")]
    TransientNetwork(String),

    #[error("Indeterminate gateway response {code} for transaction {reference}")]
    IndeterminateResponse { reference: String, code: String },

    #[error("Illegal status transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Gateway credentials are not configured")]
    NotConfigured,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    // 获取错误对应的HTTP状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::SignatureMismatch { .. } => StatusCode::BAD_GATEWAY,
            Self::SecurityVerificationFailed(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateReference(_) => StatusCode::CONFLICT,
            Self::NotRefundable(_, _) => StatusCode::BAD_REQUEST,
            Self::AmountExceedsAvailable { .. } => StatusCode::BAD_REQUEST,
            Self::TransientNetwork(_) => StatusCode::BAD_GATEWAY,
            Self::IndeterminateResponse { .. } => StatusCode::BAD_GATEWAY,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // 获取错误代码
    pub fn error_code(&self) -> String {
        let code = match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::SignatureMismatch { .. } => ErrorCode::InvalidSignature,
            Self::SecurityVerificationFailed(_) => ErrorCode::VerificationFailed,
            Self::NotFound(_) => ErrorCode::ResourceNotFound,
            Self::DuplicateReference(_) => ErrorCode::DuplicateReference,
            Self::NotRefundable(_, _) => ErrorCode::RefundNotAllowed,
            Self::AmountExceedsAvailable { .. } => ErrorCode::RefundExceedsAvailable,
            Self::TransientNetwork(_) => ErrorCode::GatewayNetworkError,
            Self::IndeterminateResponse { .. } => ErrorCode::GatewayIndeterminate,
            Self::InvalidTransition { .. } => ErrorCode::IllegalTransition,
            Self::NotConfigured => ErrorCode::ConfigError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Internal(_) => ErrorCode::InternalServerError,
        };
        code.to_string()
    }

    // 获取用户友好的错误消息
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(err) => {
                error!("Database error: {}", err);
                "A database error occurred. Please try again later.".to_string()
            }
            Self::Internal(err) => {
                error!("Internal server error: {:#}", err);
                "An internal error occurred. Please try again later.".to_string()
            }
            Self::SignatureMismatch { .. } => {
                "Gateway response failed security verification.".to_string()
            }
            Self::TransientNetwork(_) => {
                "Could not reach the payment gateway. The transaction remains pending; use a status inquiry to resolve it.".to_string()
            }
            Self::IndeterminateResponse { reference, code } => {
                format!(
                    "Gateway returned unrecognized code {} for {}. The transaction remains pending; use a status inquiry to resolve it.",
                    code, reference
                )
            }
            other => other.to_string(),
        }
    }
}

// 将GatewayError转换为Axum响应
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.user_message();

        let response = ApiResponse::<()>::error(&code, &message);

        // 记录5xx错误
        if status.is_server_error() {
            error!(
                status_code = %status.as_u16(),
                error_code = %code,
                error_message = %message,
                "Server error occurred"
            );
        }

        (status, Json(response)).into_response()
    }
}
