use crate::api::handlers::{callback_handlers, payment_handlers, refund_handlers};
use crate::app_state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // 健康检查
        .route("/health", get(|| async { "OK" }))

        // 支付相关接口
        .route("/api/v1/payments/wallet", post(payment_handlers::initiate_wallet_payment))
        .route("/api/v1/payments/card", post(payment_handlers::prepare_card_payment))
        .route("/api/v1/payments/:reference", get(payment_handlers::get_transaction))
        .route("/api/v1/payments/:reference/inquiry", post(payment_handlers::inquire_status))

        // 网关回调接口
        .route("/api/v1/callbacks/return", post(callback_handlers::handle_return))
        .route("/api/v1/callbacks/ipn", post(callback_handlers::handle_ipn))

        // 退款接口
        .route("/api/v1/refunds", post(refund_handlers::create_refund))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
