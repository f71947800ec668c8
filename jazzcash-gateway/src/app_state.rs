use std::sync::Arc;
use std::time::Duration;

use sqlx::MySqlPool;
use tracing::warn;

use crate::config::AppConfig;
use crate::repositories::{
    CallbackLogRepository, RefundRepository, StatusInquiryRepository, TransactionRepository,
    TransactionRepositoryTrait,
};
use crate::services::registration::HttpRegistrationNotifier;
use crate::services::PaymentService;
use crate::utils::error::GatewayError;
use crate::utils::http_client::HttpGatewayTransport;

/// 应用共享状态，路由处理器经由State取用
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: MySqlPool,
    pub transaction_repository: Arc<dyn TransactionRepositoryTrait>,
    pub payment_service: Arc<PaymentService>,
}

impl AppState {
    pub fn new(config: AppConfig, db_pool: MySqlPool) -> Result<Self, GatewayError> {
        if !config.jazzcash.is_configured() {
            warn!("Gateway credentials are not configured, payment endpoints will refuse requests");
        }

        let transactions = Arc::new(TransactionRepository::new(db_pool.clone()));
        let refunds = Arc::new(RefundRepository::new(db_pool.clone()));
        let callback_logs = Arc::new(CallbackLogRepository::new(db_pool.clone()));
        let inquiries = Arc::new(StatusInquiryRepository::new(db_pool.clone()));

        let gateway = Arc::new(HttpGatewayTransport::new(Duration::from_secs(
            config.jazzcash.request_timeout,
        ))?);
        let registrations = Arc::new(HttpRegistrationNotifier::new(&config.registration)?);

        let payment_service = Arc::new(PaymentService::new(
            config.jazzcash.clone(),
            transactions.clone(),
            refunds,
            callback_logs,
            inquiries,
            gateway,
            registrations,
        ));

        Ok(Self {
            config,
            db_pool,
            transaction_repository: transactions,
            payment_service,
        })
    }
}
