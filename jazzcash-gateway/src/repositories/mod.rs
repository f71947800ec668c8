mod audit_repo;
mod memory;
mod refund_repo;
mod transaction_repo;

pub use audit_repo::{CallbackLogRepository, StatusInquiryRepository};
pub use memory::{
    InMemoryCallbackLogRepository, InMemoryRefundRepository, InMemoryStatusInquiryRepository,
    InMemoryTransactionRepository,
};
pub use refund_repo::RefundRepository;
pub use transaction_repo::TransactionRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entities::{CallbackLog, RefundRecord, StatusInquiryRecord, Transaction};
use crate::utils::error::GatewayError;

#[async_trait]
pub trait TransactionRepositoryTrait: Send + Sync {
    /// 插入新交易。引用号撞库返回DuplicateReference。
    async fn create(&self, txn: &Transaction) -> Result<(), GatewayError>;
    async fn find_by_reference(&self, reference: &str)
        -> Result<Option<Transaction>, GatewayError>;
    async fn update(&self, txn: &Transaction) -> Result<(), GatewayError>;
    /// 退款确认时交易与退款记录必须一起落库
    async fn update_with_refund(
        &self,
        txn: &Transaction,
        refund: &RefundRecord,
    ) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait RefundRepositoryTrait: Send + Sync {
    async fn create(&self, refund: &RefundRecord) -> Result<(), GatewayError>;
    async fn update(&self, refund: &RefundRecord) -> Result<(), GatewayError>;
    async fn find_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<RefundRecord>, GatewayError>;
}

#[async_trait]
pub trait CallbackLogRepositoryTrait: Send + Sync {
    async fn append(&self, log: &CallbackLog) -> Result<(), GatewayError>;
    /// 统计同一引用号同一响应码的历史投递次数，作为派生的重试计数
    async fn count_matching(
        &self,
        reference: &str,
        response_code: &str,
    ) -> Result<u32, GatewayError>;
    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait StatusInquiryRepositoryTrait: Send + Sync {
    async fn append(&self, record: &StatusInquiryRecord) -> Result<(), GatewayError>;
}
