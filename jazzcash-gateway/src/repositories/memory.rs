//! 内存实现，供测试和本地演练使用，与MySQL实现遵守同一套契约。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::domain::entities::{CallbackLog, RefundRecord, StatusInquiryRecord, Transaction};
use crate::repositories::{
    CallbackLogRepositoryTrait, RefundRepositoryTrait, StatusInquiryRepositoryTrait,
    TransactionRepositoryTrait,
};
use crate::utils::error::GatewayError;

fn lock_poisoned() -> GatewayError {
    GatewayError::Internal(anyhow::anyhow!("in-memory store lock poisoned"))
}

pub struct InMemoryTransactionRepository {
    by_reference: RwLock<HashMap<String, Transaction>>,
    refunds: Arc<InMemoryRefundRepository>,
}

impl InMemoryTransactionRepository {
    /// 退款仓储要传进来，update_with_refund才能和MySQL实现一样双写
    pub fn new(refunds: Arc<InMemoryRefundRepository>) -> Self {
        Self {
            by_reference: RwLock::new(HashMap::new()),
            refunds,
        }
    }

    pub fn all(&self) -> Vec<Transaction> {
        self.by_reference
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TransactionRepositoryTrait for InMemoryTransactionRepository {
    async fn create(&self, txn: &Transaction) -> Result<(), GatewayError> {
        let mut map = self.by_reference.write().map_err(|_| lock_poisoned())?;
        if map.contains_key(&txn.reference) {
            return Err(GatewayError::DuplicateReference(txn.reference.clone()));
        }
        map.insert(txn.reference.clone(), txn.clone());
        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, GatewayError> {
        let map = self.by_reference.read().map_err(|_| lock_poisoned())?;
        Ok(map.get(reference).cloned())
    }

    async fn update(&self, txn: &Transaction) -> Result<(), GatewayError> {
        let mut map = self.by_reference.write().map_err(|_| lock_poisoned())?;
        if !map.contains_key(&txn.reference) {
            return Err(GatewayError::not_found(format!(
                "transaction {}",
                txn.reference
            )));
        }
        map.insert(txn.reference.clone(), txn.clone());
        Ok(())
    }

    async fn update_with_refund(
        &self,
        txn: &Transaction,
        refund: &RefundRecord,
    ) -> Result<(), GatewayError> {
        // 交易和退款记录一起落，与MySQL实现的事务语义对齐
        self.update(txn).await?;
        self.refunds.update(refund).await
    }
}

#[derive(Default)]
pub struct InMemoryRefundRepository {
    by_id: RwLock<HashMap<Uuid, RefundRecord>>,
}

impl InMemoryRefundRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<RefundRecord> {
        self.by_id
            .read()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RefundRepositoryTrait for InMemoryRefundRepository {
    async fn create(&self, refund: &RefundRecord) -> Result<(), GatewayError> {
        let mut map = self.by_id.write().map_err(|_| lock_poisoned())?;
        map.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn update(&self, refund: &RefundRecord) -> Result<(), GatewayError> {
        let mut map = self.by_id.write().map_err(|_| lock_poisoned())?;
        map.insert(refund.id, refund.clone());
        Ok(())
    }

    async fn find_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<RefundRecord>, GatewayError> {
        let map = self.by_id.read().map_err(|_| lock_poisoned())?;
        let mut refunds: Vec<RefundRecord> = map
            .values()
            .filter(|r| r.transaction_id == transaction_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }
}

#[derive(Default)]
pub struct InMemoryCallbackLogRepository {
    logs: RwLock<Vec<CallbackLog>>,
}

impl InMemoryCallbackLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<CallbackLog> {
        self.logs
            .read()
            .map(|logs| logs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CallbackLogRepositoryTrait for InMemoryCallbackLogRepository {
    async fn append(&self, log: &CallbackLog) -> Result<(), GatewayError> {
        let mut logs = self.logs.write().map_err(|_| lock_poisoned())?;
        logs.push(log.clone());
        Ok(())
    }

    async fn count_matching(
        &self,
        reference: &str,
        response_code: &str,
    ) -> Result<u32, GatewayError> {
        let logs = self.logs.read().map_err(|_| lock_poisoned())?;
        Ok(logs
            .iter()
            .filter(|l| l.reference == reference && l.response_code == response_code)
            .count() as u32)
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), GatewayError> {
        let mut logs = self.logs.write().map_err(|_| lock_poisoned())?;
        if let Some(log) = logs.iter_mut().find(|l| l.id == id) {
            log.processed = true;
            log.processed_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStatusInquiryRepository {
    records: RwLock<Vec<StatusInquiryRecord>>,
}

impl InMemoryStatusInquiryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<StatusInquiryRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StatusInquiryRepositoryTrait for InMemoryStatusInquiryRepository {
    async fn append(&self, record: &StatusInquiryRecord) -> Result<(), GatewayError> {
        let mut records = self.records.write().map_err(|_| lock_poisoned())?;
        records.push(record.clone());
        Ok(())
    }
}
