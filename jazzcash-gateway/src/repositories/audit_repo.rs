use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::domain::entities::{CallbackLog, StatusInquiryRecord};
use crate::repositories::{CallbackLogRepositoryTrait, StatusInquiryRepositoryTrait};
use crate::utils::error::GatewayError;

fn payload_to_string(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

pub struct CallbackLogRepository {
    db_pool: MySqlPool,
}

impl CallbackLogRepository {
    pub fn new(db_pool: MySqlPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CallbackLogRepositoryTrait for CallbackLogRepository {
    async fn append(&self, log: &CallbackLog) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT INTO jazzcash_callback_logs (
                id, transaction_id, reference, declared_kind, response_code,
                response_message, payload, received_hash, computed_hash,
                verified, processed, processed_at, retry_count, received_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.transaction_id.map(|id| id.to_string()))
        .bind(&log.reference)
        .bind(&log.declared_kind)
        .bind(&log.response_code)
        .bind(&log.response_message)
        .bind(payload_to_string(&log.payload))
        .bind(&log.received_hash)
        .bind(&log.computed_hash)
        .bind(log.verified)
        .bind(log.processed)
        .bind(log.processed_at)
        .bind(log.retry_count)
        .bind(log.received_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn count_matching(
        &self,
        reference: &str,
        response_code: &str,
    ) -> Result<u32, GatewayError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jazzcash_callback_logs WHERE reference = ? AND response_code = ?",
        )
        .bind(reference)
        .bind(response_code)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count.max(0) as u32)
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), GatewayError> {
        sqlx::query(
            "UPDATE jazzcash_callback_logs SET processed = TRUE, processed_at = ? WHERE id = ?",
        )
        .bind(at)
        .bind(id.to_string())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}

pub struct StatusInquiryRepository {
    db_pool: MySqlPool,
}

impl StatusInquiryRepository {
    pub fn new(db_pool: MySqlPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl StatusInquiryRepositoryTrait for StatusInquiryRepository {
    async fn append(&self, record: &StatusInquiryRecord) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT INTO jazzcash_status_inquiries (
                id, transaction_id, reference, requested_by, request_payload,
                response_payload, response_code, response_message,
                payment_response_code, payment_response_message, payment_status,
                verified, success, inquired_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.transaction_id.to_string())
        .bind(&record.reference)
        .bind(&record.requested_by)
        .bind(payload_to_string(&record.request_payload))
        .bind(record.response_payload.as_ref().map(payload_to_string))
        .bind(&record.response_code)
        .bind(&record.response_message)
        .bind(&record.payment_response_code)
        .bind(&record.payment_response_message)
        .bind(&record.payment_status)
        .bind(record.verified)
        .bind(record.success)
        .bind(record.inquired_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}
