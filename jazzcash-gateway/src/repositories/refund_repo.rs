use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::entities::RefundRecord;
use crate::domain::enums::RefundStatus;
use crate::repositories::RefundRepositoryTrait;
use crate::utils::error::GatewayError;

pub struct RefundRepository {
    db_pool: MySqlPool,
}

impl RefundRepository {
    pub fn new(db_pool: MySqlPool) -> Self {
        Self { db_pool }
    }
}

fn payload_to_string(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

#[async_trait]
impl RefundRepositoryTrait for RefundRepository {
    async fn create(&self, refund: &RefundRecord) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT INTO jazzcash_refunds (
                id, transaction_id, reference, amount, amount_minor, reason,
                requested_by, status, response_code, response_message,
                request_payload, response_payload, created_at, updated_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(refund.id.to_string())
        .bind(refund.transaction_id.to_string())
        .bind(&refund.reference)
        .bind(refund.amount)
        .bind(refund.amount_minor)
        .bind(&refund.reason)
        .bind(&refund.requested_by)
        .bind(refund.status.to_string())
        .bind(&refund.response_code)
        .bind(&refund.response_message)
        .bind(payload_to_string(&refund.request_payload))
        .bind(refund.response_payload.as_ref().map(payload_to_string))
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .bind(refund.completed_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn update(&self, refund: &RefundRecord) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            UPDATE jazzcash_refunds
            SET status = ?, response_code = ?, response_message = ?,
                response_payload = ?, updated_at = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(refund.status.to_string())
        .bind(&refund.response_code)
        .bind(&refund.response_message)
        .bind(refund.response_payload.as_ref().map(payload_to_string))
        .bind(refund.updated_at)
        .bind(refund.completed_at)
        .bind(refund.id.to_string())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn find_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<RefundRecord>, GatewayError> {
        let records = sqlx::query_as::<_, RefundRow>(
            "SELECT * FROM jazzcash_refunds WHERE transaction_id = ? ORDER BY created_at",
        )
        .bind(transaction_id.to_string())
        .fetch_all(&self.db_pool)
        .await?;

        Ok(records.into_iter().map(RefundRecord::from).collect())
    }
}

// 数据库记录结构体，用于sqlx
#[derive(sqlx::FromRow)]
struct RefundRow {
    id: String,
    transaction_id: String,
    reference: String,
    amount: Decimal,
    amount_minor: i64,
    reason: String,
    requested_by: Option<String>,
    status: String,
    response_code: Option<String>,
    response_message: Option<String>,
    request_payload: String,
    response_payload: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<RefundRow> for RefundRecord {
    fn from(record: RefundRow) -> Self {
        Self {
            id: Uuid::parse_str(&record.id).unwrap_or_default(),
            transaction_id: Uuid::parse_str(&record.transaction_id).unwrap_or_default(),
            reference: record.reference,
            amount: record.amount,
            amount_minor: record.amount_minor,
            reason: record.reason,
            requested_by: record.requested_by,
            status: RefundStatus::from_str(&record.status).unwrap_or(RefundStatus::Pending),
            response_code: record.response_code,
            response_message: record.response_message,
            request_payload: serde_json::from_str(&record.request_payload)
                .unwrap_or(serde_json::Value::Null),
            response_payload: record
                .response_payload
                .and_then(|s| serde_json::from_str(&s).ok()),
            created_at: record.created_at,
            updated_at: record.updated_at,
            completed_at: record.completed_at,
        }
    }
}
