use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::entities::{RefundRecord, Subject, Transaction};
use crate::domain::enums::{SubjectKind, TransactionKind, TransactionStatus};
use crate::repositories::TransactionRepositoryTrait;
use crate::utils::error::GatewayError;

pub struct TransactionRepository {
    db_pool: MySqlPool,
}

impl TransactionRepository {
    pub fn new(db_pool: MySqlPool) -> Self {
        Self { db_pool }
    }
}

fn payload_to_string(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

const INSERT_SQL: &str = r#"
INSERT INTO jazzcash_transactions (
    id, reference, kind, amount, amount_minor, currency,
    subject_kind, subject_id, registration_id, bill_reference, description,
    mobile_number, cnic_last6, status, response_code, response_message,
    retrieval_ref_no, auth_code, request_payload, response_payload,
    refunded_total, is_refundable, created_at, updated_at, completed_at
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_SQL: &str = r#"
UPDATE jazzcash_transactions
SET status = ?, response_code = ?, response_message = ?, retrieval_ref_no = ?,
    auth_code = ?, response_payload = ?, registration_id = ?, refunded_total = ?,
    is_refundable = ?, updated_at = ?, completed_at = ?
WHERE id = ?
"#;

#[async_trait]
impl TransactionRepositoryTrait for TransactionRepository {
    async fn create(&self, txn: &Transaction) -> Result<(), GatewayError> {
        let result = sqlx::query(INSERT_SQL)
            .bind(txn.id.to_string())
            .bind(&txn.reference)
            .bind(txn.kind.to_string())
            .bind(txn.amount)
            .bind(txn.amount_minor)
            .bind(&txn.currency)
            .bind(txn.subject.kind.to_string())
            .bind(&txn.subject.id)
            .bind(&txn.registration_id)
            .bind(&txn.bill_reference)
            .bind(&txn.description)
            .bind(&txn.mobile_number)
            .bind(&txn.cnic_last6)
            .bind(txn.status.to_string())
            .bind(&txn.response_code)
            .bind(&txn.response_message)
            .bind(&txn.retrieval_ref_no)
            .bind(&txn.auth_code)
            .bind(payload_to_string(&txn.request_payload))
            .bind(txn.response_payload.as_ref().map(payload_to_string))
            .bind(txn.refunded_total)
            .bind(txn.is_refundable)
            .bind(txn.created_at)
            .bind(txn.updated_at)
            .bind(txn.completed_at)
            .execute(&self.db_pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false)
                {
                    Err(GatewayError::DuplicateReference(txn.reference.clone()))
                } else {
                    Err(GatewayError::Database(e))
                }
            }
        }
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, GatewayError> {
        let record = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM jazzcash_transactions WHERE reference = ?",
        )
        .bind(reference)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(record.map(Transaction::from))
    }

    async fn update(&self, txn: &Transaction) -> Result<(), GatewayError> {
        sqlx::query(UPDATE_SQL)
            .bind(txn.status.to_string())
            .bind(&txn.response_code)
            .bind(&txn.response_message)
            .bind(&txn.retrieval_ref_no)
            .bind(&txn.auth_code)
            .bind(txn.response_payload.as_ref().map(payload_to_string))
            .bind(&txn.registration_id)
            .bind(txn.refunded_total)
            .bind(txn.is_refundable)
            .bind(txn.updated_at)
            .bind(txn.completed_at)
            .bind(txn.id.to_string())
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }

    async fn update_with_refund(
        &self,
        txn: &Transaction,
        refund: &RefundRecord,
    ) -> Result<(), GatewayError> {
        let mut tx = self.db_pool.begin().await?;

        sqlx::query(UPDATE_SQL)
            .bind(txn.status.to_string())
            .bind(&txn.response_code)
            .bind(&txn.response_message)
            .bind(&txn.retrieval_ref_no)
            .bind(&txn.auth_code)
            .bind(txn.response_payload.as_ref().map(payload_to_string))
            .bind(&txn.registration_id)
            .bind(txn.refunded_total)
            .bind(txn.is_refundable)
            .bind(txn.updated_at)
            .bind(txn.completed_at)
            .bind(txn.id.to_string())
            .execute(&mut *tx)
            .await?;

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
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

// 数据库记录结构体，用于sqlx
#[derive(sqlx::FromRow)]
struct TransactionRecord {
    id: String,
    reference: String,
    kind: String,
    amount: Decimal,
    amount_minor: i64,
    currency: String,
    subject_kind: String,
    subject_id: String,
    registration_id: Option<String>,
    bill_reference: String,
    description: String,
    mobile_number: Option<String>,
    cnic_last6: Option<String>,
    status: String,
    response_code: Option<String>,
    response_message: Option<String>,
    retrieval_ref_no: Option<String>,
    auth_code: Option<String>,
    request_payload: String,
    response_payload: Option<String>,
    refunded_total: Decimal,
    is_refundable: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<TransactionRecord> for Transaction {
    fn from(record: TransactionRecord) -> Self {
        Self {
            id: Uuid::parse_str(&record.id).unwrap_or_default(),
            reference: record.reference,
            kind: TransactionKind::from_str(&record.kind).unwrap_or(TransactionKind::Wallet),
            amount: record.amount,
            amount_minor: record.amount_minor,
            currency: record.currency,
            subject: Subject {
                kind: SubjectKind::from_str(&record.subject_kind).unwrap_or(SubjectKind::Event),
                id: record.subject_id,
            },
            registration_id: record.registration_id,
            bill_reference: record.bill_reference,
            description: record.description,
            mobile_number: record.mobile_number,
            cnic_last6: record.cnic_last6,
            status: TransactionStatus::from_str(&record.status)
                .unwrap_or(TransactionStatus::Pending),
            response_code: record.response_code,
            response_message: record.response_message,
            retrieval_ref_no: record.retrieval_ref_no,
            auth_code: record.auth_code,
            request_payload: serde_json::from_str(&record.request_payload)
                .unwrap_or(serde_json::Value::Null),
            response_payload: record
                .response_payload
                .and_then(|s| serde_json::from_str(&s).ok()),
            refunded_total: record.refunded_total,
            is_refundable: record.is_refundable,
            created_at: record.created_at,
            updated_at: record.updated_at,
            completed_at: record.completed_at,
        }
    }
}
