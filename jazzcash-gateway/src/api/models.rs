use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entities::Transaction;
use crate::domain::enums::{SubjectKind, TransactionKind, TransactionStatus};

// 发起钱包支付的请求体
#[derive(Debug, Clone, Deserialize)]
pub struct WalletPaymentPayload {
    pub subject_kind: SubjectKind,
    pub subject_id: String,
    pub amount: Decimal,
    pub mobile_number: String,
    pub cnic_last6: String,
    pub description: Option<String>,
    pub registration_id: Option<String>,
}

// 准备卡支付表单的请求体
#[derive(Debug, Clone, Deserialize)]
pub struct CardPaymentPayload {
    pub subject_kind: SubjectKind,
    pub subject_id: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub registration_id: Option<String>,
}

// 对账查询的请求体，整体可省略
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InquiryPayload {
    pub requested_by: Option<String>,
}

// 交易详情响应
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub reference: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: String,
    pub subject_kind: SubjectKind,
    pub subject_id: String,
    pub registration_id: Option<String>,
    pub bill_reference: String,
    pub description: String,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub retrieval_ref_no: Option<String>,
    pub refunded_total: Decimal,
    pub available_refund: Decimal,
    pub is_refundable: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionResponse {
    fn from(txn: Transaction) -> Self {
        let available_refund = txn.available_refund();
        Self {
            reference: txn.reference,
            kind: txn.kind,
            status: txn.status,
            amount: txn.amount,
            currency: txn.currency,
            subject_kind: txn.subject.kind,
            subject_id: txn.subject.id,
            registration_id: txn.registration_id,
            bill_reference: txn.bill_reference,
            description: txn.description,
            response_code: txn.response_code,
            response_message: txn.response_message,
            retrieval_ref_no: txn.retrieval_ref_no,
            refunded_total: txn.refunded_total,
            available_refund,
            is_refundable: txn.is_refundable,
            created_at: txn.created_at,
            completed_at: txn.completed_at,
        }
    }
}
