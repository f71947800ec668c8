use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::enums::{SubjectKind, TransactionKind, TransactionStatus};
use crate::protocol::fields::FieldMap;
use crate::utils::error::GatewayError;

/// 支付对应的业务主体（活动报名或场次预约）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: String,
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
    pub subject: Subject,
    pub registration_id: Option<String>,
    pub bill_reference: String,
    pub description: String,
    pub mobile_number: Option<String>,
    pub cnic_last6: Option<String>,
    pub status: TransactionStatus,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub retrieval_ref_no: Option<String>,
    pub auth_code: Option<String>,
    pub request_payload: serde_json::Value,
    pub response_payload: Option<serde_json::Value>,
    pub refunded_total: Decimal,
    pub is_refundable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference: String,
        kind: TransactionKind,
        amount: Decimal,
        amount_minor: i64,
        currency: String,
        subject: Subject,
        registration_id: Option<String>,
        bill_reference: String,
        description: String,
        request_payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference,
            kind,
            amount,
            amount_minor,
            currency,
            subject,
            registration_id,
            bill_reference,
            description,
            mobile_number: None,
            cnic_last6: None,
            status: TransactionStatus::Pending,
            response_code: None,
            response_message: None,
            retrieval_ref_no: None,
            auth_code: None,
            request_payload,
            response_payload: None,
            refunded_total: Decimal::ZERO,
            is_refundable: true,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, TransactionStatus::Pending)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, TransactionStatus::Completed)
    }

    /// 把网关响应字段合并进交易记录，原始报文一并保留
    pub fn attach_gateway_response(&mut self, fields: &FieldMap) {
        if let Some(code) = fields.get("pp_ResponseCode") {
            self.response_code = Some(code.to_string());
        }
        if let Some(message) = fields.get("pp_ResponseMessage") {
            self.response_message = Some(message.to_string());
        }
        // 网关侧的字段名就是这个拼写
        if let Some(rrn) = fields.get("pp_RetreivalReferenceNo") {
            self.retrieval_ref_no = Some(rrn.to_string());
        }
        if let Some(auth) = fields.get("pp_AuthCode") {
            self.auth_code = Some(auth.to_string());
        }
        self.response_payload = Some(fields.to_json());
        self.updated_at = Utc::now();
    }

    /// 状态迁移。重复迁移到当前状态是幂等空操作，返回Ok(false)
    pub fn transition(&mut self, next: TransactionStatus) -> Result<bool, GatewayError> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(GatewayError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        if matches!(next, TransactionStatus::Completed) {
            self.completed_at = Some(self.updated_at);
        }
        Ok(true)
    }

    /// 剩余可退金额
    pub fn available_refund(&self) -> Decimal {
        self.amount - self.refunded_total
    }

    pub fn can_refund(&self, amount: Decimal) -> Result<(), GatewayError> {
        if amount <= Decimal::ZERO {
            return Err(GatewayError::Validation(
                "refund amount must be positive".to_string(),
            ));
        }
        if !self.is_refundable {
            return Err(GatewayError::NotRefundable(
                self.reference.clone(),
                "transaction is flagged non-refundable".to_string(),
            ));
        }
        if !matches!(
            self.status,
            TransactionStatus::Completed | TransactionStatus::PartiallyRefunded
        ) {
            return Err(GatewayError::NotRefundable(
                self.reference.clone(),
                format!("transaction status is {}", self.status),
            ));
        }
        let available = self.available_refund();
        if amount > available {
            return Err(GatewayError::AmountExceedsAvailable {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    /// 记入一笔已确认的退款并推进状态
    pub fn apply_refund(&mut self, amount: Decimal) -> Result<(), GatewayError> {
        self.can_refund(amount)?;
        self.refunded_total += amount;
        let next = if self.refunded_total >= self.amount {
            TransactionStatus::Refunded
        } else {
            TransactionStatus::PartiallyRefunded
        };
        self.transition(next)?;
        Ok(())
    }
}
