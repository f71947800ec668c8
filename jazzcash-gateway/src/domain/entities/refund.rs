use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::enums::RefundStatus;
use crate::protocol::fields::FieldMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub id: Uuid,
    pub transaction_id: Uuid,
    /// 原交易引用号，冗余一份便于查询
    pub reference: String,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub reason: String,
    pub requested_by: Option<String>,
    pub status: RefundStatus,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub request_payload: serde_json::Value,
    pub response_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RefundRecord {
    pub fn new(
        transaction_id: Uuid,
        reference: String,
        amount: Decimal,
        amount_minor: i64,
        reason: String,
        requested_by: Option<String>,
        request_payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            reference,
            amount,
            amount_minor,
            reason,
            requested_by,
            status: RefundStatus::Pending,
            response_code: None,
            response_message: None,
            request_payload,
            response_payload: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn attach_response(&mut self, fields: &FieldMap) {
        // 退款接口返回的是无前缀的驼峰字段
        self.response_code = fields
            .get("responseCode")
            .or_else(|| fields.get("pp_ResponseCode"))
            .map(|v| v.to_string());
        self.response_message = fields
            .get("responseMessage")
            .or_else(|| fields.get("pp_ResponseMessage"))
            .map(|v| v.to_string());
        self.response_payload = Some(fields.to_json());
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, fields: &FieldMap) {
        self.attach_response(fields);
        self.status = RefundStatus::Completed;
        self.completed_at = Some(self.updated_at);
    }

    pub fn mark_failed(&mut self, fields: Option<&FieldMap>, message: &str) {
        if let Some(fields) = fields {
            self.attach_response(fields);
        }
        if self.response_message.is_none() {
            self.response_message = Some(message.to_string());
        }
        self.status = RefundStatus::Failed;
        self.updated_at = Utc::now();
    }
}
