use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 对账查询的审计记录。每次发起查询都会落一条，网络失败也不例外。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInquiryRecord {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub reference: String,
    pub requested_by: Option<String>,
    pub request_payload: serde_json::Value,
    pub response_payload: Option<serde_json::Value>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub payment_response_code: Option<String>,
    pub payment_response_message: Option<String>,
    pub payment_status: Option<String>,
    pub verified: bool,
    pub success: bool,
    pub inquired_at: DateTime<Utc>,
}

impl StatusInquiryRecord {
    pub fn new(
        transaction_id: Uuid,
        reference: String,
        requested_by: Option<String>,
        request_payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            reference,
            requested_by,
            request_payload,
            response_payload: None,
            response_code: None,
            response_message: None,
            payment_response_code: None,
            payment_response_message: None,
            payment_status: None,
            verified: false,
            success: false,
            inquired_at: Utc::now(),
        }
    }
}
