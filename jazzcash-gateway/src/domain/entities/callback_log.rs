use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// IPN投递的审计日志。无论能否对上交易，每次投递都会落一条。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackLog {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub reference: String,
    pub declared_kind: Option<String>,
    pub response_code: String,
    pub response_message: Option<String>,
    pub payload: serde_json::Value,
    pub received_hash: Option<String>,
    pub computed_hash: Option<String>,
    pub verified: bool,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub received_at: DateTime<Utc>,
}

impl CallbackLog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transaction_id: Option<Uuid>,
        reference: String,
        declared_kind: Option<String>,
        response_code: String,
        response_message: Option<String>,
        payload: serde_json::Value,
        received_hash: Option<String>,
        computed_hash: Option<String>,
        verified: bool,
        retry_count: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            reference,
            declared_kind,
            response_code,
            response_message,
            payload,
            received_hash,
            computed_hash,
            verified,
            processed: false,
            processed_at: None,
            retry_count,
            received_at: Utc::now(),
        }
    }
}
