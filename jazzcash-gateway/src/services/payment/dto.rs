use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::Subject;
use crate::domain::enums::{RefundStatus, TransactionStatus};
use crate::protocol::fields::FieldMap;

#[derive(Debug, Clone)]
pub struct WalletPaymentRequest {
    pub subject: Subject,
    pub amount: Decimal,
    pub mobile_number: String,
    pub cnic_last6: String,
    pub description: Option<String>,
    pub registration_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CardPaymentRequest {
    pub subject: Subject,
    pub amount: Decimal,
    pub description: Option<String>,
    pub registration_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletPaymentOutcome {
    pub reference: String,
    pub success: bool,
    pub status: TransactionStatus,
    pub response_code: Option<String>,
    pub message: String,
}

/// 卡支付不直接走接口，而是给前端一个可提交的表单描述
#[derive(Debug, Clone, Serialize)]
pub struct CardFormDescriptor {
    pub reference: String,
    pub action: String,
    pub method: String,
    pub fields: FieldMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnCallbackOutcome {
    pub reference: String,
    pub success: bool,
    pub status: TransactionStatus,
    pub message: String,
}

/// IPN应答。body永远是带签名的三字段应答报文。
#[derive(Debug, Clone)]
pub struct IpnAck {
    pub accepted: bool,
    pub body: FieldMap,
}

#[derive(Debug, Clone)]
pub struct InquiryRequest {
    pub reference: String,
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InquiryOutcome {
    pub reference: String,
    pub success: bool,
    pub status: TransactionStatus,
    pub payment_status: Option<String>,
    pub message: String,
    pub response: FieldMap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub reference: String,
    pub amount: Decimal,
    pub reason: String,
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub refund_id: Uuid,
    pub reference: String,
    pub amount: Decimal,
    pub refund_status: RefundStatus,
    pub transaction_status: TransactionStatus,
    pub message: String,
}
