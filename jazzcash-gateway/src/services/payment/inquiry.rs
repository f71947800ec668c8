use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::domain::entities::StatusInquiryRecord;
use crate::protocol::codes::{self, GATEWAY_OK};
use crate::protocol::fields::FieldMap;
use crate::protocol::signer;
use crate::services::payment::dto::{InquiryOutcome, InquiryRequest};
use crate::services::payment::PaymentService;
use crate::utils::error::GatewayError;

impl PaymentService {
    /// 对账查询。网关落单有延迟，pending交易要过了冷却期才允许查，
    /// 查询结果里只有121加completed才会把交易结清。
    pub async fn inquire_status(
        &self,
        request: InquiryRequest,
    ) -> Result<InquiryOutcome, GatewayError> {
        let credentials = self.config().credentials()?;

        let txn = self
            .transactions
            .find_by_reference(&request.reference)
            .await?
            .ok_or_else(|| {
                GatewayError::not_found(format!("transaction {}", request.reference))
            })?;

        if txn.is_pending() {
            let age = Utc::now() - txn.created_at;
            let dwell = Duration::minutes(self.config().inquiry_dwell_minutes);
            if age < dwell {
                return Err(GatewayError::Validation(format!(
                    "transaction {} is too recent to inquire, retry after {} minutes",
                    txn.reference,
                    self.config().inquiry_dwell_minutes
                )));
            }
        }

        let mut fields = FieldMap::new();
        fields.insert("pp_TxnRefNo", txn.reference.clone());
        fields.insert("pp_MerchantID", credentials.merchant_id.clone());
        fields.insert("pp_Password", credentials.password.clone());
        signer::sign_fields(&mut fields, &credentials.integrity_salt, false)?;

        let mut record = StatusInquiryRecord::new(
            txn.id,
            txn.reference.clone(),
            request.requested_by.clone(),
            fields.to_json(),
        );

        info!("Inquiring status of transaction {}", txn.reference);

        let response = match self
            .gateway
            .post_fields(&self.config().endpoints().inquiry_url, &fields)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Status inquiry for {} failed in transit: {}", txn.reference, e);
                self.inquiries.append(&record).await?;
                return Err(e.into());
            }
        };

        record.response_payload = Some(response.to_json());
        record.response_code = response.get("pp_ResponseCode").map(|v| v.to_string());
        record.response_message = response.get("pp_ResponseMessage").map(|v| v.to_string());
        record.payment_response_code = response
            .get("pp_PaymentResponseCode")
            .map(|v| v.to_string());
        record.payment_response_message = response
            .get("pp_PaymentResponseMessage")
            .map(|v| v.to_string());
        record.payment_status = response.get("pp_Status").map(|v| v.to_string());

        let received = response.get_or_default("pp_SecureHash").to_string();
        if let Err(e) =
            signer::verify_secure_hash(&response, &received, &credentials.integrity_salt, false)
        {
            if matches!(e, GatewayError::SignatureMismatch { .. }) {
                warn!(
                    "Status inquiry response for {} failed signature verification",
                    txn.reference
                );
                self.inquiries.append(&record).await?;
                return Err(self.fail_unverified(&txn.reference, &response).await);
            }
            self.inquiries.append(&record).await?;
            return Err(e);
        }
        record.verified = true;

        let inquiry_code = record.response_code.clone().unwrap_or_default();
        record.success = inquiry_code == GATEWAY_OK;

        let message = record
            .payment_response_message
            .clone()
            .or_else(|| record.response_message.clone())
            .unwrap_or_default();
        let payment_status = record.payment_status.clone();

        // 审计记录先落地，后面的结算写库失败也不能丢查询留痕
        self.inquiries.append(&record).await?;

        // 查询接口本身失败时不动交易状态
        let txn = if record.success {
            let outcome = codes::inquiry_outcome(
                record.payment_response_code.as_deref().unwrap_or_default(),
                payment_status.as_deref().unwrap_or_default(),
            );
            self.apply_gateway_outcome(&txn.reference, &response, outcome)
                .await?
        } else {
            warn!(
                "Status inquiry for {} returned code {}",
                txn.reference, inquiry_code
            );
            txn
        };

        Ok(InquiryOutcome {
            reference: txn.reference.clone(),
            success: record.success,
            status: txn.status,
            payment_status,
            message,
            response,
        })
    }
}
