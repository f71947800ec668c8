use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::domain::entities::CallbackLog;
use crate::protocol::codes::{self, GATEWAY_OK};
use crate::protocol::fields::FieldMap;
use crate::protocol::signer::{self, SIGNATURE_FIELDS};
use crate::services::payment::dto::IpnAck;
use crate::services::payment::PaymentService;

const ACK_FAILURE_CODE: &str = "999";

impl PaymentService {
    /// 处理网关服务器间IPN投递。
    ///
    /// 这个入口绝不向上抛错：无论报文多离谱，都先落一条审计日志，
    /// 再回一份签名应答。验签失败或对不上交易时回失败应答，
    /// 让网关按自己的节奏重投。
    pub async fn process_ipn(&self, raw: &Value) -> IpnAck {
        let fields = FieldMap::from_json(raw);
        let reference = fields.get_or_default("pp_TxnRefNo").to_string();
        let response_code = fields.get_or_default("pp_ResponseCode").to_string();
        let response_message = fields.get("pp_ResponseMessage").map(|v| v.to_string());
        let declared_kind = fields.get("pp_TxnType").map(|v| v.to_string());
        let received_hash = fields.get("pp_SecureHash").map(|v| v.to_string());

        let salt = match self.config().credentials() {
            Ok(credentials) => Some(credentials.integrity_salt),
            Err(_) => {
                error!("IPN received but gateway credentials are not configured");
                None
            }
        };

        // 重算哈希留档，verified由比较结果决定；凭证缺失时只留档不验
        let computed_hash = salt.as_deref().and_then(|salt| {
            let stripped = fields.without(&SIGNATURE_FIELDS);
            signer::secure_hash(&stripped, salt, false).ok()
        });
        let verified = match (&received_hash, &computed_hash) {
            (Some(received), Some(computed)) => received.eq_ignore_ascii_case(computed),
            _ => false,
        };

        let transaction = match self.transactions.find_by_reference(&reference).await {
            Ok(found) => found,
            Err(e) => {
                error!("Could not resolve IPN transaction {}: {}", reference, e);
                None
            }
        };

        let retry_count = self
            .callback_logs
            .count_matching(&reference, &response_code)
            .await
            .unwrap_or_else(|e| {
                error!("Could not count prior IPN deliveries: {}", e);
                0
            });

        let log = CallbackLog::new(
            transaction.as_ref().map(|txn| txn.id),
            reference.clone(),
            declared_kind,
            response_code.clone(),
            response_message,
            fields.to_json(),
            received_hash,
            computed_hash,
            verified,
            retry_count,
        );
        if let Err(e) = self.callback_logs.append(&log).await {
            error!("Could not persist IPN log for {}: {}", reference, e);
            return self.ipn_ack(false, "Processing error");
        }

        if salt.is_none() {
            // 自身配置缺失不能归咎于报文，交易状态不动
            return self.ipn_ack(false, "Service not configured");
        }

        if !verified {
            warn!(
                reference = %reference,
                retry_count = retry_count,
                "IPN failed signature verification"
            );
            if transaction.is_some() {
                // 签名不过的报文按失败收尾，响应码不作数
                let _ = self.fail_unverified(&reference, &fields).await;
            }
            return self.ipn_ack(false, "Signature verification failed");
        }

        let Some(txn) = transaction else {
            warn!("Verified IPN for unknown reference {}", reference);
            return self.ipn_ack(false, "Unknown transaction reference");
        };

        let outcome = codes::classify(&response_code);
        match self
            .apply_gateway_outcome(&txn.reference, &fields, outcome)
            .await
        {
            Ok(txn) => {
                if let Err(e) = self.callback_logs.mark_processed(log.id, Utc::now()).await {
                    error!("Could not mark IPN log processed: {}", e);
                }
                info!(
                    "IPN for {} processed, transaction status {} (delivery {})",
                    reference,
                    txn.status,
                    retry_count + 1
                );
                self.ipn_ack(true, "Success")
            }
            Err(e) => {
                error!("Could not apply IPN outcome for {}: {}", reference, e);
                self.ipn_ack(false, "Processing error")
            }
        }
    }

    /// 组装签名应答。凭证缺失时退化为未签名应答。
    fn ipn_ack(&self, accepted: bool, message: &str) -> IpnAck {
        let mut body = FieldMap::new();
        body.insert(
            "pp_ResponseCode",
            if accepted { GATEWAY_OK } else { ACK_FAILURE_CODE },
        );
        body.insert("pp_ResponseMessage", message);
        if let Ok(credentials) = self.config().credentials() {
            if let Err(e) = signer::sign_fields(&mut body, &credentials.integrity_salt, false) {
                error!("Could not sign IPN acknowledgement: {}", e);
            }
        }
        IpnAck { accepted, body }
    }
}
