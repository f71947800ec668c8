use tracing::{info, warn};

use crate::domain::entities::Transaction;
use crate::domain::enums::TransactionKind;
use crate::protocol::codes::{self, ResponseOutcome};
use crate::protocol::fields::FieldMap;
use crate::protocol::signer;
use crate::services::payment::dto::{WalletPaymentOutcome, WalletPaymentRequest};
use crate::services::payment::PaymentService;
use crate::utils::error::GatewayError;
use crate::utils::reference::{
    amount_to_paisa, bill_reference, expiry_datetime, generate_reference, normalize_cnic_suffix,
    normalize_mobile_number,
};

/// 引用号基于秒级时间戳加两位随机数，撞库时换号重试的上限
const REFERENCE_ATTEMPTS: usize = 3;

impl PaymentService {
    /// 发起钱包直扣支付。同步得到结果：成功、拒绝，或者
    /// 网络/未知码导致的悬而未决（交易保持pending等对账）。
    pub async fn initiate_wallet_payment(
        &self,
        request: WalletPaymentRequest,
    ) -> Result<WalletPaymentOutcome, GatewayError> {
        let credentials = self.config().credentials()?;
        let amount_minor = amount_to_paisa(request.amount)?;
        let mobile = normalize_mobile_number(&request.mobile_number)?;
        let cnic = normalize_cnic_suffix(&request.cnic_last6)?;
        let description = resolve_description(&request.description, &request);

        // 先落库再请求：网关见过的引用号必须已经存在于本地
        let (txn, fields) = self
            .persist_new_wallet_transaction(
                &request,
                &credentials,
                amount_minor,
                &mobile,
                &cnic,
                &description,
            )
            .await?;

        info!(
            "Initiating wallet payment {} for {} ({} paisa)",
            txn.reference, txn.subject, amount_minor
        );

        let response = match self
            .gateway
            .post_fields(&self.config().endpoints().wallet_url, &fields)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Wallet request {} failed in transit, transaction stays pending: {}",
                    txn.reference, e
                );
                return Err(e.into());
            }
        };

        self.ensure_verified(&txn.reference, &response, &credentials.integrity_salt)
            .await?;

        let code = response.get_or_default("pp_ResponseCode").to_string();
        let message = response.get_or_default("pp_ResponseMessage").to_string();

        match codes::classify(&code) {
            ResponseOutcome::Settled => {
                let txn = self
                    .apply_gateway_outcome(&txn.reference, &response, ResponseOutcome::Settled)
                    .await?;
                Ok(WalletPaymentOutcome {
                    reference: txn.reference,
                    success: true,
                    status: txn.status,
                    response_code: Some(code),
                    message,
                })
            }
            ResponseOutcome::Declined => {
                let txn = self
                    .apply_gateway_outcome(&txn.reference, &response, ResponseOutcome::Declined)
                    .await?;
                Ok(WalletPaymentOutcome {
                    reference: txn.reference,
                    success: false,
                    status: txn.status,
                    response_code: Some(code),
                    message,
                })
            }
            ResponseOutcome::Indeterminate => {
                self.apply_gateway_outcome(
                    &txn.reference,
                    &response,
                    ResponseOutcome::Indeterminate,
                )
                .await?;
                Err(GatewayError::IndeterminateResponse {
                    reference: txn.reference,
                    code,
                })
            }
        }
    }

    async fn persist_new_wallet_transaction(
        &self,
        request: &WalletPaymentRequest,
        credentials: &crate::config::GatewayCredentials,
        amount_minor: i64,
        mobile: &str,
        cnic: &str,
        description: &str,
    ) -> Result<(Transaction, FieldMap), GatewayError> {
        for attempt in 1..=REFERENCE_ATTEMPTS {
            let reference = generate_reference();
            let bill_ref = bill_reference(&request.subject);

            let mut fields = self.base_fields(credentials);
            fields.insert("pp_Amount", amount_minor.to_string());
            fields.insert("pp_BillReference", bill_ref.clone());
            fields.insert("pp_CNIC", cnic);
            fields.insert("pp_Description", description);
            fields.insert("pp_MobileNumber", mobile);
            fields.insert(
                "pp_TxnExpiryDateTime",
                expiry_datetime(self.config().wallet_expiry_hours),
            );
            fields.insert("pp_TxnRefNo", reference.clone());
            for extra in ["ppmpf_1", "ppmpf_2", "ppmpf_3", "ppmpf_4", "ppmpf_5"] {
                fields.insert(extra, "");
            }
            signer::sign_fields(&mut fields, &credentials.integrity_salt, false)?;

            let mut txn = Transaction::new(
                reference,
                TransactionKind::Wallet,
                request.amount,
                amount_minor,
                self.config().currency.clone(),
                request.subject.clone(),
                request.registration_id.clone(),
                bill_ref,
                description.to_string(),
                fields.to_json(),
            );
            txn.mobile_number = Some(mobile.to_string());
            txn.cnic_last6 = Some(cnic.to_string());

            match self.transactions.create(&txn).await {
                Ok(()) => return Ok((txn, fields)),
                Err(GatewayError::DuplicateReference(reference))
                    if attempt < REFERENCE_ATTEMPTS =>
                {
                    warn!(
                        "Reference {} already taken, retrying ({}/{})",
                        reference, attempt, REFERENCE_ATTEMPTS
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(GatewayError::Internal(anyhow::anyhow!(
            "could not allocate a unique transaction reference"
        )))
    }
}

fn resolve_description(description: &Option<String>, request: &WalletPaymentRequest) -> String {
    let text = description.clone().unwrap_or_else(|| {
        format!(
            "Payment for {} {}",
            request.subject.kind, request.subject.id
        )
    });
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enums::TransactionStatus;
    use crate::services::payment::test_support::{harness, sample_subject, signed_response};
    use rust_decimal_macros::dec;

    fn wallet_request() -> WalletPaymentRequest {
        WalletPaymentRequest {
            subject: sample_subject(),
            amount: dec!(1500.00),
            mobile_number: "03001234567".to_string(),
            cnic_last6: "123456".to_string(),
            description: None,
            registration_id: None,
        }
    }

    #[tokio::test]
    async fn test_invalid_mobile_never_reaches_gateway() {
        let h = harness(|_, _| panic!("gateway must not be called"));
        let mut request = wallet_request();
        request.mobile_number = "12345".to_string();

        let err = h.service.initiate_wallet_payment(request).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(h.transactions.all().is_empty());
    }

    #[tokio::test]
    async fn test_wallet_request_carries_signed_protocol_fields() {
        let h = harness(|_, fields| {
            let reference = fields.get_or_default("pp_TxnRefNo").to_string();
            Ok(signed_response(&[
                ("pp_ResponseCode", "000"),
                ("pp_ResponseMessage", "Success"),
                ("pp_TxnRefNo", &reference),
            ]))
        });

        let outcome = h
            .service
            .initiate_wallet_payment(wallet_request())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.status, TransactionStatus::Completed);

        let requests = h.transport.requests.lock().unwrap();
        let (url, fields) = &requests[0];
        assert!(url.contains("domwallettransaction"));
        assert_eq!(fields.get_or_default("pp_Amount"), "150000");
        assert_eq!(fields.get_or_default("pp_MobileNumber"), "03001234567");
        assert_eq!(fields.get_or_default("pp_CNIC"), "123456");
        assert_eq!(fields.get_or_default("pp_TxnCurrency"), "PKR");
        assert!(!fields.get_or_default("pp_SecureHash").is_empty());
        assert_eq!(fields.get_or_default("pp_TxnExpiryDateTime").len(), 14);
    }

    #[tokio::test]
    async fn test_declined_wallet_payment_is_not_an_error() {
        let h = harness(|_, fields| {
            let reference = fields.get_or_default("pp_TxnRefNo").to_string();
            Ok(signed_response(&[
                ("pp_ResponseCode", "199"),
                ("pp_ResponseMessage", "Insufficient balance"),
                ("pp_TxnRefNo", &reference),
            ]))
        });

        let outcome = h
            .service
            .initiate_wallet_payment(wallet_request())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.status, TransactionStatus::Failed);
        assert!(h.notifier.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_code_leaves_transaction_pending() {
        let h = harness(|_, fields| {
            let reference = fields.get_or_default("pp_TxnRefNo").to_string();
            Ok(signed_response(&[
                ("pp_ResponseCode", "124"),
                ("pp_ResponseMessage", "Pending approval"),
                ("pp_TxnRefNo", &reference),
            ]))
        });

        let err = h
            .service
            .initiate_wallet_payment(wallet_request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::IndeterminateResponse { .. }));

        let stored = h.transactions.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, TransactionStatus::Pending);
    }
}
