use tracing::{info, warn};

use crate::domain::entities::RefundRecord;
use crate::protocol::codes::GATEWAY_OK;
use crate::protocol::fields::FieldMap;
use crate::protocol::signer::{self, SIGNATURE_FIELDS};
use crate::services::payment::dto::{RefundOutcome, RefundRequest};
use crate::services::payment::PaymentService;
use crate::utils::error::GatewayError;
use crate::utils::reference::amount_to_paisa;

/// 退款响应里签名字段的写法不固定，按候选名逐个找
fn received_signature(response: &FieldMap) -> String {
    response
        .iter()
        .find(|(k, _)| SIGNATURE_FIELDS.iter().any(|s| s.eq_ignore_ascii_case(k)))
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

impl PaymentService {
    /// 对已结清交易发起退款，支持部分退款。
    /// 整个流程持有引用号锁，退款记账和交易状态一起推进。
    pub async fn process_refund(
        &self,
        request: RefundRequest,
    ) -> Result<RefundOutcome, GatewayError> {
        let credentials = self.config().credentials()?;
        let _guard = self.locks.acquire(&request.reference).await;

        let mut txn = self
            .transactions
            .find_by_reference(&request.reference)
            .await?
            .ok_or_else(|| {
                GatewayError::not_found(format!("transaction {}", request.reference))
            })?;

        txn.can_refund(request.amount)?;
        let amount_minor = amount_to_paisa(request.amount)?;

        let mut fields = FieldMap::new();
        fields.insert("pp_TxnRefNo", txn.reference.clone());
        fields.insert("pp_Amount", amount_minor.to_string());
        fields.insert("pp_TxnCurrency", txn.currency.clone());
        fields.insert("pp_MerchantID", credentials.merchant_id.clone());
        fields.insert("pp_Password", credentials.password.clone());
        signer::sign_fields(&mut fields, &credentials.integrity_salt, false)?;

        let mut refund = RefundRecord::new(
            txn.id,
            txn.reference.clone(),
            request.amount,
            amount_minor,
            request.reason.clone(),
            request.requested_by.clone(),
            fields.to_json(),
        );
        self.refunds.create(&refund).await?;

        info!(
            "Requesting refund of {} against transaction {} (refund {})",
            request.amount, txn.reference, refund.id
        );

        let response = match self
            .gateway
            .post_fields(&self.config().endpoints().refund_url, &fields)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Refund {} for {} failed in transit: {}",
                    refund.id, txn.reference, e
                );
                refund.mark_failed(None, "gateway unreachable, outcome unknown");
                self.refunds.update(&refund).await?;
                return Err(e.into());
            }
        };

        let received = received_signature(&response);
        if let Err(e) =
            signer::verify_secure_hash(&response, &received, &credentials.integrity_salt, false)
        {
            if matches!(e, GatewayError::SignatureMismatch { .. }) {
                warn!(
                    "Refund response for {} failed signature verification",
                    txn.reference
                );
                refund.mark_failed(Some(&response), "signature verification failed");
                self.refunds.update(&refund).await?;
                return Err(GatewayError::SecurityVerificationFailed(
                    txn.reference.clone(),
                ));
            }
            refund.mark_failed(Some(&response), "could not verify response");
            self.refunds.update(&refund).await?;
            return Err(e);
        }

        let code = response
            .get("responseCode")
            .or_else(|| response.get("pp_ResponseCode"))
            .unwrap_or_default()
            .to_string();
        let message = response
            .get("responseMessage")
            .or_else(|| response.get("pp_ResponseMessage"))
            .unwrap_or_default()
            .to_string();

        if code == GATEWAY_OK {
            refund.mark_completed(&response);
            txn.apply_refund(request.amount)?;
            // 交易和退款记录经update_with_refund一次落库
            self.transactions.update_with_refund(&txn, &refund).await?;
            info!(
                "Refund {} confirmed, transaction {} now {}",
                refund.id, txn.reference, txn.status
            );
        } else {
            refund.mark_failed(Some(&response), &message);
            self.refunds.update(&refund).await?;
            warn!(
                "Refund {} for {} declined with code {}",
                refund.id, txn.reference, code
            );
        }

        Ok(RefundOutcome {
            refund_id: refund.id,
            reference: txn.reference.clone(),
            amount: request.amount,
            refund_status: refund.status,
            transaction_status: txn.status,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enums::{RefundStatus, TransactionStatus};
    use crate::services::payment::dto::WalletPaymentRequest;
    use crate::services::payment::test_support::{harness, sample_subject, signed_response, Harness};
    use crate::utils::http_client::TransportError;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// 先完成一笔1500的钱包支付，作为退款对象
    async fn completed_transaction(h: &Harness) -> String {
        let request = WalletPaymentRequest {
            subject: sample_subject(),
            amount: dec!(1500.00),
            mobile_number: "03001234567".to_string(),
            cnic_last6: "123456".to_string(),
            description: None,
            registration_id: None,
        };
        let outcome = h.service.initiate_wallet_payment(request).await.unwrap();
        assert!(outcome.success);
        outcome.reference
    }

    fn refund_request(reference: &str, amount: Decimal) -> RefundRequest {
        RefundRequest {
            reference: reference.to_string(),
            amount,
            reason: "customer request".to_string(),
            requested_by: Some("ops@example.com".to_string()),
        }
    }

    fn scripted_gateway(
        url: &str,
        fields: &FieldMap,
    ) -> Result<FieldMap, TransportError> {
        if url.contains("Refund") {
            // 退款接口回的是无前缀驼峰字段
            Ok(signed_response(&[
                ("responseCode", "000"),
                ("responseMessage", "refund processed"),
            ]))
        } else {
            let reference = fields.get_or_default("pp_TxnRefNo").to_string();
            Ok(signed_response(&[
                ("pp_TxnRefNo", &reference),
                ("pp_ResponseCode", "000"),
                ("pp_ResponseMessage", "Success"),
            ]))
        }
    }

    #[tokio::test]
    async fn test_partial_then_full_refund() {
        let h = harness(scripted_gateway);
        let reference = completed_transaction(&h).await;

        let first = h
            .service
            .process_refund(refund_request(&reference, dec!(500.00)))
            .await
            .unwrap();
        assert_eq!(first.refund_status, RefundStatus::Completed);
        assert_eq!(first.transaction_status, TransactionStatus::PartiallyRefunded);

        let second = h
            .service
            .process_refund(refund_request(&reference, dec!(1000.00)))
            .await
            .unwrap();
        assert_eq!(second.transaction_status, TransactionStatus::Refunded);

        let over = h
            .service
            .process_refund(refund_request(&reference, dec!(1.00)))
            .await
            .unwrap_err();
        assert!(matches!(over, GatewayError::NotRefundable(_, _)));

        // 成功退款的记录状态随交易一并持久化
        let refunds = h.refunds.all();
        assert_eq!(refunds.len(), 2);
        assert!(refunds.iter().all(|r| r.status == RefundStatus::Completed));
        assert!(refunds.iter().all(|r| r.completed_at.is_some()));
    }

    #[tokio::test]
    async fn test_refund_over_available_is_rejected_before_gateway() {
        let h = harness(|url, fields| {
            if url.contains("Refund") {
                panic!("over-available refund must not reach the gateway");
            }
            scripted_gateway(url, fields)
        });
        let reference = completed_transaction(&h).await;

        let err = h
            .service
            .process_refund(refund_request(&reference, dec!(1500.01)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AmountExceedsAvailable { .. }));
        assert!(h.refunds.all().is_empty());
    }

    #[tokio::test]
    async fn test_refund_of_pending_transaction_is_rejected() {
        let h = harness(|_, _| Err(TransportError::Timeout));
        let request = WalletPaymentRequest {
            subject: sample_subject(),
            amount: dec!(1500.00),
            mobile_number: "03001234567".to_string(),
            cnic_last6: "123456".to_string(),
            description: None,
            registration_id: None,
        };
        h.service.initiate_wallet_payment(request).await.unwrap_err();
        let reference = h.transactions.all()[0].reference.clone();

        let err = h
            .service
            .process_refund(refund_request(&reference, dec!(100.00)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotRefundable(_, _)));
    }

    #[tokio::test]
    async fn test_declined_refund_keeps_transaction_state() {
        let h = harness(|url, fields| {
            if url.contains("Refund") {
                Ok(signed_response(&[
                    ("responseCode", "199"),
                    ("responseMessage", "refund window expired"),
                ]))
            } else {
                scripted_gateway(url, fields)
            }
        });
        let reference = completed_transaction(&h).await;

        let outcome = h
            .service
            .process_refund(refund_request(&reference, dec!(500.00)))
            .await
            .unwrap();
        assert_eq!(outcome.refund_status, RefundStatus::Failed);
        assert_eq!(outcome.transaction_status, TransactionStatus::Completed);

        let stored = h.transactions.all();
        assert_eq!(stored[0].refunded_total, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_refund_transport_failure_marks_refund_failed() {
        let h = harness(|url, fields| {
            if url.contains("Refund") {
                Err(TransportError::Timeout)
            } else {
                scripted_gateway(url, fields)
            }
        });
        let reference = completed_transaction(&h).await;

        let err = h
            .service
            .process_refund(refund_request(&reference, dec!(500.00)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TransientNetwork(_)));

        let refunds = h.refunds.all();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].status, RefundStatus::Failed);
        assert_eq!(
            h.transactions.all()[0].status,
            TransactionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_tampered_refund_response_is_rejected() {
        let h = harness(|url, fields| {
            if url.contains("Refund") {
                let mut response = signed_response(&[
                    ("responseCode", "000"),
                    ("responseMessage", "refund processed"),
                ]);
                response.insert("responseMessage", "tampered");
                Ok(response)
            } else {
                scripted_gateway(url, fields)
            }
        });
        let reference = completed_transaction(&h).await;

        let err = h
            .service
            .process_refund(refund_request(&reference, dec!(500.00)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::SecurityVerificationFailed(_)));

        let refunds = h.refunds.all();
        assert_eq!(refunds[0].status, RefundStatus::Failed);
        assert_eq!(
            h.transactions.all()[0].status,
            TransactionStatus::Completed
        );
    }
}
