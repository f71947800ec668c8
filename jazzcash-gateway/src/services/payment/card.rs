use tracing::{info, warn};

use crate::domain::entities::Transaction;
use crate::domain::enums::TransactionKind;
use crate::protocol::codes;
use crate::protocol::fields::FieldMap;
use crate::protocol::signer;
use crate::services::payment::dto::{
    CardFormDescriptor, CardPaymentRequest, ReturnCallbackOutcome,
};
use crate::services::payment::PaymentService;
use crate::utils::error::GatewayError;
use crate::utils::reference::{amount_to_paisa, bill_reference, expiry_datetime, generate_reference};

const REFERENCE_ATTEMPTS: usize = 3;

impl PaymentService {
    /// 准备卡支付。不直接调接口，返回一份签好名的表单描述，
    /// 由前端POST到网关页面，结果经浏览器回跳和IPN送回。
    pub async fn prepare_card_form(
        &self,
        request: CardPaymentRequest,
    ) -> Result<CardFormDescriptor, GatewayError> {
        let credentials = self.config().credentials()?;
        let amount_minor = amount_to_paisa(request.amount)?;
        let description: String = request
            .description
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "Payment for {} {}",
                    request.subject.kind, request.subject.id
                )
            })
            .chars()
            .take(200)
            .collect();

        for attempt in 1..=REFERENCE_ATTEMPTS {
            let reference = generate_reference();
            let bill_ref = bill_reference(&request.subject);

            let mut fields = self.base_fields(&credentials);
            fields.insert("pp_Version", "1.1");
            fields.insert("pp_TxnType", TransactionKind::Card.wire_code());
            fields.insert("pp_SubMerchantID", "");
            fields.insert("pp_TxnRefNo", reference.clone());
            fields.insert("pp_Amount", amount_minor.to_string());
            fields.insert("pp_BillReference", bill_ref.clone());
            fields.insert("pp_Description", description.clone());
            fields.insert(
                "pp_TxnExpiryDateTime",
                expiry_datetime(self.config().card_expiry_hours),
            );
            fields.insert("pp_ReturnURL", self.config().return_url.clone());
            fields.insert("pp_BankID", "");
            fields.insert("pp_ProductID", "");
            for extra in ["ppmpf_1", "ppmpf_2", "ppmpf_3", "ppmpf_4", "ppmpf_5"] {
                fields.insert(extra, "");
            }
            signer::sign_fields(&mut fields, &credentials.integrity_salt, false)?;

            let txn = Transaction::new(
                reference.clone(),
                TransactionKind::Card,
                request.amount,
                amount_minor,
                self.config().currency.clone(),
                request.subject.clone(),
                request.registration_id.clone(),
                bill_ref,
                description.clone(),
                fields.to_json(),
            );

            match self.transactions.create(&txn).await {
                Ok(()) => {
                    info!(
                        "Prepared card payment form {} for {}",
                        reference, txn.subject
                    );
                    return Ok(CardFormDescriptor {
                        reference,
                        action: self.config().endpoints().card_url.clone(),
                        method: "POST".to_string(),
                        fields,
                    });
                }
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

    /// 处理卡支付完成后的浏览器回跳表单。
    /// 回跳只作展示依据，权威结果仍以IPN和对账为准。
    pub async fn handle_return_callback(
        &self,
        response: FieldMap,
    ) -> Result<ReturnCallbackOutcome, GatewayError> {
        let credentials = self.config().credentials()?;
        let reference = response.get_or_default("pp_TxnRefNo").to_string();
        if reference.is_empty() {
            return Err(GatewayError::validation(
                "return callback is missing pp_TxnRefNo",
            ));
        }

        if self
            .transactions
            .find_by_reference(&reference)
            .await?
            .is_none()
        {
            warn!("Return callback for unknown reference {}", reference);
            return Err(GatewayError::not_found(format!("transaction {}", reference)));
        }

        self.ensure_verified(&reference, &response, &credentials.integrity_salt)
            .await?;

        let code = response.get_or_default("pp_ResponseCode").to_string();
        let message = response.get_or_default("pp_ResponseMessage").to_string();
        let outcome = codes::classify(&code);
        let txn = self
            .apply_gateway_outcome(&reference, &response, outcome)
            .await?;

        Ok(ReturnCallbackOutcome {
            reference,
            success: txn.is_completed(),
            status: txn.status,
            message,
        })
    }
}
