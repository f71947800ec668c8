pub mod dto;

mod card;
mod inquiry;
mod ipn;
mod refund;
mod wallet;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{GatewayCredentials, JazzCashConfig};
use crate::domain::entities::Transaction;
use crate::domain::enums::TransactionStatus;
use crate::protocol::codes::ResponseOutcome;
use crate::protocol::fields::FieldMap;
use crate::protocol::signer;
use crate::repositories::{
    CallbackLogRepositoryTrait, RefundRepositoryTrait, StatusInquiryRepositoryTrait,
    TransactionRepositoryTrait,
};
use crate::services::locks::ReferenceLocks;
use crate::services::registration::RegistrationNotifier;
use crate::utils::error::GatewayError;
use crate::utils::http_client::GatewayTransport;
use crate::utils::reference::gateway_datetime_now;

/// 支付核心服务。发起、回调、对账、退款都经由这里，
/// 同一笔交易的状态变更统一走引用号锁。
pub struct PaymentService {
    config: JazzCashConfig,
    transactions: Arc<dyn TransactionRepositoryTrait>,
    refunds: Arc<dyn RefundRepositoryTrait>,
    callback_logs: Arc<dyn CallbackLogRepositoryTrait>,
    inquiries: Arc<dyn StatusInquiryRepositoryTrait>,
    gateway: Arc<dyn GatewayTransport>,
    registrations: Arc<dyn RegistrationNotifier>,
    locks: ReferenceLocks,
}

impl PaymentService {
    pub fn new(
        config: JazzCashConfig,
        transactions: Arc<dyn TransactionRepositoryTrait>,
        refunds: Arc<dyn RefundRepositoryTrait>,
        callback_logs: Arc<dyn CallbackLogRepositoryTrait>,
        inquiries: Arc<dyn StatusInquiryRepositoryTrait>,
        gateway: Arc<dyn GatewayTransport>,
        registrations: Arc<dyn RegistrationNotifier>,
    ) -> Self {
        Self {
            config,
            transactions,
            refunds,
            callback_logs,
            inquiries,
            gateway,
            registrations,
            locks: ReferenceLocks::new(),
        }
    }

    pub(crate) fn config(&self) -> &JazzCashConfig {
        &self.config
    }

    /// 所有出站请求共有的商户字段
    pub(crate) fn base_fields(&self, credentials: &GatewayCredentials) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("pp_Language", self.config.language.clone());
        fields.insert("pp_MerchantID", credentials.merchant_id.clone());
        fields.insert("pp_Password", credentials.password.clone());
        fields.insert("pp_TxnCurrency", self.config.currency.clone());
        fields.insert("pp_TxnDateTime", gateway_datetime_now());
        fields
    }

    /// 校验网关响应签名；失败时将pending交易置为失败并留存原始报文
    pub(crate) async fn ensure_verified(
        &self,
        reference: &str,
        response: &FieldMap,
        integrity_salt: &str,
    ) -> Result<(), GatewayError> {
        let received = response.get_or_default("pp_SecureHash").to_string();
        match signer::verify_secure_hash(response, &received, integrity_salt, false) {
            Ok(()) => Ok(()),
            Err(GatewayError::SignatureMismatch { expected, received }) => {
                warn!(
                    reference = %reference,
                    expected = %expected,
                    received = %received,
                    "Gateway response failed signature verification"
                );
                Err(self.fail_unverified(reference, response).await)
            }
            Err(e) => Err(e),
        }
    }

    /// 签名校验失败的收尾：交易置为失败，响应码再好看也不作数
    pub(crate) async fn fail_unverified(
        &self,
        reference: &str,
        response: &FieldMap,
    ) -> GatewayError {
        let _guard = self.locks.acquire(reference).await;
        match self.transactions.find_by_reference(reference).await {
            Ok(Some(mut txn)) => {
                txn.attach_gateway_response(response);
                if txn.is_pending() {
                    if let Err(e) = txn.transition(TransactionStatus::Failed) {
                        error!("Could not fail transaction {}: {}", reference, e);
                    }
                }
                if let Err(e) = self.transactions.update(&txn).await {
                    error!("Could not persist failed transaction {}: {}", reference, e);
                }
            }
            Ok(None) => {}
            Err(e) => error!("Could not load transaction {}: {}", reference, e),
        }
        GatewayError::SecurityVerificationFailed(reference.to_string())
    }

    /// 已验签报文的统一结算路径。
    ///
    /// 锁内重新加载交易，结清/拒绝只对pending生效，重复投递
    /// 只刷新报文不再迁移状态，报名通知因此恰好触发一次。
    pub(crate) async fn apply_gateway_outcome(
        &self,
        reference: &str,
        response: &FieldMap,
        outcome: ResponseOutcome,
    ) -> Result<Transaction, GatewayError> {
        let _guard = self.locks.acquire(reference).await;

        let mut txn = self
            .transactions
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("transaction {}", reference)))?;

        let was_pending = txn.is_pending();
        txn.attach_gateway_response(response);

        match outcome {
            ResponseOutcome::Settled if was_pending => {
                txn.transition(TransactionStatus::Completed)?;
                self.transactions.update(&txn).await?;
                info!("Transaction {} completed", reference);
                self.notify_registration(&mut txn).await;
            }
            ResponseOutcome::Declined if was_pending => {
                txn.transition(TransactionStatus::Failed)?;
                self.transactions.update(&txn).await?;
                info!(
                    "Transaction {} declined with code {:?}",
                    reference, txn.response_code
                );
            }
            _ => {
                // 重复投递或悬而未决的码：只留痕，不动状态
                self.transactions.update(&txn).await?;
            }
        }

        Ok(txn)
    }

    /// 结清后通知业务侧。通知失败只记日志，不回滚支付结果。
    async fn notify_registration(&self, txn: &mut Transaction) {
        let result = match txn.registration_id.clone() {
            Some(registration_id) => {
                self.registrations
                    .confirm_registration(&txn.subject, &registration_id, txn)
                    .await
            }
            None => match self
                .registrations
                .create_registration(&txn.subject, txn)
                .await
            {
                Ok(registration_id) => {
                    txn.registration_id = Some(registration_id);
                    self.transactions.update(txn).await.map(|_| ())
                }
                Err(e) => Err(e),
            },
        };

        if let Err(e) = result {
            error!(
                "Registration notification failed for {}: {}",
                txn.reference, e
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::entities::Subject;
    use crate::repositories::{
        InMemoryCallbackLogRepository, InMemoryRefundRepository, InMemoryStatusInquiryRepository,
        InMemoryTransactionRepository,
    };
    use crate::utils::http_client::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) const TEST_SALT: &str = "9208s6wx05";

    type Responder =
        Box<dyn FnMut(&str, &FieldMap) -> Result<FieldMap, TransportError> + Send + 'static>;

    /// 用闭包脚本化的网关替身，同时记录每次请求
    pub(crate) struct ScriptedTransport {
        responder: Mutex<Responder>,
        pub requests: Mutex<Vec<(String, FieldMap)>>,
    }

    impl ScriptedTransport {
        pub fn new(
            responder: impl FnMut(&str, &FieldMap) -> Result<FieldMap, TransportError>
                + Send
                + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                responder: Mutex::new(Box::new(responder)),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn post_fields(
            &self,
            url: &str,
            fields: &FieldMap,
        ) -> Result<FieldMap, TransportError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push((url.to_string(), fields.clone()));
            }
            let mut responder = self
                .responder
                .lock()
                .map_err(|_| TransportError::Connect("responder poisoned".into()))?;
            responder(url, fields)
        }
    }

    /// 记录型报名通知替身
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub confirmed: Mutex<Vec<(String, String)>>,
        pub created: Mutex<Vec<String>>,
        next_id: AtomicUsize,
    }

    #[async_trait]
    impl RegistrationNotifier for RecordingNotifier {
        async fn confirm_registration(
            &self,
            _subject: &Subject,
            registration_id: &str,
            txn: &Transaction,
        ) -> Result<(), GatewayError> {
            if let Ok(mut confirmed) = self.confirmed.lock() {
                confirmed.push((txn.reference.clone(), registration_id.to_string()));
            }
            Ok(())
        }

        async fn create_registration(
            &self,
            _subject: &Subject,
            txn: &Transaction,
        ) -> Result<String, GatewayError> {
            let id = format!("reg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            if let Ok(mut created) = self.created.lock() {
                created.push(txn.reference.clone());
            }
            Ok(id)
        }
    }

    pub(crate) struct Harness {
        pub service: PaymentService,
        pub transactions: Arc<InMemoryTransactionRepository>,
        pub refunds: Arc<InMemoryRefundRepository>,
        pub callback_logs: Arc<InMemoryCallbackLogRepository>,
        pub inquiries: Arc<InMemoryStatusInquiryRepository>,
        pub transport: Arc<ScriptedTransport>,
        pub notifier: Arc<RecordingNotifier>,
    }

    pub(crate) fn test_config() -> JazzCashConfig {
        JazzCashConfig {
            merchant_id: "MC32084".to_string(),
            password: "yy41w5f10e".to_string(),
            integrity_salt: TEST_SALT.to_string(),
            inquiry_dwell_minutes: 0,
            ..JazzCashConfig::default()
        }
    }

    pub(crate) fn harness(
        responder: impl FnMut(&str, &FieldMap) -> Result<FieldMap, TransportError> + Send + 'static,
    ) -> Harness {
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let transactions = Arc::new(InMemoryTransactionRepository::new(refunds.clone()));
        let callback_logs = Arc::new(InMemoryCallbackLogRepository::new());
        let inquiries = Arc::new(InMemoryStatusInquiryRepository::new());
        let transport = ScriptedTransport::new(responder);
        let notifier = Arc::new(RecordingNotifier::default());

        let service = PaymentService::new(
            test_config(),
            transactions.clone(),
            refunds.clone(),
            callback_logs.clone(),
            inquiries.clone(),
            transport.clone(),
            notifier.clone(),
        );

        Harness {
            service,
            transactions,
            refunds,
            callback_logs,
            inquiries,
            transport,
            notifier,
        }
    }

    /// 以测试盐签好名的响应报文
    pub(crate) fn signed_response(pairs: &[(&str, &str)]) -> FieldMap {
        let mut fields = FieldMap::new();
        for (key, value) in pairs {
            fields.insert(*key, *value);
        }
        signer::sign_fields(&mut fields, TEST_SALT, false).expect("test response must sign");
        fields
    }

    pub(crate) fn sample_subject() -> Subject {
        Subject {
            kind: crate::domain::enums::SubjectKind::Event,
            id: "evt-42".to_string(),
        }
    }
}
