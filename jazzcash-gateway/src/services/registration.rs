use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::config::RegistrationConfig;
use crate::domain::entities::{Subject, Transaction};
use crate::utils::error::GatewayError;

/// 支付结清后对业务侧的通知出口。
///
/// 已有报名记录时确认付款；没有时补建一条并回填其ID。
/// 每笔交易只会在pending到completed的那次迁移里触发一次。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistrationNotifier: Send + Sync {
    async fn confirm_registration(
        &self,
        subject: &Subject,
        registration_id: &str,
        txn: &Transaction,
    ) -> Result<(), GatewayError>;

    async fn create_registration(
        &self,
        subject: &Subject,
        txn: &Transaction,
    ) -> Result<String, GatewayError>;
}

pub struct HttpRegistrationNotifier {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CreatedRegistration {
    id: String,
}

impl HttpRegistrationNotifier {
    pub fn new(config: &RegistrationConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| GatewayError::Internal(e.into()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn payment_body(subject: &Subject, txn: &Transaction) -> serde_json::Value {
        json!({
            "subject_kind": subject.kind,
            "subject_id": subject.id,
            "reference": txn.reference,
            "amount": txn.amount,
            "currency": txn.currency,
            "paid_at": txn.completed_at,
        })
    }
}

#[async_trait]
impl RegistrationNotifier for HttpRegistrationNotifier {
    async fn confirm_registration(
        &self,
        subject: &Subject,
        registration_id: &str,
        txn: &Transaction,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/registrations/{}/confirm", self.base_url, registration_id);
        let response = self
            .client
            .post(&url)
            .json(&Self::payment_body(subject, txn))
            .send()
            .await
            .map_err(|e| GatewayError::TransientNetwork(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Internal(anyhow::anyhow!(
                "registration confirm returned HTTP {}",
                response.status()
            )));
        }
        info!(
            "Confirmed registration {} for transaction {}",
            registration_id, txn.reference
        );
        Ok(())
    }

    async fn create_registration(
        &self,
        subject: &Subject,
        txn: &Transaction,
    ) -> Result<String, GatewayError> {
        let url = format!("{}/registrations", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&Self::payment_body(subject, txn))
            .send()
            .await
            .map_err(|e| GatewayError::TransientNetwork(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Internal(anyhow::anyhow!(
                "registration create returned HTTP {}",
                response.status()
            )));
        }
        let created: CreatedRegistration = response
            .json()
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        info!(
            "Created registration {} for transaction {}",
            created.id, txn.reference
        );
        Ok(created.id)
    }
}
