use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::fields::FieldMap;
use crate::utils::error::GatewayError;

// 传输层错误，与业务错误分开建模
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway connection failed: {0}")]
    Connect(String),

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        // 三类传输故障对交易而言都是结果未知，保持pending等待对账
        GatewayError::TransientNetwork(err.to_string())
    }
}

/// 网关传输抽象。测试里用脚本化实现替代真实HTTP。
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn post_fields(&self, url: &str, fields: &FieldMap) -> Result<FieldMap, TransportError>;
}

// 日志脱敏器
#[derive(Clone)]
pub struct PayloadMasker {
    mask_fields: Vec<String>,
}

impl Default for PayloadMasker {
    fn default() -> Self {
        Self {
            mask_fields: vec![
                "password".to_string(),
                "securehash".to_string(),
                "secure_hash".to_string(),
                "salt".to_string(),
                "secret".to_string(),
                "cnic".to_string(),
            ],
        }
    }
}

impl PayloadMasker {
    fn is_sensitive(&self, key: &str) -> bool {
        let lowered = key.to_lowercase();
        self.mask_fields.iter().any(|field| lowered.contains(field))
    }

    // 遮蔽敏感字段
    pub fn mask_sensitive_data(&self, data: &str) -> String {
        if let Ok(mut json_value) = serde_json::from_str::<Value>(data) {
            self.mask_json_value(&mut json_value);
            return json_value.to_string();
        }

        // 非JSON时按表单键值对处理
        let mut result = data.to_string();
        for field in &self.mask_fields {
            let pattern = format!(r#"(?i)([^&=]*{}[^&=]*)=([^&]+)"#, regex::escape(field));
            if let Ok(regex) = regex::Regex::new(&pattern) {
                result = regex.replace_all(&result, "$1=*****").to_string();
            }
        }
        result
    }

    pub fn mask_field_map(&self, fields: &FieldMap) -> Value {
        let mut value = fields.to_json();
        self.mask_json_value(&mut value);
        value
    }

    // 递归遮蔽JSON中的敏感字段
    fn mask_json_value(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    if self.is_sensitive(key) {
                        if val.is_string() || val.is_number() {
                            *val = Value::String("*****".to_string());
                        }
                    } else {
                        self.mask_json_value(val);
                    }
                }
            }
            Value::Array(array) => {
                for val in array.iter_mut() {
                    self.mask_json_value(val);
                }
            }
            _ => {}
        }
    }
}

// 面向网关的HTTP传输实现
#[derive(Clone)]
pub struct HttpGatewayTransport {
    client: Client,
    masker: PayloadMasker,
}

impl HttpGatewayTransport {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!(
                "JazzCashGateway/{} Rust",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| GatewayError::Internal(e.into()))?;

        Ok(Self {
            client,
            masker: PayloadMasker::default(),
        })
    }
}

#[async_trait]
impl GatewayTransport for HttpGatewayTransport {
    async fn post_fields(&self, url: &str, fields: &FieldMap) -> Result<FieldMap, TransportError> {
        debug!(
            url = %url,
            payload = %self.masker.mask_field_map(fields),
            "Sending gateway request"
        );

        let response = self
            .client
            .post(url)
            .json(fields)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Connect(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        if !status.is_success() {
            warn!(status = %status, "Gateway returned HTTP error");
            return Err(TransportError::InvalidResponse(format!(
                "HTTP {}: {}",
                status,
                self.masker.mask_sensitive_data(&body)
            )));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| TransportError::InvalidResponse(format!("not JSON: {}", e)))?;
        if !value.is_object() {
            return Err(TransportError::InvalidResponse(
                "response is not a JSON object".to_string(),
            ));
        }

        debug!(
            payload = %self.masker.mask_sensitive_data(&body),
            "Received gateway response"
        );

        Ok(FieldMap::from_json(&value))
    }
}
