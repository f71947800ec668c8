use axum::body::Bytes;
use axum::extract::{Form, Json, State};
use axum::http::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::app_state::AppState;
use crate::protocol::fields::FieldMap;
use crate::services::payment::dto::ReturnCallbackOutcome;
use crate::utils::error::{ApiResponse, GatewayError};

// 卡支付完成后的浏览器回跳，网关以表单POST送达
pub async fn handle_return(
    State(state): State<Arc<AppState>>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<(StatusCode, Json<ApiResponse<ReturnCallbackOutcome>>), GatewayError> {
    let fields = FieldMap::from_pairs(pairs);
    info!(
        "API: return callback for {}",
        fields.get_or_default("pp_TxnRefNo")
    );

    let outcome = state.payment_service.handle_return_callback(fields).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(outcome))))
}

// 服务器间IPN。网关既可能发JSON也可能发表单，这里都收。
// 应答永远是签名后的三字段报文，状态码标记是否接受。
pub async fn handle_ipn(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let raw = parse_ipn_body(&body);
    let ack = state.payment_service.process_ipn(&raw).await;
    let status = if ack.accepted {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(ack.body.to_json()))
}

fn parse_ipn_body(body: &[u8]) -> Value {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if value.is_object() {
            return value;
        }
    }
    match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
        Ok(pairs) => Value::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        ),
        Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_body() {
        let raw = parse_ipn_body(br#"{"pp_TxnRefNo":"T1","pp_ResponseCode":"000"}"#);
        assert_eq!(raw["pp_TxnRefNo"], "T1");
    }

    #[test]
    fn test_parse_form_body() {
        let raw = parse_ipn_body(b"pp_TxnRefNo=T1&pp_ResponseCode=000");
        assert_eq!(raw["pp_ResponseCode"], "000");
    }

    #[test]
    fn test_unparseable_body_becomes_null() {
        // 纯JSON标量不是合法报文，按空处理
        let raw = parse_ipn_body(b"\"just a string\"");
        assert!(raw.is_null() || raw.as_object().map(|o| o.is_empty()).unwrap_or(false));
    }
}
