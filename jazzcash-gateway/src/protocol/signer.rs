use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::protocol::fields::FieldMap;
use crate::utils::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// 参与签名的字段前缀，比较不区分大小写
pub const FIELD_PREFIX: &str = "pp_";

/// 签名字段本身的各种写法，校验时一律剔除
pub const SIGNATURE_FIELDS: [&str; 3] = ["pp_securehash", "securehash", "pp_secure_hash"];

fn has_prefix(key: &str) -> bool {
    key.len() >= FIELD_PREFIX.len()
        && key[..FIELD_PREFIX.len()].eq_ignore_ascii_case(FIELD_PREFIX)
}

/// 按协议规则选出参与签名的值，保持键的字典序。
///
/// 先取pp_前缀字段；一个都没有时回退为全部字段（退款接口的
/// 响应就是无前缀的驼峰字段）。include_empty控制空值是否纳入，
/// 这一点协议本身并不自洽，必须由调用点显式指定。
fn signable_values(fields: &FieldMap, include_empty: bool) -> Vec<String> {
    let prefixed: Vec<String> = fields
        .iter()
        .filter(|(k, v)| has_prefix(k) && (include_empty || !v.is_empty()))
        .map(|(_, v)| v.clone())
        .collect();
    if !prefixed.is_empty() {
        return prefixed;
    }
    fields
        .iter()
        .filter(|(_, v)| include_empty || !v.is_empty())
        .map(|(_, v)| v.clone())
        .collect()
}

/// 计算HMAC-SHA256安全哈希，返回大写十六进制串。
///
/// 盐既作为消息前缀又作为MAC密钥。
pub fn secure_hash(
    fields: &FieldMap,
    integrity_salt: &str,
    include_empty: bool,
) -> Result<String, GatewayError> {
    if integrity_salt.is_empty() {
        return Err(GatewayError::NotConfigured);
    }

    let values = signable_values(fields, include_empty);
    if values.is_empty() {
        return Err(GatewayError::Validation(
            "no signable fields in payload".to_string(),
        ));
    }

    let message = format!("{}&{}", integrity_salt, values.join("&"));

    let mut mac = HmacSha256::new_from_slice(integrity_salt.as_bytes())
        .map_err(|e| GatewayError::Validation(format!("invalid hmac key: {}", e)))?;
    mac.update(message.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(hex::encode_upper(digest))
}

/// 计算签名并写入pp_SecureHash字段
pub fn sign_fields(
    fields: &mut FieldMap,
    integrity_salt: &str,
    include_empty: bool,
) -> Result<(), GatewayError> {
    let hash = secure_hash(fields, integrity_salt, include_empty)?;
    fields.insert("pp_SecureHash", hash);
    Ok(())
}

/// 校验入站报文的签名。
///
/// 先剔除签名字段本身，重算后与收到的值做不区分大小写比较。
/// 不匹配返回SignatureMismatch，由调用方决定是否将交易置为失败。
pub fn verify_secure_hash(
    fields: &FieldMap,
    received_hash: &str,
    integrity_salt: &str,
    include_empty: bool,
) -> Result<(), GatewayError> {
    let stripped = fields.without(&SIGNATURE_FIELDS);
    let expected = secure_hash(&stripped, integrity_salt, include_empty)?;

    if received_hash.is_empty() || !expected.eq_ignore_ascii_case(received_hash) {
        return Err(GatewayError::SignatureMismatch {
            expected,
            received: received_hash.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 商户文档里的示例报文
    fn doc_fields() -> FieldMap {
        FieldMap::from_json(&json!({
            "pp_Amount": "25000",
            "pp_MerchantID": "MC25041",
            "pp_MerchantMPIN": "1234",
            "pp_Password": "sz1v4agvyf",
            "pp_TxnCurrency": "PKR",
            "pp_TxnRefNo": "T20220518150213",
        }))
    }

    // 钱包接口文档里的示例报文，带空字段和ppmpf_*附加字段
    fn mwallet_fields() -> FieldMap {
        let mut fields = FieldMap::new();
        for (k, v) in [
            ("pp_amount", "100"),
            ("pp_bankID", ""),
            ("pp_billRef", "billRef3781"),
            ("pp_cnic", "345678"),
            ("pp_description", "Test case description"),
            ("pp_language", "EN"),
            ("pp_merchantID", "MC32084"),
            ("pp_mobile", "03123456789"),
            ("pp_password", "yy41w5f10e"),
            ("pp_productID", ""),
            ("pp_txnCurrency", "PKR"),
            ("pp_txnDateTime", "20220124224204"),
            ("pp_txnExpiryDateTime", "20220125224204"),
            ("pp_txnRefNo", "T71608120"),
            ("ppmpf_1", ""),
            ("ppmpf_2", ""),
            ("ppmpf_3", ""),
            ("ppmpf_4", ""),
            ("ppmpf_5", ""),
        ] {
            fields.insert(k, v);
        }
        fields
    }

    #[test]
    fn test_documentation_vector() {
        let hash = secure_hash(&doc_fields(), "3vv9wu3a18", false).unwrap();
        assert_eq!(
            hash,
            "2C595361C2DA0E502D18BFBAA92CF4740330215E5E8AD0CF4489A64E7400B117"
        );
    }

    #[test]
    fn test_mwallet_vector_excluding_empty() {
        let hash = secure_hash(&mwallet_fields(), "9208s6wx05", false).unwrap();
        assert_eq!(
            hash,
            "39ECAACFC30F9AFA1763B7E61EA33AC75977FB2E849A5EE1EDC4016791F3438F"
        );
    }

    #[test]
    fn test_mwallet_vector_including_empty() {
        // ppmpf_*不带pp_前缀，即便包含空值模式也不参与签名
        let hash = secure_hash(&mwallet_fields(), "9208s6wx05", true).unwrap();
        assert_eq!(
            hash,
            "42C77547705E5C0C974012096FDD36DFB4BA81E0F5A4C42EB41C9E0DEB99E01A"
        );
    }

    #[test]
    fn test_fallback_to_unprefixed_fields() {
        // 退款接口的响应没有pp_前缀
        let mut fields = FieldMap::new();
        fields.insert("responseCode", "000");
        fields.insert("responseMessage", "refund processed");
        let hash = secure_hash(&fields, "9208s6wx05", false).unwrap();
        assert_eq!(
            hash,
            "B13A15FC27B4605E48832409AF16A7D4C8842300E1B3C4642158EDF94ACE2D35"
        );
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut reversed = FieldMap::new();
        reversed.insert("pp_TxnRefNo", "T20220518150213");
        reversed.insert("pp_TxnCurrency", "PKR");
        reversed.insert("pp_Password", "sz1v4agvyf");
        reversed.insert("pp_MerchantMPIN", "1234");
        reversed.insert("pp_MerchantID", "MC25041");
        reversed.insert("pp_Amount", "25000");

        assert_eq!(
            secure_hash(&reversed, "3vv9wu3a18", false).unwrap(),
            secure_hash(&doc_fields(), "3vv9wu3a18", false).unwrap()
        );
    }

    #[test]
    fn test_sign_then_verify_round_trip() {
        let mut fields = doc_fields();
        sign_fields(&mut fields, "3vv9wu3a18", false).unwrap();
        let received = fields.get("pp_SecureHash").unwrap().to_string();
        verify_secure_hash(&fields, &received, "3vv9wu3a18", false).unwrap();
    }

    #[test]
    fn test_tampered_field_fails_verification() {
        let mut fields = doc_fields();
        sign_fields(&mut fields, "3vv9wu3a18", false).unwrap();
        let received = fields.get("pp_SecureHash").unwrap().to_string();

        fields.insert("pp_Amount", "26000");
        let err = verify_secure_hash(&fields, &received, "3vv9wu3a18", false).unwrap_err();
        assert!(matches!(err, GatewayError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_verification_is_case_insensitive() {
        let mut fields = doc_fields();
        sign_fields(&mut fields, "3vv9wu3a18", false).unwrap();
        let received = fields.get("pp_SecureHash").unwrap().to_lowercase();
        verify_secure_hash(&fields, &received, "3vv9wu3a18", false).unwrap();
    }

    #[test]
    fn test_missing_received_hash_fails() {
        let fields = doc_fields();
        let err = verify_secure_hash(&fields, "", "3vv9wu3a18", false).unwrap_err();
        assert!(matches!(err, GatewayError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_modes_agree_without_empty_fields() {
        let fields = doc_fields();
        assert_eq!(
            secure_hash(&fields, "3vv9wu3a18", false).unwrap(),
            secure_hash(&fields, "3vv9wu3a18", true).unwrap()
        );
    }

    #[test]
    fn test_modes_differ_with_empty_fields() {
        let fields = mwallet_fields();
        assert_ne!(
            secure_hash(&fields, "9208s6wx05", false).unwrap(),
            secure_hash(&fields, "9208s6wx05", true).unwrap()
        );
    }

    #[test]
    fn test_empty_salt_is_rejected() {
        let err = secure_hash(&doc_fields(), "", false).unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured));
    }
}
