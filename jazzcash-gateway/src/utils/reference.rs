use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::entities::Subject;
use crate::utils::error::GatewayError;

/// 网关按巴基斯坦时间(UTC+5)解读所有日期字段
const PKT_OFFSET_SECS: i32 = 5 * 3600;

/// 交易引用号的长度上限，网关侧约束
const REFERENCE_MAX_LEN: usize = 20;

fn pkt_offset() -> FixedOffset {
    // 偏移量是常量，east_opt只会在越界时返回None
    FixedOffset::east_opt(PKT_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

fn pkt_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&pkt_offset())
}

/// 生成交易引用号：T + 巴基斯坦时间YYYYMMDDHHMMSS + 2位随机数字
pub fn generate_reference() -> String {
    let timestamp = pkt_now().format("%Y%m%d%H%M%S");
    let suffix = rand::rng().random_range(0..100u32);
    let reference = format!("T{}{:02}", timestamp, suffix);
    reference.chars().take(REFERENCE_MAX_LEN).collect()
}

/// 当前时间的网关日期串(YYYYMMDDHHMMSS)
pub fn gateway_datetime_now() -> String {
    pkt_now().format("%Y%m%d%H%M%S").to_string()
}

/// 有效期截止时间的网关日期串
pub fn expiry_datetime(hours: i64) -> String {
    (pkt_now() + Duration::hours(hours))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// 金额转最小单位(paisa)。网关要求整数，末两位是小数部分。
pub fn amount_to_paisa(amount: Decimal) -> Result<i64, GatewayError> {
    if amount <= Decimal::ZERO {
        return Err(GatewayError::Validation(
            "amount must be positive".to_string(),
        ));
    }
    let paisa = (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    paisa
        .to_i64()
        .ok_or_else(|| GatewayError::Validation(format!("amount {} out of range", amount)))
}

pub fn paisa_to_amount(paisa: i64) -> Decimal {
    Decimal::from(paisa) / Decimal::from(100)
}

/// 业务主体的账单引用：主体类型首字母 + 主体ID摘录 + T + 时间戳
pub fn bill_reference(subject: &Subject) -> String {
    let kind_tag = subject
        .kind
        .to_string()
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('X');
    let id_part: String = subject
        .id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(6)
        .collect();
    let timestamp = pkt_now().format("%y%m%d%H%M");
    let bill_ref = format!("{}{}T{}", kind_tag, id_part, timestamp);
    bill_ref.chars().take(REFERENCE_MAX_LEN).collect()
}

/// 规整并校验巴基斯坦手机号，返回03XXXXXXXXX格式
pub fn normalize_mobile_number(mobile: &str) -> Result<String, GatewayError> {
    let mut digits: String = mobile
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '+'))
        .collect();

    // 去掉国家码92
    if digits.starts_with("92") && digits.len() == 12 {
        digits = format!("0{}", &digits[2..]);
    }

    if digits.len() != 11 || !digits.starts_with("03") || !digits.chars().all(|c| c.is_ascii_digit())
    {
        return Err(GatewayError::Validation(
            "mobile number must be 11 digits starting with 03".to_string(),
        ));
    }
    Ok(digits)
}

/// 校验身份证号后6位
pub fn normalize_cnic_suffix(cnic: &str) -> Result<String, GatewayError> {
    let digits: String = cnic
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .collect();

    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::Validation(
            "CNIC suffix must be exactly 6 digits".to_string(),
        ));
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enums::SubjectKind;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reference_shape() {
        let reference = generate_reference();
        assert!(reference.len() <= REFERENCE_MAX_LEN);
        assert!(reference.starts_with('T'));
        assert_eq!(reference.len(), 17);
        assert!(reference[1..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_references_are_distinct_enough() {
        let a = generate_reference();
        let b = generate_reference();
        // 同一秒内靠两位随机数区分，偶发相等也不影响断言形状
        assert_eq!(a.len(), b.len());
    }

    #[rstest]
    #[case(dec!(1500.00), 150000)]
    #[case(dec!(999.99), 99999)]
    #[case(dec!(100.50), 10050)]
    #[case(dec!(0.01), 1)]
    fn test_amount_to_paisa(#[case] amount: Decimal, #[case] expected: i64) {
        assert_eq!(amount_to_paisa(amount).unwrap(), expected);
    }

    #[test]
    fn test_amount_to_paisa_rejects_non_positive() {
        assert!(amount_to_paisa(dec!(0)).is_err());
        assert!(amount_to_paisa(dec!(-5.00)).is_err());
    }

    #[test]
    fn test_paisa_round_trip() {
        assert_eq!(paisa_to_amount(150000), dec!(1500.00));
        assert_eq!(paisa_to_amount(99999), dec!(999.99));
    }

    #[rstest]
    #[case("03001234567", "03001234567")]
    #[case("0300-1234567", "03001234567")]
    #[case("+923001234567", "03001234567")]
    #[case("92 300 1234567", "03001234567")]
    fn test_mobile_normalization(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_mobile_number(input).unwrap(), expected);
    }

    #[rstest]
    #[case("1234567890")]
    #[case("04001234567")]
    #[case("030012345678")]
    #[case("03001abc567")]
    #[case("")]
    fn test_invalid_mobile_rejected(#[case] input: &str) {
        assert!(normalize_mobile_number(input).is_err());
    }

    #[test]
    fn test_cnic_suffix() {
        assert_eq!(normalize_cnic_suffix("123456").unwrap(), "123456");
        assert_eq!(normalize_cnic_suffix("12-34 56").unwrap(), "123456");
        assert!(normalize_cnic_suffix("12345").is_err());
        assert!(normalize_cnic_suffix("12345a").is_err());
    }

    #[test]
    fn test_bill_reference_shape() {
        let subject = Subject {
            kind: SubjectKind::Event,
            id: "evt-420000".to_string(),
        };
        let bill_ref = bill_reference(&subject);
        assert!(bill_ref.len() <= REFERENCE_MAX_LEN);
        assert!(bill_ref.starts_with("Eevt420"));
        assert!(bill_ref.contains('T'));
    }

    #[test]
    fn test_gateway_datetime_format() {
        let now = gateway_datetime_now();
        assert_eq!(now.len(), 14);
        assert!(now.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_expiry_is_after_now() {
        let now = gateway_datetime_now();
        let expiry = expiry_datetime(24);
        assert!(expiry > now);
    }
}
