/// 网关确认成功的响应码。121是钱包异步场景下的已受理成功码。
pub const SUCCESS_CODES: [&str; 2] = ["000", "121"];

/// 网关明确拒绝的响应码
pub const FAILURE_CODES: [&str; 2] = ["199", "999"];

/// 查询接口本身调用成功的码
pub const GATEWAY_OK: &str = "000";

/// 查询结果中代表原交易已成功的码
pub const INQUIRY_SETTLED_CODE: &str = "121";

/// 响应码三分类。未知码一律视为悬而未决，交易保持pending。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Settled,
    Declined,
    Indeterminate,
}

pub fn classify(code: &str) -> ResponseOutcome {
    if SUCCESS_CODES.contains(&code) {
        ResponseOutcome::Settled
    } else if FAILURE_CODES.contains(&code) {
        ResponseOutcome::Declined
    } else {
        ResponseOutcome::Indeterminate
    }
}

pub fn is_success(code: &str) -> bool {
    SUCCESS_CODES.contains(&code)
}

/// 对账查询里原交易的结论。只有121加completed才算已结清。
pub fn inquiry_outcome(payment_code: &str, payment_status: &str) -> ResponseOutcome {
    if payment_code == INQUIRY_SETTLED_CODE && payment_status.eq_ignore_ascii_case("completed") {
        return ResponseOutcome::Settled;
    }
    if FAILURE_CODES.contains(&payment_code) {
        return ResponseOutcome::Declined;
    }
    ResponseOutcome::Indeterminate
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("000", ResponseOutcome::Settled)]
    #[case("121", ResponseOutcome::Settled)]
    #[case("199", ResponseOutcome::Declined)]
    #[case("999", ResponseOutcome::Declined)]
    #[case("124", ResponseOutcome::Indeterminate)]
    #[case("", ResponseOutcome::Indeterminate)]
    #[case("0", ResponseOutcome::Indeterminate)]
    fn test_classify(#[case] code: &str, #[case] expected: ResponseOutcome) {
        assert_eq!(classify(code), expected);
    }

    #[rstest]
    #[case("121", "Completed", ResponseOutcome::Settled)]
    #[case("121", "completed", ResponseOutcome::Settled)]
    #[case("121", "Pending", ResponseOutcome::Indeterminate)]
    #[case("000", "Completed", ResponseOutcome::Indeterminate)]
    #[case("199", "Failed", ResponseOutcome::Declined)]
    #[case("999", "", ResponseOutcome::Declined)]
    fn test_inquiry_outcome(
        #[case] code: &str,
        #[case] status: &str,
        #[case] expected: ResponseOutcome,
    ) {
        assert_eq!(inquiry_outcome(code, status), expected);
    }
}
