use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 网关报文的字段集合。键按字典序排列，签名依赖这个顺序。
///
/// 入站报文在这里统一规整：值去掉首尾空白，字面量"none"/"null"
/// 和JSON null一律当作字段缺失。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<String, String>);

/// 清洗单个字段值，None表示该字段应被丢弃
fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(trimmed.to_string())
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => normalize(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        // 嵌套结构原样序列化，网关协议里不会出现
        other => Some(other.to_string()),
    }
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从JSON对象构建，非对象输入得到空集合
    pub fn from_json(value: &Value) -> Self {
        let mut map = BTreeMap::new();
        if let Value::Object(obj) = value {
            for (key, val) in obj {
                if let Some(normalized) = value_to_string(val) {
                    map.insert(key.clone(), normalized);
                }
            }
        }
        Self(map)
    }

    /// 从键值对构建，常用于表单解码结果
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut map = BTreeMap::new();
        for (key, value) in pairs {
            if let Some(normalized) = normalize(value.as_ref()) {
                map.insert(key.into(), normalized);
            }
        }
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn get_or_default(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// 复制一份并剔除给定键，键名比较不区分大小写
    pub fn without(&self, keys: &[&str]) -> Self {
        let map = self
            .0
            .iter()
            .filter(|(k, _)| !keys.iter().any(|x| x.eq_ignore_ascii_case(k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self(map)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a FieldMap {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_drops_null_like_values() {
        let fields = FieldMap::from_json(&json!({
            "pp_TxnRefNo": "T20241125134512",
            "pp_BankID": null,
            "pp_ProductID": "None",
            "pp_SubMerchantID": "null",
            "pp_Amount": 150000,
        }));

        assert_eq!(fields.get("pp_TxnRefNo"), Some("T20241125134512"));
        assert_eq!(fields.get("pp_Amount"), Some("150000"));
        assert!(!fields.contains_key("pp_BankID"));
        assert!(!fields.contains_key("pp_ProductID"));
        assert!(!fields.contains_key("pp_SubMerchantID"));
    }

    #[test]
    fn test_from_json_trims_but_keeps_empty_strings() {
        let fields = FieldMap::from_json(&json!({
            "pp_BankID": "  ",
            "pp_Language": " EN ",
        }));
        // 空串保留，由签名器按模式决定是否纳入
        assert_eq!(fields.get("pp_BankID"), Some(""));
        assert_eq!(fields.get("pp_Language"), Some("EN"));
    }

    #[test]
    fn test_zero_is_not_null_like() {
        let fields = FieldMap::from_json(&json!({ "pp_DiscountedAmount": "0" }));
        assert_eq!(fields.get("pp_DiscountedAmount"), Some("0"));
    }

    #[test]
    fn test_iteration_is_lexicographic() {
        let mut fields = FieldMap::new();
        fields.insert("pp_TxnRefNo", "x");
        fields.insert("pp_Amount", "y");
        fields.insert("ppmpf_1", "z");
        let keys: Vec<&String> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["pp_Amount", "pp_TxnRefNo", "ppmpf_1"]);
    }

    #[test]
    fn test_without_is_case_insensitive() {
        let mut fields = FieldMap::new();
        fields.insert("pp_SecureHash", "ABC");
        fields.insert("pp_Amount", "100");
        let stripped = fields.without(&["pp_securehash"]);
        assert!(!stripped.contains_key("pp_SecureHash"));
        assert_eq!(stripped.get("pp_Amount"), Some("100"));
    }

    #[test]
    fn test_from_pairs_normalizes_values() {
        let fields = FieldMap::from_pairs(vec![
            ("pp_ResponseCode".to_string(), "000".to_string()),
            ("pp_BankID".to_string(), "None".to_string()),
        ]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("pp_ResponseCode"), Some("000"));
    }
}
