// ==========================================
// 交易数仓分层引擎 - 记录模型
// ==========================================
// 职责: 动态记录 (字段名 -> 标量/嵌套值) 与类型化访问器
// 说明: 各表字段不同,不使用固定结构体;已知表结构处由调用方取值
// ==========================================

use crate::layer::error::{LayerError, LayerResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// 记录: 有序的 字段名 -> 值 映射
pub type Record = Map<String, Value>;

/// 目标表字段名,所有层输出记录都会携带
pub const RECORD_TYPE_FIELD: &str = "record_type";

/// 记录标识候选字段 (按优先级)
const ID_FIELDS: &[&str] = &[
    "id",
    "order_id",
    "user_id",
    "product_id",
    "date_key",
    "period_start",
];

/// 推导记录标识
///
/// # 规则
/// - 依次取 id / order_id / user_id / product_id / date_key / period_start
/// - 都不存在时回退为 `row:<index>`（无序号时为 `row:?`）
pub fn record_id(record: &Record, index: Option<usize>) -> String {
    for field in ID_FIELDS {
        match record.get(*field) {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.trim().to_string(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    match index {
        Some(i) => format!("row:{}", i),
        None => "row:?".to_string(),
    }
}

/// 解析日期字符串
///
/// 兼容: YYYY-MM-DD / YYYY-MM-DD HH:MM:SS / RFC 3339 / YYYYMMDD
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let s = value.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

/// 将 JSON 值解释为数值（数字或数字字符串）
///
/// # 返回
/// - Some(Ok(v)): 可解析
/// - Some(Err(())): 存在但非数值（含 NaN / inf 等非有限值）
/// - None: 缺失 / null / 空白字符串
pub fn numeric_value(value: Option<&Value>) -> Option<Result<f64, ()>> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(n.as_f64().filter(|v| v.is_finite()).ok_or(())),
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or(()),
        ),
        Some(Value::Bool(_)) | Some(Value::Array(_)) | Some(Value::Object(_)) => Some(Err(())),
    }
}

/// 是否视为"空值"（缺失 / null / 空白字符串）
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

// ==========================================
// RecordExt - 类型化访问器
// ==========================================
pub trait RecordExt {
    /// 记录类型（目标表名）
    fn record_type(&self) -> Option<&str>;

    /// 文本字段；数字会被格式化为字符串
    fn text(&self, field: &str) -> Option<String>;

    /// 必填文本字段
    fn require_text(&self, field: &str) -> LayerResult<String>;

    /// 可选数值字段；存在但非数值时返回错误
    fn f64_opt(&self, field: &str) -> LayerResult<Option<f64>>;

    /// 数值字段，缺失时使用默认值
    fn f64_or(&self, field: &str, default: f64) -> LayerResult<f64> {
        Ok(self.f64_opt(field)?.unwrap_or(default))
    }

    /// 必填数值字段
    fn require_f64(&self, field: &str) -> LayerResult<f64>;

    /// 可选整数字段（小数向零截断）
    fn i64_opt(&self, field: &str) -> LayerResult<Option<i64>> {
        Ok(self.f64_opt(field)?.map(|v| v.trunc() as i64))
    }

    /// 可选日期字段
    fn date_opt(&self, field: &str) -> LayerResult<Option<NaiveDate>>;

    /// 必填日期字段
    fn require_date(&self, field: &str) -> LayerResult<NaiveDate>;

    /// 可选布尔字段（兼容 1/0/true/false/Y/N）
    fn bool_opt(&self, field: &str) -> Option<bool>;
}

impl RecordExt for Record {
    fn record_type(&self) -> Option<&str> {
        self.get(RECORD_TYPE_FIELD).and_then(Value::as_str)
    }

    fn text(&self, field: &str) -> Option<String> {
        match self.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        }
    }

    fn require_text(&self, field: &str) -> LayerResult<String> {
        self.text(field)
            .ok_or_else(|| LayerError::missing_field(self, field))
    }

    fn f64_opt(&self, field: &str) -> LayerResult<Option<f64>> {
        match numeric_value(self.get(field)) {
            None => Ok(None),
            Some(Ok(v)) => Ok(Some(v)),
            Some(Err(())) => Err(LayerError::invalid_field(
                self,
                field,
                format!("期望数值, 实际 {}", self.get(field).cloned().unwrap_or(Value::Null)),
            )),
        }
    }

    fn require_f64(&self, field: &str) -> LayerResult<f64> {
        self.f64_opt(field)?
            .ok_or_else(|| LayerError::missing_field(self, field))
    }

    fn date_opt(&self, field: &str) -> LayerResult<Option<NaiveDate>> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => parse_date(s).map(Some).ok_or_else(|| {
                LayerError::invalid_field(self, field, format!("日期格式错误: {}", s))
            }),
            Some(other) => Err(LayerError::invalid_field(
                self,
                field,
                format!("期望日期字符串, 实际 {}", other),
            )),
        }
    }

    fn require_date(&self, field: &str) -> LayerResult<NaiveDate> {
        self.date_opt(field)?
            .ok_or_else(|| LayerError::missing_field(self, field))
    }

    fn bool_opt(&self, field: &str) -> Option<bool> {
        match self.get(field) {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0),
            Some(Value::String(s)) => match s.trim().to_uppercase().as_str() {
                "1" | "Y" | "TRUE" | "YES" => Some(true),
                "0" | "N" | "FALSE" | "NO" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_record_id_priority() {
        let r = record(json!({"user_id": "U1", "order_id": "O9"}));
        assert_eq!(record_id(&r, Some(3)), "O9");

        let r = record(json!({"amount": 1}));
        assert_eq!(record_id(&r, Some(3)), "row:3");
        assert_eq!(record_id(&r, None), "row:?");
    }

    #[test]
    fn test_numeric_string_accepted() {
        let r = record(json!({"amount": "12.50", "qty": 3, "blank": "  "}));
        assert_eq!(r.f64_opt("amount").unwrap(), Some(12.5));
        assert_eq!(r.f64_opt("qty").unwrap(), Some(3.0));
        assert_eq!(r.f64_opt("blank").unwrap(), None);
        assert_eq!(r.f64_opt("missing").unwrap(), None);
    }

    #[test]
    fn test_non_numeric_is_typed_error() {
        let r = record(json!({"order_id": "O1", "amount": "abc"}));
        let err = r.require_f64("amount").unwrap_err();
        match err {
            LayerError::InvalidField { record_id, field, .. } => {
                assert_eq!(record_id, "O1");
                assert_eq!(field, "amount");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_strings_are_not_numeric() {
        let r = record(json!({"order_id": "O1", "a": "NaN", "b": "inf", "c": "-Infinity"}));
        for field in ["a", "b", "c"] {
            assert!(
                matches!(r.f64_opt(field), Err(LayerError::InvalidField { .. })),
                "字段 {} 应被拒绝",
                field
            );
        }
        assert_eq!(numeric_value(Some(&json!("nan"))), Some(Err(())));
    }

    #[test]
    fn test_parse_date_formats() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_date("2024-03-05"), Some(d));
        assert_eq!(parse_date("2024-03-05 10:11:12"), Some(d));
        assert_eq!(parse_date("2024-03-05T10:11:12Z"), Some(d));
        assert_eq!(parse_date("20240305"), Some(d));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_bool_opt() {
        let r = record(json!({"a": "Y", "b": 0, "c": true, "d": "maybe"}));
        assert_eq!(r.bool_opt("a"), Some(true));
        assert_eq!(r.bool_opt("b"), Some(false));
        assert_eq!(r.bool_opt("c"), Some(true));
        assert_eq!(r.bool_opt("d"), None);
    }
}
