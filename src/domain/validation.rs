// ==========================================
// 交易数仓分层引擎 - 校验规则 DSL
// ==========================================
// 职责: 解析 "required|numeric|positive" 规则表达式 + 规则求值
// 说明: 构造期一次解析为枚举序列,逐条记录只做 match 分派
// ==========================================

use crate::domain::record::{is_blank, numeric_value, parse_date, record_id, Record};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email regex is valid")
});

/// 规则解析错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleParseError {
    #[error("未知规则 (字段 {field}): {rule}")]
    UnknownRule { field: String, rule: String },

    #[error("规则参数错误 (字段 {field}): {rule}")]
    InvalidArgument { field: String, rule: String },
}

// ==========================================
// Rule - 单条校验谓词
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    Required,
    Numeric,
    String,
    Date,
    Email,
    Positive,
    Min(f64),
    Max(f64),
}

impl Rule {
    /// 解析单条规则（如 "min:0"）
    pub fn parse(field: &str, token: &str) -> Result<Rule, RuleParseError> {
        let token = token.trim();
        let (name, arg) = match token.split_once(':') {
            Some((n, a)) => (n.trim(), Some(a.trim())),
            None => (token, None),
        };

        let bound = |arg: Option<&str>| -> Result<f64, RuleParseError> {
            arg.and_then(|a| a.parse::<f64>().ok())
                .ok_or_else(|| RuleParseError::InvalidArgument {
                    field: field.to_string(),
                    rule: token.to_string(),
                })
        };

        match (name, arg) {
            ("required", None) => Ok(Rule::Required),
            ("numeric", None) => Ok(Rule::Numeric),
            ("string", None) => Ok(Rule::String),
            ("date", None) => Ok(Rule::Date),
            ("email", None) => Ok(Rule::Email),
            ("positive", None) => Ok(Rule::Positive),
            ("min", a) => Ok(Rule::Min(bound(a)?)),
            ("max", a) => Ok(Rule::Max(bound(a)?)),
            _ => Err(RuleParseError::UnknownRule {
                field: field.to_string(),
                rule: token.to_string(),
            }),
        }
    }

    /// 规则求值
    ///
    /// # 说明
    /// - required 以外的规则在值缺失/为 null/空白时跳过
    pub fn check(&self, value: Option<&Value>) -> bool {
        if let Rule::Required = self {
            return !is_blank(value);
        }
        let value = match value {
            Some(v) if !is_blank(Some(v)) => v,
            _ => return true,
        };

        match self {
            Rule::Required => true,
            Rule::Numeric => matches!(numeric_value(Some(value)), Some(Ok(_))),
            Rule::String => value.is_string(),
            Rule::Date => value.as_str().and_then(parse_date).is_some(),
            Rule::Email => value
                .as_str()
                .map(|s| EMAIL_RE.is_match(s.trim()))
                .unwrap_or(false),
            Rule::Positive => matches!(numeric_value(Some(value)), Some(Ok(v)) if v > 0.0),
            Rule::Min(min) => matches!(numeric_value(Some(value)), Some(Ok(v)) if v >= *min),
            Rule::Max(max) => matches!(numeric_value(Some(value)), Some(Ok(v)) if v <= *max),
        }
    }

    fn describe(&self, field: &str) -> String {
        match self {
            Rule::Required => format!("{} 为必填字段", field),
            Rule::Numeric => format!("{} 必须为数值", field),
            Rule::String => format!("{} 必须为字符串", field),
            Rule::Date => format!("{} 必须为合法日期", field),
            Rule::Email => format!("{} 必须为合法邮箱", field),
            Rule::Positive => format!("{} 必须大于 0", field),
            Rule::Min(min) => format!("{} 不能小于 {}", field, min),
            Rule::Max(max) => format!("{} 不能大于 {}", field, max),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required => write!(f, "required"),
            Rule::Numeric => write!(f, "numeric"),
            Rule::String => write!(f, "string"),
            Rule::Date => write!(f, "date"),
            Rule::Email => write!(f, "email"),
            Rule::Positive => write!(f, "positive"),
            Rule::Min(v) => write!(f, "min:{}", v),
            Rule::Max(v) => write!(f, "max:{}", v),
        }
    }
}

// ==========================================
// RuleSet - 字段 -> 规则序列
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: IndexMap<String, Vec<Rule>>,
}

impl RuleSet {
    /// 从 (字段, 规则表达式) 列表解析
    pub fn parse(entries: &[(&str, &str)]) -> Result<Self, RuleParseError> {
        let mut rules = IndexMap::new();
        for (field, expr) in entries {
            let parsed = expr
                .split('|')
                .filter(|t| !t.trim().is_empty())
                .map(|t| Rule::parse(field, t))
                .collect::<Result<Vec<_>, _>>()?;
            rules.insert(field.to_string(), parsed);
        }
        Ok(Self { rules })
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[Rule])> {
        self.rules.iter().map(|(f, r)| (f.as_str(), r.as_slice()))
    }

    pub fn get(&self, field: &str) -> Option<&[Rule]> {
        self.rules.get(field).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 校验单条记录，每条失败规则产生一条问题
    pub fn check_record(&self, record: &Record, index: usize) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (field, rules) in &self.rules {
            let value = record.get(field.as_str());
            for rule in rules {
                if !rule.check(value) {
                    issues.push(ValidationIssue {
                        record_id: record_id(record, Some(index)),
                        field: field.clone(),
                        value: value.cloned().unwrap_or(Value::Null),
                        rule: rule.to_string(),
                        message: rule.describe(field),
                    });
                }
            }
        }
        issues
    }
}

// ==========================================
// ValidationIssue - 数据质量问题
// ==========================================
// 只产生,不抛出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub record_id: String,
    pub field: String,
    pub value: Value,
    pub rule: String,
    pub message: String,
}

/// 批次数据质量汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub records_checked: usize,
    pub issue_count: usize,
    pub records_with_issues: usize,
    pub issues_by_rule: BTreeMap<String, usize>,
}

impl DataQualityReport {
    pub fn from_issues(records_checked: usize, issues: &[ValidationIssue]) -> Self {
        let mut issues_by_rule = BTreeMap::new();
        let mut records = std::collections::HashSet::new();
        for issue in issues {
            *issues_by_rule.entry(issue.rule.clone()).or_insert(0) += 1;
            records.insert(issue.record_id.as_str());
        }
        Self {
            records_checked,
            issue_count: issues.len(),
            records_with_issues: records.len(),
            issues_by_rule,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issue_count == 0
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
    fn test_parse_rule_expression() {
        let set = RuleSet::parse(&[("amount", "required|numeric|min:0|max:1")]).unwrap();
        assert_eq!(
            set.get("amount").unwrap(),
            &[Rule::Required, Rule::Numeric, Rule::Min(0.0), Rule::Max(1.0)]
        );
    }

    #[test]
    fn test_parse_rejects_unknown_rule() {
        let err = RuleSet::parse(&[("amount", "required|decimal")]).unwrap_err();
        assert!(matches!(err, RuleParseError::UnknownRule { .. }));

        let err = RuleSet::parse(&[("amount", "min:abc")]).unwrap_err();
        assert!(matches!(err, RuleParseError::InvalidArgument { .. }));
    }

    #[test]
    fn test_required_rejects_blank() {
        assert!(!Rule::Required.check(None));
        assert!(!Rule::Required.check(Some(&json!(null))));
        assert!(!Rule::Required.check(Some(&json!("  "))));
        assert!(Rule::Required.check(Some(&json!(0))));
    }

    #[test]
    fn test_optional_rules_skip_missing_values() {
        assert!(Rule::Numeric.check(None));
        assert!(Rule::Email.check(Some(&json!(null))));
        assert!(Rule::Positive.check(None));
    }

    #[test]
    fn test_value_rules() {
        assert!(Rule::Numeric.check(Some(&json!("3.5"))));
        assert!(!Rule::Numeric.check(Some(&json!("x"))));
        assert!(Rule::Positive.check(Some(&json!(1))));
        assert!(!Rule::Positive.check(Some(&json!(0))));
        assert!(Rule::Min(0.0).check(Some(&json!(0))));
        assert!(!Rule::Max(1.0).check(Some(&json!(1.5))));
        assert!(Rule::Email.check(Some(&json!("a.b@example.com"))));
        assert!(!Rule::Email.check(Some(&json!("not-an-email"))));
        assert!(Rule::Date.check(Some(&json!("2024-01-31"))));
        assert!(!Rule::Date.check(Some(&json!("2024-13-31"))));
        assert!(Rule::String.check(Some(&json!("x"))));
        assert!(!Rule::String.check(Some(&json!(5))));
    }

    #[test]
    fn test_non_finite_strings_fail_numeric_rules() {
        for raw in ["NaN", "inf", "infinity", "-inf"] {
            let value = json!(raw);
            assert!(!Rule::Numeric.check(Some(&value)), "{} 不应视为数值", raw);
            assert!(!Rule::Min(0.0).check(Some(&value)));
            assert!(!Rule::Max(1.0).check(Some(&value)));
        }
    }

    #[test]
    fn test_check_record_one_issue_per_failed_rule() {
        let set = RuleSet::parse(&[
            ("order_id", "required|string"),
            ("amount", "numeric|positive|max:100"),
        ])
        .unwrap();

        let ok = record(json!({"order_id": "O1", "amount": 10}));
        assert!(set.check_record(&ok, 0).is_empty());

        // 非数值: numeric / positive / max 三条全部失败
        let bad = record(json!({"order_id": "O2", "amount": "abc"}));
        let issues = set.check_record(&bad, 1);
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().all(|i| i.record_id == "O2" && i.field == "amount"));

        let missing = record(json!({"amount": 5}));
        let issues = set.check_record(&missing, 7);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule, "required");
        assert_eq!(issues[0].record_id, "row:7");
    }

    #[test]
    fn test_quality_report_summary() {
        let set = RuleSet::parse(&[("email", "required|email")]).unwrap();
        let records = vec![
            record(json!({"user_id": "U1", "email": "bad"})),
            record(json!({"user_id": "U2"})),
            record(json!({"user_id": "U3", "email": "ok@example.com"})),
        ];
        let issues: Vec<_> = records
            .iter()
            .enumerate()
            .flat_map(|(i, r)| set.check_record(r, i))
            .collect();

        let report = DataQualityReport::from_issues(records.len(), &issues);
        assert_eq!(report.issue_count, 2);
        assert_eq!(report.records_with_issues, 2);
        assert_eq!(report.issues_by_rule.get("email"), Some(&1));
        assert_eq!(report.issues_by_rule.get("required"), Some(&1));
        assert!(!report.is_clean());
    }
}
