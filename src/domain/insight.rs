// ==========================================
// 交易数仓分层引擎 - 告警与建议
// ==========================================
// 职责: ADS 层嵌套输出结构（序列化为 JSON 存入记录）
// ==========================================

use crate::domain::types::{AlertSeverity, Priority};
use serde::{Deserialize, Serialize};

/// 告警条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub metric: String,
    pub value: f64,
}

impl Alert {
    pub fn new(
        alert_type: &str,
        severity: AlertSeverity,
        metric: &str,
        value: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type: alert_type.to_string(),
            message: message.into(),
            severity,
            metric: metric.to_string(),
            value,
        }
    }
}

/// 建议条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub priority: Priority,
    pub action: String,
    pub description: String,
    pub expected_impact: String,
}

impl Recommendation {
    pub fn new(
        category: &str,
        priority: Priority,
        action: &str,
        description: &str,
        expected_impact: &str,
    ) -> Self {
        Self {
            category: category.to_string(),
            priority,
            action: action.to_string(),
            description: description.to_string(),
            expected_impact: expected_impact.to_string(),
        }
    }
}

/// 分层行动计划（立即 / 短期 / 长期）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub immediate: Vec<String>,
    pub short_term: Vec<String>,
    pub long_term: Vec<String>,
}

impl ActionPlan {
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.short_term.is_empty() && self.long_term.is_empty()
    }
}
