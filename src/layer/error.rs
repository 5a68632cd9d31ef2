// ==========================================
// 交易数仓分层引擎 - 分层加工错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 单条记录的结构性失败,不中断整批
// ==========================================

use crate::domain::record::{record_id, Record};
use crate::domain::validation::RuleParseError;
use thiserror::Error;

/// 分层加工错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayerError {
    // ===== 记录级错误 =====
    #[error("字段缺失 (记录 {record_id}, 字段 {field})")]
    MissingField { record_id: String, field: String },

    #[error("字段值非法 (记录 {record_id}, 字段 {field}): {message}")]
    InvalidField {
        record_id: String,
        field: String,
        message: String,
    },

    #[error("未知记录类型 (记录 {record_id}): {record_type}")]
    UnknownRecordType {
        record_id: String,
        record_type: String,
    },

    // ===== 构造期错误 =====
    #[error("校验规则解析失败: {0}")]
    RuleParse(#[from] RuleParseError),
}

impl LayerError {
    pub fn missing_field(record: &Record, field: &str) -> Self {
        LayerError::MissingField {
            record_id: record_id(record, None),
            field: field.to_string(),
        }
    }

    pub fn invalid_field(record: &Record, field: &str, message: impl Into<String>) -> Self {
        LayerError::InvalidField {
            record_id: record_id(record, None),
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn unknown_record_type(record: &Record, record_type: &str) -> Self {
        LayerError::UnknownRecordType {
            record_id: record_id(record, None),
            record_type: record_type.to_string(),
        }
    }

    /// 出错记录标识（构造期错误无记录）
    pub fn record_id(&self) -> Option<&str> {
        match self {
            LayerError::MissingField { record_id, .. }
            | LayerError::InvalidField { record_id, .. }
            | LayerError::UnknownRecordType { record_id, .. } => Some(record_id),
            LayerError::RuleParse(_) => None,
        }
    }
}

/// Result 类型别名
pub type LayerResult<T> = Result<T, LayerError>;
