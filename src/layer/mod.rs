// ==========================================
// 交易数仓分层引擎 - 分层契约
// ==========================================
// 职责: 定义每个加工层的统一接口
// - schema / indexes / validation_rules: 声明式元数据
// - transform: 层内唯一的专属算法（输入不可变,返回新记录）
// - validate_data_quality: 共享的质量报告流程（只报告,不拦截）
// 顺序: ODS → DWD → DWS → ADS,由编排器串联
// ==========================================

pub mod ads;
pub mod batch;
pub mod dwd;
pub mod dws;
pub mod error;
pub mod ods;

use crate::domain::record::{Record, RECORD_TYPE_FIELD};
use crate::domain::schema::{IndexDescriptor, SchemaDescriptor};
use crate::domain::validation::{RuleSet, ValidationIssue};
use error::{LayerError, LayerResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// 重导出各层
pub use ads::ApplicationLayer;
pub use batch::generate_batch_id;
pub use dwd::CleanedLayer;
pub use dws::AggregatedLayer;
pub use ods::{RawLayer, SourceQuery};

// ==========================================
// LayerKind - 层标识
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayerKind {
    Ods, // 原始层
    Dwd, // 明细层
    Dws, // 汇总层
    Ads, // 应用层
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Ods => write!(f, "ODS"),
            LayerKind::Dwd => write!(f, "DWD"),
            LayerKind::Dws => write!(f, "DWS"),
            LayerKind::Ads => write!(f, "ADS"),
        }
    }
}

// ==========================================
// TransformOutcome - 加工结果
// ==========================================
// 单条记录失败进入 failures,不影响同批其他记录
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub records: Vec<Record>,
    pub failures: Vec<LayerError>,
}

impl TransformOutcome {
    /// 汇总逐条加工结果（每条输入可产出 0..n 条记录）
    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = LayerResult<Vec<Record>>>,
    {
        let mut outcome = Self::default();
        for result in results {
            match result {
                Ok(mut records) => outcome.records.append(&mut records),
                Err(e) => outcome.failures.push(e),
            }
        }
        outcome
    }

    pub fn extend(&mut self, other: TransformOutcome) {
        self.records.extend(other.records);
        self.failures.extend(other.failures);
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

// ==========================================
// Layer Trait
// ==========================================
pub trait Layer: Send + Sync {
    fn kind(&self) -> LayerKind;

    /// 表结构（表名 -> 列名 -> 声明类型）
    fn schema(&self) -> &SchemaDescriptor;

    /// 索引建议
    fn indexes(&self) -> &IndexDescriptor;

    /// 字段校验规则
    fn validation_rules(&self) -> &RuleSet;

    /// 层专属加工
    ///
    /// 输入记录不会被修改；批次号与时间字段以外,相同输入得到相同输出
    fn transform(&self, records: &[Record]) -> TransformOutcome;

    /// 数据质量校验
    ///
    /// # 说明
    /// - 每条记录对每条规则求值,每个失败规则追加一条问题
    /// - 只报告,不中断记录或批次
    fn validate_data_quality(&self, records: &[Record]) -> Vec<ValidationIssue> {
        let rules = self.validation_rules();
        let issues: Vec<ValidationIssue> = records
            .iter()
            .enumerate()
            .flat_map(|(index, record)| rules.check_record(record, index))
            .collect();

        if !issues.is_empty() {
            tracing::debug!(
                layer = %self.kind(),
                records = records.len(),
                issues = issues.len(),
                "数据质量校验发现问题"
            );
        }
        issues
    }
}

// ==========================================
// 记录构造辅助
// ==========================================

/// 新建带 record_type 的空记录
pub(crate) fn new_record(record_type: &str) -> Record {
    let mut record = Record::new();
    record.insert(RECORD_TYPE_FIELD.to_string(), Value::from(record_type));
    record
}

/// 追加批次追踪字段
pub(crate) fn stamp_batch(record: &mut Record, batch_id: &str, etl_time: &str) {
    record.insert("batch_id".to_string(), Value::from(batch_id));
    record.insert("etl_time".to_string(), Value::from(etl_time));
}

/// 可选字符串 -> JSON 值
pub(crate) fn opt_value(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}
