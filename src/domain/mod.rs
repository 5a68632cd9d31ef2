// ==========================================
// 交易数仓分层引擎 - 领域模型层
// ==========================================
// 职责: 记录、表结构、校验规则、领域枚举
// 红线: 不含加工逻辑,不含存储逻辑
// ==========================================

pub mod insight;
pub mod record;
pub mod schema;
pub mod types;
pub mod validation;

// 重导出核心类型
pub use insight::{ActionPlan, Alert, Recommendation};
pub use record::{parse_date, record_id, Record, RecordExt, RECORD_TYPE_FIELD};
pub use schema::{IndexDescriptor, SchemaDescriptor};
pub use types::{
    AggregationPeriod, AlertSeverity, CustomerSegment, LoyaltyTier, PerformanceGrade, Priority,
    RfmSegment, RiskLevel, SalesVelocity, Season, TrendIndicator,
};
pub use validation::{DataQualityReport, Rule, RuleParseError, RuleSet, ValidationIssue};
