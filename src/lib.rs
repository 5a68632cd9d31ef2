// ==========================================
// 交易数仓分层引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 分层: ODS (原始) → DWD (明细) → DWS (汇总) → ADS (应用)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录、表结构、校验规则、枚举
pub mod domain;

// 引擎层 - 纯指标算法
pub mod engine;

// 分层契约与四层实现
pub mod layer;

// 数据源抽取
pub mod source;

// 存储层 - 数据访问
pub mod repository;

// 配置层 - 加工参数
pub mod config;

// 编排层 - 全链路加工
pub mod pipeline;

// 时钟
pub mod clock;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 性能统计
pub mod perf;

// ==========================================
// 重导出核心类型
// ==========================================

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigManager, EtlConfig};
pub use domain::{
    AggregationPeriod, DataQualityReport, IndexDescriptor, Record, RecordExt, RiskLevel,
    SchemaDescriptor, ValidationIssue,
};
pub use layer::{
    AggregatedLayer, ApplicationLayer, CleanedLayer, Layer, LayerKind, RawLayer,
    TransformOutcome,
};
pub use pipeline::{EtlOrchestrator, EtlRunSummary, PipelineError, RunStatus};
pub use repository::{LayerStore, SqliteLayerStore, VersionClosure};
pub use source::{FileSource, Filters, InMemorySource, SourceExtractor};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "交易数仓分层引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
