// ==========================================
// 交易数仓分层引擎 - 编排层
// ==========================================
// 职责: 串联四层并汇总批次结果
// ==========================================

pub mod error;
pub mod orchestrator;

pub use error::{PipelineError, PipelineResult};
pub use orchestrator::{EtlOrchestrator, EtlRunSummary, LayerRunStats, RunStatus};
