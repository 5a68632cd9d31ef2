// ==========================================
// 交易数仓分层引擎 - 编排错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 批次级失败（抽取 / 建表 / 落库 / 层构造）
// ==========================================

use crate::layer::error::LayerError;
use crate::layer::LayerKind;
use crate::repository::error::RepositoryError;
use crate::source::error::SourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("分层构造失败: {0}")]
    Layer(#[from] LayerError),

    #[error("数据源抽取失败: {0}")]
    Source(#[from] SourceError),

    #[error("存储失败: {0}")]
    Repository(#[from] RepositoryError),

    #[error("{layer} 层落库失败: {source}")]
    Persist {
        layer: LayerKind,
        #[source]
        source: RepositoryError,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type PipelineResult<T> = Result<T, PipelineError>;
