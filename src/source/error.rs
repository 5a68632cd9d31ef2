// ==========================================
// 交易数仓分层引擎 - 数据源错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 数据源抽取错误类型
#[derive(Error, Debug)]
pub enum SourceError {
    // ===== 文件相关错误 =====
    #[error("文件格式不支持: {0}（仅支持 .csv/.xlsx）")]
    UnsupportedFormat(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParse(String),

    #[error("CSV 解析失败: {0}")]
    CsvParse(#[from] csv::Error),

    #[error("文件读取失败: {0}")]
    Io(#[from] std::io::Error),

    // ===== 运行时错误 =====
    #[error("抽取任务异常终止 (数据源 {source_name}): {message}")]
    Task {
        source_name: String,
        message: String,
    },
}

/// Result 类型别名
pub type SourceResult<T> = Result<T, SourceError>;
