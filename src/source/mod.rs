// ==========================================
// 交易数仓分层引擎 - 数据源抽取
// ==========================================
// 职责: 按数据源名称 + 等值过滤条件返回原始行
// 约定: 未知数据源返回空序列,不报错
// 实现者: InMemorySource, FileSource
// ==========================================

pub mod error;
pub mod file;
pub mod memory;

use crate::domain::record::{Record, RecordExt};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use error::{SourceError, SourceResult};
pub use file::FileSource;
pub use memory::InMemorySource;

/// 等值过滤条件（字段 -> 期望值）,按键有序
pub type Filters = BTreeMap<String, String>;

// ==========================================
// SourceExtractor Trait
// ==========================================
#[async_trait]
pub trait SourceExtractor: Send + Sync {
    /// 抽取数据源中满足全部过滤条件的行
    ///
    /// # 返回
    /// - Ok(vec![]): 数据源不存在
    /// - Err: 读取失败（文件损坏、I/O 等）
    async fn extract(&self, source: &str, filters: &Filters) -> SourceResult<Vec<Record>>;
}

/// 记录是否满足全部等值过滤条件
///
/// 数值字段按文本形式比较（`7` 等于 `"7"`）
pub fn matches_filters(record: &Record, filters: &Filters) -> bool {
    filters
        .iter()
        .all(|(field, expected)| record.text(field).as_deref() == Some(expected.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matches_filters() {
        let record = json!({"status": "completed", "quantity": 7})
            .as_object()
            .cloned()
            .unwrap();

        let mut filters = Filters::new();
        assert!(matches_filters(&record, &filters));

        filters.insert("status".to_string(), "completed".to_string());
        filters.insert("quantity".to_string(), "7".to_string());
        assert!(matches_filters(&record, &filters));

        filters.insert("currency".to_string(), "USD".to_string());
        assert!(!matches_filters(&record, &filters));
    }
}
