// ==========================================
// 交易数仓分层引擎 - 内存数据源
// ==========================================
// 用途: 测试与嵌入式调用,预先登记每个数据源的行
// ==========================================

use crate::domain::record::Record;
use crate::source::error::SourceResult;
use crate::source::{matches_filters, Filters, SourceExtractor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemorySource {
    sources: RwLock<HashMap<String, Vec<Record>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记（追加）数据源行
    pub fn with_rows(self, source: &str, rows: Vec<Record>) -> Self {
        self.insert(source, rows);
        self
    }

    pub fn insert(&self, source: &str, rows: Vec<Record>) {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        sources.entry(source.to_string()).or_default().extend(rows);
    }

    pub fn source_names(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = sources.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl SourceExtractor for InMemorySource {
    async fn extract(&self, source: &str, filters: &Filters) -> SourceResult<Vec<Record>> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        let rows = match sources.get(source) {
            Some(rows) => rows
                .iter()
                .filter(|row| matches_filters(row, filters))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_extract_with_filters() {
        let source = InMemorySource::new().with_rows(
            "orders",
            vec![
                row(json!({"order_id": "O1", "status": "completed"})),
                row(json!({"order_id": "O2", "status": "cancelled"})),
            ],
        );

        let mut filters = Filters::new();
        filters.insert("status".to_string(), "completed".to_string());

        let rows = source.extract("orders", &filters).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["order_id"], json!("O1"));
    }

    #[tokio::test]
    async fn test_unknown_source_is_empty() {
        let source = InMemorySource::new();
        let rows = source.extract("nothing", &Filters::new()).await.unwrap();
        assert!(rows.is_empty());
    }
}
