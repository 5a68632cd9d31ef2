// ==========================================
// 交易数仓分层引擎 - 表结构描述
// ==========================================
// 职责: 表名 -> (列名 -> 声明类型) / 表名 -> (索引名 -> 列清单)
// 说明: 供存储协作方建表,不在对象层面强制类型
// ==========================================

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 表结构描述（构造后不可变）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    tables: IndexMap<String, IndexMap<String, String>>,
}

impl SchemaDescriptor {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &IndexMap<String, String>)> {
        self.tables.iter().map(|(t, c)| (t.as_str(), c))
    }

    pub fn table(&self, name: &str) -> Option<&IndexMap<String, String>> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}

/// 表结构构建器
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: IndexMap<String, IndexMap<String, String>>,
}

impl SchemaBuilder {
    pub fn table(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
        let cols = columns
            .iter()
            .map(|(c, t)| (c.to_string(), t.to_string()))
            .collect();
        self.tables.insert(name.to_string(), cols);
        self
    }

    pub fn build(self) -> SchemaDescriptor {
        SchemaDescriptor {
            tables: self.tables,
        }
    }
}

/// 索引描述（对存储方仅为建议）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    tables: IndexMap<String, IndexMap<String, String>>,
}

impl IndexDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, indexes: &[(&str, &str)]) -> Self {
        let idx = indexes
            .iter()
            .map(|(n, c)| (n.to_string(), c.to_string()))
            .collect();
        self.tables.insert(table.to_string(), idx);
        self
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &IndexMap<String, String>)> {
        self.tables.iter().map(|(t, i)| (t.as_str(), i))
    }

    pub fn table(&self, name: &str) -> Option<&IndexMap<String, String>> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_keeps_declaration_order() {
        let schema = SchemaDescriptor::builder()
            .table("b_table", &[("z", "TEXT"), ("a", "DECIMAL(12,2)")])
            .table("a_table", &[("id", "VARCHAR(50)")])
            .build();

        assert_eq!(schema.table_names(), vec!["b_table", "a_table"]);
        let cols: Vec<_> = schema.table("b_table").unwrap().keys().cloned().collect();
        assert_eq!(cols, vec!["z", "a"]);
        assert!(schema.contains_table("a_table"));
        assert!(!schema.contains_table("c_table"));
    }

    #[test]
    fn test_index_descriptor() {
        let idx = IndexDescriptor::new().with_table("t", &[("idx_t_a", "a, b")]);
        assert_eq!(idx.table("t").unwrap().get("idx_t_a").unwrap(), "a, b");
        assert!(idx.table("missing").is_none());
    }
}
