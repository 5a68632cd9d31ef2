// ==========================================
// 交易数仓分层引擎 - 存储层
// ==========================================
// 职责: 按 schema 建表建索引,按 record_type 路由落库
// 红线: 不含加工逻辑,只负责数据访问
// ==========================================

pub mod error;
pub mod sqlite_store;

use crate::domain::record::Record;
use crate::domain::schema::{IndexDescriptor, SchemaDescriptor};

pub use error::{RepositoryError, RepositoryResult};
pub use sqlite_store::SqliteLayerStore;

/// SCD2 旧版本关闭指令: 业务键当前行置 effective_to / is_current = false
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionClosure {
    pub table: String,
    pub key_field: String,
    pub key: String,
    pub effective_to: String,
}

// ==========================================
// LayerStore Trait
// ==========================================
// 实现者: SqliteLayerStore
pub trait LayerStore: Send + Sync {
    /// 按表结构与索引建议创建存储（幂等）
    fn provision(&self, schema: &SchemaDescriptor, indexes: &IndexDescriptor)
        -> RepositoryResult<()>;

    /// 持久化一批记录（单事务）
    ///
    /// # 返回
    /// - Ok(n): 写入行数
    /// - Err: 任一记录无法路由或写入时整批回滚
    fn persist(&self, records: &[Record]) -> RepositoryResult<usize> {
        self.persist_versioned(&[], records)
    }

    /// 先关闭维度旧版本,再写入记录（同一事务）
    ///
    /// # 返回
    /// - Ok(n): 写入行数（不含被关闭的行）
    fn persist_versioned(
        &self,
        closures: &[VersionClosure],
        records: &[Record],
    ) -> RepositoryResult<usize>;

    /// 维度表中指定业务键的当前版本（is_current = true,每键至多一行）
    fn current_versions(
        &self,
        table: &str,
        key_field: &str,
        keys: &[String],
    ) -> RepositoryResult<Vec<Record>>;

    /// 表行数
    fn row_count(&self, table: &str) -> RepositoryResult<i64>;
}
