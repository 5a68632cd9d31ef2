// ==========================================
// 交易数仓分层引擎 - SQLite 分层存储
// ==========================================
// 职责:
// - provision: CREATE TABLE / CREATE INDEX IF NOT EXISTS
// - persist: 按 record_type 路由,单事务写入
// - SCD2: 同一事务内先关闭旧版本再写入新版本
// 说明:
// - 未在 schema 中声明的字段忽略
// - 嵌套值（告警 / 建议 / 行动计划）以 JSON 文本存储
// - 布尔值存为 0/1
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::record::{Record, RecordExt};
use crate::domain::schema::{IndexDescriptor, SchemaDescriptor};
use crate::perf::install_sqlite_tracing;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{LayerStore, VersionClosure};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub struct SqliteLayerStore {
    conn: Arc<Mutex<Connection>>,
    // 已建表 -> 列名（声明顺序）
    tables: Mutex<HashMap<String, Vec<String>>>,
}

impl SqliteLayerStore {
    /// 打开数据库文件
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let mut conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        install_sqlite_tracing(&mut conn);
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 内存数据库（测试用）
    pub fn in_memory() -> RepositoryResult<Self> {
        Self::new(":memory:")
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            tables: Mutex::new(HashMap::new()),
        }
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn get_tables(&self) -> RepositoryResult<MutexGuard<'_, HashMap<String, Vec<String>>>> {
        self.tables
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 已建表的列名
    pub fn columns(&self, table: &str) -> RepositoryResult<Vec<String>> {
        self.get_tables()?
            .get(table)
            .cloned()
            .ok_or_else(|| RepositoryError::UnknownTable(table.to_string()))
    }

    /// 读取整表（按写入顺序）,供检查与测试
    pub fn load_records(&self, table: &str) -> RepositoryResult<Vec<Record>> {
        let columns = self.columns(table)?;
        let conn = self.get_conn()?;

        let column_list = columns
            .iter()
            .map(|c| quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY row_id",
            column_list,
            quote(table)
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| read_record(row, &columns))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

impl LayerStore for SqliteLayerStore {
    fn provision(
        &self,
        schema: &SchemaDescriptor,
        indexes: &IndexDescriptor,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let mut tables = self.get_tables()?;

        for (table, columns) in schema.tables() {
            check_identifier(table)?;
            let mut defs = vec!["row_id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
            for (column, column_type) in columns {
                check_identifier(column)?;
                defs.push(format!("{} {}", quote(column), column_type));
            }
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} ({});",
                quote(table),
                defs.join(", ")
            ))?;
            tables.insert(table.to_string(), columns.keys().cloned().collect());
        }

        for (table, table_indexes) in indexes.tables() {
            if !tables.contains_key(table) {
                return Err(RepositoryError::UnknownTable(table.to_string()));
            }
            for (name, column_list) in table_indexes {
                check_identifier(name)?;
                let cols = column_list
                    .split(',')
                    .map(|c| {
                        let c = c.trim();
                        check_identifier(c).map(|_| quote(c))
                    })
                    .collect::<RepositoryResult<Vec<_>>>()?;
                conn.execute_batch(&format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
                    quote(name),
                    quote(table),
                    cols.join(", ")
                ))?;
            }
        }

        debug!(tables = schema.table_names().len(), "存储表结构已就绪");
        Ok(())
    }

    fn persist_versioned(
        &self,
        closures: &[VersionClosure],
        records: &[Record],
    ) -> RepositoryResult<usize> {
        if closures.is_empty() && records.is_empty() {
            return Ok(0);
        }

        // 加锁顺序与 provision 一致: conn → tables
        let mut conn = self.get_conn()?;
        let tables = self.get_tables()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let mut closed = 0usize;
        for closure in closures {
            if !tables.contains_key(&closure.table) {
                return Err(RepositoryError::UnknownTable(closure.table.clone()));
            }
            check_identifier(&closure.key_field)?;
            let sql = format!(
                "UPDATE {} SET effective_to = ?1, is_current = 0 WHERE {} = ?2 AND is_current = 1",
                quote(&closure.table),
                quote(&closure.key_field)
            );
            let mut stmt = tx.prepare_cached(&sql)?;
            closed += stmt.execute(params![closure.effective_to, closure.key])?;
        }

        let mut written = 0usize;
        for (idx, record) in records.iter().enumerate() {
            let table = record
                .record_type()
                .ok_or(RepositoryError::MissingRecordType(idx))?;
            let columns = tables
                .get(table)
                .ok_or_else(|| RepositoryError::UnknownTable(table.to_string()))?;

            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(table),
                columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
                vec!["?"; columns.len()].join(", ")
            );
            let values = columns.iter().map(|c| to_sql(record.get(c)));

            let mut stmt = tx.prepare_cached(&sql)?;
            written += stmt.execute(params_from_iter(values))?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        debug!(rows = written, closed, "批次记录已落库");
        Ok(written)
    }

    fn current_versions(
        &self,
        table: &str,
        key_field: &str,
        keys: &[String],
    ) -> RepositoryResult<Vec<Record>> {
        let columns = self.columns(table)?;
        check_identifier(key_field)?;
        let conn = self.get_conn()?;

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 AND is_current = 1 ORDER BY row_id DESC LIMIT 1",
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            quote(table),
            quote(key_field)
        );
        let mut stmt = conn.prepare_cached(&sql)?;

        let mut records = Vec::new();
        for key in keys {
            let mut rows = stmt.query_map([key], |row| read_record(row, &columns))?;
            if let Some(row) = rows.next() {
                records.push(row?);
            }
        }
        Ok(records)
    }

    fn row_count(&self, table: &str) -> RepositoryResult<i64> {
        check_identifier(table)?;
        let conn = self.get_conn()?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote(table)),
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count)
    }
}

// ==========================================
// 值转换 / 标识符
// ==========================================

fn check_identifier(name: &str) -> RepositoryResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RepositoryError::InvalidIdentifier(name.to_string()))
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

fn to_sql(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(nested @ (Value::Array(_) | Value::Object(_))) => SqlValue::Text(nested.to_string()),
    }
}

fn read_record(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Record> {
    let mut record = Record::new();
    for (idx, column) in columns.iter().enumerate() {
        record.insert(column.clone(), from_sql(row.get_ref(idx)?));
    }
    Ok(record)
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}
