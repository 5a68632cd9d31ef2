// ==========================================
// 交易数仓分层引擎 - 配置管理器
// ==========================================
// 职责: 加工参数的加载、查询、覆写
// 存储: config_kv 表 (key -> JSON 值)
// 说明: 缺失或格式错误的键回退默认值
// ==========================================

use crate::config::etl_config::EtlConfig;
use crate::db::{configure_sqlite_connection, open_sqlite_connection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Self::from_connection(Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明: 会对传入连接再次应用统一 PRAGMA（幂等）,并确保 config_kv 存在。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
            guard.execute_batch(
                "CREATE TABLE IF NOT EXISTS config_kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );",
            )?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取原始配置值
    ///
    /// # 返回
    /// - Some(String): 配置值（JSON 文本）
    /// - None: 配置不存在
    pub fn get_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入配置值（JSON 序列化后覆盖）
    pub fn set_value<T: Serialize>(&self, key: &str, value: &T) -> RepositoryResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| RepositoryError::ValueFormatError {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, raw],
        )?;
        Ok(())
    }

    /// 读取并解析单个键
    ///
    /// 格式错误时告警并视为未配置
    fn get_parsed<T: DeserializeOwned>(&self, key: &str) -> RepositoryResult<Option<T>> {
        let raw = match self.get_value(key)? {
            Some(v) => v,
            None => return Ok(None),
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                warn!(config_key = key, raw_value = %raw, error = %e, "配置格式错误,使用默认值");
                Ok(None)
            }
        }
    }

    /// 所有配置的快照（key -> 原始值）
    pub fn snapshot(&self) -> RepositoryResult<BTreeMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut map = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// 加载加工参数（覆写 + 默认值）
    pub fn load(&self) -> RepositoryResult<EtlConfig> {
        let mut config = EtlConfig::default();

        if let Some(rates) = self.get_parsed::<BTreeMap<String, f64>>(config_keys::CURRENCY_RATES)? {
            // 覆写按币种合并,未覆写的币种保留默认汇率
            config.currency_rates.extend(rates);
        }
        if let Some(holidays) = self.get_parsed(config_keys::HOLIDAYS)? {
            config.holidays = holidays;
        }
        if let Some(days) = self.get_parsed::<f64>(config_keys::DEFAULT_ORDER_FREQUENCY_DAYS)? {
            if days > 0.0 {
                config.default_order_frequency_days = days;
            }
        }
        if let Some(period) = self.get_parsed(config_keys::AGGREGATION_PERIOD)? {
            config.aggregation_period = period;
        }
        if let Some(block) = self.get_parsed(config_keys::BLOCK_ON_VALIDATION_ISSUES)? {
            config.block_on_validation_issues = block;
        }
        if let Some(horizon) = self.get_parsed(config_keys::FORECAST_HORIZON)? {
            config.forecast_horizon = horizon;
        }

        Ok(config)
    }
}

/// 配置键
pub mod config_keys {
    pub const CURRENCY_RATES: &str = "currency_rates"; // {"USD": 7.2, ...}
    pub const HOLIDAYS: &str = "holidays"; // ["01-01", ...]
    pub const DEFAULT_ORDER_FREQUENCY_DAYS: &str = "default_order_frequency_days";
    pub const AGGREGATION_PERIOD: &str = "aggregation_period";
    pub const BLOCK_ON_VALIDATION_ISSUES: &str = "block_on_validation_issues";
    pub const FORECAST_HORIZON: &str = "forecast_horizon";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AggregationPeriod;

    fn manager() -> ConfigManager {
        ConfigManager::new(":memory:").unwrap()
    }

    #[test]
    fn test_load_defaults_when_empty() {
        let config = manager().load().unwrap();
        assert_eq!(config, EtlConfig::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let mgr = manager();
        let mut rates = BTreeMap::new();
        rates.insert("GBP".to_string(), 9.1);
        mgr.set_value(config_keys::CURRENCY_RATES, &rates).unwrap();
        mgr.set_value(config_keys::AGGREGATION_PERIOD, &AggregationPeriod::Weekly)
            .unwrap();
        mgr.set_value(config_keys::BLOCK_ON_VALIDATION_ISSUES, &true)
            .unwrap();

        let config = mgr.load().unwrap();
        assert_eq!(config.currency_rates.get("GBP"), Some(&9.1));
        assert_eq!(config.currency_rates.get("USD"), Some(&7.2));
        assert_eq!(config.aggregation_period, AggregationPeriod::Weekly);
        assert!(config.block_on_validation_issues);
    }

    #[test]
    fn test_set_value_overwrites() {
        let mgr = manager();
        mgr.set_value(config_keys::FORECAST_HORIZON, &5).unwrap();
        mgr.set_value(config_keys::FORECAST_HORIZON, &7).unwrap();
        assert_eq!(
            mgr.get_value(config_keys::FORECAST_HORIZON).unwrap(),
            Some("7".to_string())
        );
        assert_eq!(mgr.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_value_falls_back() {
        let mgr = manager();
        {
            let conn = mgr.get_conn().unwrap();
            conn.execute(
                "INSERT INTO config_kv (key, value) VALUES (?1, ?2)",
                params![config_keys::FORECAST_HORIZON, "not-json"],
            )
            .unwrap();
        }
        assert_eq!(mgr.load().unwrap().forecast_horizon, 3);
    }
}
