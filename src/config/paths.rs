// ==========================================
// 交易数仓分层引擎 - 默认路径
// ==========================================

use std::path::PathBuf;

/// 默认数据库路径
///
/// 优先级: TRADE_ETL_DB_PATH > 用户数据目录 > ./trade_etl.db
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var("TRADE_ETL_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./trade_etl.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录,避免污染生产数据
        #[cfg(debug_assertions)]
        let dir = data_dir.join("trade-etl-dev");
        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("trade-etl");

        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("trade_etl.db");
        }
    }

    path.to_string_lossy().to_string()
}
