// ==========================================
// 交易数仓分层引擎 - 配置层
// ==========================================
// 职责: 加工参数定义与 config_kv 覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod etl_config;
pub mod paths;

pub use config_manager::{config_keys, ConfigManager};
pub use etl_config::EtlConfig;
pub use paths::get_default_db_path;
