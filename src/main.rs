// ==========================================
// 交易数仓分层引擎 - 命令行入口
// ==========================================
// 用法: trade-etl <source_dir> [db_path] [daily|weekly|monthly]
// - source_dir: 含 orders/users/products/inventory 的 .csv 或 .xlsx
// - db_path: 缺省为用户数据目录下的 trade_etl.db
// - 汇总周期缺省读取 config_kv
// 输出: 批次摘要 JSON（stdout）
// ==========================================

use anyhow::{anyhow, Context};
use std::sync::Arc;
use trade_etl::config::{get_default_db_path, ConfigManager};
use trade_etl::{
    logging, AggregationPeriod, EtlOrchestrator, FileSource, Filters, RunStatus,
    SqliteLayerStore, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let source_dir = args
        .next()
        .ok_or_else(|| anyhow!("用法: trade-etl <source_dir> [db_path] [daily|weekly|monthly]"))?;
    let db_path = args.next().unwrap_or_else(get_default_db_path);
    let period = args
        .next()
        .map(|p| p.parse::<AggregationPeriod>().map_err(|e| anyhow!(e)))
        .transpose()?;

    tracing::info!("==================================================");
    tracing::info!("{} v{}", trade_etl::APP_NAME, trade_etl::VERSION);
    tracing::info!("数据源目录: {}", source_dir);
    tracing::info!("使用数据库: {}", db_path);
    tracing::info!("==================================================");

    let config = ConfigManager::new(&db_path)
        .and_then(|m| m.load())
        .context("加载加工参数失败")?;
    let store = SqliteLayerStore::new(&db_path).context("打开数据库失败")?;

    let orchestrator = EtlOrchestrator::new(
        Arc::new(SystemClock),
        Arc::new(FileSource::new(&source_dir)),
        Arc::new(store),
        config,
    )
    .context("初始化分层引擎失败")?;

    let summary = orchestrator.run_full_etl(&Filters::new(), period).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.status == RunStatus::Failed {
        return Err(anyhow!(
            "批次 {} 失败: {}",
            summary.batch_id,
            summary.error_message.unwrap_or_default()
        ));
    }
    Ok(())
}
