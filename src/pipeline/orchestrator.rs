// ==========================================
// 交易数仓分层引擎 - 全链路编排器
// ==========================================
// 职责: 建表 → 并发抽取 → ODS → DWD → DWS → ADS
// 每层: 加工 → 质量校验 → 落库 → 统计
// 红线:
// - 单条记录失败只计入 errors,批次继续
// - 抽取 / 建表 / 落库失败终止批次,状态 failed
// - 质量问题只告警;开启拦截时该层不落库,但仍向下游传递
// - DWD 维度按 SCD2 落库: 未变化跳过,变化时关闭旧版本
// ==========================================

use crate::clock::{format_timestamp, Clock};
use crate::config::EtlConfig;
use crate::domain::record::{Record, RecordExt};
use crate::domain::types::AggregationPeriod;
use crate::domain::validation::DataQualityReport;
use crate::layer::dwd::DIMENSION_KEYS;
use crate::layer::ods::SOURCE_TABLES;
use crate::layer::{
    generate_batch_id, AggregatedLayer, ApplicationLayer, CleanedLayer, Layer, LayerKind,
    RawLayer, TransformOutcome,
};
use crate::perf::StageTimer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::repository::{LayerStore, RepositoryResult, VersionClosure};
use crate::source::{Filters, SourceExtractor};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

// ==========================================
// 运行结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

/// 单层运行统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRunStats {
    pub layer: LayerKind,
    pub input: usize,
    pub output: usize,
    pub failures: usize,
    pub issues: usize,
    pub persisted: usize,
    pub quality: DataQualityReport,
}

/// 批次运行摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlRunSummary {
    pub batch_id: String,
    pub started_at: String,
    /// 抽取到的源数据行数
    pub records_processed: usize,
    /// 记录级加工失败数
    pub errors: usize,
    /// 质量问题数
    pub warnings: usize,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub layers: Vec<LayerRunStats>,
}

impl EtlRunSummary {
    fn new(batch_id: String, started_at: String) -> Self {
        Self {
            batch_id,
            started_at,
            records_processed: 0,
            errors: 0,
            warnings: 0,
            duration_ms: 0,
            status: RunStatus::Success,
            error_message: None,
            layers: Vec::new(),
        }
    }

    pub fn layer(&self, kind: LayerKind) -> Option<&LayerRunStats> {
        self.layers.iter().find(|s| s.layer == kind)
    }
}

// ==========================================
// EtlOrchestrator
// ==========================================
pub struct EtlOrchestrator {
    clock: Arc<dyn Clock>,
    store: Arc<dyn LayerStore>,
    config: EtlConfig,
    ods: RawLayer,
    dwd: CleanedLayer,
    dws: AggregatedLayer,
    ads: ApplicationLayer,
}

impl EtlOrchestrator {
    /// 按加工参数构造四层
    pub fn new(
        clock: Arc<dyn Clock>,
        extractor: Arc<dyn SourceExtractor>,
        store: Arc<dyn LayerStore>,
        config: EtlConfig,
    ) -> PipelineResult<Self> {
        let ods = RawLayer::new(Arc::clone(&clock), extractor)?;
        let dwd = CleanedLayer::with_settings(
            Arc::clone(&clock),
            config.currency_table(),
            config.date_generator(),
        )?;
        let dws = AggregatedLayer::with_settings(
            Arc::clone(&clock),
            config.aggregation_period,
            config.default_order_frequency_days,
        )?;
        let ads = ApplicationLayer::with_settings(Arc::clone(&clock), config.forecast_horizon)?;

        Ok(Self {
            clock,
            store,
            config,
            ods,
            dwd,
            dws,
            ads,
        })
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// 按执行顺序排列的四层
    pub fn layers(&self) -> [&dyn Layer; 4] {
        [&self.ods, &self.dwd, &self.dws, &self.ads]
    }

    /// 为全部层建表建索引（幂等）
    pub fn provision(&self) -> PipelineResult<()> {
        for layer in self.layers() {
            self.store.provision(layer.schema(), layer.indexes())?;
            debug!(layer = %layer.kind(), tables = layer.schema().table_names().len(), "存储已就绪");
        }
        Ok(())
    }

    /// 执行全链路加工
    ///
    /// # 参数
    /// - filters: 抽取过滤条件（对四个数据源一致生效）
    /// - period: 汇总周期,None 时使用配置
    ///
    /// # 返回
    /// 批次摘要;批次级失败体现为 status = failed,不以 Err 返回
    pub async fn run_full_etl(
        &self,
        filters: &Filters,
        period: Option<AggregationPeriod>,
    ) -> EtlRunSummary {
        let started = Instant::now();
        let batch_id = generate_batch_id(self.clock.as_ref());
        let period = period.unwrap_or(self.config.aggregation_period);
        let mut summary = EtlRunSummary::new(batch_id, format_timestamp(self.clock.now()));

        info!(
            batch_id = %summary.batch_id,
            period = %period,
            filters = filters.len(),
            "开始执行全链路加工"
        );

        match self.run_stages(filters, period, &mut summary).await {
            Ok(()) => {
                summary.status = if summary.errors > 0 {
                    RunStatus::Partial
                } else {
                    RunStatus::Success
                };
            }
            Err(e) => {
                error!(batch_id = %summary.batch_id, error = %e, "全链路加工失败");
                summary.status = RunStatus::Failed;
                summary.error_message = Some(e.to_string());
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            batch_id = %summary.batch_id,
            status = ?summary.status,
            records_processed = summary.records_processed,
            errors = summary.errors,
            warnings = summary.warnings,
            duration_ms = summary.duration_ms,
            "全链路加工结束"
        );
        summary
    }

    async fn run_stages(
        &self,
        filters: &Filters,
        period: AggregationPeriod,
        summary: &mut EtlRunSummary,
    ) -> PipelineResult<()> {
        // ==========================================
        // 步骤0: 建表建索引
        // ==========================================
        debug!("步骤0: 建表建索引");
        self.provision()?;

        // ==========================================
        // 步骤1: 并发抽取四个数据源
        // ==========================================
        debug!("步骤1: 并发抽取数据源");
        let extracted = join_all(
            SOURCE_TABLES
                .iter()
                .map(|(source, _)| self.ods.extract_from_source(source, filters)),
        )
        .await;

        let mut source_rows = Vec::new();
        for ((source, _), rows) in SOURCE_TABLES.iter().zip(extracted) {
            let rows = rows?;
            debug!(source = %source, rows = rows.len(), "数据源行数");
            source_rows.extend(rows);
        }
        summary.records_processed = source_rows.len();

        info!(rows = source_rows.len(), "数据源抽取完成");

        // ==========================================
        // 步骤2: ODS 落地
        // ==========================================
        debug!("步骤2: ODS 原始层落地");
        let outcome = self.ods.transform(&source_rows);
        let ods_records = self.finish_stage(&self.ods, source_rows.len(), outcome, summary, false)?;

        // ==========================================
        // 步骤3: DWD 清洗与维度建模
        // ==========================================
        debug!("步骤3: DWD 明细层清洗");
        let outcome = self.dwd.transform(&ods_records);
        let dwd_records = self.finish_stage(&self.dwd, ods_records.len(), outcome, summary, true)?;

        // ==========================================
        // 步骤4: DWS 周期汇总
        // ==========================================
        debug!("步骤4: DWS 汇总层聚合");
        let outcome = self.dws.aggregate(&dwd_records, period);
        let dws_records = self.finish_stage(&self.dws, dwd_records.len(), outcome, summary, false)?;

        // ==========================================
        // 步骤5: ADS 应用指标
        // ==========================================
        debug!("步骤5: ADS 应用层指标");
        let outcome = self.ads.transform(&dws_records);
        self.finish_stage(&self.ads, dws_records.len(), outcome, summary, false)?;

        Ok(())
    }

    /// 单层收尾: 质量校验 → 落库 → 统计
    ///
    /// versioned: 维度记录按 SCD2 落库;向下游传递的仍是本层完整输出
    fn finish_stage(
        &self,
        layer: &dyn Layer,
        input: usize,
        outcome: TransformOutcome,
        summary: &mut EtlRunSummary,
        versioned: bool,
    ) -> PipelineResult<Vec<Record>> {
        let kind = layer.kind();
        let mut timer = StageTimer::new("layer", kind);
        timer.set_records(input, outcome.records.len());

        for failure in &outcome.failures {
            warn!(layer = %kind, record_id = failure.record_id().unwrap_or("-"), error = %failure, "记录加工失败,已跳过");
        }

        let issues = layer.validate_data_quality(&outcome.records);
        let quality = DataQualityReport::from_issues(outcome.records.len(), &issues);

        let persisted = if self.config.block_on_validation_issues && !quality.is_clean() {
            warn!(
                layer = %kind,
                issues = quality.issue_count,
                "存在数据质量问题,本层不落库"
            );
            0
        } else if versioned {
            self.persist_dimension_versions(&outcome.records)
                .map_err(|source| PipelineError::Persist { layer: kind, source })?
        } else {
            self.store
                .persist(&outcome.records)
                .map_err(|source| PipelineError::Persist { layer: kind, source })?
        };

        let stats = LayerRunStats {
            layer: kind,
            input,
            output: outcome.records.len(),
            failures: outcome.failures.len(),
            issues: issues.len(),
            persisted,
            quality,
        };

        info!(
            layer = %kind,
            input = stats.input,
            output = stats.output,
            failures = stats.failures,
            issues = stats.issues,
            persisted = stats.persisted,
            "分层加工完成"
        );

        summary.errors += stats.failures;
        summary.warnings += stats.issues;
        summary.layers.push(stats);
        Ok(outcome.records)
    }

    /// DWD 落库: 读取批内业务键的当前版本 → 生成版本计划 → 单事务关闭旧版本并写入
    fn persist_dimension_versions(&self, records: &[Record]) -> RepositoryResult<usize> {
        let mut stored = Vec::new();
        for (table, key_field) in DIMENSION_KEYS {
            let keys: BTreeSet<String> = records
                .iter()
                .filter(|r| r.record_type() == Some(*table))
                .filter_map(|r| r.text(key_field))
                .collect();
            if keys.is_empty() {
                continue;
            }
            let keys: Vec<String> = keys.into_iter().collect();
            stored.extend(self.store.current_versions(table, key_field, &keys)?);
        }

        let plan = self.dwd.plan_versions(&stored, records);
        let closures: Vec<VersionClosure> = plan.closed.iter().filter_map(version_closure).collect();

        debug!(
            stored = stored.len(),
            closed = closures.len(),
            unchanged = plan.unchanged,
            "维度版本计划"
        );
        self.store.persist_versioned(&closures, &plan.records)
    }
}

/// 关闭后的维度版本 -> 存储层关闭指令
fn version_closure(closed: &Record) -> Option<VersionClosure> {
    let table = closed.record_type()?;
    let (_, key_field) = DIMENSION_KEYS.iter().find(|(t, _)| *t == table)?;
    Some(VersionClosure {
        table: table.to_string(),
        key_field: key_field.to_string(),
        key: closed.text(key_field)?,
        effective_to: closed.text("effective_to")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::domain::schema::{IndexDescriptor, SchemaDescriptor};
    use crate::repository::{RepositoryError, SqliteLayerStore};
    use crate::source::InMemorySource;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()))
    }

    fn source() -> Arc<InMemorySource> {
        Arc::new(
            InMemorySource::new()
                .with_rows(
                    "orders",
                    vec![
                        record(json!({"order_id": "O1", "user_id": "U1", "product_id": "P1",
                            "order_date": "2024-01-10", "quantity": 2, "unit_price": 50.0,
                            "currency": "USD", "status": "completed"})),
                        record(json!({"order_id": "O2", "user_id": "U1", "product_id": "P1",
                            "order_date": "2024-01-11", "quantity": 1, "unit_price": 50.0,
                            "currency": "USD", "status": "completed"})),
                    ],
                )
                .with_rows(
                    "users",
                    vec![record(json!({"user_id": "U1", "first_name": "Ada", "last_name": "Li",
                        "email": "ADA@EXAMPLE.COM", "country": "cn", "total_spent": 100.0,
                        "currency": "USD"}))],
                )
                .with_rows(
                    "products",
                    vec![record(json!({"product_id": "P1", "product_name": "Kettle", "price": 50.0,
                        "cost": 20.0, "currency": "USD", "category": "Home", "rating": 4.5}))],
                )
                .with_rows(
                    "inventory",
                    vec![record(json!({"product_id": "P1", "quantity_on_hand": 40, "reorder_point": 10,
                        "unit_cost": 20.0, "currency": "USD", "snapshot_date": "2024-01-31"}))],
                ),
        )
    }

    #[tokio::test]
    async fn test_run_full_etl_persists_every_layer() {
        let store = Arc::new(SqliteLayerStore::in_memory().unwrap());
        let orchestrator =
            EtlOrchestrator::new(clock(), source(), store.clone(), EtlConfig::default()).unwrap();

        let summary = orchestrator.run_full_etl(&Filters::new(), None).await;

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.records_processed, 5);
        assert_eq!(summary.layers.len(), 4);
        assert!(summary.batch_id.starts_with("BATCH_20240201000000_"));
        assert_eq!(store.row_count("ods_orders").unwrap(), 2);
        assert_eq!(store.row_count("dwd_fact_orders").unwrap(), 2);
        assert_eq!(store.row_count("dws_customer_rfm").unwrap(), 1);
        assert_eq!(store.row_count("ads_customer_insights").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_failures_make_run_partial() {
        let src = source();
        src.insert(
            "orders",
            vec![record(json!({"order_id": "O3", "user_id": "U1", "order_date": "not-a-date",
                "quantity": 1, "unit_price": 5.0, "currency": "USD", "status": "completed"}))],
        );
        let store = Arc::new(SqliteLayerStore::in_memory().unwrap());
        let orchestrator =
            EtlOrchestrator::new(clock(), src, store, EtlConfig::default()).unwrap();

        let summary = orchestrator.run_full_etl(&Filters::new(), None).await;

        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.layer(LayerKind::Dwd).unwrap().failures, 1);
        assert!(summary.errors >= 1);
    }

    struct BrokenStore;

    impl LayerStore for BrokenStore {
        fn provision(&self, _: &SchemaDescriptor, _: &IndexDescriptor) -> RepositoryResult<()> {
            Ok(())
        }

        fn persist_versioned(&self, _: &[VersionClosure], _: &[Record]) -> RepositoryResult<usize> {
            Err(RepositoryError::LockError("poisoned".into()))
        }

        fn current_versions(&self, _: &str, _: &str, _: &[String]) -> RepositoryResult<Vec<Record>> {
            Ok(Vec::new())
        }

        fn row_count(&self, _: &str) -> RepositoryResult<i64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_storage_failure_fails_batch() {
        let orchestrator =
            EtlOrchestrator::new(clock(), source(), Arc::new(BrokenStore), EtlConfig::default())
                .unwrap();

        let summary = orchestrator.run_full_etl(&Filters::new(), None).await;

        assert_eq!(summary.status, RunStatus::Failed);
        assert!(summary.error_message.unwrap().contains("ODS"));
        assert!(summary.layers.is_empty());
    }
}
