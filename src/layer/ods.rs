// ==========================================
// 交易数仓分层引擎 - ODS 原始层
// ==========================================
// 职责: 源系统记录近乎原样落地
// - extract_from_source: 构造查询描述,委托数据源抽取
// - transform: 补 created_at / updated_at,附带完整原始记录快照 raw_data
// 红线: 不删除、不重命名任何字段
// ==========================================

use crate::clock::{format_timestamp, Clock};
use crate::domain::record::{is_blank, Record, RECORD_TYPE_FIELD};
use crate::domain::schema::{IndexDescriptor, SchemaDescriptor};
use crate::domain::validation::RuleSet;
use crate::layer::error::{LayerError, LayerResult};
use crate::layer::{Layer, LayerKind, TransformOutcome};
use crate::source::{Filters, SourceExtractor, SourceResult};
use rayon::prelude::*;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 数据源 -> ODS 表
pub const SOURCE_TABLES: &[(&str, &str)] = &[
    ("orders", "ods_orders"),
    ("users", "ods_users"),
    ("products", "ods_products"),
    ("inventory", "ods_inventory"),
];

/// 数据源对应的 ODS 表名
pub fn table_for_source(source: &str) -> Option<&'static str> {
    SOURCE_TABLES
        .iter()
        .find(|(name, _)| *name == source)
        .map(|(_, table)| *table)
}

// ==========================================
// SourceQuery - 抽取查询描述
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    pub source: String,
    pub table: String,
    pub filters: Filters,
    pub description: String,
}

impl SourceQuery {
    /// 构造查询描述,未知数据源返回 None
    pub fn build(source: &str, filters: &Filters) -> Option<Self> {
        let table = table_for_source(source)?;

        // Filters 为 BTreeMap,条件按字段名有序
        let mut description = format!("SELECT * FROM {}", table);
        if !filters.is_empty() {
            let conditions: Vec<String> = filters
                .iter()
                .map(|(k, v)| format!("{} = '{}'", k, v.replace('\'', "''")))
                .collect();
            description.push_str(" WHERE ");
            description.push_str(&conditions.join(" AND "));
        }

        Some(Self {
            source: source.to_string(),
            table: table.to_string(),
            filters: filters.clone(),
            description,
        })
    }
}

// ==========================================
// RawLayer
// ==========================================
pub struct RawLayer {
    clock: Arc<dyn Clock>,
    extractor: Arc<dyn SourceExtractor>,
    schema: SchemaDescriptor,
    indexes: IndexDescriptor,
    rules: RuleSet,
}

impl RawLayer {
    pub fn new(clock: Arc<dyn Clock>, extractor: Arc<dyn SourceExtractor>) -> LayerResult<Self> {
        Ok(Self {
            clock,
            extractor,
            schema: Self::build_schema(),
            indexes: Self::build_indexes(),
            rules: Self::build_rules()?,
        })
    }

    fn build_schema() -> SchemaDescriptor {
        const AUDIT: &[(&str, &str)] = &[
            ("record_type", "VARCHAR(50)"),
            ("raw_data", "TEXT"),
            ("created_at", "TIMESTAMP"),
            ("updated_at", "TIMESTAMP"),
        ];
        let with_audit = |columns: &[(&'static str, &'static str)]| {
            columns
                .iter()
                .chain(AUDIT.iter())
                .copied()
                .collect::<Vec<(&str, &str)>>()
        };

        SchemaDescriptor::builder()
            .table(
                "ods_orders",
                &with_audit(&[
                    ("order_id", "VARCHAR(50)"),
                    ("user_id", "VARCHAR(50)"),
                    ("product_id", "VARCHAR(50)"),
                    ("order_date", "TIMESTAMP"),
                    ("quantity", "INT"),
                    ("unit_price", "DECIMAL(12,2)"),
                    ("amount", "DECIMAL(12,2)"),
                    ("discount", "DECIMAL(12,2)"),
                    ("currency", "VARCHAR(10)"),
                    ("status", "VARCHAR(20)"),
                ]),
            )
            .table(
                "ods_users",
                &with_audit(&[
                    ("user_id", "VARCHAR(50)"),
                    ("first_name", "VARCHAR(100)"),
                    ("last_name", "VARCHAR(100)"),
                    ("email", "VARCHAR(255)"),
                    ("country", "VARCHAR(50)"),
                    ("registration_date", "DATE"),
                    ("total_spent", "DECIMAL(14,2)"),
                    ("order_count", "INT"),
                    ("loyalty_points", "INT"),
                    ("currency", "VARCHAR(10)"),
                ]),
            )
            .table(
                "ods_products",
                &with_audit(&[
                    ("product_id", "VARCHAR(50)"),
                    ("product_name", "VARCHAR(255)"),
                    ("category", "VARCHAR(100)"),
                    ("brand", "VARCHAR(100)"),
                    ("price", "DECIMAL(12,2)"),
                    ("cost", "DECIMAL(12,2)"),
                    ("currency", "VARCHAR(10)"),
                    ("rating", "DECIMAL(3,2)"),
                ]),
            )
            .table(
                "ods_inventory",
                &with_audit(&[
                    ("product_id", "VARCHAR(50)"),
                    ("warehouse_id", "VARCHAR(50)"),
                    ("quantity_on_hand", "INT"),
                    ("reorder_point", "INT"),
                    ("unit_cost", "DECIMAL(12,2)"),
                    ("currency", "VARCHAR(10)"),
                    ("snapshot_date", "DATE"),
                ]),
            )
            .build()
    }

    fn build_indexes() -> IndexDescriptor {
        IndexDescriptor::new()
            .with_table(
                "ods_orders",
                &[
                    ("idx_ods_orders_order_id", "order_id"),
                    ("idx_ods_orders_user_date", "user_id, order_date"),
                ],
            )
            .with_table("ods_users", &[("idx_ods_users_user_id", "user_id")])
            .with_table("ods_products", &[("idx_ods_products_product_id", "product_id")])
            .with_table(
                "ods_inventory",
                &[("idx_ods_inventory_product", "product_id, snapshot_date")],
            )
    }

    fn build_rules() -> LayerResult<RuleSet> {
        Ok(RuleSet::parse(&[
            ("record_type", "required|string"),
            ("raw_data", "required|string"),
            ("created_at", "required|date"),
            ("updated_at", "required|date"),
            ("order_date", "date"),
            ("quantity", "numeric|min:0"),
            ("unit_price", "numeric|min:0"),
            ("discount", "numeric|min:0"),
            ("email", "email"),
            ("total_spent", "numeric|min:0"),
            ("price", "numeric|min:0"),
            ("cost", "numeric|min:0"),
            ("rating", "numeric|min:0|max:5"),
            ("quantity_on_hand", "numeric|min:0"),
        ])?)
    }

    /// 从数据源抽取原始行
    ///
    /// # 返回
    /// - 未知数据源: 空序列,不调用抽取方
    /// - 其他: 抽取结果,缺少 record_type 的行补上对应 ODS 表名
    pub async fn extract_from_source(
        &self,
        source: &str,
        filters: &Filters,
    ) -> SourceResult<Vec<Record>> {
        let Some(query) = SourceQuery::build(source, filters) else {
            warn!(source = %source, "未知数据源,返回空结果");
            return Ok(Vec::new());
        };

        debug!(source = %query.source, query = %query.description, "开始抽取数据源");
        let mut rows = self.extractor.extract(&query.source, &query.filters).await?;

        for row in rows.iter_mut() {
            if is_blank(row.get(RECORD_TYPE_FIELD)) {
                row.insert(RECORD_TYPE_FIELD.to_string(), Value::from(query.table.as_str()));
            }
        }

        info!(source = %query.source, table = %query.table, rows = rows.len(), "数据源抽取完成");
        Ok(rows)
    }

    /// 单条记录落地
    fn land_record(record: &Record, now: &str) -> LayerResult<Record> {
        let raw_data = serde_json::to_string(record)
            .map_err(|e| LayerError::invalid_field(record, "raw_data", e.to_string()))?;

        let mut landed = record.clone();
        if is_blank(landed.get("created_at")) {
            landed.insert("created_at".to_string(), Value::from(now));
        }
        landed.insert("updated_at".to_string(), Value::from(now));
        landed.insert("raw_data".to_string(), Value::from(raw_data));
        Ok(landed)
    }
}

impl Layer for RawLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Ods
    }

    fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    fn indexes(&self) -> &IndexDescriptor {
        &self.indexes
    }

    fn validation_rules(&self) -> &RuleSet {
        &self.rules
    }

    fn transform(&self, records: &[Record]) -> TransformOutcome {
        let now = format_timestamp(self.clock.now());
        let results: Vec<LayerResult<Vec<Record>>> = records
            .par_iter()
            .map(|record| Self::land_record(record, &now).map(|r| vec![r]))
            .collect();
        TransformOutcome::from_results(results)
    }
}
