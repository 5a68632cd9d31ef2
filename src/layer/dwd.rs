// ==========================================
// 交易数仓分层引擎 - DWD 明细层
// ==========================================
// 职责: 标准化 + 维度建模 + 币种折算
// - ods_orders    -> dwd_fact_orders   (金额折算 CNY, date_key, 完成/取消标记)
// - ods_users     -> dwd_dim_users     (客户分群, 会员等级, SCD2)
// - ods_products  -> dwd_dim_products  (CNY 价格/成本, 单位毛利, 价格带, SCD2)
// - ods_inventory -> dwd_fact_inventory(CNY 单位成本, 库存金额)
// - 订单日期跨度  -> dwd_dim_date
// 红线: 单条记录失败不影响同批其他记录
// ==========================================

use crate::clock::{format_timestamp, Clock};
use crate::domain::record::{is_blank, numeric_value, parse_date, Record, RecordExt};
use crate::domain::schema::{IndexDescriptor, SchemaDescriptor};
use crate::domain::validation::RuleSet;
use crate::engine::currency::CurrencyTable;
use crate::engine::date_dimension::{date_key, DateDimension, DateDimensionGenerator};
use crate::engine::metrics::{profit_margin, round_money, round_rate};
use crate::engine::segmentation::{customer_segment, loyalty_tier, price_band};
use crate::layer::batch::generate_batch_id;
use crate::layer::error::{LayerError, LayerResult};
use crate::layer::{new_record, opt_value, stamp_batch, Layer, LayerKind, TransformOutcome};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// 视为"已完成"的订单状态
const COMPLETED_STATUSES: &[&str] = &["completed", "delivered"];
/// 视为"已取消"的订单状态
const CANCELLED_STATUSES: &[&str] = &["cancelled", "canceled", "refunded"];

/// SCD2 追踪字段: 变化时产生新版本
const USER_TRACKED_FIELDS: &[&str] = &[
    "full_name",
    "email",
    "country",
    "customer_segment",
    "loyalty_tier",
];
const PRODUCT_TRACKED_FIELDS: &[&str] = &[
    "product_name",
    "category",
    "brand",
    "price_cny",
    "cost_cny",
];

/// SCD2 维度表 -> 业务键字段
pub const DIMENSION_KEYS: &[(&str, &str)] = &[
    ("dwd_dim_users", "user_id"),
    ("dwd_dim_products", "product_id"),
];

/// SCD2 落库计划
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionPlan {
    /// 被关闭的已存储版本（effective_to 已填,is_current = false）
    pub closed: Vec<Record>,
    /// 待写入记录: 非维度记录 + 新增/变化的维度版本
    pub records: Vec<Record>,
    /// 追踪字段无变化而跳过的维度记录数
    pub unchanged: usize,
}

#[derive(Debug, Clone)]
enum CurrentVersion {
    Stored(Record),
    Pending(usize),
}

/// 单批次共享的只读上下文
#[derive(Debug, Clone)]
struct BatchContext {
    batch_id: String,
    etl_time: String,
    today: NaiveDate,
}

// ==========================================
// CleanedLayer
// ==========================================
pub struct CleanedLayer {
    clock: Arc<dyn Clock>,
    currency: CurrencyTable,
    dates: DateDimensionGenerator,
    schema: SchemaDescriptor,
    indexes: IndexDescriptor,
    rules: RuleSet,
}

impl CleanedLayer {
    pub fn new(clock: Arc<dyn Clock>) -> LayerResult<Self> {
        Self::with_settings(clock, CurrencyTable::default(), DateDimensionGenerator::default())
    }

    /// 指定汇率表与节假日集合
    pub fn with_settings(
        clock: Arc<dyn Clock>,
        currency: CurrencyTable,
        dates: DateDimensionGenerator,
    ) -> LayerResult<Self> {
        Ok(Self {
            clock,
            currency,
            dates,
            schema: Self::build_schema(),
            indexes: Self::build_indexes(),
            rules: Self::build_rules()?,
        })
    }

    fn build_schema() -> SchemaDescriptor {
        SchemaDescriptor::builder()
            .table(
                "dwd_fact_orders",
                &[
                    ("order_id", "VARCHAR(50)"),
                    ("user_id", "VARCHAR(50)"),
                    ("product_id", "VARCHAR(50)"),
                    ("order_date", "DATE"),
                    ("date_key", "INT"),
                    ("quantity", "DECIMAL(12,2)"),
                    ("unit_price_cny", "DECIMAL(12,2)"),
                    ("amount_cny", "DECIMAL(14,2)"),
                    ("discount_cny", "DECIMAL(14,2)"),
                    ("net_amount_cny", "DECIMAL(14,2)"),
                    ("original_currency", "VARCHAR(10)"),
                    ("exchange_rate", "DECIMAL(10,4)"),
                    ("order_status", "VARCHAR(20)"),
                    ("is_completed", "BOOLEAN"),
                    ("is_cancelled", "BOOLEAN"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "dwd_dim_users",
                &[
                    ("user_id", "VARCHAR(50)"),
                    ("full_name", "VARCHAR(200)"),
                    ("email", "VARCHAR(255)"),
                    ("country", "VARCHAR(50)"),
                    ("registration_date", "DATE"),
                    ("total_spent_cny", "DECIMAL(14,2)"),
                    ("order_count", "INT"),
                    ("loyalty_points", "INT"),
                    ("customer_segment", "VARCHAR(20)"),
                    ("loyalty_tier", "VARCHAR(20)"),
                    ("effective_from", "DATE"),
                    ("effective_to", "DATE"),
                    ("is_current", "BOOLEAN"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "dwd_dim_products",
                &[
                    ("product_id", "VARCHAR(50)"),
                    ("product_name", "VARCHAR(255)"),
                    ("category", "VARCHAR(100)"),
                    ("brand", "VARCHAR(100)"),
                    ("price_cny", "DECIMAL(12,2)"),
                    ("cost_cny", "DECIMAL(12,2)"),
                    ("unit_margin", "DECIMAL(6,4)"),
                    ("price_band", "VARCHAR(20)"),
                    ("rating", "DECIMAL(3,2)"),
                    ("effective_from", "DATE"),
                    ("effective_to", "DATE"),
                    ("is_current", "BOOLEAN"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "dwd_fact_inventory",
                &[
                    ("product_id", "VARCHAR(50)"),
                    ("warehouse_id", "VARCHAR(50)"),
                    ("snapshot_date", "DATE"),
                    ("date_key", "INT"),
                    ("quantity_on_hand", "DECIMAL(12,2)"),
                    ("reorder_point", "DECIMAL(12,2)"),
                    ("unit_cost_cny", "DECIMAL(12,2)"),
                    ("inventory_value_cny", "DECIMAL(14,2)"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "dwd_dim_date",
                &[
                    ("date_key", "INT"),
                    ("full_date", "DATE"),
                    ("year", "INT"),
                    ("quarter", "INT"),
                    ("month", "INT"),
                    ("month_name", "VARCHAR(20)"),
                    ("week_of_year", "INT"),
                    ("day_of_week", "INT"),
                    ("day_name", "VARCHAR(20)"),
                    ("day_of_month", "INT"),
                    ("day_of_year", "INT"),
                    ("is_weekend", "BOOLEAN"),
                    ("is_holiday", "BOOLEAN"),
                    ("season", "VARCHAR(10)"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .build()
    }

    fn build_indexes() -> IndexDescriptor {
        IndexDescriptor::new()
            .with_table(
                "dwd_fact_orders",
                &[
                    ("idx_dwd_orders_date_key", "date_key"),
                    ("idx_dwd_orders_user", "user_id"),
                    ("idx_dwd_orders_product", "product_id"),
                ],
            )
            .with_table(
                "dwd_dim_users",
                &[("idx_dwd_users_current", "user_id, is_current")],
            )
            .with_table(
                "dwd_dim_products",
                &[("idx_dwd_products_current", "product_id, is_current")],
            )
            .with_table(
                "dwd_fact_inventory",
                &[("idx_dwd_inventory_product", "product_id, snapshot_date")],
            )
            .with_table("dwd_dim_date", &[("idx_dwd_date_key", "date_key")])
    }

    fn build_rules() -> LayerResult<RuleSet> {
        Ok(RuleSet::parse(&[
            ("record_type", "required|string"),
            ("batch_id", "required|string"),
            ("etl_time", "required|date"),
            ("order_date", "date"),
            ("quantity", "numeric|min:0"),
            ("amount_cny", "numeric|min:0"),
            ("net_amount_cny", "numeric"),
            ("exchange_rate", "numeric|positive"),
            ("email", "email"),
            ("total_spent_cny", "numeric|min:0"),
            ("price_cny", "numeric|min:0"),
            ("cost_cny", "numeric|min:0"),
            ("unit_margin", "numeric|max:1"),
            ("quantity_on_hand", "numeric|min:0"),
            ("effective_from", "date"),
            ("full_date", "date"),
        ])?)
    }

    pub fn currency(&self) -> &CurrencyTable {
        &self.currency
    }

    // ==========================================
    // 逐条清洗
    // ==========================================

    fn clean_record(&self, record: &Record, ctx: &BatchContext) -> LayerResult<Record> {
        let mut cleaned = match record.record_type() {
            Some("ods_orders") => self.clean_order(record)?,
            Some("ods_users") => self.clean_user(record, ctx.today)?,
            Some("ods_products") => self.clean_product(record, ctx.today)?,
            Some("ods_inventory") => self.clean_inventory(record, ctx.today)?,
            other => {
                return Err(LayerError::unknown_record_type(
                    record,
                    other.unwrap_or("<missing>"),
                ))
            }
        };
        stamp_batch(&mut cleaned, &ctx.batch_id, &ctx.etl_time);
        Ok(cleaned)
    }

    /// 订单事实
    fn clean_order(&self, record: &Record) -> LayerResult<Record> {
        let order_id = record.require_text("order_id")?;
        let order_date = record.require_date("order_date")?;
        let quantity = record.f64_or("quantity", 1.0)?;
        if quantity < 0.0 {
            return Err(LayerError::invalid_field(record, "quantity", "数量不能为负"));
        }

        let currency = record
            .text("currency")
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| "CNY".to_string());
        let rate = self.currency.rate(&currency);

        // 优先使用源系统金额,否则按 数量 × 单价
        let (unit_price, amount) = match record.f64_opt("amount")? {
            Some(amount) => {
                let unit = record
                    .f64_opt("unit_price")?
                    .unwrap_or(if quantity > 0.0 { amount / quantity } else { 0.0 });
                (unit, amount)
            }
            None => {
                let unit = record.require_f64("unit_price")?;
                (unit, unit * quantity)
            }
        };
        let discount = record.f64_or("discount", 0.0)?;

        let amount_cny = round_money(amount * rate);
        let discount_cny = round_money(discount * rate);
        let status = record
            .text("status")
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| "pending".to_string());

        let mut fact = new_record("dwd_fact_orders");
        fact.insert("order_id".into(), Value::from(order_id));
        fact.insert("user_id".into(), opt_value(record.text("user_id")));
        fact.insert("product_id".into(), opt_value(record.text("product_id")));
        fact.insert("order_date".into(), Value::from(order_date.format("%Y-%m-%d").to_string()));
        fact.insert("date_key".into(), Value::from(date_key(order_date)));
        fact.insert("quantity".into(), Value::from(quantity));
        fact.insert("unit_price_cny".into(), Value::from(round_money(unit_price * rate)));
        fact.insert("amount_cny".into(), Value::from(amount_cny));
        fact.insert("discount_cny".into(), Value::from(discount_cny));
        fact.insert("net_amount_cny".into(), Value::from(round_money(amount_cny - discount_cny)));
        fact.insert("original_currency".into(), Value::from(currency));
        fact.insert("exchange_rate".into(), Value::from(rate));
        fact.insert(
            "is_completed".into(),
            Value::from(COMPLETED_STATUSES.contains(&status.as_str())),
        );
        fact.insert(
            "is_cancelled".into(),
            Value::from(CANCELLED_STATUSES.contains(&status.as_str())),
        );
        fact.insert("order_status".into(), Value::from(status));
        Ok(fact)
    }

    /// 用户维度（SCD2 新版本）
    fn clean_user(&self, record: &Record, today: NaiveDate) -> LayerResult<Record> {
        let user_id = record.require_text("user_id")?;

        let full_name = match (record.text("first_name"), record.text("last_name")) {
            (None, None) => record.text("name"),
            (first, last) => Some(
                [first, last]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        };
        let email = record.text("email").map(|e| e.to_lowercase());
        let country = record.text("country").map(|c| c.to_uppercase());
        let registration_date = record
            .date_opt("registration_date")?
            .map(|d| d.format("%Y-%m-%d").to_string());

        let currency = record.text("currency").unwrap_or_else(|| "CNY".to_string());
        let total_spent_cny = round_money(
            self.currency
                .convert(record.f64_or("total_spent", 0.0)?, &currency),
        );
        let order_count = record.i64_opt("order_count")?.unwrap_or(0);
        let loyalty_points = record.f64_or("loyalty_points", 0.0)?;

        let mut dim = new_record("dwd_dim_users");
        dim.insert("user_id".into(), Value::from(user_id));
        dim.insert("full_name".into(), opt_value(full_name));
        dim.insert("email".into(), opt_value(email));
        dim.insert("country".into(), opt_value(country));
        dim.insert("registration_date".into(), opt_value(registration_date));
        dim.insert("total_spent_cny".into(), Value::from(total_spent_cny));
        dim.insert("order_count".into(), Value::from(order_count));
        dim.insert("loyalty_points".into(), Value::from(loyalty_points.trunc() as i64));
        dim.insert(
            "customer_segment".into(),
            Value::from(customer_segment(total_spent_cny, order_count).as_str()),
        );
        dim.insert(
            "loyalty_tier".into(),
            Value::from(loyalty_tier(loyalty_points).as_str()),
        );
        open_version(&mut dim, today);
        Ok(dim)
    }

    /// 商品维度（SCD2 新版本）
    fn clean_product(&self, record: &Record, today: NaiveDate) -> LayerResult<Record> {
        let product_id = record.require_text("product_id")?;
        let currency = record.text("currency").unwrap_or_else(|| "CNY".to_string());

        let price_cny = round_money(self.currency.convert(record.require_f64("price")?, &currency));
        let cost_cny = round_money(self.currency.convert(record.f64_or("cost", 0.0)?, &currency));
        let unit_margin = round_rate(profit_margin(price_cny - cost_cny, price_cny));

        let mut dim = new_record("dwd_dim_products");
        dim.insert("product_id".into(), Value::from(product_id));
        dim.insert("product_name".into(), opt_value(record.text("product_name")));
        dim.insert(
            "category".into(),
            Value::from(record.text("category").unwrap_or_else(|| "Uncategorized".to_string())),
        );
        dim.insert("brand".into(), opt_value(record.text("brand")));
        dim.insert("price_cny".into(), Value::from(price_cny));
        dim.insert("cost_cny".into(), Value::from(cost_cny));
        dim.insert("unit_margin".into(), Value::from(unit_margin));
        dim.insert("price_band".into(), Value::from(price_band(price_cny)));
        dim.insert("rating".into(), Value::from(record.f64_or("rating", 0.0)?));
        open_version(&mut dim, today);
        Ok(dim)
    }

    /// 库存快照事实
    fn clean_inventory(&self, record: &Record, today: NaiveDate) -> LayerResult<Record> {
        let product_id = record.require_text("product_id")?;
        let snapshot_date = record.date_opt("snapshot_date")?.unwrap_or(today);
        let quantity_on_hand = record.require_f64("quantity_on_hand")?;
        let currency = record.text("currency").unwrap_or_else(|| "CNY".to_string());
        let unit_cost_cny =
            round_money(self.currency.convert(record.f64_or("unit_cost", 0.0)?, &currency));

        let mut fact = new_record("dwd_fact_inventory");
        fact.insert("product_id".into(), Value::from(product_id));
        fact.insert(
            "warehouse_id".into(),
            Value::from(record.text("warehouse_id").unwrap_or_else(|| "MAIN".to_string())),
        );
        fact.insert(
            "snapshot_date".into(),
            Value::from(snapshot_date.format("%Y-%m-%d").to_string()),
        );
        fact.insert("date_key".into(), Value::from(date_key(snapshot_date)));
        fact.insert("quantity_on_hand".into(), Value::from(quantity_on_hand));
        fact.insert(
            "reorder_point".into(),
            Value::from(record.f64_or("reorder_point", 0.0)?),
        );
        fact.insert("unit_cost_cny".into(), Value::from(unit_cost_cny));
        fact.insert(
            "inventory_value_cny".into(),
            Value::from(round_money(quantity_on_hand * unit_cost_cny)),
        );
        Ok(fact)
    }

    // ==========================================
    // 日期维度
    // ==========================================

    /// 生成 [start, end] 的日期维度记录
    pub fn date_dimension_records(&self, start: NaiveDate, end: NaiveDate) -> Vec<Record> {
        let batch_id = generate_batch_id(self.clock.as_ref());
        let etl_time = format_timestamp(self.clock.now());
        self.stamped_dates(start, end, &batch_id, &etl_time)
    }

    fn stamped_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        batch_id: &str,
        etl_time: &str,
    ) -> Vec<Record> {
        self.dates
            .generate(start, end)
            .iter()
            .map(|dim| {
                let mut record = date_dimension_record(dim);
                stamp_batch(&mut record, batch_id, etl_time);
                record
            })
            .collect()
    }

    // ==========================================
    // SCD2 版本切换
    // ==========================================

    /// 比较维度新旧版本
    ///
    /// # 返回
    /// - 追踪字段无变化: 空序列（旧版本继续有效）
    /// - 有变化: [关闭后的旧版本, 新版本]
    /// - 非维度记录: [新版本]
    pub fn supersede(&self, previous: &Record, current: &Record) -> Vec<Record> {
        let tracked = match current.record_type() {
            Some("dwd_dim_users") => USER_TRACKED_FIELDS,
            Some("dwd_dim_products") => PRODUCT_TRACKED_FIELDS,
            _ => return vec![current.clone()],
        };

        let changed = tracked
            .iter()
            .any(|field| !same_value(previous.get(*field), current.get(*field)));
        if !changed {
            return Vec::new();
        }

        let today = self.clock.today().format("%Y-%m-%d").to_string();
        let mut closed = previous.clone();
        closed.insert("effective_to".into(), Value::from(today));
        closed.insert("is_current".into(), Value::Bool(false));
        vec![closed, current.clone()]
    }

    /// 对照已存储的当前版本生成落库计划
    ///
    /// 同批内同一业务键出现多次时,后者取代前者,前者以关闭版本写入
    pub fn plan_versions(&self, stored: &[Record], batch: &[Record]) -> VersionPlan {
        let mut plan = VersionPlan::default();
        let mut current: HashMap<(String, String), CurrentVersion> = HashMap::new();

        for record in stored {
            if let Some(key) = dimension_key(record) {
                current.insert(key, CurrentVersion::Stored(record.clone()));
            }
        }

        for record in batch {
            let Some(key) = dimension_key(record) else {
                plan.records.push(record.clone());
                continue;
            };

            let previous = match current.get(&key) {
                None => None,
                Some(CurrentVersion::Stored(prev)) => Some((prev.clone(), None)),
                Some(CurrentVersion::Pending(idx)) => Some((plan.records[*idx].clone(), Some(*idx))),
            };

            match previous {
                None => plan.records.push(record.clone()),
                Some((prev, pending)) => {
                    let mut versions = self.supersede(&prev, record);
                    let Some(next) = versions.pop() else {
                        plan.unchanged += 1;
                        continue;
                    };
                    if let Some(closed) = versions.pop() {
                        match pending {
                            Some(idx) => plan.records[idx] = closed,
                            None => plan.closed.push(closed),
                        }
                    }
                    plan.records.push(next);
                }
            }
            current.insert(key, CurrentVersion::Pending(plan.records.len() - 1));
        }

        plan
    }
}

/// (维度表, 业务键) ;非维度记录为 None
fn dimension_key(record: &Record) -> Option<(String, String)> {
    let table = record.record_type()?;
    let (_, key_field) = DIMENSION_KEYS.iter().find(|(t, _)| *t == table)?;
    Some((table.to_string(), record.text(key_field)?))
}

/// 追踪字段比较: 数值按数值比较（存储可能把 720.0 读回为 720）,空值彼此相等
fn same_value(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (numeric_value(a), numeric_value(b)) {
        (Some(Ok(x)), Some(Ok(y))) => (x - y).abs() < 1e-9,
        _ => (is_blank(a) && is_blank(b)) || a == b,
    }
}

/// SCD2 新版本字段
fn open_version(record: &mut Record, today: NaiveDate) {
    record.insert(
        "effective_from".into(),
        Value::from(today.format("%Y-%m-%d").to_string()),
    );
    record.insert("effective_to".into(), Value::Null);
    record.insert("is_current".into(), Value::Bool(true));
}

fn date_dimension_record(dim: &DateDimension) -> Record {
    let mut record = new_record("dwd_dim_date");
    record.insert("date_key".into(), Value::from(dim.date_key));
    record.insert("full_date".into(), Value::from(dim.full_date.as_str()));
    record.insert("year".into(), Value::from(dim.year));
    record.insert("quarter".into(), Value::from(dim.quarter));
    record.insert("month".into(), Value::from(dim.month));
    record.insert("month_name".into(), Value::from(dim.month_name.as_str()));
    record.insert("week_of_year".into(), Value::from(dim.week_of_year));
    record.insert("day_of_week".into(), Value::from(dim.day_of_week));
    record.insert("day_name".into(), Value::from(dim.day_name.as_str()));
    record.insert("day_of_month".into(), Value::from(dim.day_of_month));
    record.insert("day_of_year".into(), Value::from(dim.day_of_year));
    record.insert("is_weekend".into(), Value::Bool(dim.is_weekend));
    record.insert("is_holiday".into(), Value::Bool(dim.is_holiday));
    record.insert("season".into(), Value::from(dim.season.as_str()));
    record
}

impl Layer for CleanedLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Dwd
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
        let ctx = BatchContext {
            batch_id: generate_batch_id(self.clock.as_ref()),
            etl_time: format_timestamp(self.clock.now()),
            today: self.clock.today(),
        };

        let results: Vec<LayerResult<Vec<Record>>> = records
            .par_iter()
            .map(|record| self.clean_record(record, &ctx).map(|r| vec![r]))
            .collect();
        let mut outcome = TransformOutcome::from_results(results);

        // 订单日期跨度 -> 日期维度
        let order_dates: Vec<NaiveDate> = outcome
            .records
            .iter()
            .filter(|r| r.record_type() == Some("dwd_fact_orders"))
            .filter_map(|r| r.get("order_date").and_then(Value::as_str).and_then(parse_date))
            .collect();
        if let (Some(start), Some(end)) = (order_dates.iter().min(), order_dates.iter().max()) {
            let dims = self.stamped_dates(*start, *end, &ctx.batch_id, &ctx.etl_time);
            debug!(start = %start, end = %end, rows = dims.len(), "生成日期维度");
            outcome.records.extend(dims);
        }

        info!(
            layer = %LayerKind::Dwd,
            batch_id = %ctx.batch_id,
            input = records.len(),
            output = outcome.records.len(),
            failures = outcome.failures.len(),
            "明细层加工完成"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn layer() -> CleanedLayer {
        let clock = Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
        CleanedLayer::new(clock).unwrap()
    }

    fn of_type<'a>(records: &'a [Record], record_type: &str) -> Vec<&'a Record> {
        records
            .iter()
            .filter(|r| r.record_type() == Some(record_type))
            .collect()
    }

    #[test]
    fn test_order_currency_conversion() {
        let outcome = layer().transform(&[record(json!({
            "record_type": "ods_orders",
            "order_id": "O1",
            "user_id": "U1",
            "product_id": "P1",
            "order_date": "2024-01-15 10:30:00",
            "quantity": 2,
            "unit_price": "50",
            "discount": 10,
            "currency": "usd",
            "status": "Completed"
        }))]);

        assert!(outcome.failures.is_empty());
        let fact = of_type(&outcome.records, "dwd_fact_orders")[0];
        assert_eq!(fact["amount_cny"], json!(720.0));
        assert_eq!(fact["discount_cny"], json!(72.0));
        assert_eq!(fact["net_amount_cny"], json!(648.0));
        assert_eq!(fact["date_key"], json!(20240115));
        assert_eq!(fact["original_currency"], json!("USD"));
        assert_eq!(fact["is_completed"], json!(true));
        assert_eq!(fact["is_cancelled"], json!(false));
        assert!(fact["batch_id"].as_str().unwrap().starts_with("BATCH_20240201000000_"));

        // 单日订单 -> 单行日期维度
        assert_eq!(of_type(&outcome.records, "dwd_dim_date").len(), 1);
    }

    #[test]
    fn test_bad_record_does_not_abort_batch() {
        let outcome = layer().transform(&[
            record(json!({
                "record_type": "ods_orders",
                "order_id": "O1",
                "order_date": "2024-01-01",
                "unit_price": "abc"
            })),
            record(json!({
                "record_type": "ods_orders",
                "order_id": "O2",
                "order_date": "2024-01-01",
                "unit_price": 10
            })),
            record(json!({"record_type": "ods_payments", "id": "X"})),
        ]);

        assert_eq!(of_type(&outcome.records, "dwd_fact_orders").len(), 1);
        assert_eq!(outcome.failures.len(), 2);
        assert!(matches!(
            &outcome.failures[0],
            LayerError::InvalidField { record_id, field, .. } if record_id == "O1" && field == "unit_price"
        ));
        assert!(matches!(
            &outcome.failures[1],
            LayerError::UnknownRecordType { record_type, .. } if record_type == "ods_payments"
        ));
    }

    #[test]
    fn test_non_finite_price_fails_record() {
        let outcome = layer().transform(&[record(json!({
            "record_type": "ods_orders",
            "order_id": "O1",
            "order_date": "2024-01-01",
            "quantity": 2,
            "unit_price": "NaN"
        }))]);

        assert!(outcome.records.iter().all(|r| r.record_type() != Some("dwd_fact_orders")));
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            LayerError::InvalidField { field, .. } if field == "unit_price"
        ));
    }

    #[test]
    fn test_user_dimension() {
        let outcome = layer().transform(&[record(json!({
            "record_type": "ods_users",
            "user_id": "U1",
            "first_name": "Li",
            "last_name": "Wei",
            "email": " Li.Wei@Example.COM ",
            "country": "cn",
            "total_spent": 10000,
            "currency": "USD",
            "order_count": 3,
            "loyalty_points": 5200
        }))]);

        let dim = &outcome.records[0];
        assert_eq!(dim["full_name"], json!("Li Wei"));
        assert_eq!(dim["email"], json!("li.wei@example.com"));
        assert_eq!(dim["total_spent_cny"], json!(72000.0));
        assert_eq!(dim["customer_segment"], json!("Premium"));
        assert_eq!(dim["loyalty_tier"], json!("Gold"));
        assert_eq!(dim["effective_from"], json!("2024-02-01"));
        assert_eq!(dim["effective_to"], Value::Null);
        assert_eq!(dim["is_current"], json!(true));
    }

    #[test]
    fn test_product_dimension() {
        let outcome = layer().transform(&[record(json!({
            "record_type": "ods_products",
            "product_id": "P1",
            "product_name": "Desk Lamp",
            "price": 100,
            "cost": 60,
            "currency": "EUR"
        }))]);

        let dim = &outcome.records[0];
        assert_eq!(dim["price_cny"], json!(780.0));
        assert_eq!(dim["cost_cny"], json!(468.0));
        assert_eq!(dim["unit_margin"], json!(0.4));
        assert_eq!(dim["price_band"], json!("Premium"));
        assert_eq!(dim["category"], json!("Uncategorized"));
    }

    #[test]
    fn test_inventory_fact() {
        let outcome = layer().transform(&[record(json!({
            "record_type": "ods_inventory",
            "product_id": "P1",
            "quantity_on_hand": 40,
            "unit_cost": 2.5
        }))]);

        let fact = &outcome.records[0];
        assert_eq!(fact["snapshot_date"], json!("2024-02-01"));
        assert_eq!(fact["warehouse_id"], json!("MAIN"));
        assert_eq!(fact["inventory_value_cny"], json!(100.0));
    }

    #[test]
    fn test_date_dimension_span_january() {
        let dims = layer().date_dimension_records(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert_eq!(dims.len(), 31);
        assert_eq!(dims[0]["is_holiday"], json!(true));
        assert_eq!(dims[0]["season"], json!("Winter"));
        assert_eq!(dims[5]["full_date"], json!("2024-01-06"));
        assert_eq!(dims[5]["is_weekend"], json!(true));
    }

    #[test]
    fn test_supersede_closes_changed_version() {
        let layer = layer();
        let base = json!({
            "record_type": "dwd_dim_users",
            "user_id": "U1",
            "full_name": "Li Wei",
            "email": "li@example.com",
            "country": "CN",
            "customer_segment": "Regular",
            "loyalty_tier": "Basic",
            "effective_from": "2024-01-01",
            "effective_to": null,
            "is_current": true
        });
        let previous = record(base.clone());

        // 仅批次字段变化: 不产生新版本
        let mut same = previous.clone();
        same.insert("batch_id".into(), json!("BATCH_X"));
        assert!(layer.supersede(&previous, &same).is_empty());

        let mut upgraded = previous.clone();
        upgraded.insert("customer_segment".into(), json!("VIP"));
        upgraded.insert("effective_from".into(), json!("2024-02-01"));
        let versions = layer.supersede(&previous, &upgraded);
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0]["effective_to"], json!("2024-02-01"));
        assert_eq!(versions[0]["is_current"], json!(false));
        assert_eq!(versions[1]["customer_segment"], json!("VIP"));
        assert_eq!(versions[1]["is_current"], json!(true));
    }

    fn user_dim(user_id: &str, tier: &str, price_like: Value) -> Record {
        record(json!({
            "record_type": "dwd_dim_users",
            "user_id": user_id,
            "full_name": "Li Wei",
            "email": "li@example.com",
            "country": price_like,
            "customer_segment": "Regular",
            "loyalty_tier": tier,
            "effective_from": "2024-02-01",
            "effective_to": null,
            "is_current": true
        }))
    }

    #[test]
    fn test_plan_versions_against_stored_rows() {
        let layer = layer();
        // 存储读回: 布尔为 0/1,数值可能丢失小数部分
        let mut stored_u1 = user_dim("U1", "Basic", json!(86));
        stored_u1.insert("is_current".into(), json!(1));
        let stored_u2 = user_dim("U2", "Basic", json!("CN"));

        let fact = record(json!({"record_type": "dwd_fact_orders", "order_id": "O1"}));
        let batch = vec![
            fact.clone(),
            user_dim("U1", "Basic", json!(86.0)),
            user_dim("U2", "Gold", json!("CN")),
            user_dim("U3", "Basic", json!("CN")),
        ];

        let plan = layer.plan_versions(&[stored_u1, stored_u2], &batch);

        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.closed.len(), 1);
        assert_eq!(plan.closed[0]["user_id"], json!("U2"));
        assert_eq!(plan.closed[0]["is_current"], json!(false));
        let written: Vec<_> = plan.records.iter().map(|r| r.text("user_id")).collect();
        assert_eq!(written, vec![None, Some("U2".into()), Some("U3".into())]);
        assert_eq!(plan.records[0], fact);
    }

    #[test]
    fn test_plan_versions_within_one_batch() {
        let layer = layer();
        let batch = vec![
            user_dim("U1", "Basic", json!("CN")),
            user_dim("U1", "Basic", json!("CN")),
            user_dim("U1", "Gold", json!("CN")),
        ];

        let plan = layer.plan_versions(&[], &batch);

        assert!(plan.closed.is_empty());
        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.records.len(), 2);
        assert_eq!(plan.records[0]["is_current"], json!(false));
        assert_eq!(plan.records[0]["effective_to"], json!("2024-02-01"));
        assert_eq!(plan.records[1]["loyalty_tier"], json!("Gold"));
        assert_eq!(plan.records[1]["is_current"], json!(true));
    }

    #[test]
    fn test_transform_idempotent_with_frozen_clock() {
        let layer = layer();
        let input = vec![
            record(json!({
                "record_type": "ods_orders",
                "order_id": "O1",
                "order_date": "2024-01-01",
                "unit_price": 10,
                "quantity": 3
            })),
            record(json!({"record_type": "ods_users", "user_id": "U1", "total_spent": 200})),
        ];

        let strip = |records: Vec<Record>| -> Vec<Record> {
            records
                .into_iter()
                .map(|mut r| {
                    r.remove("batch_id");
                    r
                })
                .collect()
        };
        let first = strip(layer.transform(&input).records);
        let second = strip(layer.transform(&input).records);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_output_passes_quality_rules() {
        let layer = layer();
        let outcome = layer.transform(&[record(json!({
            "record_type": "ods_orders",
            "order_id": "O1",
            "order_date": "2024-01-01",
            "unit_price": 10
        }))]);
        assert!(layer.validate_data_quality(&outcome.records).is_empty());
    }
}
