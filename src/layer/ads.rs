// ==========================================
// 交易数仓分层引擎 - ADS 应用层
// ==========================================
// 职责: 面向看板 / 预测 / 风险的业务指标
// - ads_executive_dashboard    每周期 KPI + 绩效等级 + 告警
// - ads_sales_forecast         移动平均外推
// - ads_customer_insights      流失风险 + 生命周期价值 + 建议
// - ads_product_intelligence   销售速度 + 绩效等级 + 建议
// - ads_inventory_optimization 缺货/积压风险 + 补货量 + 分层行动计划
// - ads_market_analysis        收入波动 + 市场趋势 + 分群分布
// 说明: 告警与建议为嵌套 JSON 数组
// ==========================================

use crate::clock::{format_timestamp, Clock};
use crate::domain::record::{Record, RecordExt};
use crate::domain::schema::{IndexDescriptor, SchemaDescriptor};
use crate::domain::types::{RfmSegment, RiskLevel};
use crate::domain::validation::RuleSet;
use crate::engine::alerts::{
    customer_alerts, customer_recommendations, executive_alerts, executive_recommendations,
    inventory_action_plan, inventory_alerts, market_recommendations, product_alerts,
    product_recommendations,
};
use crate::engine::forecast::forecast_series;
use crate::engine::grading::{assign_performance_grade, PerformanceInputs};
use crate::engine::metrics::{
    coefficient_of_variation, round_money, round_rate, safe_divide, trend_indicator,
    DEFAULT_ORDER_FREQUENCY_DAYS,
};
use crate::engine::rfm::rfm_segment;
use crate::engine::risk::{
    assess_churn_risk, assess_excess_stock_risk, assess_stockout_risk, classify_sales_velocity,
    inventory_health,
};
use crate::layer::batch::generate_batch_id;
use crate::layer::error::{LayerError, LayerResult};
use crate::layer::{new_record, opt_value, stamp_batch, Layer, LayerKind, TransformOutcome};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

/// 默认预测周期数
pub const DEFAULT_FORECAST_HORIZON: usize = 3;

/// 生命周期价值的预期年限
const LIFETIME_YEARS: f64 = 3.0;

// ==========================================
// 汇总层输入（类型化）
// ==========================================

#[derive(Debug, Clone)]
struct SalesRow {
    period_start: NaiveDate,
    total_revenue: f64,
    total_orders: f64,
    unique_customers: f64,
    average_order_value: f64,
    conversion_rate: f64,
    revenue_growth: f64,
}

#[derive(Debug, Clone)]
struct FinancialRow {
    period_start: NaiveDate,
    gross_profit: f64,
    profit_margin: f64,
}

#[derive(Debug, Clone)]
struct InventoryRow {
    product_id: String,
    product_name: Option<String>,
    category: Option<String>,
    current_stock: f64,
    reorder_point: f64,
    units_sold: f64,
    revenue: f64,
    product_margin: f64,
    rating: f64,
    daily_demand: f64,
    days_of_supply: Option<f64>,
    optimal_stock: f64,
}

impl InventoryRow {
    fn stockout_risk(&self) -> RiskLevel {
        assess_stockout_risk(self.current_stock, self.reorder_point, self.daily_demand)
    }

    fn excess_risk(&self) -> RiskLevel {
        assess_excess_stock_risk(self.current_stock, self.optimal_stock)
    }

    fn health(&self) -> f64 {
        inventory_health(self.stockout_risk(), self.excess_risk())
    }
}

#[derive(Debug, Clone)]
struct CustomerRow {
    user_id: String,
    full_name: Option<String>,
    days_since_last_order: f64,
    total_orders: f64,
    total_revenue: f64,
    average_order_value: f64,
    order_frequency_days: f64,
    churn_probability: f64,
    rfm_score: Option<String>,
    segment: RfmSegment,
}

enum SummaryRow {
    Sales(SalesRow),
    Financial(FinancialRow),
    Inventory(InventoryRow),
    Customer(CustomerRow),
}

fn score_field(record: &Record, field: &str) -> LayerResult<u8> {
    let score = record.require_f64(field)?;
    if score.fract() != 0.0 || !(1.0..=5.0).contains(&score) {
        return Err(LayerError::invalid_field(
            record,
            field,
            format!("评分应在 1..5, 实际 {}", score),
        ));
    }
    Ok(score as u8)
}

fn parse_summary(record: &Record) -> LayerResult<SummaryRow> {
    let row = match record.record_type() {
        Some("dws_daily_sales") => SummaryRow::Sales(SalesRow {
            period_start: record.require_date("period_start")?,
            total_revenue: record.require_f64("total_revenue")?,
            total_orders: record.f64_or("total_orders", 0.0)?,
            unique_customers: record.f64_or("unique_customers", 0.0)?,
            average_order_value: record.f64_or("average_order_value", 0.0)?,
            conversion_rate: record.f64_or("conversion_rate", 0.0)?,
            revenue_growth: record.f64_or("revenue_growth", 0.0)?,
        }),
        Some("dws_financial_summary") => SummaryRow::Financial(FinancialRow {
            period_start: record.require_date("period_start")?,
            gross_profit: record.f64_or("gross_profit", 0.0)?,
            profit_margin: record.f64_or("profit_margin", 0.0)?,
        }),
        Some("dws_inventory_analysis") => SummaryRow::Inventory(InventoryRow {
            product_id: record.require_text("product_id")?,
            product_name: record.text("product_name"),
            category: record.text("category"),
            current_stock: record.require_f64("current_stock")?,
            reorder_point: record.f64_or("reorder_point", 0.0)?,
            units_sold: record.f64_or("units_sold", 0.0)?,
            revenue: record.f64_or("revenue", 0.0)?,
            product_margin: record.f64_or("product_margin", 0.0)?,
            rating: record.f64_or("rating", 0.0)?,
            daily_demand: record.f64_or("daily_demand", 0.0)?,
            days_of_supply: record.f64_opt("days_of_supply")?,
            optimal_stock: record.f64_or("optimal_stock", 0.0)?,
        }),
        Some("dws_customer_rfm") => {
            let r = score_field(record, "recency_score")?;
            let f = score_field(record, "frequency_score")?;
            let m = score_field(record, "monetary_score")?;
            SummaryRow::Customer(CustomerRow {
                user_id: record.require_text("user_id")?,
                full_name: record.text("full_name"),
                days_since_last_order: record.require_f64("days_since_last_order")?,
                total_orders: record.f64_or("total_orders", 0.0)?,
                total_revenue: record.f64_or("total_revenue", 0.0)?,
                average_order_value: record.f64_or("average_order_value", 0.0)?,
                order_frequency_days: record
                    .f64_or("order_frequency_days", DEFAULT_ORDER_FREQUENCY_DAYS)?,
                churn_probability: record.require_f64("churn_probability")?,
                rfm_score: record.text("rfm_score"),
                segment: rfm_segment(r, f, m),
            })
        }
        other => {
            return Err(LayerError::unknown_record_type(
                record,
                other.unwrap_or("<missing>"),
            ))
        }
    };
    Ok(row)
}

#[derive(Default)]
struct SummarySet {
    sales: Vec<SalesRow>,
    financial: HashMap<NaiveDate, FinancialRow>,
    inventory: Vec<InventoryRow>,
    customers: Vec<CustomerRow>,
}

/// 嵌套结构 -> JSON 值
fn nested<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// 客户生命周期价值
///
/// avg_order_value × 365 / order_frequency_days × 3 × (1 − churn_probability)
pub fn lifetime_value(
    average_order_value: f64,
    order_frequency_days: f64,
    churn_probability: f64,
) -> f64 {
    let frequency = if order_frequency_days > 0.0 {
        order_frequency_days
    } else {
        DEFAULT_ORDER_FREQUENCY_DAYS
    };
    round_money(
        average_order_value * safe_divide(365.0, frequency) * LIFETIME_YEARS
            * (1.0 - churn_probability),
    )
}

/// 建议补货量: 缺货风险达到 Medium 时补至 最优库存 + 再订货点
pub fn reorder_quantity(
    stockout: RiskLevel,
    current_stock: f64,
    reorder_point: f64,
    optimal_stock: f64,
) -> f64 {
    if stockout.severity() < RiskLevel::Medium.severity() {
        return 0.0;
    }
    (optimal_stock + reorder_point - current_stock).max(0.0).ceil()
}

// ==========================================
// ApplicationLayer
// ==========================================
pub struct ApplicationLayer {
    clock: Arc<dyn Clock>,
    forecast_horizon: usize,
    schema: SchemaDescriptor,
    indexes: IndexDescriptor,
    rules: RuleSet,
}

impl ApplicationLayer {
    pub fn new(clock: Arc<dyn Clock>) -> LayerResult<Self> {
        Self::with_settings(clock, DEFAULT_FORECAST_HORIZON)
    }

    pub fn with_settings(clock: Arc<dyn Clock>, forecast_horizon: usize) -> LayerResult<Self> {
        Ok(Self {
            clock,
            forecast_horizon,
            schema: Self::build_schema(),
            indexes: Self::build_indexes(),
            rules: Self::build_rules()?,
        })
    }

    fn build_schema() -> SchemaDescriptor {
        SchemaDescriptor::builder()
            .table(
                "ads_executive_dashboard",
                &[
                    ("period_start", "DATE"),
                    ("total_revenue", "DECIMAL(14,2)"),
                    ("total_orders", "INT"),
                    ("unique_customers", "INT"),
                    ("average_order_value", "DECIMAL(12,2)"),
                    ("conversion_rate", "DECIMAL(6,4)"),
                    ("revenue_growth", "DECIMAL(8,4)"),
                    ("trend_indicator", "VARCHAR(20)"),
                    ("gross_profit", "DECIMAL(14,2)"),
                    ("profit_margin", "DECIMAL(6,4)"),
                    ("customer_satisfaction", "DECIMAL(3,2)"),
                    ("inventory_health", "DECIMAL(5,2)"),
                    ("performance_score", "DECIMAL(5,2)"),
                    ("performance_grade", "VARCHAR(2)"),
                    ("alerts", "JSON"),
                    ("recommendations", "JSON"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "ads_sales_forecast",
                &[
                    ("forecast_date", "DATE"),
                    ("last_period_start", "DATE"),
                    ("data_points", "INT"),
                    ("moving_average", "DECIMAL(14,2)"),
                    ("average_growth", "DECIMAL(8,4)"),
                    ("forecast_horizon", "INT"),
                    ("forecasts", "JSON"),
                    ("confidence_level", "VARCHAR(10)"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "ads_customer_insights",
                &[
                    ("user_id", "VARCHAR(50)"),
                    ("full_name", "VARCHAR(200)"),
                    ("rfm_score", "VARCHAR(3)"),
                    ("customer_segment", "VARCHAR(30)"),
                    ("days_since_last_order", "INT"),
                    ("total_orders", "INT"),
                    ("total_revenue", "DECIMAL(14,2)"),
                    ("churn_probability", "DECIMAL(4,2)"),
                    ("churn_risk", "VARCHAR(10)"),
                    ("lifetime_value", "DECIMAL(14,2)"),
                    ("alerts", "JSON"),
                    ("recommendations", "JSON"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "ads_product_intelligence",
                &[
                    ("product_id", "VARCHAR(50)"),
                    ("product_name", "VARCHAR(255)"),
                    ("category", "VARCHAR(100)"),
                    ("units_sold", "DECIMAL(12,2)"),
                    ("revenue", "DECIMAL(14,2)"),
                    ("daily_demand", "DECIMAL(12,4)"),
                    ("sales_velocity", "VARCHAR(10)"),
                    ("inventory_health", "DECIMAL(5,2)"),
                    ("performance_score", "DECIMAL(5,2)"),
                    ("performance_grade", "VARCHAR(2)"),
                    ("alerts", "JSON"),
                    ("recommendations", "JSON"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "ads_inventory_optimization",
                &[
                    ("product_id", "VARCHAR(50)"),
                    ("current_stock", "DECIMAL(12,2)"),
                    ("reorder_point", "DECIMAL(12,2)"),
                    ("optimal_stock", "DECIMAL(12,2)"),
                    ("daily_demand", "DECIMAL(12,4)"),
                    ("days_of_supply", "DECIMAL(12,2)"),
                    ("stockout_risk", "VARCHAR(10)"),
                    ("excess_stock_risk", "VARCHAR(10)"),
                    ("reorder_quantity", "DECIMAL(12,2)"),
                    ("alerts", "JSON"),
                    ("action_plan", "JSON"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "ads_market_analysis",
                &[
                    ("analysis_date", "DATE"),
                    ("period_count", "INT"),
                    ("total_revenue", "DECIMAL(14,2)"),
                    ("average_growth", "DECIMAL(8,4)"),
                    ("revenue_volatility", "DECIMAL(8,4)"),
                    ("market_trend", "VARCHAR(20)"),
                    ("customer_count", "INT"),
                    ("segment_distribution", "JSON"),
                    ("recommendations", "JSON"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .build()
    }

    fn build_indexes() -> IndexDescriptor {
        IndexDescriptor::new()
            .with_table(
                "ads_executive_dashboard",
                &[("idx_ads_dashboard_period", "period_start")],
            )
            .with_table(
                "ads_customer_insights",
                &[
                    ("idx_ads_customer_user", "user_id"),
                    ("idx_ads_customer_risk", "churn_risk"),
                ],
            )
            .with_table(
                "ads_product_intelligence",
                &[("idx_ads_product_grade", "performance_grade")],
            )
            .with_table(
                "ads_inventory_optimization",
                &[("idx_ads_inventory_risk", "stockout_risk")],
            )
    }

    fn build_rules() -> LayerResult<RuleSet> {
        Ok(RuleSet::parse(&[
            ("record_type", "required|string"),
            ("batch_id", "required|string"),
            ("etl_time", "required|date"),
            ("performance_score", "numeric|min:0|max:100"),
            ("inventory_health", "numeric|min:0|max:100"),
            ("churn_probability", "numeric|min:0|max:1"),
            ("lifetime_value", "numeric|min:0"),
            ("reorder_quantity", "numeric|min:0"),
            ("revenue_volatility", "numeric|min:0"),
            ("conversion_rate", "numeric|min:0|max:1"),
        ])?)
    }

    // ==========================================
    // 经营总览
    // ==========================================
    fn executive_dashboard(&self, set: &SummarySet) -> Vec<Record> {
        let health = mean(set.inventory.iter().map(InventoryRow::health)).unwrap_or(100.0);
        let satisfaction = mean(set.inventory.iter().map(|i| i.rating)).unwrap_or(0.0);

        set.sales
            .iter()
            .map(|sales| {
                let financial = set.financial.get(&sales.period_start);
                let margin = financial.map(|f| f.profit_margin).unwrap_or(0.0);
                let trend = trend_indicator(sales.revenue_growth);
                let (score, grade) = assign_performance_grade(&PerformanceInputs {
                    sales: sales.total_revenue,
                    margin,
                    satisfaction,
                    inventory_health: health,
                });

                let mut row = new_record("ads_executive_dashboard");
                row.insert("period_start".into(), Value::from(ymd(sales.period_start)));
                row.insert("total_revenue".into(), Value::from(sales.total_revenue));
                row.insert("total_orders".into(), Value::from(sales.total_orders as i64));
                row.insert(
                    "unique_customers".into(),
                    Value::from(sales.unique_customers as i64),
                );
                row.insert(
                    "average_order_value".into(),
                    Value::from(sales.average_order_value),
                );
                row.insert("conversion_rate".into(), Value::from(sales.conversion_rate));
                row.insert("revenue_growth".into(), Value::from(sales.revenue_growth));
                row.insert("trend_indicator".into(), Value::from(trend.as_str()));
                row.insert(
                    "gross_profit".into(),
                    Value::from(financial.map(|f| f.gross_profit).unwrap_or(0.0)),
                );
                row.insert("profit_margin".into(), Value::from(margin));
                row.insert(
                    "customer_satisfaction".into(),
                    Value::from(round_money(satisfaction)),
                );
                row.insert("inventory_health".into(), Value::from(round_money(health)));
                row.insert("performance_score".into(), Value::from(score));
                row.insert("performance_grade".into(), Value::from(grade.as_str()));
                row.insert(
                    "alerts".into(),
                    nested(&executive_alerts(
                        sales.revenue_growth,
                        margin,
                        sales.conversion_rate,
                    )),
                );
                row.insert(
                    "recommendations".into(),
                    nested(&executive_recommendations(trend, margin)),
                );
                row
            })
            .collect()
    }

    // ==========================================
    // 销售预测
    // ==========================================
    fn sales_forecast(&self, set: &SummarySet) -> Option<Record> {
        let last = set.sales.last()?;
        let revenues: Vec<f64> = set.sales.iter().map(|s| s.total_revenue).collect();
        let forecast = forecast_series(&revenues, self.forecast_horizon);

        let mut row = new_record("ads_sales_forecast");
        row.insert("forecast_date".into(), Value::from(ymd(self.clock.today())));
        row.insert("last_period_start".into(), Value::from(ymd(last.period_start)));
        row.insert("data_points".into(), Value::from(forecast.data_points as i64));
        row.insert("moving_average".into(), Value::from(forecast.moving_average));
        row.insert("average_growth".into(), Value::from(forecast.average_growth));
        row.insert(
            "forecast_horizon".into(),
            Value::from(self.forecast_horizon as i64),
        );
        row.insert("forecasts".into(), nested(&forecast.forecasts));
        row.insert(
            "confidence_level".into(),
            Value::from(forecast.confidence_level),
        );
        Some(row)
    }

    // ==========================================
    // 客户洞察
    // ==========================================
    fn customer_insight(customer: &CustomerRow) -> Record {
        let churn_risk = assess_churn_risk(customer.churn_probability);

        let mut row = new_record("ads_customer_insights");
        row.insert("user_id".into(), Value::from(customer.user_id.as_str()));
        row.insert("full_name".into(), opt_value(customer.full_name.clone()));
        row.insert("rfm_score".into(), opt_value(customer.rfm_score.clone()));
        row.insert(
            "customer_segment".into(),
            Value::from(customer.segment.as_str()),
        );
        row.insert(
            "days_since_last_order".into(),
            Value::from(customer.days_since_last_order as i64),
        );
        row.insert("total_orders".into(), Value::from(customer.total_orders as i64));
        row.insert("total_revenue".into(), Value::from(customer.total_revenue));
        row.insert(
            "churn_probability".into(),
            Value::from(customer.churn_probability),
        );
        row.insert("churn_risk".into(), Value::from(churn_risk.as_str()));
        row.insert(
            "lifetime_value".into(),
            Value::from(lifetime_value(
                customer.average_order_value,
                customer.order_frequency_days,
                customer.churn_probability,
            )),
        );
        row.insert(
            "alerts".into(),
            nested(&customer_alerts(
                customer.churn_probability,
                customer.days_since_last_order,
            )),
        );
        row.insert(
            "recommendations".into(),
            nested(&customer_recommendations(customer.segment, churn_risk)),
        );
        row
    }

    // ==========================================
    // 商品洞察
    // ==========================================
    fn product_intelligence(item: &InventoryRow) -> Record {
        let stockout = item.stockout_risk();
        let excess = item.excess_risk();
        let health = inventory_health(stockout, excess);
        let velocity = classify_sales_velocity(item.daily_demand);
        let (score, grade) = assign_performance_grade(&PerformanceInputs {
            sales: item.revenue,
            margin: item.product_margin,
            satisfaction: item.rating,
            inventory_health: health,
        });

        let mut row = new_record("ads_product_intelligence");
        row.insert("product_id".into(), Value::from(item.product_id.as_str()));
        row.insert("product_name".into(), opt_value(item.product_name.clone()));
        row.insert("category".into(), opt_value(item.category.clone()));
        row.insert("units_sold".into(), Value::from(item.units_sold));
        row.insert("revenue".into(), Value::from(item.revenue));
        row.insert("daily_demand".into(), Value::from(item.daily_demand));
        row.insert("sales_velocity".into(), Value::from(velocity.as_str()));
        row.insert("inventory_health".into(), Value::from(health));
        row.insert("performance_score".into(), Value::from(score));
        row.insert("performance_grade".into(), Value::from(grade.as_str()));
        row.insert(
            "alerts".into(),
            nested(&product_alerts(grade, item.product_margin, score)),
        );
        row.insert(
            "recommendations".into(),
            nested(&product_recommendations(grade, velocity, stockout, excess)),
        );
        row
    }

    // ==========================================
    // 库存优化
    // ==========================================
    fn inventory_optimization(item: &InventoryRow) -> Record {
        let stockout = item.stockout_risk();
        let excess = item.excess_risk();
        let velocity = classify_sales_velocity(item.daily_demand);
        let quantity = reorder_quantity(
            stockout,
            item.current_stock,
            item.reorder_point,
            item.optimal_stock,
        );
        let plan = inventory_action_plan(stockout, excess, velocity, quantity);

        let mut row = new_record("ads_inventory_optimization");
        row.insert("product_id".into(), Value::from(item.product_id.as_str()));
        row.insert("current_stock".into(), Value::from(item.current_stock));
        row.insert("reorder_point".into(), Value::from(item.reorder_point));
        row.insert("optimal_stock".into(), Value::from(item.optimal_stock));
        row.insert("daily_demand".into(), Value::from(item.daily_demand));
        row.insert(
            "days_of_supply".into(),
            item.days_of_supply.map(Value::from).unwrap_or(Value::Null),
        );
        row.insert("stockout_risk".into(), Value::from(stockout.as_str()));
        row.insert("excess_stock_risk".into(), Value::from(excess.as_str()));
        row.insert("reorder_quantity".into(), Value::from(quantity));
        row.insert(
            "alerts".into(),
            nested(&inventory_alerts(stockout, excess, item.current_stock)),
        );
        row.insert("action_plan".into(), nested(&plan));
        row
    }

    // ==========================================
    // 市场分析
    // ==========================================
    fn market_analysis(&self, set: &SummarySet) -> Option<Record> {
        if set.sales.is_empty() {
            return None;
        }
        let revenues: Vec<f64> = set.sales.iter().map(|s| s.total_revenue).collect();
        // 首个周期无环比,不参与平均
        let average_growth = round_rate(
            mean(set.sales.iter().skip(1).map(|s| s.revenue_growth)).unwrap_or(0.0),
        );
        let volatility = coefficient_of_variation(&revenues);
        let trend = trend_indicator(average_growth);

        let mut distribution: BTreeMap<&str, i64> = BTreeMap::new();
        for customer in &set.customers {
            *distribution.entry(customer.segment.as_str()).or_default() += 1;
        }

        let mut row = new_record("ads_market_analysis");
        row.insert("analysis_date".into(), Value::from(ymd(self.clock.today())));
        row.insert("period_count".into(), Value::from(set.sales.len() as i64));
        row.insert(
            "total_revenue".into(),
            Value::from(round_money(revenues.iter().sum())),
        );
        row.insert("average_growth".into(), Value::from(average_growth));
        row.insert("revenue_volatility".into(), Value::from(volatility));
        row.insert("market_trend".into(), Value::from(trend.as_str()));
        row.insert(
            "customer_count".into(),
            Value::from(set.customers.len() as i64),
        );
        row.insert("segment_distribution".into(), nested(&distribution));
        row.insert(
            "recommendations".into(),
            nested(&market_recommendations(trend, volatility)),
        );
        Some(row)
    }
}

impl Layer for ApplicationLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Ads
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
        let batch_id = generate_batch_id(self.clock.as_ref());
        let etl_time = format_timestamp(self.clock.now());

        let parsed: Vec<LayerResult<SummaryRow>> = records.par_iter().map(parse_summary).collect();

        let mut set = SummarySet::default();
        let mut failures = Vec::new();
        for row in parsed {
            match row {
                Ok(SummaryRow::Sales(s)) => set.sales.push(s),
                Ok(SummaryRow::Financial(f)) => {
                    set.financial.insert(f.period_start, f);
                }
                Ok(SummaryRow::Inventory(i)) => set.inventory.push(i),
                Ok(SummaryRow::Customer(c)) => set.customers.push(c),
                Err(e) => failures.push(e),
            }
        }
        set.sales.sort_by_key(|s| s.period_start);

        let mut output = self.executive_dashboard(&set);
        output.extend(self.sales_forecast(&set));
        output.extend(set.customers.par_iter().map(Self::customer_insight).collect::<Vec<_>>());
        output.extend(
            set.inventory
                .par_iter()
                .map(Self::product_intelligence)
                .collect::<Vec<_>>(),
        );
        output.extend(
            set.inventory
                .par_iter()
                .map(Self::inventory_optimization)
                .collect::<Vec<_>>(),
        );
        output.extend(self.market_analysis(&set));
        for record in output.iter_mut() {
            stamp_batch(record, &batch_id, &etl_time);
        }

        info!(
            layer = %LayerKind::Ads,
            batch_id = %batch_id,
            input = records.len(),
            output = output.len(),
            failures = failures.len(),
            "应用层加工完成"
        );
        TransformOutcome {
            records: output,
            failures,
        }
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

    fn layer() -> ApplicationLayer {
        let clock = Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        ApplicationLayer::new(clock).unwrap()
    }

    fn of_type<'a>(records: &'a [Record], record_type: &str) -> Vec<&'a Record> {
        records
            .iter()
            .filter(|r| r.record_type() == Some(record_type))
            .collect()
    }

    fn sales(period: &str, revenue: f64, growth: f64) -> Record {
        record(json!({
            "record_type": "dws_daily_sales",
            "period_start": period,
            "total_orders": 10,
            "unique_customers": 8,
            "total_revenue": revenue,
            "average_order_value": revenue / 10.0,
            "conversion_rate": 0.9,
            "revenue_growth": growth
        }))
    }

    fn summaries() -> Vec<Record> {
        vec![
            sales("2024-01-02", 800.0, -0.2),
            sales("2024-01-01", 1000.0, 0.0),
            record(json!({
                "record_type": "dws_financial_summary",
                "period_start": "2024-01-02",
                "gross_profit": 40.0,
                "profit_margin": 0.05
            })),
            record(json!({
                "record_type": "dws_inventory_analysis",
                "product_id": "P1",
                "current_stock": 5,
                "reorder_point": 10,
                "units_sold": 30,
                "revenue": 3000.0,
                "product_margin": 0.3,
                "rating": 4.0,
                "daily_demand": 1.0,
                "days_of_supply": 5.0,
                "optimal_stock": 30.0
            })),
            record(json!({
                "record_type": "dws_customer_rfm",
                "user_id": "U1",
                "days_since_last_order": 120,
                "total_orders": 6,
                "total_revenue": 6000.0,
                "average_order_value": 1000.0,
                "order_frequency_days": 20.0,
                "churn_probability": 0.8,
                "recency_score": 2,
                "frequency_score": 3,
                "monetary_score": 2,
                "rfm_score": "232"
            })),
        ]
    }

    #[test]
    fn test_dashboard_per_period_in_order() {
        let outcome = layer().transform(&summaries());
        assert!(outcome.failures.is_empty());

        let dashboards = of_type(&outcome.records, "ads_executive_dashboard");
        assert_eq!(dashboards.len(), 2);
        assert_eq!(dashboards[0]["period_start"], json!("2024-01-01"));

        let day2 = dashboards[1];
        assert_eq!(day2["trend_indicator"], json!("Strong Down"));
        assert_eq!(day2["profit_margin"], json!(0.05));
        // 收入下降 20% + 毛利率 5%
        let alerts = day2["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0]["type"], json!("warning"));
        assert_eq!(alerts[0]["severity"], json!("high"));
        assert!(day2["performance_grade"].is_string());
    }

    #[test]
    fn test_forecast_record() {
        let outcome = layer().transform(&summaries());
        let forecast = of_type(&outcome.records, "ads_sales_forecast")[0];
        assert_eq!(forecast["data_points"], json!(2));
        assert_eq!(forecast["moving_average"], json!(900.0));
        assert_eq!(forecast["confidence_level"], json!("Low"));
        assert_eq!(forecast["forecasts"].as_array().unwrap().len(), 3);
        assert_eq!(forecast["last_period_start"], json!("2024-01-02"));
    }

    #[test]
    fn test_customer_insight() {
        let outcome = layer().transform(&summaries());
        let insight = of_type(&outcome.records, "ads_customer_insights")[0];
        assert_eq!(insight["customer_segment"], json!("At Risk"));
        assert_eq!(insight["churn_risk"], json!("Critical"));
        // 1000 × 365/20 × 3 × 0.2
        assert_eq!(insight["lifetime_value"], json!(10950.0));
        assert_eq!(insight["alerts"].as_array().unwrap().len(), 1);
        assert_eq!(insight["recommendations"][0]["category"], json!("winback"));
    }

    #[test]
    fn test_inventory_optimization() {
        let outcome = layer().transform(&summaries());
        let inv = of_type(&outcome.records, "ads_inventory_optimization")[0];
        assert_eq!(inv["stockout_risk"], json!("Critical"));
        assert_eq!(inv["excess_stock_risk"], json!("Very Low"));
        // 30 + 10 - 5
        assert_eq!(inv["reorder_quantity"], json!(35.0));
        assert_eq!(inv["action_plan"]["immediate"][0], json!("紧急补货 35 件"));

        let product = of_type(&outcome.records, "ads_product_intelligence")[0];
        assert_eq!(product["inventory_health"], json!(20.0));
        assert_eq!(product["sales_velocity"], json!("Very Slow"));
    }

    #[test]
    fn test_market_analysis() {
        let outcome = layer().transform(&summaries());
        let market = of_type(&outcome.records, "ads_market_analysis")[0];
        assert_eq!(market["period_count"], json!(2));
        assert_eq!(market["total_revenue"], json!(1800.0));
        assert_eq!(market["average_growth"], json!(-0.2));
        assert_eq!(market["market_trend"], json!("Strong Down"));
        assert_eq!(market["segment_distribution"], json!({"At Risk": 1}));
    }

    #[test]
    fn test_lifetime_value_and_reorder_helpers() {
        assert_eq!(lifetime_value(100.0, 0.0, 0.0), 3650.0);
        assert_eq!(reorder_quantity(RiskLevel::Low, 5.0, 10.0, 30.0), 0.0);
        assert_eq!(reorder_quantity(RiskLevel::Medium, 50.0, 10.0, 30.0), 0.0);
    }

    #[test]
    fn test_unknown_summary_type_is_failure() {
        let outcome = layer().transform(&[record(json!({"record_type": "dwd_fact_orders", "order_id": "O1"}))]);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.records.is_empty());
    }

    #[test]
    fn test_customer_row_without_scores_is_failure() {
        let mut rows = summaries();
        let customer = rows.last_mut().unwrap();
        customer.remove("frequency_score");

        let outcome = layer().transform(&rows);

        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            &outcome.failures[0],
            LayerError::MissingField { field, .. } if field == "frequency_score"
        ));
        assert!(of_type(&outcome.records, "ads_customer_insights").is_empty());
    }

    #[test]
    fn test_output_passes_quality_rules() {
        let layer = layer();
        let outcome = layer.transform(&summaries());
        assert!(layer.validate_data_quality(&outcome.records).is_empty());
    }
}
