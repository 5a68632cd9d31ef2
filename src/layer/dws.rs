// ==========================================
// 交易数仓分层引擎 - DWS 汇总层
// ==========================================
// 职责: 按周期 / 实体汇总明细层记录
// - dws_daily_sales         每周期销售 (订单数, 收入, 客单价, 完成率, 环比, 趋势)
// - dws_financial_summary   每周期财务 (收入, 成本, 毛利, 毛利率, 折扣, 退款)
// - dws_inventory_analysis  每商品库存 (日需求, 可供天数, 最优库存, 周转率)
// - dws_customer_rfm        每客户 RFM (最近/频次/金额, 流失概率, 分群)
// 说明: 仅汇总当前版本的维度行；批次首个周期环比为 0
// ==========================================

use crate::clock::{format_timestamp, Clock};
use crate::domain::record::{Record, RecordExt};
use crate::domain::schema::{IndexDescriptor, SchemaDescriptor};
use crate::domain::types::AggregationPeriod;
use crate::domain::validation::RuleSet;
use crate::engine::metrics::{
    average_order_value, churn_probability, conversion_rate, growth_rate, inventory_turnover,
    profit_margin, retention_rate, round_money, round_rate, trend_indicator,
    DEFAULT_ORDER_FREQUENCY_DAYS,
};
use crate::engine::rfm::RfmScore;
use crate::engine::risk::days_of_supply;
use crate::layer::batch::generate_batch_id;
use crate::layer::error::{LayerError, LayerResult};
use crate::layer::{new_record, opt_value, stamp_batch, Layer, LayerKind, TransformOutcome};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// 最优库存覆盖天数
pub const OPTIMAL_STOCK_DAYS: f64 = 30.0;

// ==========================================
// 明细层输入（类型化）
// ==========================================

#[derive(Debug, Clone)]
struct OrderFact {
    user_id: Option<String>,
    product_id: Option<String>,
    order_date: NaiveDate,
    quantity: f64,
    amount: f64,
    discount: f64,
    net_amount: f64,
    is_completed: bool,
    is_cancelled: bool,
}

#[derive(Debug, Clone)]
struct UserDim {
    user_id: String,
    full_name: Option<String>,
    customer_segment: Option<String>,
    loyalty_tier: Option<String>,
}

#[derive(Debug, Clone)]
struct ProductDim {
    product_id: String,
    product_name: Option<String>,
    category: Option<String>,
    cost: f64,
    unit_margin: f64,
    rating: f64,
}

#[derive(Debug, Clone)]
struct InventoryFact {
    product_id: String,
    snapshot_date: NaiveDate,
    quantity_on_hand: f64,
    reorder_point: f64,
    inventory_value: f64,
}

enum DetailRow {
    Order(OrderFact),
    User(UserDim),
    Product(ProductDim),
    Inventory(InventoryFact),
    Skip,
}

fn parse_detail(record: &Record) -> LayerResult<DetailRow> {
    // 已关闭的历史版本不参与汇总
    let is_history = record.bool_opt("is_current") == Some(false);

    let row = match record.record_type() {
        Some("dwd_fact_orders") => DetailRow::Order(OrderFact {
            user_id: record.text("user_id"),
            product_id: record.text("product_id"),
            order_date: record.require_date("order_date")?,
            quantity: record.f64_or("quantity", 0.0)?,
            amount: record.f64_or("amount_cny", 0.0)?,
            discount: record.f64_or("discount_cny", 0.0)?,
            net_amount: record.require_f64("net_amount_cny")?,
            is_completed: record.bool_opt("is_completed").unwrap_or(false),
            is_cancelled: record.bool_opt("is_cancelled").unwrap_or(false),
        }),
        Some("dwd_dim_users") if is_history => DetailRow::Skip,
        Some("dwd_dim_users") => DetailRow::User(UserDim {
            user_id: record.require_text("user_id")?,
            full_name: record.text("full_name"),
            customer_segment: record.text("customer_segment"),
            loyalty_tier: record.text("loyalty_tier"),
        }),
        Some("dwd_dim_products") if is_history => DetailRow::Skip,
        Some("dwd_dim_products") => DetailRow::Product(ProductDim {
            product_id: record.require_text("product_id")?,
            product_name: record.text("product_name"),
            category: record.text("category"),
            cost: record.f64_or("cost_cny", 0.0)?,
            unit_margin: record.f64_or("unit_margin", 0.0)?,
            rating: record.f64_or("rating", 0.0)?,
        }),
        Some("dwd_fact_inventory") => DetailRow::Inventory(InventoryFact {
            product_id: record.require_text("product_id")?,
            snapshot_date: record.require_date("snapshot_date")?,
            quantity_on_hand: record.require_f64("quantity_on_hand")?,
            reorder_point: record.f64_or("reorder_point", 0.0)?,
            inventory_value: record.f64_or("inventory_value_cny", 0.0)?,
        }),
        Some("dwd_dim_date") => DetailRow::Skip,
        other => {
            return Err(LayerError::unknown_record_type(
                record,
                other.unwrap_or("<missing>"),
            ))
        }
    };
    Ok(row)
}

/// 按类型分拣后的明细
#[derive(Default)]
struct DetailSet {
    orders: Vec<OrderFact>,
    users: HashMap<String, UserDim>,
    products: HashMap<String, ProductDim>,
    inventory: Vec<InventoryFact>,
}

fn ymd(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ==========================================
// AggregatedLayer
// ==========================================
pub struct AggregatedLayer {
    clock: Arc<dyn Clock>,
    period: AggregationPeriod,
    default_frequency_days: f64,
    schema: SchemaDescriptor,
    indexes: IndexDescriptor,
    rules: RuleSet,
}

impl AggregatedLayer {
    pub fn new(clock: Arc<dyn Clock>) -> LayerResult<Self> {
        Self::with_settings(clock, AggregationPeriod::default(), DEFAULT_ORDER_FREQUENCY_DAYS)
    }

    pub fn with_settings(
        clock: Arc<dyn Clock>,
        period: AggregationPeriod,
        default_frequency_days: f64,
    ) -> LayerResult<Self> {
        Ok(Self {
            clock,
            period,
            default_frequency_days,
            schema: Self::build_schema(),
            indexes: Self::build_indexes(),
            rules: Self::build_rules()?,
        })
    }

    pub fn period(&self) -> AggregationPeriod {
        self.period
    }

    fn build_schema() -> SchemaDescriptor {
        SchemaDescriptor::builder()
            .table(
                "dws_daily_sales",
                &[
                    ("period_start", "DATE"),
                    ("period_type", "VARCHAR(10)"),
                    ("total_orders", "INT"),
                    ("completed_orders", "INT"),
                    ("cancelled_orders", "INT"),
                    ("total_revenue", "DECIMAL(14,2)"),
                    ("total_quantity", "DECIMAL(14,2)"),
                    ("unique_customers", "INT"),
                    ("average_order_value", "DECIMAL(12,2)"),
                    ("conversion_rate", "DECIMAL(6,4)"),
                    ("repeat_customer_rate", "DECIMAL(6,4)"),
                    ("revenue_growth", "DECIMAL(8,4)"),
                    ("trend_indicator", "VARCHAR(20)"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "dws_financial_summary",
                &[
                    ("period_start", "DATE"),
                    ("period_type", "VARCHAR(10)"),
                    ("order_count", "INT"),
                    ("gross_revenue", "DECIMAL(14,2)"),
                    ("total_discount", "DECIMAL(14,2)"),
                    ("net_revenue", "DECIMAL(14,2)"),
                    ("cost_of_goods_sold", "DECIMAL(14,2)"),
                    ("gross_profit", "DECIMAL(14,2)"),
                    ("profit_margin", "DECIMAL(6,4)"),
                    ("refund_amount", "DECIMAL(14,2)"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "dws_inventory_analysis",
                &[
                    ("product_id", "VARCHAR(50)"),
                    ("product_name", "VARCHAR(255)"),
                    ("category", "VARCHAR(100)"),
                    ("snapshot_date", "DATE"),
                    ("current_stock", "DECIMAL(12,2)"),
                    ("reorder_point", "DECIMAL(12,2)"),
                    ("inventory_value", "DECIMAL(14,2)"),
                    ("units_sold", "DECIMAL(12,2)"),
                    ("revenue", "DECIMAL(14,2)"),
                    ("product_margin", "DECIMAL(6,4)"),
                    ("rating", "DECIMAL(3,2)"),
                    ("daily_demand", "DECIMAL(12,4)"),
                    ("days_of_supply", "DECIMAL(12,2)"),
                    ("optimal_stock", "DECIMAL(12,2)"),
                    ("inventory_turnover", "DECIMAL(8,4)"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .table(
                "dws_customer_rfm",
                &[
                    ("user_id", "VARCHAR(50)"),
                    ("full_name", "VARCHAR(200)"),
                    ("base_segment", "VARCHAR(20)"),
                    ("loyalty_tier", "VARCHAR(20)"),
                    ("first_order_date", "DATE"),
                    ("last_order_date", "DATE"),
                    ("days_since_last_order", "INT"),
                    ("total_orders", "INT"),
                    ("total_revenue", "DECIMAL(14,2)"),
                    ("average_order_value", "DECIMAL(12,2)"),
                    ("order_frequency_days", "DECIMAL(8,2)"),
                    ("churn_probability", "DECIMAL(4,2)"),
                    ("is_retained", "BOOLEAN"),
                    ("recency_score", "INT"),
                    ("frequency_score", "INT"),
                    ("monetary_score", "INT"),
                    ("rfm_score", "VARCHAR(3)"),
                    ("customer_segment", "VARCHAR(30)"),
                    ("batch_id", "VARCHAR(64)"),
                    ("etl_time", "TIMESTAMP"),
                ],
            )
            .build()
    }

    fn build_indexes() -> IndexDescriptor {
        IndexDescriptor::new()
            .with_table("dws_daily_sales", &[("idx_dws_sales_period", "period_start")])
            .with_table(
                "dws_financial_summary",
                &[("idx_dws_financial_period", "period_start")],
            )
            .with_table(
                "dws_inventory_analysis",
                &[("idx_dws_inventory_product", "product_id")],
            )
            .with_table(
                "dws_customer_rfm",
                &[
                    ("idx_dws_rfm_user", "user_id"),
                    ("idx_dws_rfm_segment", "customer_segment"),
                ],
            )
    }

    fn build_rules() -> LayerResult<RuleSet> {
        Ok(RuleSet::parse(&[
            ("record_type", "required|string"),
            ("batch_id", "required|string"),
            ("etl_time", "required|date"),
            ("period_start", "date"),
            ("total_orders", "numeric|min:0"),
            ("total_revenue", "numeric"),
            ("conversion_rate", "numeric|min:0|max:1"),
            ("repeat_customer_rate", "numeric|min:0|max:1"),
            ("profit_margin", "numeric|max:1"),
            ("current_stock", "numeric|min:0"),
            ("daily_demand", "numeric|min:0"),
            ("churn_probability", "numeric|min:0|max:1"),
            ("recency_score", "numeric|min:1|max:5"),
            ("frequency_score", "numeric|min:1|max:5"),
            ("monetary_score", "numeric|min:1|max:5"),
        ])?)
    }

    /// 按指定周期汇总
    pub fn aggregate(&self, records: &[Record], period: AggregationPeriod) -> TransformOutcome {
        let batch_id = generate_batch_id(self.clock.as_ref());
        let etl_time = format_timestamp(self.clock.now());

        let parsed: Vec<LayerResult<DetailRow>> = records.par_iter().map(parse_detail).collect();

        let mut details = DetailSet::default();
        let mut failures = Vec::new();
        for row in parsed {
            match row {
                Ok(DetailRow::Order(o)) => details.orders.push(o),
                Ok(DetailRow::User(u)) => {
                    details.users.insert(u.user_id.clone(), u);
                }
                Ok(DetailRow::Product(p)) => {
                    details.products.insert(p.product_id.clone(), p);
                }
                Ok(DetailRow::Inventory(i)) => details.inventory.push(i),
                Ok(DetailRow::Skip) => {}
                Err(e) => failures.push(e),
            }
        }

        let mut output = Vec::new();
        output.extend(self.sales_summaries(&details, period));
        output.extend(self.financial_summaries(&details, period));
        output.extend(self.inventory_analysis(&details));
        output.extend(self.customer_rfm(&details));
        for record in output.iter_mut() {
            stamp_batch(record, &batch_id, &etl_time);
        }

        info!(
            layer = %LayerKind::Dws,
            batch_id = %batch_id,
            period = %period,
            input = records.len(),
            output = output.len(),
            failures = failures.len(),
            "汇总层加工完成"
        );
        TransformOutcome {
            records: output,
            failures,
        }
    }

    // ==========================================
    // 周期销售
    // ==========================================
    fn sales_summaries(&self, details: &DetailSet, period: AggregationPeriod) -> Vec<Record> {
        let by_period = group_by_period(&details.orders, period);

        let mut seen_customers: HashSet<&str> = HashSet::new();
        let mut previous_revenue: Option<f64> = None;
        let mut rows = Vec::with_capacity(by_period.len());

        for (start, orders) in &by_period {
            let total = orders.len() as f64;
            let completed = orders.iter().filter(|o| o.is_completed).count() as f64;
            let cancelled = orders.iter().filter(|o| o.is_cancelled).count() as f64;
            let valid: Vec<&&OrderFact> = orders.iter().filter(|o| !o.is_cancelled).collect();

            let revenue = round_money(valid.iter().map(|o| o.net_amount).sum());
            let quantity: f64 = valid.iter().map(|o| o.quantity).sum();
            let customers: HashSet<&str> = orders
                .iter()
                .filter_map(|o| o.user_id.as_deref())
                .collect();
            let returning = customers
                .iter()
                .filter(|c| seen_customers.contains(*c))
                .count() as f64;

            let growth = previous_revenue
                .map(|prev| growth_rate(revenue, prev))
                .unwrap_or(0.0);

            let mut row = new_record("dws_daily_sales");
            row.insert("period_start".into(), Value::from(ymd(*start)));
            row.insert("period_type".into(), Value::from(period.as_str()));
            row.insert("total_orders".into(), Value::from(total as i64));
            row.insert("completed_orders".into(), Value::from(completed as i64));
            row.insert("cancelled_orders".into(), Value::from(cancelled as i64));
            row.insert("total_revenue".into(), Value::from(revenue));
            row.insert("total_quantity".into(), Value::from(quantity));
            row.insert("unique_customers".into(), Value::from(customers.len() as i64));
            row.insert(
                "average_order_value".into(),
                Value::from(average_order_value(revenue, valid.len() as f64)),
            );
            row.insert(
                "conversion_rate".into(),
                Value::from(conversion_rate(completed, total)),
            );
            row.insert(
                "repeat_customer_rate".into(),
                Value::from(retention_rate(returning, customers.len() as f64)),
            );
            row.insert("revenue_growth".into(), Value::from(growth));
            row.insert(
                "trend_indicator".into(),
                Value::from(trend_indicator(growth).as_str()),
            );
            rows.push(row);

            seen_customers.extend(customers);
            previous_revenue = Some(revenue);
        }
        rows
    }

    // ==========================================
    // 周期财务
    // ==========================================
    fn financial_summaries(&self, details: &DetailSet, period: AggregationPeriod) -> Vec<Record> {
        group_by_period(&details.orders, period)
            .into_iter()
            .map(|(start, orders)| {
                let (valid, cancelled): (Vec<&OrderFact>, Vec<&OrderFact>) =
                    orders.into_iter().partition(|o| !o.is_cancelled);

                let gross_revenue: f64 = valid.iter().map(|o| o.amount).sum();
                let total_discount: f64 = valid.iter().map(|o| o.discount).sum();
                let net_revenue: f64 = valid.iter().map(|o| o.net_amount).sum();
                let cogs: f64 = valid
                    .iter()
                    .map(|o| o.quantity * self.unit_cost(details, o.product_id.as_deref()))
                    .sum();
                let refunds: f64 = cancelled.iter().map(|o| o.net_amount).sum();
                let gross_profit = net_revenue - cogs;

                let mut row = new_record("dws_financial_summary");
                row.insert("period_start".into(), Value::from(ymd(start)));
                row.insert("period_type".into(), Value::from(period.as_str()));
                row.insert(
                    "order_count".into(),
                    Value::from((valid.len() + cancelled.len()) as i64),
                );
                row.insert("gross_revenue".into(), Value::from(round_money(gross_revenue)));
                row.insert("total_discount".into(), Value::from(round_money(total_discount)));
                row.insert("net_revenue".into(), Value::from(round_money(net_revenue)));
                row.insert("cost_of_goods_sold".into(), Value::from(round_money(cogs)));
                row.insert("gross_profit".into(), Value::from(round_money(gross_profit)));
                row.insert(
                    "profit_margin".into(),
                    Value::from(profit_margin(gross_profit, net_revenue)),
                );
                row.insert("refund_amount".into(), Value::from(round_money(refunds)));
                row
            })
            .collect()
    }

    fn unit_cost(&self, details: &DetailSet, product_id: Option<&str>) -> f64 {
        product_id
            .and_then(|id| details.products.get(id))
            .map(|p| p.cost)
            .unwrap_or(0.0)
    }

    // ==========================================
    // 商品库存分析
    // ==========================================
    fn inventory_analysis(&self, details: &DetailSet) -> Vec<Record> {
        // 每个商品取最新快照日,多仓合计
        let mut latest: BTreeMap<&str, (NaiveDate, f64, f64, f64)> = BTreeMap::new();
        for inv in &details.inventory {
            let entry = latest
                .entry(inv.product_id.as_str())
                .or_insert((inv.snapshot_date, 0.0, 0.0, 0.0));
            if inv.snapshot_date > entry.0 {
                *entry = (inv.snapshot_date, 0.0, 0.0, 0.0);
            }
            if inv.snapshot_date == entry.0 {
                entry.1 += inv.quantity_on_hand;
                entry.2 += inv.reorder_point;
                entry.3 += inv.inventory_value;
            }
        }

        let span_days = order_span_days(&details.orders);

        latest
            .into_iter()
            .map(|(product_id, (snapshot_date, stock, reorder_point, value))| {
                let sold: Vec<&OrderFact> = details
                    .orders
                    .iter()
                    .filter(|o| !o.is_cancelled && o.product_id.as_deref() == Some(product_id))
                    .collect();
                let units_sold: f64 = sold.iter().map(|o| o.quantity).sum();
                let revenue: f64 = sold.iter().map(|o| o.net_amount).sum();
                let product = details.products.get(product_id);
                let cogs = units_sold * product.map(|p| p.cost).unwrap_or(0.0);

                let daily_demand = round_rate(units_sold / span_days);
                let supply = days_of_supply(stock, daily_demand).map(round_money);

                let mut row = new_record("dws_inventory_analysis");
                row.insert("product_id".into(), Value::from(product_id));
                row.insert(
                    "product_name".into(),
                    opt_value(product.and_then(|p| p.product_name.clone())),
                );
                row.insert(
                    "category".into(),
                    opt_value(product.and_then(|p| p.category.clone())),
                );
                row.insert("snapshot_date".into(), Value::from(ymd(snapshot_date)));
                row.insert("current_stock".into(), Value::from(stock));
                row.insert("reorder_point".into(), Value::from(reorder_point));
                row.insert("inventory_value".into(), Value::from(round_money(value)));
                row.insert("units_sold".into(), Value::from(units_sold));
                row.insert("revenue".into(), Value::from(round_money(revenue)));
                row.insert(
                    "product_margin".into(),
                    Value::from(product.map(|p| p.unit_margin).unwrap_or(0.0)),
                );
                row.insert(
                    "rating".into(),
                    Value::from(product.map(|p| p.rating).unwrap_or(0.0)),
                );
                row.insert("daily_demand".into(), Value::from(daily_demand));
                row.insert(
                    "days_of_supply".into(),
                    supply.map(Value::from).unwrap_or(Value::Null),
                );
                row.insert(
                    "optimal_stock".into(),
                    Value::from(round_money(daily_demand * OPTIMAL_STOCK_DAYS)),
                );
                row.insert(
                    "inventory_turnover".into(),
                    Value::from(inventory_turnover(cogs, value)),
                );
                row
            })
            .collect()
    }

    // ==========================================
    // 客户 RFM
    // ==========================================
    fn customer_rfm(&self, details: &DetailSet) -> Vec<Record> {
        let today = self.clock.today();

        let mut by_user: BTreeMap<&str, Vec<&OrderFact>> = BTreeMap::new();
        for order in details.orders.iter().filter(|o| !o.is_cancelled) {
            if let Some(user_id) = order.user_id.as_deref() {
                by_user.entry(user_id).or_default().push(order);
            }
        }

        by_user
            .into_iter()
            .filter_map(|(user_id, orders)| {
                let first = orders.iter().map(|o| o.order_date).min()?;
                let last = orders.iter().map(|o| o.order_date).max()?;
                let total_orders = orders.len() as f64;
                let total_revenue = round_money(orders.iter().map(|o| o.net_amount).sum());
                let days_since = (today - last).num_days().max(0) as f64;

                let frequency = if orders.len() > 1 {
                    round_money((last - first).num_days() as f64 / (total_orders - 1.0))
                } else {
                    self.default_frequency_days
                };
                let effective_frequency = if frequency > 0.0 {
                    frequency
                } else {
                    self.default_frequency_days
                };
                let churn = churn_probability(days_since, Some(effective_frequency));
                let score = RfmScore::from_inputs(days_since, total_orders, total_revenue);
                let user = details.users.get(user_id);

                let mut row = new_record("dws_customer_rfm");
                row.insert("user_id".into(), Value::from(user_id));
                row.insert(
                    "full_name".into(),
                    opt_value(user.and_then(|u| u.full_name.clone())),
                );
                row.insert(
                    "base_segment".into(),
                    opt_value(user.and_then(|u| u.customer_segment.clone())),
                );
                row.insert(
                    "loyalty_tier".into(),
                    opt_value(user.and_then(|u| u.loyalty_tier.clone())),
                );
                row.insert("first_order_date".into(), Value::from(ymd(first)));
                row.insert("last_order_date".into(), Value::from(ymd(last)));
                row.insert("days_since_last_order".into(), Value::from(days_since as i64));
                row.insert("total_orders".into(), Value::from(orders.len() as i64));
                row.insert("total_revenue".into(), Value::from(total_revenue));
                row.insert(
                    "average_order_value".into(),
                    Value::from(average_order_value(total_revenue, total_orders)),
                );
                row.insert("order_frequency_days".into(), Value::from(frequency));
                row.insert("churn_probability".into(), Value::from(churn));
                row.insert("is_retained".into(), Value::Bool(orders.len() >= 2));
                row.insert("recency_score".into(), Value::from(score.recency_score));
                row.insert("frequency_score".into(), Value::from(score.frequency_score));
                row.insert("monetary_score".into(), Value::from(score.monetary_score));
                row.insert("rfm_score".into(), Value::from(score.rfm_score));
                row.insert(
                    "customer_segment".into(),
                    Value::from(score.customer_segment.as_str()),
                );
                Some(row)
            })
            .collect()
    }
}

/// 订单按周期起始日分组（有序）
fn group_by_period(
    orders: &[OrderFact],
    period: AggregationPeriod,
) -> BTreeMap<NaiveDate, Vec<&OrderFact>> {
    let mut groups: BTreeMap<NaiveDate, Vec<&OrderFact>> = BTreeMap::new();
    for order in orders {
        groups
            .entry(period.period_start(order.order_date))
            .or_default()
            .push(order);
    }
    groups
}

/// 批次订单覆盖的自然日数（至少 1）
fn order_span_days(orders: &[OrderFact]) -> f64 {
    let first = orders.iter().map(|o| o.order_date).min();
    let last = orders.iter().map(|o| o.order_date).max();
    match (first, last) {
        (Some(first), Some(last)) => ((last - first).num_days() + 1) as f64,
        _ => 1.0,
    }
}

impl Layer for AggregatedLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Dws
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
        self.aggregate(records, self.period)
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

    fn layer() -> AggregatedLayer {
        let clock = Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        AggregatedLayer::new(clock).unwrap()
    }

    fn order(id: &str, user: &str, product: &str, date: &str, qty: f64, net: f64, status: &str) -> Record {
        record(json!({
            "record_type": "dwd_fact_orders",
            "order_id": id,
            "user_id": user,
            "product_id": product,
            "order_date": date,
            "quantity": qty,
            "amount_cny": net,
            "discount_cny": 0.0,
            "net_amount_cny": net,
            "is_completed": status == "completed",
            "is_cancelled": status == "cancelled"
        }))
    }

    fn of_type<'a>(records: &'a [Record], record_type: &str) -> Vec<&'a Record> {
        records
            .iter()
            .filter(|r| r.record_type() == Some(record_type))
            .collect()
    }

    fn sample() -> Vec<Record> {
        vec![
            order("O1", "U1", "P1", "2024-01-01", 2.0, 100.0, "completed"),
            order("O2", "U2", "P1", "2024-01-01", 1.0, 100.0, "pending"),
            order("O3", "U1", "P1", "2024-01-02", 1.0, 150.0, "completed"),
            order("O4", "U3", "P1", "2024-01-02", 1.0, 80.0, "cancelled"),
            record(json!({
                "record_type": "dwd_dim_products",
                "product_id": "P1",
                "product_name": "Desk Lamp",
                "cost_cny": 30.0,
                "unit_margin": 0.4,
                "rating": 4.5,
                "is_current": true
            })),
            record(json!({
                "record_type": "dwd_fact_inventory",
                "product_id": "P1",
                "snapshot_date": "2024-01-02",
                "quantity_on_hand": 40,
                "reorder_point": 5,
                "inventory_value_cny": 1200.0
            })),
            record(json!({
                "record_type": "dwd_fact_inventory",
                "product_id": "P1",
                "snapshot_date": "2023-12-31",
                "quantity_on_hand": 999,
                "inventory_value_cny": 1.0
            })),
        ]
    }

    #[test]
    fn test_daily_sales_growth_and_trend() {
        let outcome = layer().transform(&sample());
        assert!(outcome.failures.is_empty());

        let sales = of_type(&outcome.records, "dws_daily_sales");
        assert_eq!(sales.len(), 2);

        let day1 = sales[0];
        assert_eq!(day1["period_start"], json!("2024-01-01"));
        assert_eq!(day1["total_orders"], json!(2));
        assert_eq!(day1["total_revenue"], json!(200.0));
        assert_eq!(day1["conversion_rate"], json!(0.5));
        assert_eq!(day1["revenue_growth"], json!(0.0));
        assert_eq!(day1["trend_indicator"], json!("Stable"));

        let day2 = sales[1];
        assert_eq!(day2["cancelled_orders"], json!(1));
        assert_eq!(day2["total_revenue"], json!(150.0));
        assert_eq!(day2["revenue_growth"], json!(-0.25));
        assert_eq!(day2["trend_indicator"], json!("Strong Down"));
        // U1 回购, U3 首次
        assert_eq!(day2["repeat_customer_rate"], json!(0.5));
    }

    #[test]
    fn test_monthly_period_groups_all_orders() {
        let outcome = layer().aggregate(&sample(), AggregationPeriod::Monthly);
        let sales = of_type(&outcome.records, "dws_daily_sales");
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0]["period_start"], json!("2024-01-01"));
        assert_eq!(sales[0]["period_type"], json!("monthly"));
        assert_eq!(sales[0]["total_revenue"], json!(350.0));
    }

    #[test]
    fn test_financial_summary() {
        let outcome = layer().aggregate(&sample(), AggregationPeriod::Monthly);
        let fin = of_type(&outcome.records, "dws_financial_summary")[0];
        assert_eq!(fin["net_revenue"], json!(350.0));
        assert_eq!(fin["cost_of_goods_sold"], json!(120.0));
        assert_eq!(fin["gross_profit"], json!(230.0));
        assert_eq!(fin["profit_margin"], json!(0.6571));
        assert_eq!(fin["refund_amount"], json!(80.0));
    }

    #[test]
    fn test_inventory_analysis_uses_latest_snapshot() {
        let outcome = layer().transform(&sample());
        let inv = of_type(&outcome.records, "dws_inventory_analysis")[0];
        assert_eq!(inv["current_stock"], json!(40.0));
        assert_eq!(inv["units_sold"], json!(4.0));
        // 4 件 / 2 天
        assert_eq!(inv["daily_demand"], json!(2.0));
        assert_eq!(inv["days_of_supply"], json!(20.0));
        assert_eq!(inv["optimal_stock"], json!(60.0));
        assert_eq!(inv["inventory_turnover"], json!(0.1));
        assert_eq!(inv["product_name"], json!("Desk Lamp"));
    }

    #[test]
    fn test_customer_rfm() {
        let outcome = layer().transform(&sample());
        let rfm = of_type(&outcome.records, "dws_customer_rfm");
        // U3 仅有取消订单,不计入
        assert_eq!(rfm.len(), 2);

        let u1 = rfm[0];
        assert_eq!(u1["user_id"], json!("U1"));
        assert_eq!(u1["total_orders"], json!(2));
        assert_eq!(u1["total_revenue"], json!(250.0));
        assert_eq!(u1["days_since_last_order"], json!(29));
        assert_eq!(u1["order_frequency_days"], json!(1.0));
        assert_eq!(u1["churn_probability"], json!(0.8));
        assert_eq!(u1["is_retained"], json!(true));
        assert_eq!(u1["rfm_score"], json!("521"));
        assert_eq!(u1["customer_segment"], json!("New Customers"));
    }

    #[test]
    fn test_bad_order_is_reported_not_fatal() {
        let mut input = sample();
        input.push(record(json!({
            "record_type": "dwd_fact_orders",
            "order_id": "BAD",
            "order_date": "2024-01-03",
            "net_amount_cny": "n/a"
        })));
        input.push(record(json!({"record_type": "mystery"})));

        let outcome = layer().transform(&input);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].record_id(), Some("BAD"));
        assert_eq!(of_type(&outcome.records, "dws_daily_sales").len(), 2);
    }

    #[test]
    fn test_output_passes_quality_rules() {
        let layer = layer();
        let outcome = layer.transform(&sample());
        assert!(layer.validate_data_quality(&outcome.records).is_empty());
    }
}
