// ==========================================
// 交易数仓分层引擎 - 告警与建议生成
// ==========================================
// 职责: 由已计算字段映射出 0..n 条告警 / 建议 / 分层行动计划
// 红线: 纯函数,固定触发条件,不读外部状态
// ==========================================

use crate::domain::insight::{ActionPlan, Alert, Recommendation};
use crate::domain::types::{
    AlertSeverity, PerformanceGrade, Priority, RfmSegment, RiskLevel, SalesVelocity,
    TrendIndicator,
};

// ==========================================
// 触发阈值
// ==========================================
pub const REVENUE_DROP_THRESHOLD: f64 = -0.10;
pub const REVENUE_SURGE_THRESHOLD: f64 = 0.30;
pub const LOW_MARGIN_THRESHOLD: f64 = 0.10;
pub const LOW_CONVERSION_THRESHOLD: f64 = 0.50;
pub const CHURN_ALERT_THRESHOLD: f64 = 0.7;
pub const HIGH_VOLATILITY_THRESHOLD: f64 = 0.5;

// ==========================================
// 告警
// ==========================================

/// 经营总览告警
pub fn executive_alerts(revenue_growth: f64, profit_margin: f64, conversion_rate: f64) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if revenue_growth < REVENUE_DROP_THRESHOLD {
        alerts.push(Alert::new(
            "warning",
            AlertSeverity::High,
            "revenue_growth",
            revenue_growth,
            format!("收入环比下降 {:.1}%", -revenue_growth * 100.0),
        ));
    } else if revenue_growth > REVENUE_SURGE_THRESHOLD {
        alerts.push(Alert::new(
            "info",
            AlertSeverity::Low,
            "revenue_growth",
            revenue_growth,
            format!("收入环比增长 {:.1}%", revenue_growth * 100.0),
        ));
    }

    if profit_margin < LOW_MARGIN_THRESHOLD {
        alerts.push(Alert::new(
            "warning",
            AlertSeverity::Medium,
            "profit_margin",
            profit_margin,
            format!("毛利率偏低: {:.1}%", profit_margin * 100.0),
        ));
    }

    if conversion_rate < LOW_CONVERSION_THRESHOLD {
        alerts.push(Alert::new(
            "warning",
            AlertSeverity::Medium,
            "conversion_rate",
            conversion_rate,
            format!("订单完成率偏低: {:.1}%", conversion_rate * 100.0),
        ));
    }

    alerts
}

/// 客户告警
pub fn customer_alerts(churn_probability: f64, days_since_last_order: f64) -> Vec<Alert> {
    let mut alerts = Vec::new();
    if churn_probability > CHURN_ALERT_THRESHOLD {
        alerts.push(Alert::new(
            "churn_risk",
            AlertSeverity::Critical,
            "churn_probability",
            churn_probability,
            format!("客户流失风险极高, 已 {:.0} 天未下单", days_since_last_order),
        ));
    }
    alerts
}

/// 库存告警
pub fn inventory_alerts(stockout: RiskLevel, excess: RiskLevel, current_stock: f64) -> Vec<Alert> {
    let mut alerts = Vec::new();
    match stockout {
        RiskLevel::Critical => alerts.push(Alert::new(
            "stockout",
            AlertSeverity::Critical,
            "current_stock",
            current_stock,
            "库存已低于再订货点",
        )),
        RiskLevel::High => alerts.push(Alert::new(
            "stockout",
            AlertSeverity::High,
            "current_stock",
            current_stock,
            "库存可供天数不足一周",
        )),
        _ => {}
    }
    if matches!(excess, RiskLevel::Critical | RiskLevel::High) {
        alerts.push(Alert::new(
            "excess_stock",
            AlertSeverity::Medium,
            "current_stock",
            current_stock,
            format!("库存积压 ({})", excess),
        ));
    }
    alerts
}

/// 商品告警
pub fn product_alerts(grade: PerformanceGrade, profit_margin: f64, performance_score: f64) -> Vec<Alert> {
    let mut alerts = Vec::new();
    if profit_margin < 0.0 {
        alerts.push(Alert::new(
            "negative_margin",
            AlertSeverity::High,
            "profit_margin",
            profit_margin,
            "商品毛利为负",
        ));
    }
    if grade == PerformanceGrade::F {
        alerts.push(Alert::new(
            "performance",
            AlertSeverity::High,
            "performance_score",
            performance_score,
            "商品综合表现不及格",
        ));
    }
    alerts
}

// ==========================================
// 建议
// ==========================================

/// 经营总览建议
pub fn executive_recommendations(trend: TrendIndicator, profit_margin: f64) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    match trend {
        TrendIndicator::StrongDown | TrendIndicator::Down => recs.push(Recommendation::new(
            "revenue",
            Priority::High,
            "启动促销与召回活动",
            "收入呈下降趋势,需要刺激需求",
            "止跌并恢复收入增长",
        )),
        TrendIndicator::StrongUp => recs.push(Recommendation::new(
            "capacity",
            Priority::Medium,
            "确认库存与履约能力",
            "收入快速增长,需防止断货",
            "保障增长期间的交付",
        )),
        _ => {}
    }
    if profit_margin < LOW_MARGIN_THRESHOLD {
        recs.push(Recommendation::new(
            "pricing",
            Priority::High,
            "复核定价与折扣策略",
            "毛利率低于 10%",
            "提升毛利率",
        ));
    }
    recs
}

/// 客户建议（按 RFM 分群与流失风险）
pub fn customer_recommendations(segment: RfmSegment, churn_risk: RiskLevel) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    let by_segment = match segment {
        RfmSegment::Champions => Recommendation::new(
            "retention",
            Priority::Medium,
            "提供专属权益",
            "高价值活跃客户,维持满意度",
            "提升复购与口碑推荐",
        ),
        RfmSegment::LoyalCustomers => Recommendation::new(
            "upsell",
            Priority::Medium,
            "推荐高阶商品",
            "忠诚客户,具备追加销售空间",
            "提升客单价",
        ),
        RfmSegment::NewCustomers => Recommendation::new(
            "onboarding",
            Priority::Medium,
            "发送新客引导与首单复购券",
            "新近客户,购买次数少",
            "提升二次购买率",
        ),
        RfmSegment::AtRisk => Recommendation::new(
            "winback",
            Priority::High,
            "发起定向召回",
            "曾经活跃的客户近期未下单",
            "降低流失",
        ),
        RfmSegment::Lost => Recommendation::new(
            "winback",
            Priority::Low,
            "低成本触达或移出营销名单",
            "客户已长期不活跃",
            "控制营销成本",
        ),
        RfmSegment::Potential => Recommendation::new(
            "engagement",
            Priority::Low,
            "个性化推荐",
            "具备成长潜力的客户",
            "提升购买频次",
        ),
    };
    recs.push(by_segment);

    if matches!(churn_risk, RiskLevel::Critical | RiskLevel::High) && segment != RfmSegment::AtRisk {
        recs.push(Recommendation::new(
            "churn",
            Priority::High,
            "安排客户经理回访",
            "流失风险高",
            "挽回高风险客户",
        ));
    }
    recs
}

/// 商品建议
pub fn product_recommendations(
    grade: PerformanceGrade,
    velocity: SalesVelocity,
    stockout: RiskLevel,
    excess: RiskLevel,
) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    if stockout.severity() >= RiskLevel::High.severity() {
        recs.push(Recommendation::new(
            "inventory",
            Priority::High,
            "立即补货",
            "缺货风险高",
            "避免断货损失",
        ));
    }
    if excess.severity() >= RiskLevel::High.severity() {
        recs.push(Recommendation::new(
            "inventory",
            Priority::Medium,
            "清理积压库存",
            "库存远高于最优水位",
            "释放资金占用",
        ));
    }
    if matches!(velocity, SalesVelocity::VerySlow | SalesVelocity::Slow)
        && grade.rank() <= PerformanceGrade::CMinus.rank()
    {
        recs.push(Recommendation::new(
            "assortment",
            Priority::Medium,
            "评估下架或调整定位",
            "动销慢且综合表现差",
            "优化商品结构",
        ));
    }
    if grade.rank() >= PerformanceGrade::AMinus.rank() {
        recs.push(Recommendation::new(
            "marketing",
            Priority::Low,
            "加大曝光资源",
            "综合表现优秀",
            "放大爆品收益",
        ));
    }
    recs
}

/// 市场建议
pub fn market_recommendations(trend: TrendIndicator, volatility: f64) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    if volatility > HIGH_VOLATILITY_THRESHOLD {
        recs.push(Recommendation::new(
            "planning",
            Priority::Medium,
            "平滑促销节奏",
            "收入波动较大",
            "降低经营波动",
        ));
    }
    if matches!(trend, TrendIndicator::StrongUp | TrendIndicator::Up) {
        recs.push(Recommendation::new(
            "growth",
            Priority::Low,
            "扩大获客投放",
            "市场处于上升期",
            "扩大市场份额",
        ));
    } else if matches!(trend, TrendIndicator::StrongDown | TrendIndicator::Down) {
        recs.push(Recommendation::new(
            "defense",
            Priority::High,
            "聚焦存量客户",
            "市场处于下行期",
            "守住核心收入",
        ));
    }
    recs
}

// ==========================================
// 分层行动计划
// ==========================================

/// 库存行动计划（立即 / 短期 / 长期）
pub fn inventory_action_plan(
    stockout: RiskLevel,
    excess: RiskLevel,
    velocity: SalesVelocity,
    reorder_quantity: f64,
) -> ActionPlan {
    let mut plan = ActionPlan::default();

    match stockout {
        RiskLevel::Critical => plan
            .immediate
            .push(format!("紧急补货 {:.0} 件", reorder_quantity)),
        RiskLevel::High => plan
            .immediate
            .push(format!("一周内补货 {:.0} 件", reorder_quantity)),
        RiskLevel::Medium => plan.short_term.push("两周内安排补货".to_string()),
        _ => {}
    }

    match excess {
        RiskLevel::Critical => {
            plan.immediate.push("暂停采购".to_string());
            plan.short_term.push("折扣清仓".to_string());
        }
        RiskLevel::High => plan.short_term.push("促销消化库存".to_string()),
        RiskLevel::Medium | RiskLevel::Low => {
            plan.long_term.push("下调安全库存与采购批量".to_string())
        }
        RiskLevel::VeryLow => {}
    }

    if matches!(velocity, SalesVelocity::VeryFast | SalesVelocity::Fast) {
        plan.long_term.push("提高再订货点并评估供应商产能".to_string());
    } else if velocity == SalesVelocity::VerySlow {
        plan.long_term.push("复核商品生命周期".to_string());
    }

    plan
}
