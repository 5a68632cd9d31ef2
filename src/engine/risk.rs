// ==========================================
// 交易数仓分层引擎 - 风险分级
// ==========================================
// 职责: 流失 / 缺货 / 积压 风险与销售速度
// 规则: 各自独立的优先级阈值阶梯,首个命中即返回
// ==========================================

use crate::domain::types::{RiskLevel, SalesVelocity};
use crate::engine::metrics::safe_divide;

/// 流失风险（按流失概率）
///
/// ≥0.8 Critical / ≥0.6 High / ≥0.4 Medium / ≥0.2 Low / 其他 Very Low
pub fn assess_churn_risk(churn_probability: f64) -> RiskLevel {
    if churn_probability >= 0.8 {
        RiskLevel::Critical
    } else if churn_probability >= 0.6 {
        RiskLevel::High
    } else if churn_probability >= 0.4 {
        RiskLevel::Medium
    } else if churn_probability >= 0.2 {
        RiskLevel::Low
    } else {
        RiskLevel::VeryLow
    }
}

/// 可供天数；日需求 <= 0 时为 None（无消耗）
pub fn days_of_supply(current_stock: f64, daily_demand: f64) -> Option<f64> {
    if daily_demand > 0.0 {
        Some(current_stock / daily_demand)
    } else {
        None
    }
}

/// 缺货风险
///
/// # 规则
/// 1. current_stock <= reorder_point → Critical（优先于可供天数）
/// 2. 可供天数 ≤7 / ≤14 / ≤30 → High / Medium / Low
/// 3. 其他（含无需求）→ Very Low
pub fn assess_stockout_risk(current_stock: f64, reorder_point: f64, daily_demand: f64) -> RiskLevel {
    if current_stock <= reorder_point {
        return RiskLevel::Critical;
    }
    match days_of_supply(current_stock, daily_demand) {
        Some(days) if days <= 7.0 => RiskLevel::High,
        Some(days) if days <= 14.0 => RiskLevel::Medium,
        Some(days) if days <= 30.0 => RiskLevel::Low,
        _ => RiskLevel::VeryLow,
    }
}

/// 积压风险（current / optimal，optimal 为 0 时分母按 1）
pub fn assess_excess_stock_risk(current_stock: f64, optimal_stock: f64) -> RiskLevel {
    let ratio = safe_divide(current_stock, optimal_stock);
    if ratio >= 3.0 {
        RiskLevel::Critical
    } else if ratio >= 2.0 {
        RiskLevel::High
    } else if ratio >= 1.5 {
        RiskLevel::Medium
    } else if ratio >= 1.2 {
        RiskLevel::Low
    } else {
        RiskLevel::VeryLow
    }
}

/// 销售速度（件/天）
pub fn classify_sales_velocity(units_per_day: f64) -> SalesVelocity {
    if units_per_day >= 100.0 {
        SalesVelocity::VeryFast
    } else if units_per_day >= 50.0 {
        SalesVelocity::Fast
    } else if units_per_day >= 20.0 {
        SalesVelocity::Medium
    } else if units_per_day >= 5.0 {
        SalesVelocity::Slow
    } else {
        SalesVelocity::VerySlow
    }
}

/// 库存健康分：取缺货 / 积压两项风险映射分的较小值
pub fn inventory_health(stockout: RiskLevel, excess: RiskLevel) -> f64 {
    stockout.health_score().min(excess.health_score())
}
