// ==========================================
// 交易数仓分层引擎 - 比率与趋势指标
// ==========================================
// 职责: DWS 层比率公式 / 流失概率启发式 / 趋势分级
// 规则:
// - 分母缺失或为 0 时按 1 计算（不是错误）
// - 比率保留 4 位小数,金额保留 2 位小数
// ==========================================

use crate::domain::types::TrendIndicator;

/// 默认下单间隔（天）
pub const DEFAULT_ORDER_FREQUENCY_DAYS: f64 = 30.0;

/// 安全除法：分母为 0 / 非有限值时按 1
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        numerator
    } else {
        numerator / denominator
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// 比率：4 位小数
pub fn round_rate(value: f64) -> f64 {
    round_to(value, 4)
}

/// 金额：2 位小数
pub fn round_money(value: f64) -> f64 {
    round_to(value, 2)
}

pub fn conversion_rate(completed_orders: f64, total_orders: f64) -> f64 {
    round_rate(safe_divide(completed_orders, total_orders))
}

pub fn retention_rate(retained_customers: f64, total_customers: f64) -> f64 {
    round_rate(safe_divide(retained_customers, total_customers))
}

pub fn average_order_value(revenue: f64, orders: f64) -> f64 {
    round_money(safe_divide(revenue, orders))
}

pub fn profit_margin(gross_profit: f64, revenue: f64) -> f64 {
    round_rate(safe_divide(gross_profit, revenue))
}

pub fn inventory_turnover(cost_of_goods_sold: f64, average_inventory_value: f64) -> f64 {
    round_rate(safe_divide(cost_of_goods_sold, average_inventory_value))
}

/// 增长率 (current - previous) / previous
pub fn growth_rate(current: f64, previous: f64) -> f64 {
    round_rate(safe_divide(current - previous, previous))
}

/// 流失概率启发式
///
/// # 规则
/// - days_since_last_order > 3 × 频率 → 0.8
/// - > 2 × 频率 → 0.6
/// - > 1.5 × 频率 → 0.4
/// - 其他 → 0.1
///
/// 频率缺失或 <= 0 时按 30 天。规则代理值,不是校准概率。
pub fn churn_probability(days_since_last_order: f64, order_frequency_days: Option<f64>) -> f64 {
    let frequency = order_frequency_days
        .filter(|f| *f > 0.0 && f.is_finite())
        .unwrap_or(DEFAULT_ORDER_FREQUENCY_DAYS);

    if days_since_last_order > frequency * 3.0 {
        0.8
    } else if days_since_last_order > frequency * 2.0 {
        0.6
    } else if days_since_last_order > frequency * 1.5 {
        0.4
    } else {
        0.1
    }
}

/// 趋势分级
///
/// 自上而下严格比较: 0.2 归 Up, -0.2 归 Strong Down;
/// -0.05 本身归 Stable
pub fn trend_indicator(growth_rate: f64) -> TrendIndicator {
    if growth_rate > 0.2 {
        TrendIndicator::StrongUp
    } else if growth_rate > 0.05 {
        TrendIndicator::Up
    } else if growth_rate >= -0.05 {
        TrendIndicator::Stable
    } else if growth_rate > -0.2 {
        TrendIndicator::Down
    } else {
        TrendIndicator::StrongDown
    }
}

/// 变异系数（标准差 / 均值），样本不足 2 个时为 0
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    round_rate(safe_divide(variance.sqrt(), mean))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_divide_defaults_denominator_to_one() {
        assert_eq!(safe_divide(10.0, 0.0), 10.0);
        assert_eq!(safe_divide(10.0, 4.0), 2.5);
        assert_eq!(safe_divide(10.0, f64::NAN), 10.0);
    }

    #[test]
    fn test_ratio_rounding() {
        assert_eq!(conversion_rate(1.0, 3.0), 0.3333);
        assert_eq!(average_order_value(100.0, 3.0), 33.33);
        assert_eq!(profit_margin(25.0, 100.0), 0.25);
        assert_eq!(inventory_turnover(500.0, 0.0), 500.0);
        assert_eq!(retention_rate(2.0, 3.0), 0.6667);
    }

    #[test]
    fn test_growth_rate() {
        assert_eq!(growth_rate(120.0, 100.0), 0.2);
        assert_eq!(growth_rate(80.0, 100.0), -0.2);
    }

    #[test]
    fn test_churn_probability_ladder() {
        assert_eq!(churn_probability(91.0, None), 0.8);
        assert_eq!(churn_probability(90.0, None), 0.6);
        assert_eq!(churn_probability(61.0, Some(30.0)), 0.6);
        assert_eq!(churn_probability(46.0, Some(30.0)), 0.4);
        assert_eq!(churn_probability(45.0, Some(30.0)), 0.1);
        assert_eq!(churn_probability(31.0, Some(10.0)), 0.8);
        // 非法频率回退 30
        assert_eq!(churn_probability(91.0, Some(0.0)), 0.8);
    }

    #[test]
    fn test_trend_boundaries_are_strict() {
        assert_eq!(trend_indicator(0.21), TrendIndicator::StrongUp);
        assert_eq!(trend_indicator(0.2), TrendIndicator::Up);
        assert_eq!(trend_indicator(0.05), TrendIndicator::Stable);
        assert_eq!(trend_indicator(-0.05), TrendIndicator::Stable);
        assert_eq!(trend_indicator(-0.0501), TrendIndicator::Down);
        assert_eq!(trend_indicator(-0.1999), TrendIndicator::Down);
        assert_eq!(trend_indicator(-0.2), TrendIndicator::StrongDown);
        assert_eq!(trend_indicator(-0.2001), TrendIndicator::StrongDown);
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[100.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[100.0, 100.0, 100.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[50.0, 150.0]), 0.5);
    }
}
