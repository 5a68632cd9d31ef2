// ==========================================
// 交易数仓分层引擎 - 销售预测
// ==========================================
// 职责: 基于最近 ≤7 个周期的移动平均 + 平均增长率外推
// 红线: 确定性规则,不是统计模型
// ==========================================

use crate::engine::metrics::{growth_rate, round_money, round_rate};
use serde::{Deserialize, Serialize};

/// 移动平均窗口
pub const FORECAST_WINDOW: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesForecast {
    pub data_points: usize,
    pub moving_average: f64,
    pub average_growth: f64,
    pub forecasts: Vec<f64>,
    pub confidence_level: String,
}

/// 数据点数 -> 置信度
pub fn confidence_level(data_points: usize) -> &'static str {
    if data_points >= 7 {
        "High"
    } else if data_points >= 3 {
        "Medium"
    } else {
        "Low"
    }
}

/// 按时间顺序的序列外推 horizon 个周期
pub fn forecast_series(values: &[f64], horizon: usize) -> SalesForecast {
    let window = &values[values.len().saturating_sub(FORECAST_WINDOW)..];

    let moving_average = if window.is_empty() {
        0.0
    } else {
        window.iter().sum::<f64>() / window.len() as f64
    };

    let growths: Vec<f64> = window
        .windows(2)
        .map(|pair| growth_rate(pair[1], pair[0]))
        .collect();
    let average_growth = if growths.is_empty() {
        0.0
    } else {
        growths.iter().sum::<f64>() / growths.len() as f64
    };

    let forecasts = (1..=horizon)
        .map(|i| round_money(moving_average * (1.0 + average_growth).powi(i as i32)))
        .collect();

    SalesForecast {
        data_points: window.len(),
        moving_average: round_money(moving_average),
        average_growth: round_rate(average_growth),
        forecasts,
        confidence_level: confidence_level(window.len()).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_series() {
        let f = forecast_series(&[100.0, 100.0, 100.0], 3);
        assert_eq!(f.moving_average, 100.0);
        assert_eq!(f.average_growth, 0.0);
        assert_eq!(f.forecasts, vec![100.0, 100.0, 100.0]);
        assert_eq!(f.confidence_level, "Medium");
    }

    #[test]
    fn test_growing_series() {
        let f = forecast_series(&[100.0, 110.0], 2);
        assert_eq!(f.moving_average, 105.0);
        assert_eq!(f.average_growth, 0.1);
        assert_eq!(f.forecasts, vec![115.5, 127.05]);
        assert_eq!(f.confidence_level, "Low");
    }

    #[test]
    fn test_window_uses_last_seven() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let f = forecast_series(&values, 1);
        assert_eq!(f.data_points, 7);
        assert_eq!(f.moving_average, 7.0); // 4..=10
        assert_eq!(f.confidence_level, "High");
    }

    #[test]
    fn test_empty_series() {
        let f = forecast_series(&[], 3);
        assert_eq!(f.data_points, 0);
        assert_eq!(f.forecasts, vec![0.0, 0.0, 0.0]);
    }
}
