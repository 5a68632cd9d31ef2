// ==========================================
// 交易数仓分层引擎 - 加工参数
// ==========================================
// 职责: 汇率 / 节假日 / 默认下单间隔 / 汇总周期 / 质量拦截 / 预测期数
// 说明: 默认值即各层内置的固定参数
// ==========================================

use crate::domain::types::AggregationPeriod;
use crate::engine::currency::CurrencyTable;
use crate::engine::date_dimension::{DateDimensionGenerator, DEFAULT_HOLIDAYS};
use crate::engine::metrics::DEFAULT_ORDER_FREQUENCY_DAYS;
use crate::layer::ads::DEFAULT_FORECAST_HORIZON;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// 币种 -> 兑人民币汇率
    pub currency_rates: BTreeMap<String, f64>,
    /// 节假日（MM-DD）
    pub holidays: Vec<String>,
    /// 单笔订单客户的默认下单间隔（天）
    pub default_order_frequency_days: f64,
    pub aggregation_period: AggregationPeriod,
    /// 存在质量问题的层不落库（仍向下游传递）
    pub block_on_validation_issues: bool,
    pub forecast_horizon: usize,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            currency_rates: CurrencyTable::default().rates().clone(),
            holidays: DEFAULT_HOLIDAYS.iter().map(|h| h.to_string()).collect(),
            default_order_frequency_days: DEFAULT_ORDER_FREQUENCY_DAYS,
            aggregation_period: AggregationPeriod::default(),
            block_on_validation_issues: false,
            forecast_horizon: DEFAULT_FORECAST_HORIZON,
        }
    }
}

impl EtlConfig {
    pub fn currency_table(&self) -> CurrencyTable {
        CurrencyTable::from_rates(self.currency_rates.clone())
    }

    pub fn date_generator(&self) -> DateDimensionGenerator {
        DateDimensionGenerator::new(self.holidays.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_builtin_parameters() {
        let config = EtlConfig::default();
        assert_eq!(config.currency_rates.get("USD"), Some(&7.2));
        assert_eq!(config.holidays.len(), 4);
        assert_eq!(config.default_order_frequency_days, 30.0);
        assert_eq!(config.aggregation_period, AggregationPeriod::Daily);
        assert!(!config.block_on_validation_issues);
        assert_eq!(config.forecast_horizon, 3);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: EtlConfig =
            serde_json::from_str(r#"{"aggregation_period": "monthly", "forecast_horizon": 6}"#)
                .unwrap();
        assert_eq!(config.aggregation_period, AggregationPeriod::Monthly);
        assert_eq!(config.forecast_horizon, 6);
        assert_eq!(config.currency_table().rate("EUR"), 7.8);
    }
}
