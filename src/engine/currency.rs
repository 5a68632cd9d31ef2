// ==========================================
// 交易数仓分层引擎 - 币种折算
// ==========================================
// 职责: 金额统一折算为人民币 (CNY)
// 规则: amount * rate[currency], 未知币种汇率按 1.0
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 汇率表（币种 -> 兑人民币汇率）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyTable {
    rates: BTreeMap<String, f64>,
}

impl Default for CurrencyTable {
    fn default() -> Self {
        let rates = [("CNY", 1.0), ("USD", 7.2), ("JPY", 0.048), ("EUR", 7.8)]
            .into_iter()
            .map(|(c, r)| (c.to_string(), r))
            .collect();
        Self { rates }
    }
}

impl CurrencyTable {
    pub fn from_rates(rates: BTreeMap<String, f64>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(c, r)| (c.trim().to_uppercase(), r))
            .collect();
        Self { rates }
    }

    /// 查询汇率（大小写不敏感，未知币种 1.0）
    pub fn rate(&self, currency: &str) -> f64 {
        self.rates
            .get(&currency.trim().to_uppercase())
            .copied()
            .unwrap_or(1.0)
    }

    pub fn convert(&self, amount: f64, currency: &str) -> f64 {
        amount * self.rate(currency)
    }

    pub fn rates(&self) -> &BTreeMap<String, f64> {
        &self.rates
    }
}

/// 使用默认汇率表折算为人民币
pub fn convert_to_cny(amount: f64, currency: &str) -> f64 {
    CurrencyTable::default().convert(amount, currency)
}
