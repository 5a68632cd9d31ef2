// ==========================================
// 交易数仓分层引擎 - RFM 客户价值评分
// ==========================================
// 职责: Recency / Frequency / Monetary 1-5 分 + 客户分群
// 规则: 固定断点,分群按优先级判定
// ==========================================

use crate::domain::record::{Record, RecordExt};
use crate::domain::types::RfmSegment;
use crate::layer::error::LayerResult;
use serde::{Deserialize, Serialize};

/// RFM 评分结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfmScore {
    pub recency_score: u8,
    pub frequency_score: u8,
    pub monetary_score: u8,
    pub rfm_score: String,
    pub customer_segment: RfmSegment,
}

/// 最近购买天数 -> 1..5
pub fn recency_score(days_since_last_order: f64) -> u8 {
    if days_since_last_order <= 30.0 {
        5
    } else if days_since_last_order <= 60.0 {
        4
    } else if days_since_last_order <= 90.0 {
        3
    } else if days_since_last_order <= 180.0 {
        2
    } else {
        1
    }
}

/// 订单数 -> 1..5
pub fn frequency_score(total_orders: f64) -> u8 {
    if total_orders >= 20.0 {
        5
    } else if total_orders >= 10.0 {
        4
    } else if total_orders >= 5.0 {
        3
    } else if total_orders >= 2.0 {
        2
    } else {
        1
    }
}

/// 累计收入 -> 1..5
pub fn monetary_score(total_revenue: f64) -> u8 {
    if total_revenue >= 100_000.0 {
        5
    } else if total_revenue >= 50_000.0 {
        4
    } else if total_revenue >= 20_000.0 {
        3
    } else if total_revenue >= 5_000.0 {
        2
    } else {
        1
    }
}

/// 分群（优先级顺序）
pub fn rfm_segment(r: u8, f: u8, m: u8) -> RfmSegment {
    if r >= 4 && f >= 4 && m >= 4 {
        RfmSegment::Champions
    } else if r >= 3 && f >= 3 && m >= 3 {
        RfmSegment::LoyalCustomers
    } else if r >= 4 && f <= 2 {
        RfmSegment::NewCustomers
    } else if r <= 2 && f >= 3 {
        RfmSegment::AtRisk
    } else if r <= 2 && f <= 2 {
        RfmSegment::Lost
    } else {
        RfmSegment::Potential
    }
}

impl RfmScore {
    pub fn from_inputs(days_since_last_order: f64, total_orders: f64, total_revenue: f64) -> Self {
        let r = recency_score(days_since_last_order);
        let f = frequency_score(total_orders);
        let m = monetary_score(total_revenue);
        Self {
            recency_score: r,
            frequency_score: f,
            monetary_score: m,
            rfm_score: format!("{}{}{}", r, f, m),
            customer_segment: rfm_segment(r, f, m),
        }
    }
}

/// 从客户记录计算 RFM
///
/// 读取 days_since_last_order / total_orders / total_revenue;
/// 缺失的最近购买天数视为极久远（recency=1），缺失的次数/金额视为 0
pub fn calculate_rfm(record: &Record) -> LayerResult<RfmScore> {
    let days = record.f64_or("days_since_last_order", f64::MAX)?;
    let orders = record.f64_or("total_orders", 0.0)?;
    let revenue = record.f64_or("total_revenue", 0.0)?;
    Ok(RfmScore::from_inputs(days, orders, revenue))
}
