// ==========================================
// 交易数仓分层引擎 - 客户分群与会员等级
// ==========================================
// 职责: DWD 用户维度派生字段
// 规则: 自上而下判定,首个命中即返回
// ==========================================

use crate::domain::types::{CustomerSegment, LoyaltyTier};

/// 客户分群
///
/// # 规则
/// 1. total_spent > 100000 或 order_count > 50 → VIP
/// 2. total_spent > 50000 或 order_count > 20 → Premium
/// 3. total_spent > 10000 或 order_count > 5 → Regular
/// 4. 其他 → New
pub fn customer_segment(total_spent: f64, order_count: i64) -> CustomerSegment {
    if total_spent > 100_000.0 || order_count > 50 {
        CustomerSegment::Vip
    } else if total_spent > 50_000.0 || order_count > 20 {
        CustomerSegment::Premium
    } else if total_spent > 10_000.0 || order_count > 5 {
        CustomerSegment::Regular
    } else {
        CustomerSegment::New
    }
}

/// 会员等级（积分降序阈值）
pub fn loyalty_tier(points: f64) -> LoyaltyTier {
    if points >= 10_000.0 {
        LoyaltyTier::Platinum
    } else if points >= 5_000.0 {
        LoyaltyTier::Gold
    } else if points >= 2_000.0 {
        LoyaltyTier::Silver
    } else if points >= 500.0 {
        LoyaltyTier::Bronze
    } else {
        LoyaltyTier::Basic
    }
}

/// 商品价格带（人民币单价）
pub fn price_band(price_cny: f64) -> &'static str {
    if price_cny < 100.0 {
        "Budget"
    } else if price_cny < 500.0 {
        "Mid-Range"
    } else if price_cny < 2_000.0 {
        "Premium"
    } else {
        "Luxury"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_segment_first_match_wins() {
        assert_eq!(customer_segment(150_000.0, 1), CustomerSegment::Vip);
        assert_eq!(customer_segment(0.0, 51), CustomerSegment::Vip);
        assert_eq!(customer_segment(60_000.0, 0), CustomerSegment::Premium);
        assert_eq!(customer_segment(0.0, 21), CustomerSegment::Premium);
        assert_eq!(customer_segment(10_001.0, 0), CustomerSegment::Regular);
        assert_eq!(customer_segment(0.0, 6), CustomerSegment::Regular);
        assert_eq!(customer_segment(10_000.0, 5), CustomerSegment::New);
    }

    #[test]
    fn test_customer_segment_boundaries_are_strict() {
        assert_eq!(customer_segment(100_000.0, 50), CustomerSegment::Premium);
        assert_eq!(customer_segment(50_000.0, 20), CustomerSegment::Regular);
    }

    #[test]
    fn test_loyalty_tier() {
        assert_eq!(loyalty_tier(10_000.0), LoyaltyTier::Platinum);
        assert_eq!(loyalty_tier(9_999.0), LoyaltyTier::Gold);
        assert_eq!(loyalty_tier(5_000.0), LoyaltyTier::Gold);
        assert_eq!(loyalty_tier(2_000.0), LoyaltyTier::Silver);
        assert_eq!(loyalty_tier(500.0), LoyaltyTier::Bronze);
        assert_eq!(loyalty_tier(499.0), LoyaltyTier::Basic);
    }

    #[test]
    fn test_price_band() {
        assert_eq!(price_band(99.0), "Budget");
        assert_eq!(price_band(100.0), "Mid-Range");
        assert_eq!(price_band(1_999.0), "Premium");
        assert_eq!(price_band(2_000.0), "Luxury");
    }
}
