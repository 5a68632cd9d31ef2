// ==========================================
// 交易数仓分层引擎 - 领域类型定义
// ==========================================
// 职责: 分群 / 等级 / 风险 / 趋势等枚举
// 红线: 全部为固定阈值判定结果,不是模型输出
// ==========================================

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ==========================================
// 客户分群 (DWD 用户维度)
// ==========================================
labelled_enum!(CustomerSegment {
    Vip => "VIP",
    Premium => "Premium",
    Regular => "Regular",
    New => "New",
});

// ==========================================
// 会员等级
// ==========================================
labelled_enum!(LoyaltyTier {
    Platinum => "Platinum",
    Gold => "Gold",
    Silver => "Silver",
    Bronze => "Bronze",
    Basic => "Basic",
});

// ==========================================
// 季节 (日期维度)
// ==========================================
labelled_enum!(Season {
    Spring => "Spring",
    Summer => "Summer",
    Autumn => "Autumn",
    Winter => "Winter",
});

// ==========================================
// 趋势指标
// ==========================================
labelled_enum!(TrendIndicator {
    StrongUp => "Strong Up",
    Up => "Up",
    Stable => "Stable",
    Down => "Down",
    StrongDown => "Strong Down",
});

// ==========================================
// 风险等级 (流失 / 缺货 / 积压 共用)
// ==========================================
labelled_enum!(
    /// 顺序: Critical > High > Medium > Low > Very Low
    RiskLevel {
        Critical => "Critical",
        High => "High",
        Medium => "Medium",
        Low => "Low",
        VeryLow => "Very Low",
    }
);

impl RiskLevel {
    /// 严重程度（数值越大越严重）
    pub fn severity(&self) -> u8 {
        match self {
            RiskLevel::Critical => 4,
            RiskLevel::High => 3,
            RiskLevel::Medium => 2,
            RiskLevel::Low => 1,
            RiskLevel::VeryLow => 0,
        }
    }

    /// 风险映射的库存健康分
    pub fn health_score(&self) -> f64 {
        match self {
            RiskLevel::VeryLow => 100.0,
            RiskLevel::Low => 80.0,
            RiskLevel::Medium => 60.0,
            RiskLevel::High => 40.0,
            RiskLevel::Critical => 20.0,
        }
    }
}

// ==========================================
// 销售速度
// ==========================================
labelled_enum!(SalesVelocity {
    VeryFast => "Very Fast",
    Fast => "Fast",
    Medium => "Medium",
    Slow => "Slow",
    VerySlow => "Very Slow",
});

// ==========================================
// 绩效等级 (11 档)
// ==========================================
labelled_enum!(PerformanceGrade {
    APlus => "A+",
    A => "A",
    AMinus => "A-",
    BPlus => "B+",
    B => "B",
    BMinus => "B-",
    CPlus => "C+",
    C => "C",
    CMinus => "C-",
    D => "D",
    F => "F",
});

impl PerformanceGrade {
    /// 等级序号（F=0 ... A+=10）
    pub fn rank(&self) -> u8 {
        match self {
            PerformanceGrade::F => 0,
            PerformanceGrade::D => 1,
            PerformanceGrade::CMinus => 2,
            PerformanceGrade::C => 3,
            PerformanceGrade::CPlus => 4,
            PerformanceGrade::BMinus => 5,
            PerformanceGrade::B => 6,
            PerformanceGrade::BPlus => 7,
            PerformanceGrade::AMinus => 8,
            PerformanceGrade::A => 9,
            PerformanceGrade::APlus => 10,
        }
    }
}

// ==========================================
// RFM 客户分群
// ==========================================
labelled_enum!(RfmSegment {
    Champions => "Champions",
    LoyalCustomers => "Loyal Customers",
    NewCustomers => "New Customers",
    AtRisk => "At Risk",
    Lost => "Lost",
    Potential => "Potential",
});

// ==========================================
// 告警严重度 / 建议优先级
// ==========================================
labelled_enum!(AlertSeverity {
    Critical => "critical",
    High => "high",
    Medium => "medium",
    Low => "low",
});

labelled_enum!(Priority {
    High => "high",
    Medium => "medium",
    Low => "low",
});

// ==========================================
// 汇总周期
// ==========================================
labelled_enum!(AggregationPeriod {
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
});

impl AggregationPeriod {
    /// 日期所属周期的起始日
    ///
    /// - daily: 当天
    /// - weekly: ISO 周一
    /// - monthly: 当月 1 日
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            AggregationPeriod::Daily => date,
            AggregationPeriod::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            AggregationPeriod::Monthly => date.with_day(1).unwrap_or(date),
        }
    }
}

impl Default for AggregationPeriod {
    fn default() -> Self {
        AggregationPeriod::Daily
    }
}

impl FromStr for AggregationPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(AggregationPeriod::Daily),
            "weekly" | "week" => Ok(AggregationPeriod::Weekly),
            "monthly" | "month" => Ok(AggregationPeriod::Monthly),
            other => Err(format!("未知汇总周期: {}", other)),
        }
    }
}
