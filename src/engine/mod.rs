// ==========================================
// 交易数仓分层引擎 - 指标算法层
// ==========================================
// 职责: 各层共用的派生指标算法（纯函数）
// 红线: 不访问存储,不读取当前时间
// ==========================================

pub mod alerts;
pub mod currency;
pub mod date_dimension;
pub mod forecast;
pub mod grading;
pub mod metrics;
pub mod rfm;
pub mod risk;
pub mod segmentation;

// 重导出核心算法
pub use currency::{convert_to_cny, CurrencyTable};
pub use date_dimension::{generate_date_dimensions, DateDimension, DateDimensionGenerator};
pub use forecast::{forecast_series, SalesForecast};
pub use grading::{assign_performance_grade, PerformanceInputs};
pub use metrics::{churn_probability, growth_rate, safe_divide, trend_indicator};
pub use rfm::{calculate_rfm, RfmScore};
pub use risk::{
    assess_churn_risk, assess_excess_stock_risk, assess_stockout_risk, classify_sales_velocity,
};
pub use segmentation::{customer_segment, loyalty_tier};
