// ==========================================
// 交易数仓分层引擎 - 日期维度生成
// ==========================================
// 职责: [start, end] 闭区间内每个自然日一行
// 规则:
// - 周末: ISO 星期 6 / 7
// - 节假日: 固定月日集合,不查地区日历
// - 季节: 3-5 春 / 6-8 夏 / 9-11 秋 / 其他 冬
// ==========================================

use crate::domain::types::Season;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// 默认节假日（MM-DD）
pub const DEFAULT_HOLIDAYS: &[&str] = &["01-01", "05-01", "10-01", "12-25"];

/// 日期维度行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateDimension {
    pub date_key: i64,
    pub full_date: String,
    pub year: i32,
    pub quarter: u32,
    pub month: u32,
    pub month_name: String,
    pub week_of_year: u32,
    pub day_of_week: u32,
    pub day_name: String,
    pub day_of_month: u32,
    pub day_of_year: u32,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub season: Season,
}

/// 月份 -> 季节
pub fn season_for_month(month: u32) -> Season {
    match month {
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        9..=11 => Season::Autumn,
        _ => Season::Winter,
    }
}

/// 日期键 YYYYMMDD
pub fn date_key(date: NaiveDate) -> i64 {
    date.year() as i64 * 10_000 + date.month() as i64 * 100 + date.day() as i64
}

// ==========================================
// DateDimensionGenerator
// ==========================================
#[derive(Debug, Clone)]
pub struct DateDimensionGenerator {
    holidays: Vec<String>,
}

impl Default for DateDimensionGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_HOLIDAYS.iter().map(|s| s.to_string()).collect())
    }
}

impl DateDimensionGenerator {
    pub fn new(holidays: Vec<String>) -> Self {
        Self { holidays }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        let md = date.format("%m-%d").to_string();
        self.holidays.iter().any(|h| h == &md)
    }

    /// 构造单日维度行
    pub fn dimension_for(&self, date: NaiveDate) -> DateDimension {
        let weekday = date.weekday().number_from_monday();
        DateDimension {
            date_key: date_key(date),
            full_date: date.format("%Y-%m-%d").to_string(),
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
            month: date.month(),
            month_name: date.format("%B").to_string(),
            week_of_year: date.iso_week().week(),
            day_of_week: weekday,
            day_name: date.format("%A").to_string(),
            day_of_month: date.day(),
            day_of_year: date.ordinal(),
            is_weekend: weekday >= 6,
            is_holiday: self.is_holiday(date),
            season: season_for_month(date.month()),
        }
    }

    /// 生成 [start, end] 闭区间的日期维度
    ///
    /// start > end 时返回空序列
    pub fn generate(&self, start: NaiveDate, end: NaiveDate) -> Vec<DateDimension> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| self.dimension_for(d))
            .collect()
    }
}

/// 使用默认节假日生成日期维度
pub fn generate_date_dimensions(start: NaiveDate, end: NaiveDate) -> Vec<DateDimension> {
    DateDimensionGenerator::default().generate(start, end)
}
