// ==========================================
// 交易数仓分层引擎 - 时钟
// ==========================================
// 职责: 为 created_at / updated_at / 批次号提供当前时间
// 说明: 各层构造时注入,测试中使用 FixedClock 冻结时间
// ==========================================

use chrono::{DateTime, NaiveDate, Utc};

/// 时钟能力
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定时钟（测试用）
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }

    /// 固定在某日 00:00:00 UTC
    pub fn at_date(date: NaiveDate) -> Self {
        Self {
            instant: date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

/// 统一的时间戳格式
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
