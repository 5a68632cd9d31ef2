// ==========================================
// 交易数仓分层引擎 - 批次号生成
// ==========================================
// 格式: BATCH_<YYYYMMDDHHMMSS>_<8 位随机十六进制>
// 说明: 同一秒内依靠随机后缀区分,碰撞概率可忽略但未消除
// ==========================================

use crate::clock::Clock;
use uuid::Uuid;

pub const BATCH_PREFIX: &str = "BATCH_";

pub fn generate_batch_id(clock: &dyn Clock) -> String {
    let ts = clock.now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}_{}", BATCH_PREFIX, ts, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::NaiveDate;

    #[test]
    fn test_batch_id_format() {
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        let id = generate_batch_id(&clock);

        assert!(id.starts_with("BATCH_20240309000000_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_batch_ids_differ_within_same_second() {
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_ne!(generate_batch_id(&clock), generate_batch_id(&clock));
    }
}
