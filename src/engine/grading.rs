// ==========================================
// 交易数仓分层引擎 - 绩效评分与等级
// ==========================================
// 职责: 四项加权综合分 -> 11 档字母等级
// 公式:
//   score = 0.4·norm(sales, 0, 100000)
//         + 0.3·norm(margin, 0, 0.5)
//         + 0.2·norm(satisfaction, 0, 5)
//         + 0.1·norm(inventory_health, 0, 100)
//   norm(v, min, max) = clamp((v - min) / (max - min) · 100, 0, 100)
// ==========================================

use crate::domain::types::PerformanceGrade;
use serde::{Deserialize, Serialize};

const SALES_WEIGHT: f64 = 0.4;
const MARGIN_WEIGHT: f64 = 0.3;
const SATISFACTION_WEIGHT: f64 = 0.2;
const INVENTORY_WEIGHT: f64 = 0.1;

/// 绩效评分输入
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceInputs {
    pub sales: f64,
    pub margin: f64,
    pub satisfaction: f64,
    pub inventory_health: f64,
}

/// 归一化到 [0, 100]
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max <= min || !value.is_finite() {
        return 0.0;
    }
    ((value - min) / (max - min) * 100.0).clamp(0.0, 100.0)
}

/// 加权综合分（0..100，保留 2 位小数）
pub fn performance_score(inputs: &PerformanceInputs) -> f64 {
    let score = SALES_WEIGHT * normalize(inputs.sales, 0.0, 100_000.0)
        + MARGIN_WEIGHT * normalize(inputs.margin, 0.0, 0.5)
        + SATISFACTION_WEIGHT * normalize(inputs.satisfaction, 0.0, 5.0)
        + INVENTORY_WEIGHT * normalize(inputs.inventory_health, 0.0, 100.0);
    (score * 100.0).round() / 100.0
}

/// 综合分 -> 字母等级
///
/// A+ ≥90, A ≥85, A- ≥80, B+ ≥75, B ≥70, B- ≥65,
/// C+ ≥60, C ≥55, C- ≥50, D ≥40, F <40
pub fn grade_for_score(score: f64) -> PerformanceGrade {
    const BANDS: &[(f64, PerformanceGrade)] = &[
        (90.0, PerformanceGrade::APlus),
        (85.0, PerformanceGrade::A),
        (80.0, PerformanceGrade::AMinus),
        (75.0, PerformanceGrade::BPlus),
        (70.0, PerformanceGrade::B),
        (65.0, PerformanceGrade::BMinus),
        (60.0, PerformanceGrade::CPlus),
        (55.0, PerformanceGrade::C),
        (50.0, PerformanceGrade::CMinus),
        (40.0, PerformanceGrade::D),
    ];

    BANDS
        .iter()
        .find(|(threshold, _)| score >= *threshold)
        .map(|(_, grade)| *grade)
        .unwrap_or(PerformanceGrade::F)
}

/// 计算综合分并评级
pub fn assign_performance_grade(inputs: &PerformanceInputs) -> (f64, PerformanceGrade) {
    let score = performance_score(inputs);
    (score, grade_for_score(score))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_clamps() {
        assert_eq!(normalize(50_000.0, 0.0, 100_000.0), 50.0);
        assert_eq!(normalize(-5.0, 0.0, 100.0), 0.0);
        assert_eq!(normalize(1.0, 0.0, 0.5), 100.0);
        assert_eq!(normalize(1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_perfect_inputs_get_a_plus() {
        let inputs = PerformanceInputs {
            sales: 200_000.0,
            margin: 0.6,
            satisfaction: 5.0,
            inventory_health: 100.0,
        };
        assert_eq!(assign_performance_grade(&inputs), (100.0, PerformanceGrade::APlus));
    }

    #[test]
    fn test_zero_inputs_get_f() {
        let (score, grade) = assign_performance_grade(&PerformanceInputs::default());
        assert_eq!(score, 0.0);
        assert_eq!(grade, PerformanceGrade::F);
    }

    #[test]
    fn test_grade_bands() {
        assert_eq!(grade_for_score(90.0), PerformanceGrade::APlus);
        assert_eq!(grade_for_score(89.99), PerformanceGrade::A);
        assert_eq!(grade_for_score(80.0), PerformanceGrade::AMinus);
        assert_eq!(grade_for_score(72.0), PerformanceGrade::B);
        assert_eq!(grade_for_score(50.0), PerformanceGrade::CMinus);
        assert_eq!(grade_for_score(45.0), PerformanceGrade::D);
        assert_eq!(grade_for_score(39.99), PerformanceGrade::F);
    }

    #[test]
    fn test_weighted_composite() {
        let inputs = PerformanceInputs {
            sales: 50_000.0,      // 50 * 0.4 = 20
            margin: 0.25,         // 50 * 0.3 = 15
            satisfaction: 2.5,    // 50 * 0.2 = 10
            inventory_health: 50.0, // 50 * 0.1 = 5
        };
        assert_eq!(performance_score(&inputs), 50.0);
    }

    #[test]
    fn test_grade_is_monotonic_in_each_input() {
        let base = PerformanceInputs {
            sales: 30_000.0,
            margin: 0.1,
            satisfaction: 3.0,
            inventory_health: 60.0,
        };
        let steps = [0.0, 1.0, 10.0, 100.0, 1_000.0, 10_000.0, 50_000.0, 200_000.0];

        for field in 0..4 {
            let mut last_rank = 0u8;
            for (i, step) in steps.iter().enumerate() {
                let mut inputs = base;
                match field {
                    0 => inputs.sales += step,
                    1 => inputs.margin += step / 100_000.0,
                    2 => inputs.satisfaction += step / 40_000.0,
                    _ => inputs.inventory_health += step / 2_000.0,
                }
                let rank = assign_performance_grade(&inputs).1.rank();
                if i > 0 {
                    assert!(rank >= last_rank, "field {} step {}", field, step);
                }
                last_rank = rank;
            }
        }
    }
}
