use serde::Serialize;

use super::model::{Gender, Partition, Student};

/// 1-decimal rounding, half away from zero for the non-negative values used
/// here: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStats {
    /// 1-based section number.
    pub section: usize,
    pub total: usize,
    pub male: usize,
    pub female: usize,
    pub problem: usize,
    pub special: usize,
    /// Mean rank of ranked, non-special-needs members.
    pub avg_rank: Option<f64>,
    /// Population standard deviation of the same ranks; 0 below two ranks.
    pub std_dev: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankSpread {
    pub mean: f64,
    pub std_dev: f64,
}

pub fn rank_spread(ranks: &[f64]) -> Option<RankSpread> {
    if ranks.is_empty() {
        return None;
    }
    let n = ranks.len() as f64;
    let mean = ranks.iter().sum::<f64>() / n;
    let std_dev = if ranks.len() > 1 {
        (ranks.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt()
    } else {
        0.0
    };
    Some(RankSpread { mean, std_dev })
}

pub fn section_stats(partition: &Partition, roster: &[Student]) -> Vec<SectionStats> {
    partition
        .resolve(roster)
        .into_iter()
        .enumerate()
        .map(|(i, members)| {
            let ranks: Vec<f64> = members
                .iter()
                .filter(|s| !s.is_special_needs)
                .filter_map(|s| s.rank)
                .map(f64::from)
                .collect();
            let spread = rank_spread(&ranks);
            SectionStats {
                section: i + 1,
                total: members.len(),
                male: members.iter().filter(|s| s.gender == Gender::Male).count(),
                female: members.iter().filter(|s| s.gender == Gender::Female).count(),
                problem: members.iter().filter(|s| s.is_problem).count(),
                special: members.iter().filter(|s| s.is_special_needs).count(),
                avg_rank: spread.map(|s| round_off_1_decimal(s.mean)),
                std_dev: spread.map_or(0.0, |s| round_off_1_decimal(s.std_dev)),
            }
        })
        .collect()
}
