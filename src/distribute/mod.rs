//! Section distribution engine.
//!
//! Takes a class roster and a target section count and produces a
//! partition of students into sections:
//!
//! 1. split special-needs students off and group the rest by origin section
//! 2. seed each origin group's male and female cohorts round-robin, with
//!    staggered offsets so top-ranked students spread out
//! 3. repair section sizes and gender ratios for a fixed number of rounds
//! 4. place special-needs students into the smallest sections
//! 5. optionally replace everything with a manual layout
//!
//! Every placement and repair step goes through [`gate::Gate`]. When no
//! section satisfies the rules for a student, the student is placed by
//! occupancy alone and the relaxation is reported back to the caller.
//! The engine is synchronous, deterministic and does no I/O.

pub mod gate;
pub mod manual;
pub mod model;
pub mod rebalance;
pub mod seed;
pub mod stats;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info_span};

use gate::{Gate, GivenName, Rule, SingleCharFamilyName, Violation};
use manual::{ManualSection, MergeReport};
use model::{Partition, Student};
use stats::SectionStats;

pub const DEFAULT_MAX_ITERATIONS: usize = 50;
pub const DEFAULT_ROUNDS: usize = 3;
pub const DEFAULT_GENDER_TOLERANCE: f64 = 0.15;

pub const MAX_SECTIONS: usize = 100;
pub const MAX_ITERATIONS_LIMIT: usize = 1000;
pub const MAX_ROUNDS: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum DistributeError {
    #[error("section count must be at least 2 (got {requested})")]
    TooFewSections { requested: usize },
    #[error("section count must be at most {max} (got {requested})")]
    TooManySections { requested: usize, max: usize },
    #[error("roster is empty")]
    EmptyRoster,
    #[error("{field} {requirement}")]
    InvalidOption {
        field: &'static str,
        requirement: &'static str,
    },
}

/// Repair budget. Defaults reproduce the reference behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistributeOptions {
    /// Iteration ceiling for each individual rebalancer call.
    pub max_iterations: usize,
    /// Number of {count, gender, count} repair rounds.
    pub rounds: usize,
    /// Gender repair stops once every section's male share is within this
    /// distance of the mean share.
    pub gender_tolerance: f64,
}

impl DistributeOptions {
    /// Keeps every repair pass bounded.
    pub fn check(&self) -> Result<(), DistributeError> {
        if self.max_iterations > MAX_ITERATIONS_LIMIT {
            return Err(DistributeError::InvalidOption {
                field: "maxIterations",
                requirement: "must be at most 1000",
            });
        }
        if self.rounds > MAX_ROUNDS {
            return Err(DistributeError::InvalidOption {
                field: "rounds",
                requirement: "must be at most 100",
            });
        }
        if !(self.gender_tolerance.is_finite() && self.gender_tolerance >= 0.0) {
            return Err(DistributeError::InvalidOption {
                field: "genderTolerance",
                requirement: "must be a non-negative number",
            });
        }
        Ok(())
    }
}

impl Default for DistributeOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            rounds: DEFAULT_ROUNDS,
            gender_tolerance: DEFAULT_GENDER_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Seeding,
    Straggler,
}

/// A student placed in breach of a rule because no section admitted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relaxation {
    pub student_id: String,
    pub stage: Stage,
    pub rule: Rule,
    /// 1-based section the student was placed into.
    pub section: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairSummary {
    pub moves: usize,
    pub swaps: usize,
    pub count_settled: bool,
    pub gender_settled: bool,
}

#[derive(Debug, Clone)]
pub struct Distribution {
    pub partition: Partition,
    pub stats: Vec<SectionStats>,
    pub relaxations: Vec<Relaxation>,
    pub violations: Vec<Violation>,
    pub repairs: RepairSummary,
    /// Present when a manual layout replaced the computed partition.
    pub manual: Option<MergeReport>,
}

impl Distribution {
    /// SHA-256 over the section layout by student id; identical partitions
    /// of the same roster always hash identically.
    pub fn fingerprint(&self, roster: &[Student]) -> String {
        let mut hasher = Sha256::new();
        for (i, members) in self.partition.sections().iter().enumerate() {
            hasher.update(format!("section:{}\n", i + 1).as_bytes());
            for &m in members {
                hasher.update(roster[m].id.as_bytes());
                hasher.update(b"\n");
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

pub fn validate(roster: &[Student], section_count: usize) -> Result<(), DistributeError> {
    if section_count < 2 {
        return Err(DistributeError::TooFewSections {
            requested: section_count,
        });
    }
    if section_count > MAX_SECTIONS {
        return Err(DistributeError::TooManySections {
            requested: section_count,
            max: MAX_SECTIONS,
        });
    }
    if roster.is_empty() {
        return Err(DistributeError::EmptyRoster);
    }
    Ok(())
}

/// Distributes with the default given-name rule.
pub fn distribute(
    roster: &[Student],
    section_count: usize,
    manual: Option<&[ManualSection]>,
    options: &DistributeOptions,
) -> Result<Distribution, DistributeError> {
    distribute_with(roster, section_count, manual, options, &SingleCharFamilyName)
}

pub fn distribute_with(
    roster: &[Student],
    section_count: usize,
    manual: Option<&[ManualSection]>,
    options: &DistributeOptions,
    names: &dyn GivenName,
) -> Result<Distribution, DistributeError> {
    validate(roster, section_count)?;
    options.check()?;
    let _span = info_span!("distribute", students = roster.len(), sections = section_count).entered();

    let gate = Gate::new(roster, names);
    let split = split_roster(roster);
    let mut partition = Partition::new(section_count);
    let mut relaxations = Vec::new();

    seed::seed(&gate, &split.origin_groups, &mut partition, &mut relaxations);
    seed::place_stragglers(&gate, &split.normal, &mut partition, &mut relaxations);
    debug!(counts = ?partition.counts(), relaxed = relaxations.len(), "seeded");

    let repairs = repair(&gate, &mut partition, options);
    debug!(counts = ?partition.counts(), ?repairs, "repaired");

    place_special_needs(&split.special, &mut partition);
    debug_assert!(partition.conserves(roster.len()));

    let manual = manual.map(|layout| {
        let (merged, report) = manual::merge(roster, section_count, layout);
        partition = merged;
        report
    });
    debug_assert!(partition.conserves(roster.len()));

    let stats = stats::section_stats(&partition, roster);
    let violations = gate.violations(&partition);
    Ok(Distribution {
        partition,
        stats,
        relaxations,
        violations,
        repairs,
        manual,
    })
}

struct RosterSplit {
    special: Vec<usize>,
    normal: Vec<usize>,
    /// Normal students grouped by origin section, ascending by label.
    origin_groups: Vec<Vec<usize>>,
}

fn split_roster(roster: &[Student]) -> RosterSplit {
    let mut special = Vec::new();
    let mut normal = Vec::new();
    let mut by_origin: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, s) in roster.iter().enumerate() {
        if s.is_special_needs {
            special.push(i);
        } else {
            normal.push(i);
            by_origin.entry(s.origin_section).or_default().push(i);
        }
    }
    RosterSplit {
        special,
        normal,
        origin_groups: by_origin.into_values().collect(),
    }
}

fn repair(gate: &Gate<'_>, partition: &mut Partition, options: &DistributeOptions) -> RepairSummary {
    let mut summary = RepairSummary::default();
    for _ in 0..options.rounds {
        let first = rebalance::rebalance_counts(gate, partition, options.max_iterations);
        let gender = rebalance::rebalance_gender(
            gate,
            partition,
            options.max_iterations,
            options.gender_tolerance,
        );
        let last = rebalance::rebalance_counts(gate, partition, options.max_iterations);
        for pass in [first, gender, last] {
            summary.moves += pass.moves;
            summary.swaps += pass.swaps;
        }
        summary.count_settled = last.settled;
        summary.gender_settled = gender.settled;
    }
    summary
}

/// Special-needs students skip the placement rules entirely.
fn place_special_needs(special: &[usize], partition: &mut Partition) {
    for &student in special {
        let section = partition.least_populated();
        partition.push(section, student);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::Gender;

    fn student(id: &str, name: &str, gender: Gender, rank: Option<u32>, origin: i64) -> Student {
        Student {
            id: id.to_string(),
            name: name.to_string(),
            gender,
            group: None,
            rank,
            is_problem: false,
            is_special_needs: false,
            origin_section: origin,
        }
    }

    fn section_of(d: &Distribution, roster: &[Student], id: &str) -> usize {
        let idx = roster.iter().position(|s| s.id == id).expect("student in roster");
        d.partition
            .sections()
            .iter()
            .position(|m| m.contains(&idx))
            .expect("student placed")
    }

    /// Distinct given names for synthetic rosters.
    fn name(i: usize) -> String {
        const SYLLABLES: [char; 14] = ['가', '나', '다', '라', '마', '바', '사', '아', '자', '차', '카', '타', '파', '하'];
        format!("김{}{}", SYLLABLES[i / SYLLABLES.len()], SYLLABLES[i % SYLLABLES.len()])
    }

    #[test]
    fn rejects_invalid_input_before_running() {
        let roster = vec![student("a", "김가", Gender::Male, None, 1)];
        let opts = DistributeOptions::default();
        assert_eq!(
            distribute(&roster, 1, None, &opts).unwrap_err(),
            DistributeError::TooFewSections { requested: 1 }
        );
        assert_eq!(
            distribute(&[], 3, None, &opts).unwrap_err(),
            DistributeError::EmptyRoster
        );
    }

    #[test]
    fn separates_group_members() {
        let mut roster: Vec<Student> = (0..6)
            .map(|i| {
                let g = if i % 2 == 0 { Gender::Male } else { Gender::Female };
                student(&format!("s{i}"), &name(i), g, Some(i as u32 + 1), 1)
            })
            .collect();
        // s0 and s4 both prefer section 1 by rank order.
        roster[0].group = Some("G1".to_string());
        roster[4].group = Some("G1".to_string());
        let d = distribute(&roster, 2, None, &DistributeOptions::default()).expect("distribute");
        assert_ne!(section_of(&d, &roster, "s0"), section_of(&d, &roster, "s4"));
        assert!(d.partition.conserves(roster.len()));
        assert!(d.violations.is_empty());
    }

    #[test]
    fn separates_students_sharing_a_given_name() {
        let roster = vec![
            student("a", "김민수", Gender::Male, Some(1), 1),
            student("b", "이민수", Gender::Male, Some(3), 1),
            student("c", "박지훈", Gender::Male, Some(2), 1),
            student("d", "최서연", Gender::Female, Some(4), 1),
        ];
        let d = distribute(&roster, 2, None, &DistributeOptions::default()).expect("distribute");
        assert_ne!(section_of(&d, &roster, "a"), section_of(&d, &roster, "b"));
        assert!(d.relaxations.is_empty());
    }

    #[test]
    fn ranked_roster_splits_evenly_with_balanced_means() {
        let roster: Vec<Student> = (0..10)
            .map(|i| {
                let g = if i < 5 { Gender::Male } else { Gender::Female };
                student(&format!("s{i}"), &name(i), g, Some(i as u32 + 1), 1)
            })
            .collect();
        let d = distribute(&roster, 2, None, &DistributeOptions::default()).expect("distribute");
        assert_eq!(d.partition.counts(), vec![5, 5]);
        for s in &d.stats {
            let avg = s.avg_rank.expect("ranked");
            assert!((avg - 5.5).abs() <= 1.0, "section {} avg {}", s.section, avg);
        }
    }

    #[test]
    fn five_students_into_three_sections() {
        let roster: Vec<Student> = (0..5)
            .map(|i| student(&format!("s{i}"), &name(i), Gender::Male, Some(i as u32 + 1), 1))
            .collect();
        let d = distribute(&roster, 3, None, &DistributeOptions::default()).expect("distribute");
        let mut counts = d.partition.counts();
        counts.sort_unstable();
        assert_eq!(counts, vec![1, 2, 2]);
    }

    #[test]
    fn sizes_balance_on_constraint_free_multi_origin_rosters() {
        // 3 origin sections of uneven size, mixed genders, some unranked.
        let roster: Vec<Student> = (0..37)
            .map(|i| {
                let g = if i % 3 == 0 { Gender::Female } else { Gender::Male };
                let rank = if i % 7 == 0 { None } else { Some(i as u32 % 13 + 1) };
                student(&format!("s{i}"), &name(i), g, rank, (i % 3) as i64 + 1)
            })
            .collect();
        for n in 2..=6 {
            let d = distribute(&roster, n, None, &DistributeOptions::default()).expect("distribute");
            let counts = d.partition.counts();
            let max = counts.iter().max().copied().unwrap_or(0);
            let min = counts.iter().min().copied().unwrap_or(0);
            assert!(max - min <= 1, "n={n} counts={counts:?}");
            assert!(d.partition.conserves(roster.len()));
        }
    }

    #[test]
    fn special_needs_students_go_to_smallest_sections_last() {
        let mut roster: Vec<Student> = (0..5)
            .map(|i| student(&format!("s{i}"), &name(i), Gender::Male, Some(i as u32 + 1), 1))
            .collect();
        let mut sp = student("sp", "박가나", Gender::Female, Some(1), 1);
        sp.is_special_needs = true;
        roster.push(sp);
        let d = distribute(&roster, 2, None, &DistributeOptions::default()).expect("distribute");
        // Normal students settle 3/2; the special-needs student tops up the
        // smaller section next to s1 ("김가나") despite the shared given name.
        assert_eq!(d.partition.counts(), vec![3, 3]);
        let sp_section = section_of(&d, &roster, "sp");
        assert_eq!(d.partition.members(sp_section).last(), Some(&5));
        assert_eq!(d.stats[sp_section].special, 1);
        assert!(d.violations.is_empty());
    }

    #[test]
    fn infeasible_rosters_still_conserve_and_report_relaxations() {
        let roster: Vec<Student> = ["김민수", "이민수", "박민수", "최민수", "정민수"]
            .iter()
            .enumerate()
            .map(|(i, n)| student(&format!("s{i}"), n, Gender::Male, Some(i as u32 + 1), 1))
            .collect();
        let d = distribute(&roster, 2, None, &DistributeOptions::default()).expect("distribute");
        assert!(d.partition.conserves(roster.len()));
        assert_eq!(d.relaxations.len(), 3);
        assert!(d.relaxations.iter().all(|r| r.rule == Rule::GivenName));
        assert!(!d.violations.is_empty());
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let roster: Vec<Student> = (0..23)
            .map(|i| {
                let g = if i % 2 == 0 { Gender::Female } else { Gender::Male };
                let mut s = student(&format!("s{i}"), &name(i % 9), g, Some(i as u32 % 8 + 1), (i % 4) as i64);
                if i % 5 == 0 {
                    s.group = Some(format!("그룹{}", i % 3));
                }
                s
            })
            .collect();
        let opts = DistributeOptions::default();
        let a = distribute(&roster, 4, None, &opts).expect("distribute");
        let b = distribute(&roster, 4, None, &opts).expect("distribute");
        assert_eq!(a.partition, b.partition);
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.relaxations, b.relaxations);
        assert_eq!(a.fingerprint(&roster), b.fingerprint(&roster));
    }

    #[test]
    fn zero_rounds_leaves_seeding_untouched() {
        let roster: Vec<Student> = (0..6)
            .map(|i| student(&format!("s{i}"), &name(i), Gender::Male, Some(i as u32 + 1), 1))
            .collect();
        let opts = DistributeOptions {
            rounds: 0,
            ..DistributeOptions::default()
        };
        let d = distribute(&roster, 3, None, &opts).expect("distribute");
        assert_eq!(d.repairs, RepairSummary::default());
        assert_eq!(d.partition.members(0), &[0, 3]);
        assert_eq!(d.partition.members(1), &[1, 4]);
        assert_eq!(d.partition.members(2), &[2, 5]);
    }

    #[test]
    fn oversized_section_counts_are_rejected_without_allocating() {
        let roster = vec![student("a", "김가", Gender::Male, None, 1)];
        let opts = DistributeOptions::default();
        assert_eq!(
            distribute(&roster, usize::MAX / 8, None, &opts).unwrap_err(),
            DistributeError::TooManySections {
                requested: usize::MAX / 8,
                max: MAX_SECTIONS,
            }
        );
        assert!(distribute(&roster, MAX_SECTIONS, None, &opts).is_ok());
        assert!(distribute(&roster, MAX_SECTIONS + 1, None, &opts).is_err());
    }

    #[test]
    fn unbounded_repair_budgets_are_rejected() {
        let roster = vec![student("a", "김가", Gender::Male, None, 1)];
        let huge = DistributeOptions {
            rounds: 1 << 40,
            max_iterations: 1 << 40,
            ..DistributeOptions::default()
        };
        assert!(matches!(
            distribute(&roster, 2, None, &huge).unwrap_err(),
            DistributeError::InvalidOption { field: "maxIterations", .. }
        ));
        let rounds = DistributeOptions {
            rounds: MAX_ROUNDS + 1,
            ..DistributeOptions::default()
        };
        assert!(matches!(
            rounds.check().unwrap_err(),
            DistributeError::InvalidOption { field: "rounds", .. }
        ));
        let tolerance = DistributeOptions {
            gender_tolerance: f64::NAN,
            ..DistributeOptions::default()
        };
        assert!(tolerance.check().is_err());
        let ceiling = DistributeOptions {
            rounds: MAX_ROUNDS,
            max_iterations: MAX_ITERATIONS_LIMIT,
            ..DistributeOptions::default()
        };
        assert_eq!(ceiling.check(), Ok(()));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: DistributeOptions =
            serde_json::from_value(serde_json::json!({ "rounds": 1 })).expect("parse options");
        assert_eq!(opts.rounds, 1);
        assert_eq!(opts.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(opts.gender_tolerance, DEFAULT_GENDER_TOLERANCE);
    }
}
