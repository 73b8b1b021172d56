//! Reconciles a hand-edited layout against the roster it was drawn from.
//!
//! Layout entries identify students by name and gender (plus the previous
//! section when the editor knew it), not by id, so each entry consumes the
//! first roster student that matches and has not been used yet. Students the
//! layout never mentions are appended to the smallest section so nobody is
//! dropped by a stale preview. Placement rules are not consulted.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::model::{Partition, Student};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualSection {
    /// 1-based target section.
    pub section: i64,
    #[serde(default)]
    pub students: Vec<ManualStudent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualStudent {
    pub name: String,
    /// Stored gender code ("M"/"F"); any other value matches nobody.
    pub gender: String,
    /// 0 means the editor did not know the previous section.
    #[serde(default)]
    pub previous_section: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub matched: usize,
    /// Layout entries with no unconsumed roster match.
    pub unmatched: Vec<ManualStudent>,
    /// Sections named by the layout that do not exist.
    pub ignored_sections: Vec<i64>,
    /// Roster ids the layout left out, appended to the smallest sections.
    pub backfilled: Vec<String>,
}

fn matches(student: &Student, entry: &ManualStudent) -> bool {
    student.name == entry.name
        && student.gender.code() == entry.gender
        && entry
            .previous_section
            .filter(|&prev| prev != 0)
            .map_or(true, |prev| student.origin_section == prev)
}

pub fn merge(roster: &[Student], section_count: usize, layout: &[ManualSection]) -> (Partition, MergeReport) {
    let mut partition = Partition::new(section_count);
    let mut used = vec![false; roster.len()];
    let mut report = MergeReport::default();

    for entry in layout {
        let in_range = entry.section >= 1 && (entry.section as u64) <= section_count as u64;
        if !in_range {
            report.ignored_sections.push(entry.section);
            continue;
        }
        let section = (entry.section - 1) as usize;
        for wanted in &entry.students {
            let found = roster
                .iter()
                .enumerate()
                .position(|(i, s)| !used[i] && matches(s, wanted));
            match found {
                Some(i) => {
                    used[i] = true;
                    partition.push(section, i);
                    report.matched += 1;
                }
                None => report.unmatched.push(wanted.clone()),
            }
        }
    }

    for (i, student) in roster.iter().enumerate() {
        if used[i] {
            continue;
        }
        let section = partition.least_populated();
        partition.push(section, i);
        report.backfilled.push(student.id.clone());
    }

    if !report.unmatched.is_empty() || !report.backfilled.is_empty() {
        warn!(
            unmatched = report.unmatched.len(),
            backfilled = report.backfilled.len(),
            "manual layout does not cover the roster exactly"
        );
    }
    (partition, report)
}
