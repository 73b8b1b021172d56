use tracing::{debug, warn};

use super::gate::Gate;
use super::model::{Gender, Partition};
use super::{Relaxation, Stage};

/// Circular distance between two section indices on a ring of `n`.
pub fn circular_distance(a: usize, b: usize, n: usize) -> usize {
    let d = a.abs_diff(b);
    d.min(n - d)
}

/// Orders one origin group's cohort of `gender` by rank, then name; unranked
/// students follow all ranked ones in their original order.
fn cohort(gate: &Gate<'_>, group: &[usize], gender: Gender) -> Vec<usize> {
    let roster = gate.roster();
    let mut out: Vec<usize> = group
        .iter()
        .copied()
        .filter(|&i| roster[i].gender == gender)
        .collect();
    out.sort_by_key(|&i| match roster[i].rank {
        Some(r) => (0u8, r, roster[i].name.as_str()),
        None => (1u8, 0, ""),
    });
    out
}

/// Seeds the partition from origin groups (already sorted by origin label).
///
/// Male cohorts start at `g mod N` and female cohorts at `(g + 1) mod N`,
/// so the top students of different origin groups open different sections.
pub fn seed(
    gate: &Gate<'_>,
    origin_groups: &[Vec<usize>],
    partition: &mut Partition,
    relaxations: &mut Vec<Relaxation>,
) {
    let n = partition.section_count();
    for (g, group) in origin_groups.iter().enumerate() {
        let males = cohort(gate, group, Gender::Male);
        let females = cohort(gate, group, Gender::Female);
        debug!(
            origin_group = g,
            males = males.len(),
            females = females.len(),
            "seeding origin group"
        );
        place_cohort(gate, &males, g % n, partition, relaxations);
        place_cohort(gate, &females, (g + 1) % n, partition, relaxations);
    }
}

fn place_cohort(
    gate: &Gate<'_>,
    cohort: &[usize],
    offset: usize,
    partition: &mut Partition,
    relaxations: &mut Vec<Relaxation>,
) {
    let n = partition.section_count();
    let mut pending: Vec<(usize, usize)> = Vec::new();

    for (i, &student) in cohort.iter().enumerate() {
        let preferred = (offset + i) % n;
        if gate.can_place(student, preferred, partition).is_ok() {
            partition.push(preferred, student);
        } else {
            pending.push((student, preferred));
        }
    }

    for (student, preferred) in pending {
        let target = (0..n)
            .filter(|&s| gate.can_place(student, s, partition).is_ok())
            .min_by_key(|&s| (partition.members(s).len(), circular_distance(s, preferred, n)));

        match target {
            Some(section) => partition.push(section, student),
            None => {
                let section = partition.least_populated();
                if let Err(rule) = gate.can_place(student, section, partition) {
                    let id = &gate.roster()[student].id;
                    warn!(
                        student = %id,
                        section = section + 1,
                        reason = rule.describe(),
                        "no section satisfies placement rules; relaxing"
                    );
                    relaxations.push(Relaxation {
                        student_id: id.clone(),
                        stage: Stage::Seeding,
                        rule,
                        section: section + 1,
                    });
                }
                partition.push(section, student);
            }
        }
    }
}

/// Places normal students that no cohort picked up into the least
/// populated section, ignoring rank offsets.
pub fn place_stragglers(
    gate: &Gate<'_>,
    normal: &[usize],
    partition: &mut Partition,
    relaxations: &mut Vec<Relaxation>,
) {
    let mut placed = vec![false; gate.roster().len()];
    for &idx in partition.sections().iter().flatten() {
        placed[idx] = true;
    }
    for &student in normal {
        if placed[student] {
            continue;
        }
        let section = partition.least_populated();
        if let Err(rule) = gate.can_place(student, section, partition) {
            relaxations.push(Relaxation {
                student_id: gate.roster()[student].id.clone(),
                stage: Stage::Straggler,
                rule,
                section: section + 1,
            });
        }
        partition.push(section, student);
        placed[student] = true;
    }
}
