//! Bounded local repair passes for section size and gender ratio.
//!
//! Each pass works on the current most/least loaded pair of sections and
//! tries, in order, a direct move and then swaps that keep every
//! placement rule satisfied. A pass ends as soon as the objective is met,
//! no legal change exists, or the iteration budget runs out.

use tracing::debug;

use super::gate::Gate;
use super::model::{Gender, Partition};

/// What a single repair pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub moves: usize,
    pub swaps: usize,
    /// Objective reached (as opposed to stuck or out of budget).
    pub settled: bool,
}

/// Positions `(i, j)` of the first pair, in index order, whose swap between
/// sections `a` and `b` passes the gate.
fn find_swap(
    gate: &Gate<'_>,
    partition: &Partition,
    a: usize,
    b: usize,
    take_a: impl Fn(usize) -> bool,
    take_b: impl Fn(usize) -> bool,
) -> Option<(usize, usize)> {
    let (ma, mb) = (partition.members(a), partition.members(b));
    for (i, &sa) in ma.iter().enumerate() {
        if !take_a(sa) {
            continue;
        }
        for (j, &sb) in mb.iter().enumerate() {
            if take_b(sb) && gate.can_swap(sa, a, sb, b, partition) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Position of the last member of `from` accepted by `take` that may join `to`.
fn find_move(
    gate: &Gate<'_>,
    partition: &Partition,
    from: usize,
    to: usize,
    take: impl Fn(usize) -> bool,
) -> Option<usize> {
    partition
        .members(from)
        .iter()
        .enumerate()
        .rev()
        .find(|&(_, &s)| take(s) && gate.can_place(s, to, partition).is_ok())
        .map(|(pos, _)| pos)
}

pub fn rebalance_counts(gate: &Gate<'_>, partition: &mut Partition, max_iterations: usize) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    for _ in 0..max_iterations {
        let counts = partition.counts();
        let max = counts.iter().copied().max().unwrap_or(0);
        let min = counts.iter().copied().min().unwrap_or(0);
        if max - min <= 1 {
            outcome.settled = true;
            break;
        }

        let max_idx = partition.most_populated();
        let min_idx = partition.least_populated();
        if max_idx == min_idx {
            break;
        }

        if let Some(pos) = find_move(gate, partition, max_idx, min_idx, |_| true) {
            partition.move_member(max_idx, pos, min_idx);
            outcome.moves += 1;
            continue;
        }
        if let Some((i, j)) = find_swap(gate, partition, max_idx, min_idx, |_| true, |_| true) {
            partition.swap_members(max_idx, i, min_idx, j);
            outcome.swaps += 1;
            continue;
        }

        debug!(
            from = max_idx + 1,
            to = min_idx + 1,
            "count rebalance stuck; no legal move or swap"
        );
        break;
    }
    outcome
}

/// Male share per section, 0 for empty sections.
pub fn male_ratios(partition: &Partition, gate: &Gate<'_>) -> Vec<f64> {
    let roster = gate.roster();
    partition
        .sections()
        .iter()
        .map(|members| {
            if members.is_empty() {
                return 0.0;
            }
            let male = members
                .iter()
                .filter(|&&m| roster[m].gender == Gender::Male)
                .count();
            male as f64 / members.len() as f64
        })
        .collect()
}

pub fn rebalance_gender(
    gate: &Gate<'_>,
    partition: &mut Partition,
    max_iterations: usize,
    tolerance: f64,
) -> PassOutcome {
    let roster = gate.roster();
    let mut outcome = PassOutcome::default();
    for _ in 0..max_iterations {
        let ratios = male_ratios(partition, gate);
        if ratios.is_empty() {
            break;
        }
        let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
        let max_dev = ratios
            .iter()
            .map(|r| (r - mean).abs())
            .fold(0.0_f64, f64::max);
        if max_dev < tolerance {
            outcome.settled = true;
            break;
        }

        let mut max_idx = 0;
        let mut min_idx = 0;
        for (i, &r) in ratios.iter().enumerate().skip(1) {
            if r > ratios[max_idx] {
                max_idx = i;
            }
            if r < ratios[min_idx] {
                min_idx = i;
            }
        }
        if max_idx == min_idx {
            break;
        }

        let target = if ratios[max_idx] > mean {
            Gender::Male
        } else {
            Gender::Female
        };
        let opposite = target.opposite();
        let is = |g: Gender| move |s: usize| roster[s].gender == g;

        if let Some(pos) = find_move(gate, partition, max_idx, min_idx, is(target)) {
            partition.move_member(max_idx, pos, min_idx);
            outcome.moves += 1;
            continue;
        }
        let swap = find_swap(gate, partition, max_idx, min_idx, is(target), is(target))
            .or_else(|| find_swap(gate, partition, max_idx, min_idx, is(target), is(opposite)));
        if let Some((i, j)) = swap {
            partition.swap_members(max_idx, i, min_idx, j);
            outcome.swaps += 1;
            continue;
        }

        debug!(
            from = max_idx + 1,
            to = min_idx + 1,
            ?target,
            "gender rebalance stuck; no legal move or swap"
        );
        break;
    }
    outcome
}
