//! Hard placement rules shared by seeding and both rebalancers.
//!
//! A student may join a section only if no other member shares its
//! non-empty group label and no other member shares its given name.
//! Checks always run against the section's current membership, with the
//! student itself excluded so swap candidates can be tested in place.

use serde::Serialize;

use super::model::{Partition, Student};

/// Derives the part of a full name that must be unique within a section.
pub trait GivenName {
    fn given_name<'a>(&self, name: &'a str) -> &'a str;
}

/// Treats the first character as the family name (single-character
/// surnames). Multi-character family names are not recognised.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCharFamilyName;

impl GivenName for SingleCharFamilyName {
    fn given_name<'a>(&self, name: &'a str) -> &'a str {
        let mut chars = name.char_indices();
        match (chars.next(), chars.next()) {
            (Some(_), Some((second, _))) => &name[second..],
            _ => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    Group,
    GivenName,
}

impl Rule {
    pub fn describe(self) -> &'static str {
        match self {
            Rule::Group => "a student from the same group is already in the section",
            Rule::GivenName => "a student with the same given name is already in the section",
        }
    }
}

/// A pair of members breaching a rule, reported after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub section: usize,
    pub rule: Rule,
    pub student_ids: [String; 2],
}

#[derive(Clone, Copy)]
pub struct Gate<'a> {
    roster: &'a [Student],
    names: &'a dyn GivenName,
}

impl<'a> Gate<'a> {
    pub fn new(roster: &'a [Student], names: &'a dyn GivenName) -> Self {
        Self { roster, names }
    }

    pub fn roster(&self) -> &'a [Student] {
        self.roster
    }

    /// Checks `student` against `members`, ignoring `student` itself and
    /// `without` (the partner leaving the section in a swap).
    fn admits(&self, student: usize, members: &[usize], without: Option<usize>) -> Result<(), Rule> {
        let candidate = &self.roster[student];
        let others = members
            .iter()
            .copied()
            .filter(|&m| m != student && Some(m) != without);

        if let Some(group) = candidate.group_key() {
            if others.clone().any(|m| self.roster[m].group_key() == Some(group)) {
                return Err(Rule::Group);
            }
        }

        let given = self.names.given_name(&candidate.name);
        if others
            .into_iter()
            .any(|m| self.names.given_name(&self.roster[m].name) == given)
        {
            return Err(Rule::GivenName);
        }
        Ok(())
    }

    pub fn can_place(&self, student: usize, section: usize, partition: &Partition) -> Result<(), Rule> {
        self.admits(student, partition.members(section), None)
    }

    /// True iff `a` fits `section_b` once `b` leaves it, and vice versa.
    pub fn can_swap(
        &self,
        a: usize,
        section_a: usize,
        b: usize,
        section_b: usize,
        partition: &Partition,
    ) -> bool {
        self.admits(b, partition.members(section_a), Some(a)).is_ok()
            && self.admits(a, partition.members(section_b), Some(b)).is_ok()
    }

    /// Every rule breach in the partition among non-special-needs members.
    pub fn violations(&self, partition: &Partition) -> Vec<Violation> {
        let mut out = Vec::new();
        for (section, members) in partition.sections().iter().enumerate() {
            let members: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&m| !self.roster[m].is_special_needs)
                .collect();
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    let (sa, sb) = (&self.roster[a], &self.roster[b]);
                    let rule = if sa.group_key().is_some() && sa.group_key() == sb.group_key() {
                        Some(Rule::Group)
                    } else if self.names.given_name(&sa.name) == self.names.given_name(&sb.name) {
                        Some(Rule::GivenName)
                    } else {
                        None
                    };
                    if let Some(rule) = rule {
                        out.push(Violation {
                            section: section + 1,
                            rule,
                            student_ids: [sa.id.clone(), sb.id.clone()],
                        });
                    }
                }
            }
        }
        out
    }
}
