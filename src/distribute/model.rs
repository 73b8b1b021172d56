use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    pub fn opposite(self) -> Gender {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }

    /// Stored rows use "M"/"F"; anything that is not "F" reads as male.
    pub fn from_code(code: &str) -> Gender {
        if code.trim().eq_ignore_ascii_case("F") {
            Gender::Female
        } else {
            Gender::Male
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub gender: Gender,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub is_problem: bool,
    #[serde(default)]
    pub is_special_needs: bool,
    pub origin_section: i64,
}

impl Student {
    /// Group label participating in the group rule (empty labels never conflict).
    pub fn group_key(&self) -> Option<&str> {
        self.group.as_deref().filter(|g| !g.is_empty())
    }
}

/// Sections hold indices into the roster slice the partition was built from,
/// so a student can only ever live in one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    sections: Vec<Vec<usize>>,
}

impl Partition {
    pub fn new(section_count: usize) -> Self {
        Self {
            sections: vec![Vec::new(); section_count],
        }
    }

    pub fn from_sections(sections: Vec<Vec<usize>>) -> Self {
        Self { sections }
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn members(&self, section: usize) -> &[usize] {
        &self.sections[section]
    }

    pub fn sections(&self) -> &[Vec<usize>] {
        &self.sections
    }

    pub fn counts(&self) -> Vec<usize> {
        self.sections.iter().map(Vec::len).collect()
    }

    pub fn total(&self) -> usize {
        self.sections.iter().map(Vec::len).sum()
    }

    pub fn push(&mut self, section: usize, student: usize) {
        self.sections[section].push(student);
    }

    /// First section with the fewest members.
    pub fn least_populated(&self) -> usize {
        let mut best = 0;
        for (i, s) in self.sections.iter().enumerate() {
            if s.len() < self.sections[best].len() {
                best = i;
            }
        }
        best
    }

    /// First section with the most members.
    pub fn most_populated(&self) -> usize {
        let mut best = 0;
        for (i, s) in self.sections.iter().enumerate() {
            if s.len() > self.sections[best].len() {
                best = i;
            }
        }
        best
    }

    /// Removes the member at `pos` of `from` and appends it to `to`.
    pub fn move_member(&mut self, from: usize, pos: usize, to: usize) {
        let student = self.sections[from].remove(pos);
        self.sections[to].push(student);
    }

    /// Exchanges two members in place, keeping both slot positions.
    pub fn swap_members(&mut self, a: usize, pos_a: usize, b: usize, pos_b: usize) {
        let sa = self.sections[a][pos_a];
        let sb = self.sections[b][pos_b];
        self.sections[a][pos_a] = sb;
        self.sections[b][pos_b] = sa;
    }

    /// True when every roster index in `0..roster_len` appears exactly once.
    pub fn conserves(&self, roster_len: usize) -> bool {
        let mut seen = vec![false; roster_len];
        for &idx in self.sections.iter().flatten() {
            match seen.get_mut(idx) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        seen.into_iter().all(|v| v)
    }

    pub fn resolve<'r>(&self, roster: &'r [Student]) -> Vec<Vec<&'r Student>> {
        self.sections
            .iter()
            .map(|s| s.iter().map(|&i| &roster[i]).collect())
            .collect()
    }
}
