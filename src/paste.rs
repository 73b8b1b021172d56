//! Parser for roster rows pasted from a spreadsheet.
//!
//! Columns, tab separated: name, gender, problem flag, special-needs flag,
//! group, rank. Missing trailing columns take their defaults.

use serde::Serialize;

use crate::distribute::model::Gender;

const GROUP_PREFIX: &str = "그룹";
const MAX_GROUP: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PastedStudent {
    pub name: String,
    pub gender: Gender,
    pub is_problem: bool,
    pub is_special_needs: bool,
    pub group: Option<String>,
    pub rank: Option<u32>,
}

fn parse_gender(raw: &str) -> Gender {
    let t = raw.trim();
    if t.eq_ignore_ascii_case("F") || t == "여" || t == "여자" {
        Gender::Female
    } else {
        Gender::Male
    }
}

fn parse_flag(raw: &str, marker: &str) -> bool {
    let t = raw.trim();
    t.eq_ignore_ascii_case("true") || t == "1" || t == marker
}

/// "3" and "그룹 3" both become "그룹3"; anything outside 그룹1..그룹10 is dropped.
fn parse_group(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    let label = if t.chars().all(|c| c.is_ascii_digit()) {
        format!("{GROUP_PREFIX}{t}")
    } else {
        t.chars().filter(|c| !c.is_whitespace()).collect()
    };
    let n: u32 = label.strip_prefix(GROUP_PREFIX)?.parse().ok()?;
    let canonical = format!("{GROUP_PREFIX}{n}");
    ((1..=MAX_GROUP).contains(&n) && canonical == label).then_some(canonical)
}

/// Keeps only the digits, so "3등" or " 12 " still parse.
fn parse_rank(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

pub fn parse_row(row: &str) -> PastedStudent {
    let cols: Vec<&str> = row.trim_end_matches('\r').split('\t').collect();
    let col = |i: usize| cols.get(i).copied().unwrap_or("");
    PastedStudent {
        name: col(0).trim().to_string(),
        gender: parse_gender(col(1)),
        is_problem: parse_flag(col(2), "문제"),
        is_special_needs: parse_flag(col(3), "특수"),
        group: parse_group(col(4)),
        rank: parse_rank(col(5)),
    }
}

pub fn parse_paste(text: &str) -> Vec<PastedStudent> {
    text.split('\n')
        .filter(|row| !row.trim().is_empty())
        .map(parse_row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_rows() {
        let rows = parse_paste("홍길동\t남\tfalse\tfalse\t1\t1\n김영희\t여\t0\t특수\t그룹 2\t2등\r\n\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            PastedStudent {
                name: "홍길동".to_string(),
                gender: Gender::Male,
                is_problem: false,
                is_special_needs: false,
                group: Some("그룹1".to_string()),
                rank: Some(1),
            }
        );
        assert_eq!(rows[1].gender, Gender::Female);
        assert!(rows[1].is_special_needs);
        assert_eq!(rows[1].group.as_deref(), Some("그룹2"));
        assert_eq!(rows[1].rank, Some(2));
    }

    #[test]
    fn short_rows_take_defaults() {
        let rows = parse_paste("이철수");
        assert_eq!(rows[0].name, "이철수");
        assert_eq!(rows[0].gender, Gender::Male);
        assert!(!rows[0].is_problem);
        assert_eq!(rows[0].group, None);
        assert_eq!(rows[0].rank, None);
    }

    #[test]
    fn gender_and_flags_accept_several_spellings() {
        assert_eq!(parse_gender("f"), Gender::Female);
        assert_eq!(parse_gender("여자"), Gender::Female);
        assert_eq!(parse_gender("남자"), Gender::Male);
        assert_eq!(parse_gender("?"), Gender::Male);
        assert!(parse_flag("TRUE", "문제"));
        assert!(parse_flag("문제", "문제"));
        assert!(!parse_flag("yes", "문제"));
    }

    #[test]
    fn groups_outside_the_known_set_are_dropped() {
        assert_eq!(parse_group("10").as_deref(), Some("그룹10"));
        assert_eq!(parse_group("11"), None);
        assert_eq!(parse_group("0"), None);
        assert_eq!(parse_group("A조"), None);
        assert_eq!(parse_group("그룹01"), None);
        assert_eq!(parse_group(""), None);
    }

    #[test]
    fn rank_strips_non_digits() {
        assert_eq!(parse_rank(" 12 "), Some(12));
        assert_eq!(parse_rank("-"), None);
        assert_eq!(parse_rank(""), None);
    }
}
