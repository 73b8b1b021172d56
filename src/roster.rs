//! Class and student persistence.
//!
//! A distribution commit never edits the source class: it creates a new
//! class generation pointing back at its parent, writes every placed
//! student into it, and sets the parent's forward link, all inside one
//! transaction.

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::distribute::model::{Gender, Partition, Student};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Conflict(_) => "conflict",
            StoreError::Db(_) => "db_query_failed",
        }
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
    pub grade: i64,
    pub section_count: i64,
    pub is_distributed: bool,
    pub parent_class_id: Option<String>,
    pub child_class_id: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassListItem {
    #[serde(flatten)]
    pub class: ClassRecord,
    pub student_count: i64,
}

/// A stored student row as shown to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub section: i64,
    pub name: String,
    pub gender: Gender,
    pub is_problem: bool,
    pub is_special_needs: bool,
    pub group: Option<String>,
    pub rank: Option<u32>,
    pub previous_section: Option<i64>,
}

impl StudentRow {
    /// Engine view of the row; the current section becomes the origin.
    pub fn to_student(&self) -> Student {
        Student {
            id: self.id.clone(),
            name: self.name.clone(),
            gender: self.gender,
            group: self.group.clone().filter(|g| !g.is_empty()),
            rank: self.rank,
            is_problem: self.is_problem,
            is_special_needs: self.is_special_needs,
            origin_section: self.section,
        }
    }
}

/// Incoming row for a section save.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub gender: Gender,
    #[serde(default)]
    pub is_problem: bool,
    #[serde(default)]
    pub is_special_needs: bool,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub previous_section: Option<i64>,
}

const CLASS_COLUMNS: &str =
    "id, name, grade, section_count, is_distributed, parent_class_id, child_class_id, created_at";

fn class_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ClassRecord> {
    Ok(ClassRecord {
        id: r.get(0)?,
        name: r.get(1)?,
        grade: r.get(2)?,
        section_count: r.get(3)?,
        is_distributed: r.get::<_, i64>(4)? != 0,
        parent_class_id: r.get(5)?,
        child_class_id: r.get(6)?,
        created_at: r.get(7)?,
    })
}

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    let gender: String = r.get(3)?;
    Ok(StudentRow {
        id: r.get(0)?,
        section: r.get(1)?,
        name: r.get(2)?,
        gender: Gender::from_code(&gender),
        is_problem: r.get::<_, i64>(4)? != 0,
        is_special_needs: r.get::<_, i64>(5)? != 0,
        group: r.get(6)?,
        rank: r.get(7)?,
        previous_section: r.get(8)?,
    })
}

pub fn fetch_class(conn: &Connection, class_id: &str) -> Result<Option<ClassRecord>, StoreError> {
    let sql = format!("SELECT {} FROM classes WHERE id = ?", CLASS_COLUMNS);
    Ok(conn.query_row(&sql, [class_id], class_from_row).optional()?)
}

pub fn require_class(conn: &Connection, class_id: &str) -> Result<ClassRecord, StoreError> {
    fetch_class(conn, class_id)?.ok_or(StoreError::NotFound("class"))
}

pub fn list_classes(conn: &Connection) -> Result<Vec<ClassListItem>, StoreError> {
    let sql = format!(
        "SELECT {}, (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
         FROM classes c
         ORDER BY c.grade, c.created_at, c.name",
        CLASS_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassListItem {
                class: class_from_row(r)?,
                student_count: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_class(conn: &Connection, name: &str, grade: i64, section_count: i64) -> Result<ClassRecord, StoreError> {
    let record = ClassRecord {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        grade,
        section_count,
        is_distributed: false,
        parent_class_id: None,
        child_class_id: None,
        created_at: Some(Utc::now().to_rfc3339()),
    };
    conn.execute(
        "INSERT INTO classes(id, name, grade, section_count, is_distributed, created_at)
         VALUES(?, ?, ?, ?, 0, ?)",
        (
            &record.id,
            &record.name,
            record.grade,
            record.section_count,
            &record.created_at,
        ),
    )?;
    Ok(record)
}

/// Deletes a class and its students. A class that already has a
/// distributed child cannot be deleted; deleting a child clears its
/// parent's forward link so the parent can be distributed again.
pub fn delete_class(conn: &Connection, class_id: &str) -> Result<(), StoreError> {
    let class = require_class(conn, class_id)?;
    if let Some(child) = &class.child_class_id {
        if fetch_class(conn, child)?.is_some() {
            return Err(StoreError::Conflict(
                "class has a distributed child; delete the child first".to_string(),
            ));
        }
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM students WHERE class_id = ?", [class_id])?;
    tx.execute(
        "UPDATE classes SET child_class_id = NULL WHERE child_class_id = ?",
        [class_id],
    )?;
    tx.execute("DELETE FROM classes WHERE id = ?", [class_id])?;
    tx.commit()?;
    Ok(())
}

pub fn link_classes(conn: &Connection, parent_id: &str, child_id: &str) -> Result<(), StoreError> {
    if parent_id == child_id {
        return Err(StoreError::Conflict("a class cannot be linked to itself".to_string()));
    }
    require_class(conn, parent_id)?;
    require_class(conn, child_id)?;
    conn.execute(
        "UPDATE classes SET child_class_id = ? WHERE id = ?",
        (child_id, parent_id),
    )?;
    Ok(())
}

pub fn list_students(conn: &Connection, class_id: &str, section: Option<i64>) -> Result<Vec<StudentRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, section_number, name, gender, is_problem, is_special_needs,
                group_name, rank, previous_section
         FROM students
         WHERE class_id = ?1 AND (?2 IS NULL OR section_number = ?2)
         ORDER BY section_number, sort_order",
    )?;
    let rows = stmt
        .query_map((class_id, section), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Roster for a distribution run, in origin-section then entry order.
pub fn fetch_roster(conn: &Connection, class_id: &str) -> Result<Vec<Student>, StoreError> {
    Ok(list_students(conn, class_id, None)?
        .iter()
        .map(StudentRow::to_student)
        .collect())
}

/// Replaces one section's students. Rows without a previous section keep
/// the value of the replaced row with the same name and gender.
pub fn save_section(
    conn: &Connection,
    class_id: &str,
    section: i64,
    students: &[NewStudent],
) -> Result<usize, StoreError> {
    require_class(conn, class_id)?;
    let existing = list_students(conn, class_id, Some(section))?;
    let carried = |s: &NewStudent| {
        existing
            .iter()
            .rev()
            .find(|e| e.name == s.name && e.gender == s.gender)
            .and_then(|e| e.previous_section)
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM students WHERE class_id = ? AND section_number = ?",
        (class_id, section),
    )?;
    let mut saved = 0usize;
    {
        let mut insert = tx.prepare(
            "INSERT INTO students(id, class_id, section_number, name, gender, is_problem,
                                  is_special_needs, group_name, rank, previous_section, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for s in students.iter().filter(|s| !s.name.trim().is_empty()) {
            let group = s.group.as_deref().filter(|g| !g.is_empty());
            let previous = s.previous_section.or_else(|| carried(s));
            insert.execute(rusqlite::params![
                Uuid::new_v4().to_string(),
                class_id,
                section,
                s.name.trim(),
                s.gender.code(),
                s.is_problem as i64,
                s.is_special_needs as i64,
                group,
                s.rank,
                previous,
                saved as i64,
            ])?;
            saved += 1;
        }
    }
    tx.commit()?;
    Ok(saved)
}

pub fn delete_student(conn: &Connection, student_id: &str) -> Result<(), StoreError> {
    let n = conn.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    if n == 0 {
        return Err(StoreError::NotFound("student"));
    }
    Ok(())
}

/// Persists `partition` as a new class generation of `parent`.
/// Returns the new class id.
pub fn commit_distribution(
    conn: &Connection,
    parent: &ClassRecord,
    name: &str,
    roster: &[Student],
    partition: &Partition,
) -> Result<String, StoreError> {
    let tx = conn.unchecked_transaction()?;

    let current_child: Option<Option<String>> = tx
        .query_row(
            "SELECT child_class_id FROM classes WHERE id = ?",
            [&parent.id],
            |r| r.get(0),
        )
        .optional()?;
    match current_child {
        None => return Err(StoreError::NotFound("class")),
        Some(Some(child)) => {
            return Err(StoreError::Conflict(format!(
                "class is already distributed into {}",
                child
            )))
        }
        Some(None) => {}
    }

    let new_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO classes(id, name, grade, section_count, is_distributed, parent_class_id, created_at)
         VALUES(?, ?, ?, ?, 1, ?, ?)",
        (
            &new_id,
            name,
            parent.grade,
            partition.section_count() as i64,
            &parent.id,
            &created_at,
        ),
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            StoreError::Conflict("class is already being distributed".to_string())
        } else {
            StoreError::Db(e)
        }
    })?;

    {
        let mut insert = tx.prepare(
            "INSERT INTO students(id, class_id, section_number, name, gender, is_problem,
                                  is_special_needs, group_name, rank, previous_section, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for (section, members) in partition.sections().iter().enumerate() {
            for (order, &idx) in members.iter().enumerate() {
                let s = &roster[idx];
                insert.execute(rusqlite::params![
                    Uuid::new_v4().to_string(),
                    &new_id,
                    (section + 1) as i64,
                    &s.name,
                    s.gender.code(),
                    s.is_problem as i64,
                    s.is_special_needs as i64,
                    s.group_key(),
                    s.rank,
                    s.origin_section,
                    order as i64,
                ])?;
            }
        }
    }

    tx.execute(
        "UPDATE classes SET child_class_id = ? WHERE id = ?",
        (&new_id, &parent.id),
    )?;
    tx.commit()?;

    info!(
        parent = %parent.id,
        class = %new_id,
        students = partition.total(),
        sections = partition.section_count(),
        "committed distribution"
    );
    Ok(new_id)
}
