use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_i64, get_required_str, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::paste;
use crate::roster::{self, NewStudent};
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    let section = get_optional_i64(&req.params, "section")?;
    roster::require_class(conn, &class_id)?;
    let students = roster::list_students(conn, &class_id, section)?;
    Ok(json!({ "students": students }))
}

fn handle_students_save_section(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    let section = get_optional_i64(&req.params, "section")?.unwrap_or(1);
    if section < 1 {
        return Err(HandlerErr::bad_params("section must be at least 1"));
    }
    let Some(raw) = req.params.get("students").filter(|v| v.is_array()) else {
        return Err(HandlerErr::bad_params("students must be an array"));
    };
    let students: Vec<NewStudent> = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid students: {}", e)))?;

    let count = roster::save_section(conn, &class_id, section, &students).map_err(|e| match e {
        roster::StoreError::Db(e) => HandlerErr::new("db_insert_failed", e.to_string()),
        other => other.into(),
    })?;
    Ok(json!({ "count": count }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    roster::delete_student(conn, &student_id)?;
    Ok(json!({ "ok": true }))
}

fn handle_students_parse_paste(_state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let text = req
        .params
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing text"))?;
    let students = paste::parse_paste(text);
    Ok(json!({ "students": students, "count": students.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.saveSection" => handle_students_save_section(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.parsePaste" => handle_students_parse_paste(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
