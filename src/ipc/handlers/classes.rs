use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_i64, get_required_str, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use serde_json::json;

fn handle_classes_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };
    let classes = roster::list_classes(conn)?;
    Ok(json!({ "classes": classes }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = get_required_str(&req.params, "name")?;
    let grade = get_optional_i64(&req.params, "grade")?.unwrap_or(1);
    let section_count = get_optional_i64(&req.params, "sectionCount")?.unwrap_or(1);
    if section_count < 1 {
        return Err(HandlerErr::bad_params("sectionCount must be at least 1"));
    }

    let class = roster::create_class(conn, &name, grade, section_count).map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "classes" })),
    })?;
    Ok(json!({ "classId": class.id, "class": class }))
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    let class = roster::require_class(conn, &class_id)?;

    // Linked generations are optional; a dangling id shows up as null.
    let parent = match &class.parent_class_id {
        Some(id) => roster::fetch_class(conn, id)?,
        None => None,
    };
    let child = match &class.child_class_id {
        Some(id) => roster::fetch_class(conn, id)?,
        None => None,
    };
    Ok(json!({ "class": class, "parent": parent, "child": child }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    roster::delete_class(conn, &class_id).map_err(|e| match e {
        roster::StoreError::Db(e) => HandlerErr::new("db_delete_failed", e.to_string()),
        other => other.into(),
    })?;
    tracing::info!(class = %class_id, "class deleted");
    Ok(json!({ "ok": true }))
}

fn handle_classes_link(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let parent_id = get_required_str(&req.params, "parentClassId")?;
    let child_id = get_required_str(&req.params, "childClassId")?;
    roster::link_classes(conn, &parent_id, &child_id)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => handle_classes_list(state, req),
        "classes.create" => handle_classes_create(state, req),
        "classes.get" => handle_classes_get(state, req),
        "classes.delete" => handle_classes_delete(state, req),
        "classes.link" => handle_classes_link(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
