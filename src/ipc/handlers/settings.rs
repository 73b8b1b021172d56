use crate::db;
use crate::distribute::DistributeOptions;
use crate::ipc::error::ok;
use crate::ipc::helpers::{require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

pub const DISTRIBUTION_OPTIONS_KEY: &str = "distribution.options";

/// Stored options with `overrides` laid over them field by field.
pub fn effective_options(
    conn: &Connection,
    overrides: Option<&serde_json::Value>,
) -> Result<DistributeOptions, HandlerErr> {
    let stored = db::settings_get_json(conn, DISTRIBUTION_OPTIONS_KEY)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:?}")))?;
    let mut merged = match stored {
        Some(serde_json::Value::Object(m)) => m,
        _ => serde_json::Map::new(),
    };
    match overrides {
        None | Some(serde_json::Value::Null) => {}
        Some(serde_json::Value::Object(o)) => {
            for (k, v) in o {
                merged.insert(k.clone(), v.clone());
            }
        }
        Some(_) => return Err(HandlerErr::bad_params("options must be an object")),
    }
    let options: DistributeOptions = serde_json::from_value(serde_json::Value::Object(merged))
        .map_err(|e| HandlerErr::bad_params(format!("invalid options: {}", e)))?;
    validate_options(&options)?;
    Ok(options)
}

fn validate_options(options: &DistributeOptions) -> Result<(), HandlerErr> {
    options.check().map_err(|e| HandlerErr::bad_params(e.to_string()))
}

fn handle_distribution_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let options = effective_options(conn, None)?;
    Ok(json!({ "options": options, "defaults": DistributeOptions::default() }))
}

fn handle_distribution_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let raw = req
        .params
        .get("options")
        .ok_or_else(|| HandlerErr::bad_params("missing options"))?;
    let options: DistributeOptions = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid options: {}", e)))?;
    validate_options(&options)?;

    db::settings_set_json(conn, DISTRIBUTION_OPTIONS_KEY, &json!(options))
        .map_err(|e| HandlerErr::new("db_update_failed", format!("{e:?}")))?;
    tracing::info!(?options, "distribution options updated");
    Ok(json!({ "options": options }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "settings.distribution.get" => handle_distribution_get(state, req),
        "settings.distribution.set" => handle_distribution_set(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
