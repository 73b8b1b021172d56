use crate::distribute::manual::ManualSection;
use crate::distribute::model::{Gender, Student};
use crate::distribute::{self, Distribution};
use crate::ipc::error::ok;
use crate::ipc::handlers::settings::effective_options;
use crate::ipc::helpers::{get_optional, get_required_i64, get_required_str, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, StoreError};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlacedStudent<'a> {
    id: &'a str,
    name: &'a str,
    gender: Gender,
    is_problem: bool,
    is_special_needs: bool,
    group: Option<&'a str>,
    rank: Option<u32>,
    previous_section: i64,
}

#[derive(Debug, Serialize)]
struct SectionView<'a> {
    section: usize,
    students: Vec<PlacedStudent<'a>>,
}

fn section_views<'a>(d: &Distribution, roster: &'a [Student]) -> Vec<SectionView<'a>> {
    d.partition
        .resolve(roster)
        .into_iter()
        .enumerate()
        .map(|(i, members)| SectionView {
            section: i + 1,
            students: members
                .into_iter()
                .map(|s| PlacedStudent {
                    id: &s.id,
                    name: &s.name,
                    gender: s.gender,
                    is_problem: s.is_problem,
                    is_special_needs: s.is_special_needs,
                    group: s.group_key(),
                    rank: s.rank,
                    previous_section: s.origin_section,
                })
                .collect(),
        })
        .collect()
}

fn handle_distribute_run(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = get_required_str(&req.params, "classId")?;
    let section_count = get_required_i64(&req.params, "sectionCount")?;
    if section_count < 2 {
        return Err(HandlerErr::bad_params("sectionCount must be at least 2"));
    }
    let section_count = usize::try_from(section_count)
        .map_err(|_| HandlerErr::bad_params("sectionCount is out of range"))?;
    let preview = req
        .params
        .get("preview")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let manual: Option<Vec<ManualSection>> = get_optional(&req.params, "customDistribution")?;

    let class = roster::require_class(conn, &class_id)?;
    let students = roster::fetch_roster(conn, &class_id)?;
    distribute::validate(&students, section_count).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let options = effective_options(conn, req.params.get("options"))?;

    let result = distribute::distribute(&students, section_count, manual.as_deref(), &options)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let fingerprint = result.fingerprint(&students);

    let mut response = json!({
        "preview": preview,
        "stats": result.stats,
        "sections": section_views(&result, &students),
        "relaxations": result.relaxations,
        "violations": result.violations,
        "repairs": result.repairs,
        "manual": result.manual,
        "fingerprint": fingerprint,
    });
    if preview {
        return Ok(response);
    }

    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} ({} sections)", class.name, section_count));
    let new_class_id = roster::commit_distribution(conn, &class, &name, &students, &result.partition)
        .map_err(|e| match e {
            StoreError::Db(e) => HandlerErr::new("db_tx_failed", e.to_string()),
            other => other.into(),
        })?;
    response["newClassId"] = json!(new_class_id);
    Ok(response)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "distribute.run" => handle_distribute_run(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
