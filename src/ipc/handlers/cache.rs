use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::marksheet::{compute_sheet, Sheet};
use crate::sheets::load_config;
use crate::store::{sheet_cache_key, KvStore, SqliteKvStore};
use serde_json::json;

fn handle_cache_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let key = match required_str(req, "key") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteKvStore::new(conn).get(&key) {
        Ok(value) => ok(&req.id, json!({ "key": key, "value": value })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Offline view of a cached sheet, computed against the current config.
fn handle_cache_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_key = match required_str(req, "assessmentKey") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let key = sheet_cache_key(&assessment_key, &subject_id);
    let text = match SqliteKvStore::new(conn).get(&key) {
        Ok(Some(v)) => v,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "no cached sheet",
                Some(json!({ "key": key })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut sheet: Sheet = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_cache_entry",
                e.to_string(),
                Some(json!({ "key": key })),
            )
        }
    };
    let (config, warnings) = load_config(conn, &assessment_key);
    sheet.normalize(&config);
    let result = compute_sheet(&config, &sheet);
    ok(
        &req.id,
        json!({
            "key": key,
            "sheet": sheet,
            "result": result,
            "warnings": warnings,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "cache.get" => Some(handle_cache_get(state, req)),
        "cache.preview" => Some(handle_cache_preview(state, req)),
        _ => None,
    }
}
