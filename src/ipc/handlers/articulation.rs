use crate::articulation::{parse_units, summarize, Unit};
use crate::calc::CalcError;
use crate::db;
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

/// Stored units for a subject; empty when none were saved.
pub(crate) fn load_units(
    conn: &Connection,
    subject_code: &str,
) -> Result<(Vec<Unit>, Option<String>), CalcError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT units_json, updated_at FROM articulation_matrices WHERE subject_code = ?",
            [subject_code],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let Some((text, updated_at)) = row else {
        return Ok((Vec::new(), None));
    };
    let units: Vec<Unit> = serde_json::from_str(&text).map_err(|e| {
        CalcError::new(
            "db_query_failed",
            format!("stored articulation matrix unreadable: {}", e),
        )
    })?;
    Ok((units, Some(updated_at)))
}

fn store_units(conn: &Connection, subject_code: &str, units: &[Unit]) -> Result<String, CalcError> {
    let text = serde_json::to_string(units).map_err(|e| CalcError::new("internal", e.to_string()))?;
    let now = db::now_rfc3339();
    conn.execute(
        "INSERT INTO articulation_matrices(subject_code, units_json, updated_at)
         VALUES(?, ?, ?)
         ON CONFLICT(subject_code) DO UPDATE SET
           units_json = excluded.units_json,
           updated_at = excluded.updated_at",
        (subject_code, &text, &now),
    )
    .map_err(|e| CalcError::new("db_insert_failed", e.to_string()))?;
    Ok(now)
}

fn handle_articulation_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let subject_code = match required_str(req, "subjectCode") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("units") else {
        return err(&req.id, "bad_params", "missing units[]", None);
    };
    let units = match parse_units(raw) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let updated_at = match store_units(conn, &subject_code, &units) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    tracing::debug!(subject_code = %subject_code, units = units.len(), "articulation matrix stored");
    ok(
        &req.id,
        json!({
            "ok": true,
            "units": units.len(),
            "updatedAt": updated_at,
            "summary": summarize(&units),
        }),
    )
}

fn handle_articulation_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_code = match required_str(req, "subjectCode") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_units(conn, &subject_code) {
        Ok((units, updated_at)) => ok(
            &req.id,
            json!({ "subjectCode": subject_code, "units": units, "updatedAt": updated_at }),
        ),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_articulation_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_code = match required_str(req, "subjectCode") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_units(conn, &subject_code) {
        Ok((units, _)) => ok(&req.id, json!(summarize(&units))),
        Err(e) => calc_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "articulation.set" => Some(handle_articulation_set(state, req)),
        "articulation.get" => Some(handle_articulation_get(state, req)),
        "articulation.summary" => Some(handle_articulation_summary(state, req)),
        _ => None,
    }
}
