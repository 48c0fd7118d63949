use crate::calc::{coerce_number, CalcError};
use crate::config::AssessmentConfig;
use crate::export;
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{optional_level, require_db, required_str, OrResponse, SheetParams};
use crate::ipc::types::{AppState, Request};
use crate::marksheet::{compute_sheet, Sheet};
use crate::sheets::{self, LoadedSheet};
use crate::store::SqliteKvStore;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

const SHEET_BULK_UPDATE_MAX_EDITS: usize = 5000;

struct OpenedSheet {
    params: SheetParams,
    config: AssessmentConfig,
    loaded: LoadedSheet,
}

fn open_sheet(conn: &Connection, req: &Request) -> Result<OpenedSheet, serde_json::Value> {
    let params = SheetParams::from_request(req)?;
    let (config, mut warnings) = sheets::load_config(conn, &params.assessment_key);
    let cache = SqliteKvStore::new(conn);
    let mut loaded = sheets::load_sheet(conn, &cache, &params.key(), &config).or_response(&req.id)?;
    warnings.append(&mut loaded.warnings);
    loaded.warnings = warnings;
    Ok(OpenedSheet {
        params,
        config,
        loaded,
    })
}

/// Lock check, load, edit, save. `edit` returns the per-method result
/// object; `updatedAt` and `warnings` are added to it.
fn mutate_sheet<F>(state: &AppState, req: &Request, edit: F) -> serde_json::Value
where
    F: FnOnce(&AssessmentConfig, &mut Sheet) -> Result<serde_json::Value, serde_json::Value>,
{
    let run = || -> Result<serde_json::Value, serde_json::Value> {
        let conn = require_db(state, req)?;
        let params = SheetParams::from_request(req)?;
        sheets::ensure_editable(conn, &params.key()).or_response(&req.id)?;
        let opened = open_sheet(conn, req)?;
        let mut warnings = opened.loaded.warnings;
        let mut sheet = opened.loaded.sheet;

        let mut result = edit(&opened.config, &mut sheet)?;

        let cache = SqliteKvStore::new(conn);
        let (updated_at, mut save_warnings) =
            sheets::save_draft(conn, &cache, &mut sheet).or_response(&req.id)?;
        warnings.append(&mut save_warnings);
        if let Some(obj) = result.as_object_mut() {
            obj.insert("updatedAt".into(), json!(updated_at));
            obj.insert("warnings".into(), json!(warnings));
        }
        Ok(result)
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

fn handle_sheet_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let opened = match open_sheet(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lock = match sheets::load_lock_state(conn, &opened.params.key()) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let result = compute_sheet(&opened.config, &opened.loaded.sheet);
    ok(
        &req.id,
        json!({
            "sheet": opened.loaded.sheet,
            "source": opened.loaded.source,
            "config": opened.config,
            "result": result,
            "lock": lock.flags(),
            "warnings": opened.loaded.warnings,
        }),
    )
}

fn handle_sheet_set_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let question_key = match required_str(req, "questionKey") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let value = req.params.get("value").and_then(coerce_number);
    mutate_sheet(state, req, |cfg, sheet| {
        let stored = sheet
            .set_mark(cfg, &student_id, &question_key, value)
            .or_response(&req.id)?;
        Ok(json!({ "ok": true, "value": stored }))
    })
}

fn bulk_edit_error(index: usize, e: CalcError) -> serde_json::Value {
    let mut v = json!({
        "index": index,
        "code": e.code,
        "message": e.message,
    });
    if let Some(d) = e.details {
        v["details"] = d;
    }
    v
}

fn handle_sheet_bulk_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(edits) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing edits[]", None);
    };
    if edits.len() > SHEET_BULK_UPDATE_MAX_EDITS {
        let rejected = edits.len();
        return ok(
            &req.id,
            json!({
                "ok": true,
                "updated": 0,
                "rejected": rejected,
                "limitExceeded": true,
                "errors": [{
                    "index": -1,
                    "code": "too_many_edits",
                    "message": format!(
                        "bulk payload exceeds max edits: {} > {}",
                        rejected, SHEET_BULK_UPDATE_MAX_EDITS
                    )
                }]
            }),
        );
    }

    mutate_sheet(state, req, |cfg, sheet| {
        let mut updated: usize = 0;
        let mut errors: Vec<serde_json::Value> = Vec::new();
        for (i, edit) in edits.iter().enumerate() {
            let student_id = edit.get("studentId").and_then(|v| v.as_str());
            let question_key = edit.get("questionKey").and_then(|v| v.as_str());
            let (Some(student_id), Some(question_key)) = (student_id, question_key) else {
                errors.push(bulk_edit_error(
                    i,
                    CalcError::new("bad_params", "edit needs studentId and questionKey"),
                ));
                continue;
            };
            let value = edit.get("value").and_then(coerce_number);
            match sheet.set_mark(cfg, student_id, question_key, value) {
                Ok(_) => updated += 1,
                Err(e) => errors.push(bulk_edit_error(i, e)),
            }
        }
        Ok(json!({
            "ok": true,
            "updated": updated,
            "rejected": errors.len(),
            "errors": errors,
        }))
    })
}

fn handle_sheet_set_absent(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(absent) = req.params.get("absent").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing absent", None);
    };
    mutate_sheet(state, req, |_, sheet| {
        sheet.set_absent(&student_id, absent).or_response(&req.id)?;
        Ok(json!({ "ok": true, "absent": absent }))
    })
}

fn handle_sheet_set_btl(state: &mut AppState, req: &Request) -> serde_json::Value {
    let question_key = match required_str(req, "questionKey") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level = match optional_level(req, "btl", 1, 6) {
        Ok(v) => v,
        Err(e) => return e,
    };
    mutate_sheet(state, req, |cfg, sheet| {
        sheet
            .set_btl_override(cfg, &question_key, level)
            .or_response(&req.id)?;
        Ok(json!({ "ok": true, "questionKey": question_key, "btl": level }))
    })
}

fn handle_sheet_save_draft(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("sheet") else {
        return err(&req.id, "bad_params", "missing sheet", None);
    };
    let incoming: Sheet = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid sheet: {}", e), None),
    };
    mutate_sheet(state, req, |cfg, sheet| {
        if incoming.assessment_key.to_ascii_lowercase() != sheet.assessment_key
            || incoming.subject_code != sheet.subject_code
            || incoming.teaching_assignment_id != sheet.teaching_assignment_id
        {
            return Err(err(
                &req.id,
                "bad_params",
                "sheet payload does not match the addressed sheet",
                None,
            ));
        }
        sheet.btl_overrides = incoming.btl_overrides;
        sheet.rows = incoming.rows;
        sheet.normalize(cfg);
        Ok(json!({ "ok": true, "rows": sheet.rows.len() }))
    })
}

fn handle_sheet_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let opened = match open_sheet(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = compute_sheet(&opened.config, &opened.loaded.sheet);
    ok(
        &req.id,
        json!({
            "result": result,
            "warnings": opened.loaded.warnings,
        }),
    )
}

fn handle_sheet_publish(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let opened = match open_sheet(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match sheets::publish(conn, &opened.params.key(), &opened.loaded.sheet) {
        Ok((snapshot, lock)) => ok(
            &req.id,
            json!({
                "ok": true,
                "version": snapshot.version,
                "digest": snapshot.digest,
                "publishedAt": snapshot.published_at,
                "lock": lock.flags(),
            }),
        ),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_sheet_published(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let params = match SheetParams::from_request(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match sheets::latest_published(conn, &params.key()) {
        Ok(snapshot) => ok(&req.id, json!({ "published": snapshot })),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_sheet_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let opened = match open_sheet(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = compute_sheet(&opened.config, &opened.loaded.sheet);
    let csv = export::sheet_csv(&opened.config, &opened.loaded.sheet, &result);

    let out = PathBuf::from(&out_path);
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": parent.to_string_lossy() })),
            );
        }
    }
    if let Err(e) = std::fs::write(&out, csv.as_bytes()) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }
    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "rowsExported": opened.loaded.sheet.rows.len(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sheet.open" => Some(handle_sheet_open(state, req)),
        "sheet.setMark" => Some(handle_sheet_set_mark(state, req)),
        "sheet.bulkUpdate" => Some(handle_sheet_bulk_update(state, req)),
        "sheet.setAbsent" => Some(handle_sheet_set_absent(state, req)),
        "sheet.setBtl" => Some(handle_sheet_set_btl(state, req)),
        "sheet.saveDraft" => Some(handle_sheet_save_draft(state, req)),
        "sheet.compute" => Some(handle_sheet_compute(state, req)),
        "sheet.publish" => Some(handle_sheet_publish(state, req)),
        "sheet.published" => Some(handle_sheet_published(state, req)),
        "sheet.exportCsv" => Some(handle_sheet_export_csv(state, req)),
        _ => None,
    }
}
