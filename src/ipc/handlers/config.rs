use crate::config::parse_config;
use crate::db;
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::sheets::{config_setting_key, load_config};
use serde_json::json;

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_key = match required_str(req, "assessmentKey") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };
    let overridden = matches!(
        db::settings_get_json(conn, &config_setting_key(&assessment_key)),
        Ok(Some(_))
    );
    let (config, warnings) = load_config(conn, &assessment_key);
    ok(
        &req.id,
        json!({
            "assessmentKey": assessment_key,
            "source": if overridden { "stored" } else { "default" },
            "config": config,
            "warnings": warnings,
        }),
    )
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_key = match required_str(req, "assessmentKey") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("config") else {
        return err(&req.id, "bad_params", "missing config", None);
    };
    let (config, warnings) = match parse_config(raw, &assessment_key) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let normalized = match serde_json::to_value(&config) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "internal", e.to_string(), None),
    };
    if let Err(e) = db::settings_set_json(conn, &config_setting_key(&assessment_key), &normalized) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if !warnings.is_empty() {
        tracing::warn!(assessment_key = %assessment_key, count = warnings.len(), "config stored with warnings");
    }
    ok(
        &req.id,
        json!({
            "assessmentKey": assessment_key,
            "config": normalized,
            "warnings": warnings,
        }),
    )
}

fn handle_config_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assessment_key = match required_str(req, "assessmentKey") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };
    match db::settings_delete(conn, &config_setting_key(&assessment_key)) {
        Ok(removed) => ok(&req.id, json!({ "ok": true, "removed": removed })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        "config.reset" => Some(handle_config_reset(state, req)),
        _ => None,
    }
}
