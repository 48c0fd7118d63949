use crate::active_learning::{parse_mapping, PoMapping, SETTING_KEY};
use crate::db;
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_active_learning_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut warnings: Vec<String> = Vec::new();
    let mapping = match db::settings_get_json(conn, SETTING_KEY) {
        Ok(Some(v)) => parse_mapping(&v).unwrap_or_else(|e| {
            warnings.push(format!("stored mapping invalid ({}); defaults used", e.message));
            PoMapping::default()
        }),
        Ok(None) => PoMapping::default(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "mapping": mapping, "warnings": warnings }))
}

fn handle_active_learning_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(raw) = req.params.get("mapping") else {
        return err(&req.id, "bad_params", "missing mapping", None);
    };
    let mapping = match parse_mapping(raw) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    if let Err(e) = db::settings_set_json(conn, SETTING_KEY, &mapping.to_value()) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true, "mapping": mapping }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activeLearning.get" => Some(handle_active_learning_get(state, req)),
        "activeLearning.set" => Some(handle_active_learning_set(state, req)),
        _ => None,
    }
}
