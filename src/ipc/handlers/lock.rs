use crate::ipc::error::{calc_err, ok};
use crate::ipc::helpers::{optional_str, require_db, SheetParams};
use crate::ipc::types::{AppState, Request};
use crate::lockstate::LockEvent;
use crate::sheets;
use serde_json::json;

fn handle_lock_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let params = match SheetParams::from_request(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match sheets::load_lock_state(conn, &params.key()) {
        Ok(lock) => ok(&req.id, json!({ "lock": lock.flags() })),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_lock_event(state: &mut AppState, req: &Request, event: LockEvent) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let params = match SheetParams::from_request(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let reason = optional_str(req, "reason");
    match sheets::transition_lock(conn, &params.key(), event, reason.as_deref()) {
        Ok(lock) => ok(&req.id, json!({ "ok": true, "lock": lock.flags() })),
        Err(e) => calc_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lock.status" => Some(handle_lock_status(state, req)),
        "lock.requestEdit" => Some(handle_lock_event(state, req, LockEvent::RequestEdit)),
        "lock.approve" => Some(handle_lock_event(state, req, LockEvent::Approve)),
        "lock.reject" => Some(handle_lock_event(state, req, LockEvent::Reject)),
        _ => None,
    }
}
