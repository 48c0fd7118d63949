use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_roster_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let ta_id = match required_str(req, "teachingAssignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(students) = req.params.get("students").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing students[]", None);
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut next_sort: i64 = match tx.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE teaching_assignment_id = ?",
        [&ta_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let (mut inserted, mut updated) = (0_usize, 0_usize);
    let mut errors: Vec<serde_json::Value> = Vec::new();
    for (i, s) in students.iter().enumerate() {
        let reg_no = s
            .get("regNo")
            .and_then(|v| v.as_str())
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        let name = s
            .get("name")
            .and_then(|v| v.as_str())
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        if reg_no.is_empty() || name.is_empty() {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": "regNo and name are required",
            }));
            continue;
        }
        let section = s
            .get("section")
            .and_then(|v| v.as_str())
            .map(|v| v.trim().to_string());

        let existing: Option<String> = match tx
            .query_row(
                "SELECT id FROM students WHERE teaching_assignment_id = ? AND reg_no = ?",
                (&ta_id, &reg_no),
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };

        let res = match existing {
            Some(id) => tx
                .execute(
                    "UPDATE students SET name = ?, section = ? WHERE id = ?",
                    (&name, &section, &id),
                )
                .map(|_| updated += 1),
            None => {
                let id = s
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let r = tx.execute(
                    "INSERT INTO students(id, teaching_assignment_id, reg_no, name, section, sort_order)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    (&id, &ta_id, &reg_no, &name, &section, next_sort),
                );
                if r.is_ok() {
                    next_sort += 1;
                    inserted += 1;
                }
                r.map(|_| ())
            }
        };
        if let Err(e) = res {
            errors.push(json!({
                "index": i,
                "code": "db_insert_failed",
                "message": e.to_string(),
            }));
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }
    tracing::info!(teaching_assignment_id = %ta_id, inserted, updated, rejected = errors.len(), "roster imported");
    ok(
        &req.id,
        json!({
            "ok": true,
            "inserted": inserted,
            "updated": updated,
            "rejected": errors.len(),
            "errors": errors,
        }),
    )
}

fn handle_roster_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let ta_id = match required_str(req, "teachingAssignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT id, reg_no, name, section, sort_order FROM students
         WHERE teaching_assignment_id = ?
         ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&ta_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "regNo": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
                "section": r.get::<_, Option<String>>(3)?,
                "sortOrder": r.get::<_, i64>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.import" => Some(handle_roster_import(state, req)),
        "roster.list" => Some(handle_roster_list(state, req)),
        _ => None,
    }
}
