use super::articulation::load_units;
use crate::articulation::summarize;
use crate::calc::{coerce_number, CalcError};
use crate::cotarget::{compute_targets, CoTargetInputs, TargetWeights, CO_COUNT};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{optional_level, require_db, required_str, OrResponse};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn db_err(e: impl std::fmt::Display) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

fn parse_weights(co: u8, text: Option<String>) -> TargetWeights {
    text.and_then(|t| serde_json::from_str(&t).ok())
        .unwrap_or_else(|| TargetWeights::default_for_co(co))
}

fn load_inputs(conn: &Connection, subject_code: &str) -> Result<Vec<CoTargetInputs>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT co, btl_level, aco, api, iic, weights_json FROM cotarget_inputs
             WHERE subject_code = ?
             ORDER BY co",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([subject_code], |r| {
            let co: u8 = r.get(0)?;
            Ok(CoTargetInputs {
                co,
                btl_level: r.get(1)?,
                aco: r.get(2)?,
                api: r.get(3)?,
                iic: r.get(4)?,
                weights: parse_weights(co, r.get(5)?),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(rows)
}

fn load_input(conn: &Connection, subject_code: &str, co: u8) -> Result<CoTargetInputs, CalcError> {
    let row = conn
        .query_row(
            "SELECT btl_level, aco, api, iic, weights_json FROM cotarget_inputs
             WHERE subject_code = ? AND co = ?",
            (subject_code, co),
            |r| {
                Ok(CoTargetInputs {
                    co,
                    btl_level: r.get(0)?,
                    aco: r.get(1)?,
                    api: r.get(2)?,
                    iic: r.get(3)?,
                    weights: parse_weights(co, r.get(4)?),
                })
            },
        )
        .optional()
        .map_err(db_err)?;
    Ok(row.unwrap_or_else(|| CoTargetInputs::new(co)))
}

fn store_input(conn: &Connection, subject_code: &str, input: &CoTargetInputs) -> Result<(), CalcError> {
    let weights_json =
        serde_json::to_string(&input.weights).map_err(|e| CalcError::new("internal", e.to_string()))?;
    conn.execute(
        "INSERT INTO cotarget_inputs(subject_code, co, btl_level, aco, api, iic, weights_json)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(subject_code, co) DO UPDATE SET
           btl_level = excluded.btl_level,
           aco = excluded.aco,
           api = excluded.api,
           iic = excluded.iic,
           weights_json = excluded.weights_json",
        (
            subject_code,
            input.co,
            input.btl_level,
            input.aco,
            input.api,
            input.iic,
            weights_json,
        ),
    )
    .map_err(|e| CalcError::new("db_insert_failed", e.to_string()))?;
    Ok(())
}

fn required_co(req: &Request) -> Result<u8, serde_json::Value> {
    match req.params.get("co").and_then(|v| v.as_u64()) {
        Some(n) if (1..=CO_COUNT as u64).contains(&n) => Ok(n as u8),
        _ => Err(err(
            &req.id,
            "bad_params",
            format!("co must be 1..{}", CO_COUNT),
            None,
        )),
    }
}

/// Absent key keeps the stored value; `null` clears it.
fn component(
    req: &Request,
    key: &str,
    current: Option<f64>,
) -> Result<Option<f64>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(current),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match coerce_number(v) {
            Some(n) if n >= 0.0 => Ok(Some(n)),
            _ => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be a non-negative number or null", key),
                Some(json!({ "field": key, "value": v })),
            )),
        },
    }
}

fn handle_cotarget_set_btl(state: &mut AppState, req: &Request) -> serde_json::Value {
    let run = || -> Result<serde_json::Value, serde_json::Value> {
        let conn = require_db(state, req)?;
        let subject_code = required_str(req, "subjectCode")?;
        let co = required_co(req)?;
        let level = optional_level(req, "level", 1, 6)?;
        let mut input = load_input(conn, &subject_code, co).or_response(&req.id)?;
        input.select_btl(level).or_response(&req.id)?;
        store_input(conn, &subject_code, &input).or_response(&req.id)?;
        Ok(json!({ "ok": true, "co": co, "btlLevel": input.btl_level }))
    };
    run().map_or_else(|e| e, |v| ok(&req.id, v))
}

fn handle_cotarget_set_inputs(state: &mut AppState, req: &Request) -> serde_json::Value {
    let run = || -> Result<serde_json::Value, serde_json::Value> {
        let conn = require_db(state, req)?;
        let subject_code = required_str(req, "subjectCode")?;
        let co = required_co(req)?;
        let mut input = load_input(conn, &subject_code, co).or_response(&req.id)?;
        input.aco = component(req, "aco", input.aco)?;
        input.api = component(req, "api", input.api)?;
        input.iic = component(req, "iic", input.iic)?;
        store_input(conn, &subject_code, &input).or_response(&req.id)?;
        Ok(json!({ "ok": true, "inputs": input }))
    };
    run().map_or_else(|e| e, |v| ok(&req.id, v))
}

fn handle_cotarget_set_weights(state: &mut AppState, req: &Request) -> serde_json::Value {
    let run = || -> Result<serde_json::Value, serde_json::Value> {
        let conn = require_db(state, req)?;
        let subject_code = required_str(req, "subjectCode")?;
        let Some(arr) = req.params.get("weights").and_then(|v| v.as_array()) else {
            return Err(err(&req.id, "bad_params", "missing weights[]", None));
        };
        if arr.len() != CO_COUNT as usize {
            return Err(err(
                &req.id,
                "bad_params",
                format!("weights must have {} entries", CO_COUNT),
                Some(json!({ "len": arr.len() })),
            ));
        }

        let mut parsed: Vec<TargetWeights> = Vec::with_capacity(arr.len());
        for (i, w) in arr.iter().enumerate() {
            let co = i as u8 + 1;
            let weights = if w.is_null() {
                TargetWeights::default_for_co(co)
            } else {
                serde_json::from_value::<TargetWeights>(w.clone()).map_err(|e| {
                    err(
                        &req.id,
                        "bad_params",
                        format!("weights for CO{} invalid: {}", co, e),
                        None,
                    )
                })?
            };
            weights.validate().or_response(&req.id)?;
            parsed.push(weights);
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| err(&req.id, "db_tx_failed", e.to_string(), None))?;
        for (i, weights) in parsed.iter().enumerate() {
            let mut input = load_input(&tx, &subject_code, i as u8 + 1).or_response(&req.id)?;
            input.weights = *weights;
            store_input(&tx, &subject_code, &input).or_response(&req.id)?;
        }
        tx.commit()
            .map_err(|e| err(&req.id, "db_tx_failed", e.to_string(), None))?;
        Ok(json!({ "ok": true, "weights": parsed }))
    };
    run().map_or_else(|e| e, |v| ok(&req.id, v))
}

fn handle_cotarget_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_code = match required_str(req, "subjectCode") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let units = match load_units(conn, &subject_code) {
        Ok((units, _)) => units,
        Err(e) => return calc_err(&req.id, e),
    };
    let inputs = match load_inputs(conn, &subject_code) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let summary = summarize(&units);
    let targets = compute_targets(&summary, &inputs);
    ok(
        &req.id,
        json!({
            "subjectCode": subject_code,
            "targets": targets,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "cotarget.setBtl" => Some(handle_cotarget_set_btl(state, req)),
        "cotarget.setInputs" => Some(handle_cotarget_set_inputs(state, req)),
        "cotarget.setWeights" => Some(handle_cotarget_set_weights(state, req)),
        "cotarget.compute" => Some(handle_cotarget_compute(state, req)),
        _ => None,
    }
}
