//! Sheet persistence: config lookup, roster, draft read-through, publish
//! snapshots and the lock record.

use crate::calc::CalcError;
use crate::config::{default_config, parse_config, AssessmentConfig};
use crate::db;
use crate::lockstate::{LockEvent, LockState};
use crate::marksheet::{RosterEntry, Sheet};
use crate::store::{sheet_cache_key, KvStore};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn db_err(e: impl std::fmt::Display) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct SheetKey<'a> {
    pub assessment_key: &'a str,
    pub subject_code: &'a str,
    pub teaching_assignment_id: &'a str,
}

pub fn config_setting_key(assessment_key: &str) -> String {
    format!("config.assessment.{}", assessment_key.to_ascii_lowercase())
}

/// The stored override for `assessment_key`, or the built-in default. A
/// broken stored config never blocks mark entry: defaults are used and a
/// warning is returned.
pub fn load_config(conn: &Connection, assessment_key: &str) -> (AssessmentConfig, Vec<String>) {
    let stored = match db::settings_get_json(conn, &config_setting_key(assessment_key)) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(assessment_key, error = %e, "stored config unreadable");
            return (
                default_config(assessment_key),
                vec![format!("stored config unreadable ({}); defaults used", e)],
            );
        }
    };
    let Some(raw) = stored else {
        return (default_config(assessment_key), Vec::new());
    };
    match parse_config(&raw, assessment_key) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(assessment_key, code = %e.code, "stored config invalid");
            (
                default_config(assessment_key),
                vec![format!("stored config invalid ({}); defaults used", e.message)],
            )
        }
    }
}

pub fn load_roster(
    conn: &Connection,
    teaching_assignment_id: &str,
) -> Result<Vec<RosterEntry>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, reg_no, name FROM students
             WHERE teaching_assignment_id = ?
             ORDER BY sort_order",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([teaching_assignment_id], |r| {
            Ok(RosterEntry {
                id: r.get(0)?,
                reg_no: r.get(1)?,
                name: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetSource {
    Draft,
    Cache,
    Roster,
}

#[derive(Debug, Clone)]
pub struct LoadedSheet {
    pub sheet: Sheet,
    pub source: SheetSource,
    pub warnings: Vec<String>,
}

fn parse_sheet_payload(text: &str, key: &SheetKey<'_>) -> Result<Sheet, String> {
    let sheet: Sheet = serde_json::from_str(text).map_err(|e| e.to_string())?;
    if sheet.assessment_key != key.assessment_key || sheet.subject_code != key.subject_code {
        return Err("payload belongs to a different sheet".to_string());
    }
    Ok(sheet)
}

/// Draft first (repairing the cache from it), then the local cache, then a
/// fresh sheet from the roster. New roster students are appended and row
/// invariants re-established against `config`.
pub fn load_sheet(
    conn: &Connection,
    cache: &dyn KvStore,
    key: &SheetKey<'_>,
    config: &AssessmentConfig,
) -> Result<LoadedSheet, CalcError> {
    let mut warnings: Vec<String> = Vec::new();
    let cache_key = sheet_cache_key(key.assessment_key, key.subject_code);

    let draft_text: Option<String> = conn
        .query_row(
            "SELECT payload_json FROM sheet_drafts
             WHERE assessment_key = ? AND subject_code = ? AND teaching_assignment_id = ?",
            (key.assessment_key, key.subject_code, key.teaching_assignment_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;

    let mut loaded: Option<(Sheet, SheetSource)> = None;
    if let Some(text) = draft_text {
        match parse_sheet_payload(&text, key) {
            Ok(sheet) => {
                if let Err(e) = cache.put(&cache_key, &text) {
                    warnings.push(format!("local cache not updated: {}", e));
                }
                loaded = Some((sheet, SheetSource::Draft));
            }
            Err(e) => warnings.push(format!("stored draft unreadable ({}); ignored", e)),
        }
    }

    if loaded.is_none() {
        match cache.get(&cache_key) {
            Ok(Some(text)) => match parse_sheet_payload(&text, key) {
                Ok(sheet) if sheet.teaching_assignment_id == key.teaching_assignment_id => {
                    loaded = Some((sheet, SheetSource::Cache));
                }
                Ok(_) => {}
                Err(e) => {
                    warnings.push(format!("local cache unreadable ({}); discarded", e));
                    if let Err(e) = cache.remove(&cache_key) {
                        tracing::warn!(cache_key = %cache_key, error = %e, "local cache entry not removed");
                    }
                }
            },
            Ok(None) => {}
            Err(e) => warnings.push(format!("local cache unavailable: {}", e)),
        }
    }

    let roster = load_roster(conn, key.teaching_assignment_id)?;
    let (mut sheet, source) = loaded.unwrap_or_else(|| {
        (
            Sheet::from_roster(
                key.assessment_key,
                key.subject_code,
                key.teaching_assignment_id,
                &roster,
            ),
            SheetSource::Roster,
        )
    });
    let added = sheet.merge_roster(&roster);
    sheet.normalize(config);

    tracing::debug!(
        assessment_key = key.assessment_key,
        subject_code = key.subject_code,
        source = ?source,
        rows = sheet.rows.len(),
        added,
        "sheet loaded"
    );
    Ok(LoadedSheet {
        sheet,
        source,
        warnings,
    })
}

/// Persists `sheet` as the draft and mirrors it into the local cache.
/// Returns the new `updatedAt` stamp and any cache warning.
pub fn save_draft(
    conn: &Connection,
    cache: &dyn KvStore,
    sheet: &mut Sheet,
) -> Result<(String, Vec<String>), CalcError> {
    let now = db::now_rfc3339();
    sheet.updated_at = Some(now.clone());
    let text = serde_json::to_string(sheet).map_err(|e| CalcError::new("internal", e.to_string()))?;
    conn.execute(
        "INSERT INTO sheet_drafts(assessment_key, subject_code, teaching_assignment_id, payload_json, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(assessment_key, subject_code, teaching_assignment_id) DO UPDATE SET
           payload_json = excluded.payload_json,
           updated_at = excluded.updated_at",
        (
            &sheet.assessment_key,
            &sheet.subject_code,
            &sheet.teaching_assignment_id,
            &text,
            &now,
        ),
    )
    .map_err(|e| CalcError::new("db_insert_failed", e.to_string()))?;

    let mut warnings = Vec::new();
    let cache_key = sheet_cache_key(&sheet.assessment_key, &sheet.subject_code);
    if let Err(e) = cache.put(&cache_key, &text) {
        tracing::warn!(cache_key = %cache_key, error = %e, "local cache write failed");
        warnings.push(format!("local cache not updated: {}", e));
    }
    Ok((now, warnings))
}

pub fn load_lock_state(conn: &Connection, key: &SheetKey<'_>) -> Result<LockState, CalcError> {
    let state: Option<String> = conn
        .query_row(
            "SELECT state FROM sheet_locks
             WHERE assessment_key = ? AND subject_code = ? AND teaching_assignment_id = ?",
            (key.assessment_key, key.subject_code, key.teaching_assignment_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;
    match state {
        None => Ok(LockState::Unlocked),
        Some(s) => LockState::parse(&s).ok_or_else(|| {
            CalcError::new("db_query_failed", format!("unknown lock state: {}", s))
        }),
    }
}

fn store_lock_state(
    conn: &Connection,
    key: &SheetKey<'_>,
    state: LockState,
    reason: Option<&str>,
) -> Result<(), CalcError> {
    conn.execute(
        "INSERT INTO sheet_locks(assessment_key, subject_code, teaching_assignment_id, state, reason, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(assessment_key, subject_code, teaching_assignment_id) DO UPDATE SET
           state = excluded.state,
           reason = excluded.reason,
           updated_at = excluded.updated_at",
        (
            key.assessment_key,
            key.subject_code,
            key.teaching_assignment_id,
            state.as_str(),
            reason,
            db::now_rfc3339(),
        ),
    )
    .map_err(|e| CalcError::new("db_insert_failed", e.to_string()))?;
    Ok(())
}

/// Applies a lock event other than publishing.
pub fn transition_lock(
    conn: &Connection,
    key: &SheetKey<'_>,
    event: LockEvent,
    reason: Option<&str>,
) -> Result<LockState, CalcError> {
    let current = load_lock_state(conn, key)?;
    let next = current.apply(event)?;
    store_lock_state(conn, key, next, reason)?;
    tracing::info!(
        assessment_key = key.assessment_key,
        subject_code = key.subject_code,
        from = current.as_str(),
        to = next.as_str(),
        "lock transition"
    );
    Ok(next)
}

/// Fails with `sheet_locked` unless the sheet is editable.
pub fn ensure_editable(conn: &Connection, key: &SheetKey<'_>) -> Result<LockState, CalcError> {
    let state = load_lock_state(conn, key)?;
    if !state.can_edit() {
        return Err(CalcError::new("sheet_locked", "sheet is published and locked")
            .with_details(serde_json::json!({ "state": state.as_str() })));
    }
    Ok(state)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedSnapshot {
    pub version: i64,
    pub digest: String,
    pub published_at: String,
    pub sheet: Sheet,
}

pub fn payload_digest(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Writes an immutable snapshot of `sheet` as the next version and locks
/// the sheet, atomically.
pub fn publish(
    conn: &Connection,
    key: &SheetKey<'_>,
    sheet: &Sheet,
) -> Result<(PublishedSnapshot, LockState), CalcError> {
    let current = load_lock_state(conn, key)?;
    let next = current.apply(LockEvent::Publish)?;

    let text = serde_json::to_string(sheet).map_err(|e| CalcError::new("internal", e.to_string()))?;
    let digest = payload_digest(&text);
    let published_at = db::now_rfc3339();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| CalcError::new("db_tx_failed", e.to_string()))?;
    let version: i64 = tx
        .query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM sheet_published
             WHERE assessment_key = ? AND subject_code = ? AND teaching_assignment_id = ?",
            (key.assessment_key, key.subject_code, key.teaching_assignment_id),
            |r| r.get(0),
        )
        .map_err(db_err)?;
    tx.execute(
        "INSERT INTO sheet_published(id, assessment_key, subject_code, teaching_assignment_id, version, payload_json, digest, published_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            key.assessment_key,
            key.subject_code,
            key.teaching_assignment_id,
            version,
            &text,
            &digest,
            &published_at,
        ),
    )
    .map_err(|e| CalcError::new("db_insert_failed", e.to_string()))?;
    store_lock_state(&tx, key, next, None)?;
    tx.commit()
        .map_err(|e| CalcError::new("db_tx_failed", e.to_string()))?;

    tracing::info!(
        assessment_key = key.assessment_key,
        subject_code = key.subject_code,
        version,
        digest = %digest,
        "sheet published"
    );
    Ok((
        PublishedSnapshot {
            version,
            digest,
            published_at,
            sheet: sheet.clone(),
        },
        next,
    ))
}

pub fn latest_published(
    conn: &Connection,
    key: &SheetKey<'_>,
) -> Result<Option<PublishedSnapshot>, CalcError> {
    let row: Option<(i64, String, String, String)> = conn
        .query_row(
            "SELECT version, digest, published_at, payload_json FROM sheet_published
             WHERE assessment_key = ? AND subject_code = ? AND teaching_assignment_id = ?
             ORDER BY version DESC LIMIT 1",
            (key.assessment_key, key.subject_code, key.teaching_assignment_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(db_err)?;
    let Some((version, digest, published_at, text)) = row else {
        return Ok(None);
    };
    let sheet: Sheet = serde_json::from_str(&text).map_err(|e| {
        CalcError::new("db_query_failed", format!("published payload unreadable: {}", e))
    })?;
    Ok(Some(PublishedSnapshot {
        version,
        digest,
        published_at,
        sheet,
    }))
}
