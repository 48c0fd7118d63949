use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "obed.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            teaching_assignment_id TEXT NOT NULL,
            reg_no TEXT NOT NULL,
            name TEXT NOT NULL,
            section TEXT,
            sort_order INTEGER NOT NULL,
            UNIQUE(teaching_assignment_id, reg_no)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_ta_sort ON students(teaching_assignment_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sheet_drafts(
            assessment_key TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            teaching_assignment_id TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(assessment_key, subject_code, teaching_assignment_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sheet_published(
            id TEXT PRIMARY KEY,
            assessment_key TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            teaching_assignment_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            payload_json TEXT NOT NULL,
            digest TEXT NOT NULL,
            published_at TEXT NOT NULL,
            UNIQUE(assessment_key, subject_code, teaching_assignment_id, version)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sheet_locks(
            assessment_key TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            teaching_assignment_id TEXT NOT NULL,
            state TEXT NOT NULL,
            reason TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(assessment_key, subject_code, teaching_assignment_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS articulation_matrices(
            subject_code TEXT PRIMARY KEY,
            units_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cotarget_inputs(
            subject_code TEXT NOT NULL,
            co INTEGER NOT NULL,
            btl_level INTEGER,
            aco REAL,
            api REAL,
            iic REAL,
            weights_json TEXT,
            PRIMARY KEY(subject_code, co)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS local_cache(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // Workspaces created before lock reasons were recorded.
    ensure_sheet_locks_reason(&conn)?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is not valid JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(n > 0)
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn ensure_sheet_locks_reason(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "sheet_locks", "reason")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE sheet_locks ADD COLUMN reason TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let cols = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols.iter().any(|c| c.eq_ignore_ascii_case(column)))
}
