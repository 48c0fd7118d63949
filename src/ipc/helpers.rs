use crate::calc::CalcError;
use crate::ipc::error::{calc_err, err};
use crate::ipc::types::{AppState, Request};
use crate::sheets::SheetKey;
use rusqlite::Connection;

pub fn require_db<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `null` clears; anything else must be an integer in `lo..=hi`.
pub fn optional_level(
    req: &Request,
    key: &str,
    lo: u8,
    hi: u8,
) -> Result<Option<u8>, serde_json::Value> {
    match req.params.get(key) {
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if (lo as u64..=hi as u64).contains(&n) => Ok(Some(n as u8)),
            _ => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be {}..{} or null", key, lo, hi),
                Some(serde_json::json!({ "field": key, "value": v })),
            )),
        },
    }
}

/// Owned identity of one sheet, read from request params.
#[derive(Debug, Clone)]
pub struct SheetParams {
    pub assessment_key: String,
    pub subject_code: String,
    pub teaching_assignment_id: String,
}

impl SheetParams {
    pub fn from_request(req: &Request) -> Result<Self, serde_json::Value> {
        Ok(Self {
            assessment_key: required_str(req, "assessmentKey")?.to_ascii_lowercase(),
            subject_code: required_str(req, "subjectCode")?,
            teaching_assignment_id: required_str(req, "teachingAssignmentId")?,
        })
    }

    pub fn key(&self) -> SheetKey<'_> {
        SheetKey {
            assessment_key: &self.assessment_key,
            subject_code: &self.subject_code,
            teaching_assignment_id: &self.teaching_assignment_id,
        }
    }
}

pub trait OrResponse<T> {
    fn or_response(self, id: &str) -> Result<T, serde_json::Value>;
}

impl<T> OrResponse<T> for Result<T, CalcError> {
    fn or_response(self, id: &str) -> Result<T, serde_json::Value> {
        self.map_err(|e| calc_err(id, e))
    }
}
