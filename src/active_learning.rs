//! Global mapping of active-learning activities onto programme outcomes.

use crate::articulation::PO_COUNT;
use crate::calc::CalcError;
use serde::Serialize;
use serde_json::{json, Value};

pub const ACTIVITIES: [&str; 14] = [
    "Think-Pair-Share",
    "Flipped Classroom",
    "Jigsaw",
    "Peer Instruction",
    "Case Study",
    "Role Play",
    "Problem-Based Learning",
    "Project-Based Learning",
    "Quiz / Polling",
    "Group Discussion",
    "Concept Mapping",
    "Seminar",
    "Field Visit",
    "Simulation / Game",
];

pub const SETTING_KEY: &str = "activeLearning.poMapping";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoMapping {
    pub activities: Vec<String>,
    /// `rows[activity][po]`.
    pub rows: Vec<[bool; PO_COUNT]>,
}

impl Default for PoMapping {
    fn default() -> Self {
        Self {
            activities: ACTIVITIES.iter().map(|s| s.to_string()).collect(),
            rows: vec![[false; PO_COUNT]; ACTIVITIES.len()],
        }
    }
}

impl PoMapping {
    pub fn to_value(&self) -> Value {
        json!({ "rows": self.rows })
    }
}

/// Accepts `{rows: bool[14][11]}` or the bare matrix. Dimensions must match
/// exactly; cells must be booleans.
pub fn parse_mapping(raw: &Value) -> Result<PoMapping, CalcError> {
    let matrix = raw.get("rows").unwrap_or(raw);
    let Some(rows) = matrix.as_array() else {
        return Err(CalcError::new("bad_params", "mapping must be a matrix of booleans"));
    };
    if rows.len() != ACTIVITIES.len() {
        return Err(CalcError::new("bad_params", "mapping has the wrong number of activities")
            .with_details(json!({ "expected": ACTIVITIES.len(), "actual": rows.len() })));
    }
    let mut out = PoMapping::default();
    for (i, row) in rows.iter().enumerate() {
        let cells = row.as_array().filter(|c| c.len() == PO_COUNT).ok_or_else(|| {
            CalcError::new("bad_params", "mapping row has the wrong number of POs")
                .with_details(json!({ "row": i, "expected": PO_COUNT }))
        })?;
        for (j, cell) in cells.iter().enumerate() {
            out.rows[i][j] = cell.as_bool().ok_or_else(|| {
                CalcError::new("bad_params", "mapping cells must be booleans")
                    .with_details(json!({ "row": i, "col": j }))
            })?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_false_with_fixed_activity_list() {
        let m = PoMapping::default();
        assert_eq!(m.activities.len(), 14);
        assert!(m.rows.iter().all(|r| r.iter().all(|c| !c)));
    }

    #[test]
    fn parses_wrapped_and_bare_matrices() {
        let mut rows = vec![vec![false; PO_COUNT]; 14];
        rows[2][10] = true;
        let wrapped = parse_mapping(&json!({ "rows": rows })).expect("wrapped");
        assert!(wrapped.rows[2][10]);
        let bare = parse_mapping(&json!(rows)).expect("bare");
        assert_eq!(bare, wrapped);
        assert_eq!(PoMapping::default(), parse_mapping(&PoMapping::default().to_value()).expect("default"));
    }

    #[test]
    fn rejects_wrong_dimensions_and_non_booleans() {
        let short = vec![vec![false; PO_COUNT]; 13];
        assert_eq!(parse_mapping(&json!(short)).expect_err("rows").code, "bad_params");

        let mut narrow = vec![vec![false; PO_COUNT]; 14];
        narrow[5].pop();
        let e = parse_mapping(&json!(narrow)).expect_err("cols");
        assert_eq!(e.details.expect("details")["row"], 5);

        let mut bad = vec![vec![json!(false); PO_COUNT]; 14];
        bad[0][0] = json!(1);
        assert!(parse_mapping(&json!(bad)).is_err());
    }
}
