//! Assessment master configuration.
//!
//! Configs arrive as loosely typed JSON (admin edits, stored overrides). They
//! are coerced once here, at the boundary, into [`AssessmentConfig`]; every
//! coercion is reported as a warning string so the UI can surface it.

use crate::calc::{coerce_number, CalcError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};

pub const SCHEMA_VERSION: u32 = 1;
pub const BTL_LEVELS: std::ops::RangeInclusive<u8> = 1..=6;

/// Which course outcome(s) a question feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoAssignment {
    Single(u8),
    /// Explicit `"a&b"` marker.
    Split(u8, u8),
    /// Explicit `"both"` marker.
    Both,
    Unassigned,
}

impl CoAssignment {
    pub fn parse(v: &Value) -> Self {
        if let Some(s) = v.as_str() {
            let t = s.trim();
            if t.eq_ignore_ascii_case("both") {
                return Self::Both;
            }
            if let Some((a, b)) = t.split_once('&') {
                return match (a.trim().parse::<u8>(), b.trim().parse::<u8>()) {
                    (Ok(a), Ok(b)) => Self::Split(a, b),
                    _ => Self::Unassigned,
                };
            }
        }
        match coerce_number(v) {
            Some(n) if n.fract() == 0.0 && (1.0..=255.0).contains(&n) => Self::Single(n as u8),
            _ => Self::Unassigned,
        }
    }

    pub fn is_explicit_split(self) -> bool {
        matches!(self, Self::Split(..) | Self::Both)
    }

    pub fn to_value(self) -> Value {
        match self {
            Self::Single(n) => json!(n),
            Self::Split(a, b) => json!(format!("{}&{}", a, b)),
            Self::Both => json!("both"),
            Self::Unassigned => Value::Null,
        }
    }
}

impl Serialize for CoAssignment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CoAssignment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        Ok(Self::parse(&v))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDef {
    pub key: String,
    pub label: String,
    pub max: f64,
    pub co: CoAssignment,
    pub btl: u8,
}

impl QuestionDef {
    fn new(key: &str, label: &str, max: f64, co: CoAssignment, btl: u8) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            max,
            co,
            btl,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoMaxOverride {
    pub a: Option<f64>,
    pub b: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentConfig {
    pub schema_version: u32,
    pub term_label: String,
    pub co_pair: [u8; 2],
    pub questions: Vec<QuestionDef>,
    #[serde(default)]
    pub co_max: CoMaxOverride,
    #[serde(default)]
    pub btl_max: BTreeMap<u8, f64>,
}

impl AssessmentConfig {
    pub fn question(&self, key: &str) -> Option<&QuestionDef> {
        self.questions.iter().find(|q| q.key == key)
    }
}

fn cia_questions(a: u8, b: u8) -> Vec<QuestionDef> {
    use CoAssignment::{Single, Split};
    vec![
        QuestionDef::new("q1", "Q1", 2.0, Single(a), 1),
        QuestionDef::new("q2", "Q2", 2.0, Single(a), 1),
        QuestionDef::new("q3", "Q3", 2.0, Single(a), 2),
        QuestionDef::new("q4", "Q4", 2.0, Single(b), 1),
        QuestionDef::new("q5", "Q5", 2.0, Single(b), 2),
        QuestionDef::new("q6", "Q6", 2.0, Single(b), 2),
        QuestionDef::new("q7", "Q7", 16.0, Single(a), 3),
        QuestionDef::new("q8", "Q8", 16.0, Single(b), 3),
        QuestionDef::new("q9", "Q9", 16.0, Split(a, b), 5),
    ]
}

fn lab_questions() -> Vec<QuestionDef> {
    use CoAssignment::{Single, Split};
    vec![
        QuestionDef::new("e1", "Exp 1", 10.0, Single(1), 3),
        QuestionDef::new("e2", "Exp 2", 10.0, Single(1), 3),
        QuestionDef::new("e3", "Exp 3", 10.0, Single(2), 3),
        QuestionDef::new("e4", "Exp 4", 10.0, Single(2), 4),
        QuestionDef::new("e5", "Exp 5", 10.0, Split(1, 2), 4),
    ]
}

/// Built-in config for an assessment key. Unknown keys use the CIA 1 layout.
pub fn default_config(assessment_key: &str) -> AssessmentConfig {
    let (pair, questions) = match assessment_key.to_ascii_lowercase().as_str() {
        "cia2" => ([3, 4], cia_questions(3, 4)),
        "lab" => ([1, 2], lab_questions()),
        _ => ([1, 2], cia_questions(1, 2)),
    };
    AssessmentConfig {
        schema_version: SCHEMA_VERSION,
        term_label: "Term 1".to_string(),
        co_pair: pair,
        questions,
        co_max: CoMaxOverride::default(),
        btl_max: BTreeMap::new(),
    }
}

fn optional_positive(v: Option<&Value>, field: &str, warnings: &mut Vec<String>) -> Option<f64> {
    let v = v.filter(|v| !v.is_null())?;
    match coerce_number(v) {
        Some(n) if n >= 0.0 => Some(n),
        _ => {
            warnings.push(format!("{} is not a non-negative number; ignored", field));
            None
        }
    }
}

/// Coerces a raw config object against the defaults for `assessment_key`.
///
/// Structural problems (not an object, questions not a list, duplicate or
/// empty keys) are errors; field-level problems become warnings and take the
/// documented default.
pub fn parse_config(
    raw: &Value,
    assessment_key: &str,
) -> Result<(AssessmentConfig, Vec<String>), CalcError> {
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::new("bad_params", "config must be an object"));
    };
    let defaults = default_config(assessment_key);
    let mut warnings: Vec<String> = Vec::new();

    let schema_version = match obj.get("schemaVersion").and_then(coerce_number) {
        None => SCHEMA_VERSION,
        Some(v) if v == SCHEMA_VERSION as f64 => SCHEMA_VERSION,
        Some(v) => {
            return Err(CalcError::new("bad_params", "unsupported config schemaVersion")
                .with_details(json!({ "schemaVersion": v, "supported": SCHEMA_VERSION })))
        }
    };

    let term_label = obj
        .get("termLabel")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| defaults.term_label.clone());

    let co_pair = match obj.get("coPair") {
        None | Some(Value::Null) => defaults.co_pair,
        Some(v) => {
            let parsed = v.as_array().and_then(|arr| {
                let nums: Vec<u8> = arr
                    .iter()
                    .filter_map(coerce_number)
                    .filter(|n| n.fract() == 0.0 && (1.0..=255.0).contains(n))
                    .map(|n| n as u8)
                    .collect();
                (arr.len() == 2 && nums.len() == 2 && nums[0] != nums[1])
                    .then(|| [nums[0], nums[1]])
            });
            match parsed {
                Some(p) => p,
                None => {
                    warnings.push("coPair must be two distinct CO numbers; default used".into());
                    defaults.co_pair
                }
            }
        }
    };

    let questions = match obj.get("questions") {
        None | Some(Value::Null) => defaults.questions.clone(),
        Some(Value::Array(arr)) => {
            let mut out = Vec::with_capacity(arr.len());
            let mut seen: HashSet<String> = HashSet::new();
            for (i, q) in arr.iter().enumerate() {
                let Some(qo) = q.as_object() else {
                    return Err(CalcError::new(
                        "bad_params",
                        format!("question at index {} must be an object", i),
                    ));
                };
                let key = qo
                    .get("key")
                    .and_then(|v| v.as_str())
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                if key.is_empty() {
                    return Err(CalcError::new(
                        "bad_params",
                        format!("question at index {} is missing key", i),
                    ));
                }
                if !seen.insert(key.clone()) {
                    return Err(CalcError::new("bad_params", "duplicate question key")
                        .with_details(json!({ "key": key })));
                }
                let label = qo
                    .get("label")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| key.to_ascii_uppercase());
                let max = match qo.get("max").and_then(coerce_number) {
                    Some(m) if m >= 0.0 => m,
                    _ => {
                        warnings.push(format!("question {}: max is not a number; using 0", key));
                        0.0
                    }
                };
                let co = qo
                    .get("co")
                    .map(CoAssignment::parse)
                    .unwrap_or(CoAssignment::Unassigned);
                if co == CoAssignment::Unassigned {
                    warnings.push(format!("question {}: co is not recognised", key));
                }
                let btl = match qo.get("btl").and_then(coerce_number) {
                    Some(n) if n.fract() == 0.0 && (1.0..=6.0).contains(&n) => n as u8,
                    _ => {
                        warnings.push(format!("question {}: btl must be 1..6; using 1", key));
                        1
                    }
                };
                out.push(QuestionDef {
                    key,
                    label,
                    max,
                    co,
                    btl,
                });
            }
            out
        }
        Some(_) => return Err(CalcError::new("bad_params", "questions must be an array")),
    };

    let co_max = match obj.get("coMax").and_then(|v| v.as_object()) {
        Some(m) => CoMaxOverride {
            a: optional_positive(m.get("a"), "coMax.a", &mut warnings),
            b: optional_positive(m.get("b"), "coMax.b", &mut warnings),
        },
        None => CoMaxOverride::default(),
    };

    let mut btl_max: BTreeMap<u8, f64> = BTreeMap::new();
    if let Some(m) = obj.get("btlMax").and_then(|v| v.as_object()) {
        for (k, v) in m {
            let level = k.trim().parse::<u8>().ok().filter(|n| BTL_LEVELS.contains(n));
            let Some(level) = level else {
                warnings.push(format!("btlMax.{} is not a BTL level; ignored", k));
                continue;
            };
            if let Some(n) = optional_positive(Some(v), &format!("btlMax.{}", k), &mut warnings) {
                btl_max.insert(level, n);
            }
        }
    }

    Ok((
        AssessmentConfig {
            schema_version,
            term_label,
            co_pair,
            questions,
            co_max,
            btl_max,
        },
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn co_assignment_parses_all_shapes() {
        assert_eq!(CoAssignment::parse(&json!(1)), CoAssignment::Single(1));
        assert_eq!(CoAssignment::parse(&json!("2")), CoAssignment::Single(2));
        assert_eq!(CoAssignment::parse(&json!("1&2")), CoAssignment::Split(1, 2));
        assert_eq!(CoAssignment::parse(&json!("3 & 4")), CoAssignment::Split(3, 4));
        assert_eq!(CoAssignment::parse(&json!("Both")), CoAssignment::Both);
        assert_eq!(CoAssignment::parse(&json!("x")), CoAssignment::Unassigned);
        assert_eq!(CoAssignment::parse(&json!(null)), CoAssignment::Unassigned);
    }

    #[test]
    fn second_cia_shifts_co_pair() {
        let cfg = default_config("cia2");
        assert_eq!(cfg.co_pair, [3, 4]);
        let q9 = cfg.question("q9").expect("q9");
        assert_eq!(q9.co, CoAssignment::Split(3, 4));
        assert_eq!(q9.co.to_value(), json!("3&4"));
    }

    #[test]
    fn parse_config_coerces_fields_with_warnings() {
        let raw = json!({
            "termLabel": "Odd 2025",
            "questions": [
                { "key": "q1", "max": "2", "co": 1, "btl": "1" },
                { "key": "q2", "max": "two", "co": "1&2", "btl": 9 }
            ],
            "coMax": { "a": 30, "b": "bad" },
            "btlMax": { "1": 10, "7": 4 }
        });
        let (cfg, warnings) = parse_config(&raw, "cia1").expect("parse");
        assert_eq!(cfg.term_label, "Odd 2025");
        assert_eq!(cfg.questions[0].max, 2.0);
        assert_eq!(cfg.questions[0].label, "Q1");
        assert_eq!(cfg.questions[1].max, 0.0);
        assert_eq!(cfg.questions[1].btl, 1);
        assert_eq!(cfg.co_max.a, Some(30.0));
        assert_eq!(cfg.co_max.b, None);
        assert_eq!(cfg.btl_max.get(&1), Some(&10.0));
        assert!(!cfg.btl_max.contains_key(&7));
        assert_eq!(warnings.len(), 4);
    }

    #[test]
    fn parse_config_rejects_structural_problems() {
        let dup = json!({ "questions": [{ "key": "q1" }, { "key": "q1" }] });
        assert_eq!(parse_config(&dup, "cia1").expect_err("dup").code, "bad_params");
        let bad = json!({ "questions": "nope" });
        assert!(parse_config(&bad, "cia1").is_err());
        let future = json!({ "schemaVersion": 2 });
        assert!(parse_config(&future, "cia1").is_err());
    }

    #[test]
    fn stored_config_roundtrips_through_serde() {
        let cfg = default_config("lab");
        let text = serde_json::to_string(&cfg).expect("serialize");
        let back: AssessmentConfig = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, cfg);
    }
}
