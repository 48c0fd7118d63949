//! Per-question mark sheets: totals, CO attainment and BTL attainment.

use crate::calc::{pct, CalcError};
use crate::config::{AssessmentConfig, CoAssignment, QuestionDef, BTL_LEVELS};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Which rule produced a question's CO weights. Rules are tried in the
/// declared order and the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WeightRule {
    ExplicitSplit,
    /// Old headers dropped the split marker on the last "q9" question.
    LegacyLastQuestion,
    ExactMatch,
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoWeights {
    pub a: f64,
    pub b: f64,
    pub rule: WeightRule,
}

impl CoWeights {
    const fn new(a: f64, b: f64, rule: WeightRule) -> Self {
        Self { a, b, rule }
    }
}

fn looks_like_q9(q: &QuestionDef) -> bool {
    q.key.to_ascii_lowercase().contains("q9") || q.label.to_ascii_lowercase().contains("q9")
}

/// CO weights of `questions[idx]` against the sheet's CO `pair`.
pub fn resolve_co_weights(questions: &[QuestionDef], idx: usize, pair: [u8; 2]) -> CoWeights {
    let Some(q) = questions.get(idx) else {
        return CoWeights::new(0.0, 0.0, WeightRule::Unmapped);
    };

    if q.co.is_explicit_split() {
        return CoWeights::new(0.5, 0.5, WeightRule::ExplicitSplit);
    }

    let any_split = questions.iter().any(|x| x.co.is_explicit_split());
    if !any_split && idx + 1 == questions.len() && looks_like_q9(q) {
        return CoWeights::new(0.5, 0.5, WeightRule::LegacyLastQuestion);
    }

    match q.co {
        CoAssignment::Single(n) if n == pair[0] => {
            CoWeights::new(1.0, 0.0, WeightRule::ExactMatch)
        }
        CoAssignment::Single(n) if n == pair[1] => {
            CoWeights::new(0.0, 1.0, WeightRule::ExactMatch)
        }
        _ => CoWeights::new(0.0, 0.0, WeightRule::Unmapped),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub student_id: String,
    #[serde(default)]
    pub reg_no: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub absent: bool,
    #[serde(default)]
    pub q: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub assessment_key: String,
    pub subject_code: String,
    pub teaching_assignment_id: String,
    #[serde(default)]
    pub btl_overrides: BTreeMap<String, u8>,
    #[serde(default)]
    pub rows: Vec<SheetRow>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub id: String,
    pub reg_no: String,
    pub name: String,
}

fn clamp_mark(value: f64, max: f64) -> f64 {
    value.max(0.0).min(max.max(0.0))
}

impl Sheet {
    pub fn empty(assessment_key: &str, subject_code: &str, teaching_assignment_id: &str) -> Self {
        Self {
            assessment_key: assessment_key.to_string(),
            subject_code: subject_code.to_string(),
            teaching_assignment_id: teaching_assignment_id.to_string(),
            btl_overrides: BTreeMap::new(),
            rows: Vec::new(),
            updated_at: None,
        }
    }

    /// Blank sheet with one row per roster entry.
    pub fn from_roster(
        assessment_key: &str,
        subject_code: &str,
        teaching_assignment_id: &str,
        roster: &[RosterEntry],
    ) -> Self {
        let mut sheet = Self::empty(assessment_key, subject_code, teaching_assignment_id);
        sheet.rows = roster
            .iter()
            .map(|s| SheetRow {
                student_id: s.id.clone(),
                reg_no: s.reg_no.clone(),
                name: s.name.clone(),
                absent: false,
                q: BTreeMap::new(),
            })
            .collect();
        sheet
    }

    /// Adds rows for roster students missing from the sheet. Existing rows
    /// keep their marks.
    pub fn merge_roster(&mut self, roster: &[RosterEntry]) -> usize {
        let mut added = 0;
        for s in roster {
            if self.rows.iter().any(|r| r.student_id == s.id) {
                continue;
            }
            self.rows.push(SheetRow {
                student_id: s.id.clone(),
                reg_no: s.reg_no.clone(),
                name: s.name.clone(),
                absent: false,
                q: BTreeMap::new(),
            });
            added += 1;
        }
        added
    }

    /// Re-establishes row invariants on a payload loaded from storage:
    /// marks clamped, unknown question keys dropped, absent rows cleared,
    /// invalid BTL overrides removed.
    pub fn normalize(&mut self, config: &AssessmentConfig) {
        for row in &mut self.rows {
            row.q.retain(|k, _| config.question(k).is_some());
            if row.absent {
                for v in row.q.values_mut() {
                    *v = None;
                }
                continue;
            }
            for (k, v) in row.q.iter_mut() {
                let Some(q) = config.question(k) else {
                    continue;
                };
                *v = v.filter(|x| x.is_finite()).map(|x| clamp_mark(x, q.max));
            }
        }
        self.btl_overrides
            .retain(|k, lvl| config.question(k).is_some() && BTL_LEVELS.contains(&*lvl));
    }

    fn row_mut(&mut self, student_id: &str) -> Result<&mut SheetRow, CalcError> {
        self.rows
            .iter_mut()
            .find(|r| r.student_id == student_id)
            .ok_or_else(|| {
                CalcError::new("not_found", "student not on sheet")
                    .with_details(json!({ "studentId": student_id }))
            })
    }

    /// Writes one mark, clamped into `[0, max]`. `None` blanks the cell.
    /// Returns the stored value.
    pub fn set_mark(
        &mut self,
        config: &AssessmentConfig,
        student_id: &str,
        question_key: &str,
        value: Option<f64>,
    ) -> Result<Option<f64>, CalcError> {
        let Some(q) = config.question(question_key) else {
            return Err(CalcError::new("not_found", "question not in config")
                .with_details(json!({ "questionKey": question_key })));
        };
        let max = q.max;
        let row = self.row_mut(student_id)?;
        if row.absent {
            return Err(CalcError::new(
                "student_absent",
                "student is marked absent; clear absence before entering marks",
            )
            .with_details(json!({ "studentId": student_id })));
        }
        let stored = value.filter(|v| v.is_finite()).map(|v| clamp_mark(v, max));
        row.q.insert(question_key.to_string(), stored);
        Ok(stored)
    }

    /// Absence clears every mark on the row.
    pub fn set_absent(&mut self, student_id: &str, absent: bool) -> Result<(), CalcError> {
        let row = self.row_mut(student_id)?;
        row.absent = absent;
        if absent {
            for v in row.q.values_mut() {
                *v = None;
            }
        }
        Ok(())
    }

    pub fn set_btl_override(
        &mut self,
        config: &AssessmentConfig,
        question_key: &str,
        level: Option<u8>,
    ) -> Result<(), CalcError> {
        if config.question(question_key).is_none() {
            return Err(CalcError::new("not_found", "question not in config")
                .with_details(json!({ "questionKey": question_key })));
        }
        match level {
            None => {
                self.btl_overrides.remove(question_key);
            }
            Some(l) if BTL_LEVELS.contains(&l) => {
                self.btl_overrides.insert(question_key.to_string(), l);
            }
            Some(l) => {
                return Err(CalcError::new("bad_params", "btl must be 1..6")
                    .with_details(json!({ "btl": l })))
            }
        }
        Ok(())
    }

    pub fn effective_btl(&self, q: &QuestionDef) -> u8 {
        self.btl_overrides.get(&q.key).copied().unwrap_or(q.btl)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BtlMark {
    pub level: u8,
    pub mark: f64,
    pub pct: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub student_id: String,
    pub reg_no: String,
    pub name: String,
    pub absent: bool,
    pub total: f64,
    pub co_a: f64,
    pub co_a_pct: String,
    pub co_b: f64,
    pub co_b_pct: String,
    pub btl: Vec<BtlMark>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetResult {
    pub co_pair: [u8; 2],
    pub max_total: f64,
    pub co_max: [f64; 2],
    /// Maxima for the visible levels, in level order.
    pub btl_max: BTreeMap<u8, f64>,
    pub visible_btls: Vec<u8>,
    pub weights: Vec<CoWeights>,
    pub rows: Vec<StudentResult>,
}

/// Totals, CO attainment and BTL attainment for every row of `sheet`.
pub fn compute_sheet(config: &AssessmentConfig, sheet: &Sheet) -> SheetResult {
    let questions = &config.questions;
    let pair = config.co_pair;
    let weights: Vec<CoWeights> = (0..questions.len())
        .map(|i| resolve_co_weights(questions, i, pair))
        .collect();
    let btl_of: Vec<u8> = questions.iter().map(|q| sheet.effective_btl(q)).collect();

    let visible_btls: Vec<u8> = BTL_LEVELS.filter(|l| btl_of.contains(l)).collect();

    let derived_a: f64 = questions.iter().zip(&weights).map(|(q, w)| q.max * w.a).sum();
    let derived_b: f64 = questions.iter().zip(&weights).map(|(q, w)| q.max * w.b).sum();
    let co_max = [
        config.co_max.a.unwrap_or(derived_a),
        config.co_max.b.unwrap_or(derived_b),
    ];
    let btl_max: BTreeMap<u8, f64> = visible_btls
        .iter()
        .map(|&l| {
            let derived: f64 = questions
                .iter()
                .zip(&btl_of)
                .filter(|(_, b)| **b == l)
                .map(|(q, _)| q.max)
                .sum();
            (l, config.btl_max.get(&l).copied().unwrap_or(derived))
        })
        .collect();
    let max_total: f64 = questions.iter().map(|q| q.max).sum();

    let rows = sheet
        .rows
        .iter()
        .map(|row| {
            let marks: Vec<f64> = questions
                .iter()
                .map(|q| {
                    if row.absent {
                        return 0.0;
                    }
                    row.q
                        .get(&q.key)
                        .copied()
                        .flatten()
                        .filter(|v| v.is_finite())
                        .map(|v| clamp_mark(v, q.max))
                        .unwrap_or(0.0)
                })
                .collect();

            let total: f64 = marks.iter().sum();
            let co_a: f64 = marks.iter().zip(&weights).map(|(m, w)| m * w.a).sum();
            let co_b: f64 = marks.iter().zip(&weights).map(|(m, w)| m * w.b).sum();
            let btl = visible_btls
                .iter()
                .map(|&l| {
                    let mark: f64 = marks
                        .iter()
                        .zip(&btl_of)
                        .filter(|(_, b)| **b == l)
                        .map(|(m, _)| *m)
                        .sum();
                    BtlMark {
                        level: l,
                        mark,
                        pct: pct(mark, btl_max.get(&l).copied().unwrap_or(0.0)),
                    }
                })
                .collect();

            StudentResult {
                student_id: row.student_id.clone(),
                reg_no: row.reg_no.clone(),
                name: row.name.clone(),
                absent: row.absent,
                total,
                co_a,
                co_a_pct: pct(co_a, co_max[0]),
                co_b,
                co_b_pct: pct(co_b, co_max[1]),
                btl,
            }
        })
        .collect();

    SheetResult {
        co_pair: pair,
        max_total,
        co_max,
        btl_max,
        visible_btls,
        weights,
        rows,
    }
}
