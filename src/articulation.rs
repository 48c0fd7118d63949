//! CO/PO/PSO articulation aggregation.
//!
//! Each curriculum unit maps to one course outcome (unit 1 -> CO1, ...). A
//! unit's topic rows carry teaching hours and per-PO/PSO contribution
//! weights; the unit's "course delivery" row is the hours-normalised column
//! sum, and the summary table lifts that onto the 3-point scale.

use crate::calc::{
    coerce_or_zero, format_2dp, mean_present, round_half_up, to_three_scale, CalcError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PO_COUNT: usize = 11;
pub const PSO_COUNT: usize = 3;
pub const OUTCOME_COLUMNS: usize = PO_COUNT + PSO_COUNT;
pub const MAX_UNITS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRow {
    #[serde(default)]
    pub topic: String,
    pub hours: f64,
    pub po: [f64; PO_COUNT],
    pub pso: [f64; PSO_COUNT],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    #[serde(default)]
    pub name: String,
    pub rows: Vec<TopicRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRow {
    pub label: String,
    /// `"0.50"`-style cells; `""` when the unit has no hours.
    pub po: Vec<String>,
    pub pso: Vec<String>,
    pub sum_hours: Option<f64>,
    #[serde(skip)]
    raw: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub label: String,
    /// 3-point scale values, PO1..PO11 then PSO1..PSO3.
    pub values: Vec<Option<f64>>,
    pub row_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageRow {
    pub column_averages: Vec<Option<f64>>,
    pub overall: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticulationSummary {
    pub delivery: Vec<DeliveryRow>,
    pub summary: Vec<SummaryRow>,
    pub average: AverageRow,
}

fn coerce_hours(v: Option<&Value>) -> f64 {
    let h = coerce_or_zero(v);
    if h.is_finite() {
        h
    } else {
        0.0
    }
}

fn coerce_fixed<const N: usize>(v: Option<&Value>) -> [f64; N] {
    let mut out = [0.0_f64; N];
    if let Some(arr) = v.and_then(|x| x.as_array()) {
        for (slot, item) in out.iter_mut().zip(arr.iter()) {
            *slot = coerce_or_zero(Some(item));
        }
    }
    out
}

/// Normalises a loosely typed `units` payload. Missing or non-numeric
/// cells become 0; extra units beyond five are rejected.
pub fn parse_units(raw: &Value) -> Result<Vec<Unit>, CalcError> {
    let Some(arr) = raw.as_array() else {
        return Err(CalcError::new("bad_params", "units must be an array"));
    };
    if arr.len() > MAX_UNITS {
        return Err(CalcError::new(
            "bad_params",
            format!("at most {} units are supported", MAX_UNITS),
        ));
    }

    let mut units = Vec::with_capacity(arr.len());
    for (i, u) in arr.iter().enumerate() {
        if u.is_null() {
            units.push(Unit {
                name: format!("Unit {}", i + 1),
                rows: Vec::new(),
            });
            continue;
        }
        let Some(obj) = u.as_object() else {
            return Err(CalcError::new(
                "bad_params",
                format!("unit at index {} must be an object", i),
            ));
        };
        let name = obj
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| format!("Unit {}", i + 1));
        let rows = obj
            .get("rows")
            .and_then(|v| v.as_array())
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.is_object())
                    .map(|r| TopicRow {
                        topic: r
                            .get("topic")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                        hours: coerce_hours(r.get("hours")),
                        po: coerce_fixed::<PO_COUNT>(r.get("po")),
                        pso: coerce_fixed::<PSO_COUNT>(r.get("pso")),
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        units.push(Unit { name, rows });
    }
    Ok(units)
}

fn blank_delivery(label: String) -> DeliveryRow {
    DeliveryRow {
        label,
        po: vec![String::new(); PO_COUNT],
        pso: vec![String::new(); PSO_COUNT],
        sum_hours: None,
        raw: vec![None; OUTCOME_COLUMNS],
    }
}

/// One course-delivery row for a unit: hours-weighted PO/PSO averages.
pub fn delivery_row(label: impl Into<String>, unit: Option<&Unit>) -> DeliveryRow {
    let label = label.into();
    let Some(unit) = unit.filter(|u| !u.rows.is_empty()) else {
        return blank_delivery(label);
    };

    let sum_hours: f64 = unit
        .rows
        .iter()
        .map(|r| if r.hours.is_finite() { r.hours } else { 0.0 })
        .sum();

    let mut raw: Vec<Option<f64>> = Vec::with_capacity(OUTCOME_COLUMNS);
    for j in 0..OUTCOME_COLUMNS {
        let col_sum: f64 = unit
            .rows
            .iter()
            .map(|r| if j < PO_COUNT { r.po[j] } else { r.pso[j - PO_COUNT] })
            .filter(|v| v.is_finite())
            .sum();
        raw.push(if sum_hours > 0.0 {
            Some(round_half_up(col_sum / sum_hours, 2))
        } else {
            None
        });
    }

    let cells: Vec<String> = raw
        .iter()
        .map(|v| v.map(format_2dp).unwrap_or_default())
        .collect();
    DeliveryRow {
        label,
        po: cells[..PO_COUNT].to_vec(),
        pso: cells[PO_COUNT..].to_vec(),
        sum_hours: Some(sum_hours),
        raw,
    }
}

/// Course-delivery rows, the 3-point summary, and the averages row for up
/// to five units. Missing units yield blank CO rows.
pub fn summarize(units: &[Unit]) -> ArticulationSummary {
    let delivery: Vec<DeliveryRow> = (0..MAX_UNITS)
        .map(|i| delivery_row(format!("CO{}", i + 1), units.get(i)))
        .collect();

    let summary: Vec<SummaryRow> = delivery
        .iter()
        .map(|d| {
            let values: Vec<Option<f64>> =
                d.raw.iter().map(|v| v.and_then(to_three_scale)).collect();
            let row_average = mean_present(values.iter().copied()).map(|v| round_half_up(v, 2));
            SummaryRow {
                label: d.label.clone(),
                values,
                row_average,
            }
        })
        .collect();

    let column_averages: Vec<Option<f64>> = (0..OUTCOME_COLUMNS)
        .map(|j| mean_present(summary.iter().map(|r| r.values[j])).map(|v| round_half_up(v, 2)))
        .collect();
    let overall =
        mean_present(summary.iter().map(|r| r.row_average)).map(|v| round_half_up(v, 2));

    ArticulationSummary {
        delivery,
        summary,
        average: AverageRow {
            column_averages,
            overall,
        },
    }
}
