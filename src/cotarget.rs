//! CO target setting: ICO rubric, BTL-derived BCO, and the weighted composite.

use crate::articulation::ArticulationSummary;
use crate::calc::{round_half_up, CalcError};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const HIGH_THRESHOLD: f64 = 1.98;
pub const MEDIUM_THRESHOLD: f64 = 0.99;
/// Institution convention: the rounded weighted score is projected onto
/// the 3-point scale by this fixed factor.
pub const TARGET_SCALE: f64 = 0.03;
pub const CO_COUNT: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IcoRubric {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub total: u32,
    pub denom: u32,
    pub ico: f64,
}

/// Bands every present 3-point value into High/Medium/Low and scores the
/// mix as a percentage of the all-High maximum.
pub fn ico_rubric(values: &[Option<f64>]) -> IcoRubric {
    let (mut high, mut medium, mut low) = (0_u32, 0_u32, 0_u32);
    for v in values.iter().flatten().filter(|v| v.is_finite()) {
        if *v >= HIGH_THRESHOLD {
            high += 1;
        } else if *v >= MEDIUM_THRESHOLD {
            medium += 1;
        } else {
            low += 1;
        }
    }
    let total = high * 3 + medium * 2 + low;
    let denom = high + medium + low;
    let ico = if denom == 0 {
        0.0
    } else {
        round_half_up(total as f64 / (denom as f64 * 3.0) * 100.0, 2)
    };
    IcoRubric {
        high,
        medium,
        low,
        total,
        denom,
        ico,
    }
}

pub fn bco(btl_level: Option<u8>) -> Option<f64> {
    btl_level.map(|l| l as f64 * 10.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetWeights {
    pub ico: f64,
    pub bco: f64,
    pub aco: f64,
    pub api: f64,
    pub iic: f64,
}

impl TargetWeights {
    /// CO5 is BTL-driven only; the rest use the standard split.
    pub fn default_for_co(co: u8) -> Self {
        if co == 5 {
            Self {
                ico: 0.0,
                bco: 0.5,
                aco: 0.0,
                api: 0.0,
                iic: 0.0,
            }
        } else {
            Self {
                ico: 0.4,
                bco: 0.3,
                aco: 0.1,
                api: 0.1,
                iic: 0.1,
            }
        }
    }

    pub fn validate(&self) -> Result<(), CalcError> {
        for (name, w) in [
            ("ico", self.ico),
            ("bco", self.bco),
            ("aco", self.aco),
            ("api", self.api),
            ("iic", self.iic),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(CalcError::new("bad_params", "weights must be non-negative numbers")
                    .with_details(json!({ "weight": name, "value": w })));
            }
        }
        Ok(())
    }
}

/// Per-CO user inputs. `btl_level` is a single slot, so at most one BTL
/// level can be selected for a CO.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoTargetInputs {
    pub co: u8,
    pub btl_level: Option<u8>,
    pub aco: Option<f64>,
    pub api: Option<f64>,
    pub iic: Option<f64>,
    pub weights: TargetWeights,
}

impl CoTargetInputs {
    pub fn new(co: u8) -> Self {
        Self {
            co,
            btl_level: None,
            aco: None,
            api: None,
            iic: None,
            weights: TargetWeights::default_for_co(co),
        }
    }

    /// Selecting a level replaces any previous selection.
    pub fn select_btl(&mut self, level: Option<u8>) -> Result<(), CalcError> {
        if let Some(l) = level {
            if !(1..=6).contains(&l) {
                return Err(CalcError::new("bad_params", "btl level must be 1..6")
                    .with_details(json!({ "level": l })));
            }
        }
        self.btl_level = level;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Composite {
    pub weighted_sum: f64,
    pub weighted_rounded: f64,
    pub final_target: f64,
}

/// `round(Σ component × weight) × 0.03`, rounded to two decimals. Blank
/// components count as 0.
pub fn composite(
    ico: f64,
    bco: Option<f64>,
    aco: Option<f64>,
    api: Option<f64>,
    iic: Option<f64>,
    w: &TargetWeights,
) -> Composite {
    let term = |v: Option<f64>, weight: f64| v.filter(|x| x.is_finite()).unwrap_or(0.0) * weight;
    let weighted_sum = term(Some(ico), w.ico)
        + term(bco, w.bco)
        + term(aco, w.aco)
        + term(api, w.api)
        + term(iic, w.iic);
    let weighted_rounded = round_half_up(weighted_sum, 0);
    Composite {
        weighted_sum,
        weighted_rounded,
        final_target: round_half_up(weighted_rounded * TARGET_SCALE, 2),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoTarget {
    pub co: u8,
    pub rubric: IcoRubric,
    pub bco: Option<f64>,
    pub aco: Option<f64>,
    pub api: Option<f64>,
    pub iic: Option<f64>,
    pub weights: TargetWeights,
    #[serde(flatten)]
    pub composite: Composite,
}

/// Targets for CO1..CO5. Missing inputs use an empty record with the
/// default weights for that CO.
pub fn compute_targets(summary: &ArticulationSummary, inputs: &[CoTargetInputs]) -> Vec<CoTarget> {
    (1..=CO_COUNT)
        .map(|co| {
            let input = inputs
                .iter()
                .find(|i| i.co == co)
                .copied()
                .unwrap_or_else(|| CoTargetInputs::new(co));
            let values = summary
                .summary
                .get(co as usize - 1)
                .map(|r| r.values.as_slice())
                .unwrap_or(&[]);
            let rubric = ico_rubric(values);
            let bco_value = bco(input.btl_level);
            let composite = composite(
                rubric.ico,
                bco_value,
                input.aco,
                input.api,
                input.iic,
                &input.weights,
            );
            CoTarget {
                co,
                rubric,
                bco: bco_value,
                aco: input.aco,
                api: input.api,
                iic: input.iic,
                weights: input.weights,
                composite,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::articulation::{summarize, TopicRow, Unit, PO_COUNT, PSO_COUNT};

    #[test]
    fn ico_bands_and_scores_present_values() {
        let r = ico_rubric(&[Some(2.1), Some(2.0), Some(1.5), Some(0.9), None]);
        assert_eq!((r.high, r.medium, r.low, r.denom), (2, 1, 1, 4));
        assert_eq!(r.total, 9);
        assert_eq!(r.ico, 75.0);
    }

    #[test]
    fn ico_is_zero_without_values() {
        assert_eq!(ico_rubric(&[None, None]).ico, 0.0);
        assert_eq!(ico_rubric(&[]).denom, 0);
    }

    #[test]
    fn band_edges_are_inclusive() {
        let r = ico_rubric(&[Some(1.98), Some(0.99), Some(0.98)]);
        assert_eq!((r.high, r.medium, r.low), (1, 1, 1));
    }

    #[test]
    fn end_to_end_composite() {
        let w = TargetWeights::default_for_co(1);
        let c = composite(75.0, bco(Some(3)), Some(60.0), Some(70.0), Some(50.0), &w);
        assert!((c.weighted_sum - 57.0).abs() < 1e-9);
        assert_eq!(c.weighted_rounded, 57.0);
        assert_eq!(c.final_target, 1.71);
    }

    #[test]
    fn co5_weights_only_use_bco() {
        let w = TargetWeights::default_for_co(5);
        let c = composite(90.0, bco(Some(4)), Some(80.0), None, None, &w);
        assert_eq!(c.weighted_rounded, 20.0);
        assert_eq!(c.final_target, 0.6);
    }

    #[test]
    fn blank_bco_counts_as_zero() {
        let w = TargetWeights::default_for_co(2);
        let c = composite(50.0, None, None, None, None, &w);
        assert_eq!(c.weighted_rounded, 20.0);
    }

    #[test]
    fn btl_selection_is_single_slot() {
        let mut i = CoTargetInputs::new(1);
        i.select_btl(Some(2)).expect("select");
        i.select_btl(Some(4)).expect("reselect");
        assert_eq!(i.btl_level, Some(4));
        assert!(i.select_btl(Some(0)).is_err());
        assert_eq!(i.btl_level, Some(4));
        i.select_btl(None).expect("clear");
        assert_eq!(bco(i.btl_level), None);
    }

    #[test]
    fn targets_follow_articulation_summary() {
        let mut po = [0.0; PO_COUNT];
        po[0] = 7.0;
        po[1] = 4.0;
        let unit = Unit {
            name: "U1".into(),
            rows: vec![TopicRow {
                topic: String::new(),
                hours: 10.0,
                po,
                pso: [0.0; PSO_COUNT],
            }],
        };
        let summary = summarize(&[unit]);
        let mut inputs = CoTargetInputs::new(1);
        inputs.select_btl(Some(3)).expect("btl");
        let targets = compute_targets(&summary, &[inputs]);
        assert_eq!(targets.len(), 5);
        // PO1 0.7 -> 2.1 (High), PO2 0.4 -> 1.2 (Medium).
        assert_eq!(targets[0].rubric.ico, 83.33);
        assert_eq!(targets[0].bco, Some(30.0));
        assert_eq!(targets[4].rubric.denom, 0);
    }
}
