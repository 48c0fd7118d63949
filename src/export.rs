use crate::config::AssessmentConfig;
use crate::marksheet::{Sheet, SheetResult};

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn num(v: f64) -> String {
    let s = format!("{}", crate::calc::round_half_up(v, 2));
    s.strip_suffix(".0").map(str::to_string).unwrap_or(s)
}

fn push_record(out: &mut String, cells: &[String]) {
    let line = cells
        .iter()
        .map(|c| csv_quote(c))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

/// Mark-sheet CSV: one row per student with per-question marks, total, CO
/// attainment and the visible BTL columns.
pub fn sheet_csv(config: &AssessmentConfig, sheet: &Sheet, result: &SheetResult) -> String {
    let [co_a, co_b] = config.co_pair;
    let mut header: Vec<String> = vec!["Register No".into(), "Name".into(), "Absent".into()];
    header.extend(config.questions.iter().map(|q| q.label.clone()));
    header.push("Total".into());
    header.push(format!("CO{}", co_a));
    header.push(format!("CO{} %", co_a));
    header.push(format!("CO{}", co_b));
    header.push(format!("CO{} %", co_b));
    for l in &result.visible_btls {
        header.push(format!("BTL{}", l));
        header.push(format!("BTL{} %", l));
    }

    let mut out = String::new();
    push_record(&mut out, &header);

    for (row, res) in sheet.rows.iter().zip(&result.rows) {
        let mut cells: Vec<String> = vec![
            row.reg_no.clone(),
            row.name.clone(),
            if row.absent { "Y".into() } else { "N".into() },
        ];
        for q in &config.questions {
            cells.push(if row.absent {
                "AB".to_string()
            } else {
                row.q
                    .get(&q.key)
                    .copied()
                    .flatten()
                    .map(num)
                    .unwrap_or_default()
            });
        }
        cells.push(num(res.total));
        cells.push(num(res.co_a));
        cells.push(res.co_a_pct.clone());
        cells.push(num(res.co_b));
        cells.push(res.co_b_pct.clone());
        for b in &res.btl {
            cells.push(num(b.mark));
            cells.push(b.pct.clone());
        }
        push_record(&mut out, &cells);
    }
    out
}
