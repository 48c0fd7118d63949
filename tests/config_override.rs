mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, seed_roster, sheet_params, spawn_sidecar, temp_dir};

#[test]
fn config_update_is_coerced_at_boundary_and_drives_sheets() {
    let workspace = temp_dir("obed-config-override");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_roster(&mut stdin, &mut reader);

    let defaults = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "config.get",
        json!({ "assessmentKey": "cia2" }),
    );
    assert_eq!(defaults["source"], "default");
    assert_eq!(defaults["config"]["coPair"], json!([3, 4]));
    assert_eq!(defaults["config"]["questions"][8]["co"], "3&4");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "config.update",
        json!({
            "assessmentKey": "cia1",
            "config": {
                "schemaVersion": 1,
                "termLabel": "Odd 2026",
                "coPair": [1, 2],
                "questions": [
                    { "key": "p1", "label": "Part A", "max": "10", "co": 1, "btl": 2 },
                    { "key": "p2", "label": "Part B", "max": 10, "co": "2", "btl": "x" },
                    { "key": "p3", "label": "Part C", "max": null, "co": "1&2", "btl": 4 }
                ],
                "btlMax": { "2": 20 }
            }
        }),
    );
    let warnings = updated["warnings"].as_array().expect("warnings");
    assert_eq!(warnings.len(), 2);
    assert_eq!(updated["config"]["questions"][0]["max"], 10.0);
    assert_eq!(updated["config"]["questions"][1]["btl"], 1);
    assert_eq!(updated["config"]["questions"][2]["max"], 0.0);

    let stored = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "config.get",
        json!({ "assessmentKey": "CIA1" }),
    );
    assert_eq!(stored["source"], "stored");
    assert_eq!(stored["config"]["termLabel"], "Odd 2026");

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s1", "questionKey": "p1", "value": 8 })),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s1", "questionKey": "q1", "value": 1 })),
    );
    assert_eq!(code, "not_found");
    let computed = request_ok(&mut stdin, &mut reader, "7", "sheet.compute", sheet_params(json!({})));
    let result = &computed["result"];
    assert_eq!(result["maxTotal"], 20.0);
    assert_eq!(result["visibleBtls"], json!([1, 2, 4]));
    assert_eq!(result["btlMax"]["2"], 20.0);
    assert_eq!(result["rows"][0]["btl"][1]["pct"], "40");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "config.update",
        json!({
            "assessmentKey": "cia1",
            "config": { "questions": [{ "key": "a" }, { "key": "a" }] }
        }),
    );
    assert_eq!(code, "bad_params");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "config.update",
        json!({ "assessmentKey": "cia1", "config": { "schemaVersion": 2 } }),
    );
    assert_eq!(code, "bad_params");

    let reset = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "config.reset",
        json!({ "assessmentKey": "cia1" }),
    );
    assert_eq!(reset["removed"], true);
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "config.get",
        json!({ "assessmentKey": "cia1" }),
    );
    assert_eq!(after["source"], "default");
    assert_eq!(after["config"]["questions"].as_array().map(|q| q.len()), Some(9));
}
