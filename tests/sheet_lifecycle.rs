mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, seed_roster, sheet_params, spawn_sidecar, temp_dir};

#[test]
fn sheet_entry_compute_publish_and_edit_approval() {
    let workspace = temp_dir("obed-sheet-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_roster(&mut stdin, &mut reader);

    let opened = request_ok(&mut stdin, &mut reader, "2", "sheet.open", sheet_params(json!({})));
    assert_eq!(opened["source"], "roster");
    assert_eq!(opened["sheet"]["rows"].as_array().map(|r| r.len()), Some(3));
    assert_eq!(opened["lock"]["state"], "unlocked");
    assert_eq!(opened["lock"]["canEdit"], true);
    assert_eq!(opened["result"]["visibleBtls"], json!([1, 2, 3, 5]));

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s1", "questionKey": "q1", "value": 2 })),
    );
    let clamped = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s1", "questionKey": "q7", "value": "20" })),
    );
    assert_eq!(clamped["value"], 16.0);
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s1", "questionKey": "q9", "value": 10 })),
    );
    let blanked = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s2", "questionKey": "q1", "value": "abc" })),
    );
    assert!(blanked["value"].is_null());

    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "sheet.setAbsent",
        sheet_params(json!({ "studentId": "s3", "absent": true })),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s3", "questionKey": "q1", "value": 1 })),
    );
    assert_eq!(code, "student_absent");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "nobody", "questionKey": "q1", "value": 1 })),
    );
    assert_eq!(code, "not_found");

    let computed = request_ok(&mut stdin, &mut reader, "10", "sheet.compute", sheet_params(json!({})));
    let result = &computed["result"];
    assert_eq!(result["maxTotal"], 60.0);
    assert_eq!(result["coMax"], json!([30.0, 30.0]));
    let s1 = &result["rows"][0];
    assert_eq!(s1["studentId"], "s1");
    assert_eq!(s1["total"], 28.0);
    assert_eq!(s1["coA"], 23.0);
    assert_eq!(s1["coAPct"], "76.7");
    assert_eq!(s1["coB"], 5.0);
    assert_eq!(s1["coBPct"], "16.7");
    assert_eq!(result["rows"][2]["absent"], true);
    assert_eq!(result["rows"][2]["total"], 0.0);

    let reopened = request_ok(&mut stdin, &mut reader, "11", "sheet.open", sheet_params(json!({})));
    assert_eq!(reopened["source"], "draft");
    assert_eq!(reopened["sheet"]["rows"][0]["q"]["q7"], 16.0);

    let published = request_ok(&mut stdin, &mut reader, "12", "sheet.publish", sheet_params(json!({})));
    assert_eq!(published["version"], 1);
    assert_eq!(published["digest"].as_str().map(|s| s.len()), Some(64));
    assert_eq!(published["lock"]["state"], "locked");
    assert_eq!(published["lock"]["canEdit"], false);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "13",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s1", "questionKey": "q1", "value": 1 })),
    );
    assert_eq!(code, "sheet_locked");
    let code = request_err(&mut stdin, &mut reader, "14", "sheet.publish", sheet_params(json!({})));
    assert_eq!(code, "invalid_transition");
    let code = request_err(&mut stdin, &mut reader, "15", "lock.approve", sheet_params(json!({})));
    assert_eq!(code, "invalid_transition");

    let pending = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "lock.requestEdit",
        sheet_params(json!({ "reason": "q7 mis-keyed" })),
    );
    assert_eq!(pending["lock"]["editRequestStatus"], "pending");
    let rejected = request_ok(&mut stdin, &mut reader, "17", "lock.reject", sheet_params(json!({})));
    assert_eq!(rejected["lock"]["state"], "locked_rejected");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "18",
        "sheet.setAbsent",
        sheet_params(json!({ "studentId": "s3", "absent": false })),
    );
    assert_eq!(code, "sheet_locked");

    request_ok(&mut stdin, &mut reader, "19", "lock.requestEdit", sheet_params(json!({})));
    let approved = request_ok(&mut stdin, &mut reader, "20", "lock.approve", sheet_params(json!({})));
    assert_eq!(approved["lock"]["state"], "locked_approved");
    assert_eq!(approved["lock"]["canEdit"], true);

    request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s1", "questionKey": "q7", "value": 12 })),
    );
    let republished =
        request_ok(&mut stdin, &mut reader, "22", "sheet.publish", sheet_params(json!({})));
    assert_eq!(republished["version"], 2);
    assert_ne!(republished["digest"], published["digest"]);

    let latest = request_ok(&mut stdin, &mut reader, "23", "sheet.published", sheet_params(json!({})));
    assert_eq!(latest["published"]["version"], 2);
    assert_eq!(latest["published"]["sheet"]["rows"][0]["q"]["q7"], 12.0);

    let status = request_ok(&mut stdin, &mut reader, "24", "lock.status", sheet_params(json!({})));
    assert_eq!(status["lock"]["state"], "locked");
}

#[test]
fn btl_override_changes_visible_levels() {
    let workspace = temp_dir("obed-sheet-btl");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_roster(&mut stdin, &mut reader);

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "sheet.setBtl",
        sheet_params(json!({ "questionKey": "q9", "btl": 4 })),
    );
    let computed = request_ok(&mut stdin, &mut reader, "3", "sheet.compute", sheet_params(json!({})));
    assert_eq!(computed["result"]["visibleBtls"], json!([1, 2, 3, 4]));
    assert_eq!(computed["result"]["btlMax"]["4"], 16.0);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "sheet.setBtl",
        sheet_params(json!({ "questionKey": "q9", "btl": 7 })),
    );
    assert_eq!(code, "bad_params");

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sheet.setBtl",
        sheet_params(json!({ "questionKey": "q9", "btl": null })),
    );
    let computed = request_ok(&mut stdin, &mut reader, "6", "sheet.compute", sheet_params(json!({})));
    assert_eq!(computed["result"]["visibleBtls"], json!([1, 2, 3, 5]));
}

#[test]
fn save_draft_replaces_payload_and_normalizes() {
    let workspace = temp_dir("obed-sheet-save-draft");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_roster(&mut stdin, &mut reader);

    let opened = request_ok(&mut stdin, &mut reader, "2", "sheet.open", sheet_params(json!({})));
    let mut sheet = opened["sheet"].clone();
    sheet["rows"][0]["q"] = json!({ "q1": 5, "q8": 3, "bogus": 9 });
    sheet["rows"][1]["absent"] = json!(true);
    sheet["rows"][1]["q"] = json!({ "q2": 1 });

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "sheet.saveDraft",
        sheet_params(json!({ "sheet": sheet })),
    );
    let reopened = request_ok(&mut stdin, &mut reader, "4", "sheet.open", sheet_params(json!({})));
    let row0 = &reopened["sheet"]["rows"][0]["q"];
    assert_eq!(row0["q1"], 2.0);
    assert_eq!(row0["q8"], 3.0);
    assert!(row0.get("bogus").is_none());
    assert!(reopened["sheet"]["rows"][1]["q"]["q2"].is_null());

    let mut foreign = sheet.clone();
    foreign["subjectCode"] = json!("MA201");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "sheet.saveDraft",
        sheet_params(json!({ "sheet": foreign })),
    );
    assert_eq!(code, "bad_params");
}
