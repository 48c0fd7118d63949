mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, request_err, request_ok, seed_roster, sheet_params, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("obed-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");
    let csv_out = workspace.join("smoke-export.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["workspacePath"].is_null());
    assert_eq!(
        request_err(&mut stdin, &mut reader, "2", "sheet.open", sheet_params(json!({}))),
        "no_workspace"
    );
    assert_eq!(
        request_err(&mut stdin, &mut reader, "3", "workspace.select", json!({})),
        "bad_params"
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_roster(&mut stdin, &mut reader);

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("roster.list", json!({ "teachingAssignmentId": "ta1" })),
        ("config.get", json!({ "assessmentKey": "lab" })),
        ("sheet.open", sheet_params(json!({}))),
        ("sheet.compute", sheet_params(json!({}))),
        ("sheet.published", sheet_params(json!({}))),
        ("sheet.exportCsv", sheet_params(json!({ "outPath": csv_out.to_string_lossy() }))),
        ("lock.status", sheet_params(json!({}))),
        ("articulation.get", json!({ "subjectCode": "CS101" })),
        ("articulation.summary", json!({ "subjectCode": "CS101" })),
        ("cotarget.compute", json!({ "subjectCode": "CS101" })),
        ("activeLearning.get", json!({})),
        ("cache.get", json!({ "key": "missing" })),
        ("backup.exportWorkspaceBundle", json!({ "outPath": bundle_out.to_string_lossy() })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        request_ok(&mut stdin, &mut reader, &format!("c{}", i), method, params);
    }

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "roster.list",
        json!({ "teachingAssignmentId": "ta1" }),
    );
    assert_eq!(roster["students"][2]["regNo"], "R003");
    assert_eq!(roster["students"][2]["sortOrder"], 2);

    let unknown = request(&mut stdin, &mut reader, "6", "nope.method", json!({}));
    assert_eq!(unknown["error"]["code"], "not_implemented");

    writeln!(stdin, "this is not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let reply: serde_json::Value = serde_json::from_str(line.trim()).expect("reply json");
    assert_eq!(reply["error"]["code"], "bad_json");

    // Still serving after a bad line.
    request_ok(&mut stdin, &mut reader, "7", "health", json!({}));

    assert!(bundle_out.is_file());
    assert!(csv_out.is_file());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn roster_import_upserts_by_register_number() {
    let workspace = temp_dir("obed-roster-upsert");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_roster(&mut stdin, &mut reader);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.import",
        json!({
            "teachingAssignmentId": "ta1",
            "students": [
                { "regNo": "R002", "name": "Bala S" },
                { "regNo": "R004", "name": "Deepa" },
                { "regNo": "", "name": "Nobody" }
            ]
        }),
    );
    assert_eq!(res["inserted"], 1);
    assert_eq!(res["updated"], 1);
    assert_eq!(res["rejected"], 1);

    let list = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "roster.list",
        json!({ "teachingAssignmentId": "ta1" }),
    );
    let students = list["students"].as_array().expect("students");
    assert_eq!(students.len(), 4);
    assert_eq!(students[1]["name"], "Bala S");
    assert_eq!(students[3]["regNo"], "R004");
    assert_eq!(students[3]["sortOrder"], 3);

    // New roster students join an existing draft without losing marks.
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "sheet.setMark",
        sheet_params(json!({ "studentId": "s1", "questionKey": "q1", "value": 1 })),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "roster.import",
        json!({
            "teachingAssignmentId": "ta1",
            "students": [{ "id": "s9", "regNo": "R009", "name": "Ezhil" }]
        }),
    );
    let opened = request_ok(&mut stdin, &mut reader, "6", "sheet.open", sheet_params(json!({})));
    let rows = opened["sheet"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0]["q"]["q1"], 1.0);
    assert_eq!(rows[4]["studentId"], "s9");
}
