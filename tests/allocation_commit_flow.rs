
use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, spawn_sidecar};

fn load_session(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    ielts_per_type: serde_json::Value,
) {
    request_ok(
        stdin,
        reader,
        "load",
        "session.load",
        json!({
            "orgId": 42,
            "currency": "IDR",
            "summary": {
                "ielts": {
                    "totalTopup": 50,
                    "totalUsed": 10,
                    "totalRemaining": 40,
                    "perType": ielts_per_type
                },
                "toefl": {}
            }
        }),
    );
}

#[test]
fn writing_clamp_scenario_commits_single_allocate() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // Org has 3 Writing remaining; the student already holds 2.
    load_session(
        &mut stdin,
        &mut reader,
        json!({"3": {"topup": 5, "used": 2, "remaining": 3}}),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "allocation.open",
        json!({"student": {"userId": 7, "quotas": {"IELTS": {"Writing": {"count": 2, "expiry": null}}}}}),
    );
    let edit_id = opened["editId"].as_str().expect("editId").to_string();

    let writing = opened["fields"]
        .as_array()
        .expect("fields")
        .iter()
        .find(|f| f["exam"] == "IELTS" && f["testType"] == "Writing")
        .expect("writing field")
        .clone();
    assert_eq!(writing["value"], 2);
    assert_eq!(writing["max"], 5);
    assert_eq!(writing["remaining"], 3);

    // Admin types 10; the editor clamps to student + org spare = 5.
    let set = request_ok(
        &mut stdin,
        &mut reader,
        "set",
        "allocation.set",
        json!({"editId": edit_id, "exam": "IELTS", "testType": "Writing", "value": 10}),
    );
    assert_eq!(set["value"], 5);
    assert_eq!(set["remaining"], 0);

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "allocation.save",
        json!({"editId": edit_id, "adminId": 99}),
    );
    let plan_id = saved["planId"].as_str().expect("planId").to_string();
    let ops = saved["ops"].as_array().expect("ops");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["exam"], "IELTS");
    assert_eq!(ops[0]["testTypeId"], 3);
    assert_eq!(ops[0]["direction"], "allocate");
    assert_eq!(ops[0]["amount"], 3);

    let next = request_ok(
        &mut stdin,
        &mut reader,
        "next",
        "commit.next",
        json!({"planId": plan_id}),
    );
    assert_eq!(next["done"], false);
    assert_eq!(next["body"]["test"], "IELTS");
    assert_eq!(next["body"]["user_id"], 7);
    assert_eq!(next["body"]["test_type_id"], 3);
    assert_eq!(next["body"]["amount"], 3);
    assert_eq!(next["body"]["admin_id"], 99);

    let acked = request_ok(
        &mut stdin,
        &mut reader,
        "ack",
        "commit.ack",
        json!({"planId": plan_id}),
    );
    assert_eq!(acked["done"], true);
    assert_eq!(acked["frozen"], false);

    // A completed commit invalidates the local snapshot.
    let summary = request_ok(&mut stdin, &mut reader, "sum", "session.summary", json!({}));
    assert_eq!(summary["stale"], true);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn legacy_bare_number_quotas_open_like_current_shape() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    load_session(
        &mut stdin,
        &mut reader,
        json!({"2": {"remaining": 4}, "3": {"remaining": 3}}),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "allocation.open",
        json!({"student": {"userId": 7, "quotas": {
            "IELTS": {"Reading": 4, "Writing": {"count": 2, "expiry": "2026-12-31"}}
        }}}),
    );
    let fields = opened["fields"].as_array().expect("fields");
    let reading = fields
        .iter()
        .find(|f| f["exam"] == "IELTS" && f["testType"] == "Reading")
        .expect("reading field");
    assert_eq!(reading["value"], 4);
    let writing = fields
        .iter()
        .find(|f| f["exam"] == "IELTS" && f["testType"] == "Writing")
        .expect("writing field");
    assert_eq!(writing["value"], 2);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn mangled_expiry_strings_never_crash_open() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    load_session(&mut stdin, &mut reader, json!({"3": {"remaining": 3}}));

    // Expiry cells arrive as free text; multibyte garbage must degrade to
    // "no expiry", not kill the daemon mid-request.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "allocation.open",
        json!({"student": {"userId": 7, "quotas": {
            "IELTS": {"Writing": {"count": 2, "expiry": "aaaaa€€€"}}
        }}}),
    );
    let writing = opened["fields"]
        .as_array()
        .expect("fields")
        .iter()
        .find(|f| f["exam"] == "IELTS" && f["testType"] == "Writing")
        .expect("writing field")
        .clone();
    assert_eq!(writing["value"], 2);

    // The daemon is still alive and answering.
    let health = request_ok(&mut stdin, &mut reader, "hp", "health", json!({}));
    assert_eq!(health["orgId"], 42);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn mid_sequence_failure_freezes_the_plan() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    load_session(
        &mut stdin,
        &mut reader,
        json!({"2": {"remaining": 10}, "3": {"remaining": 10}}),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "allocation.open",
        json!({"student": {"userId": 7, "quotas": {"IELTS": {"Reading": 1, "Writing": 1}}}}),
    );
    let edit_id = opened["editId"].as_str().expect("editId").to_string();

    request_ok(
        &mut stdin,
        &mut reader,
        "set1",
        "allocation.set",
        json!({"editId": edit_id, "exam": "IELTS", "testType": "Reading", "value": 5}),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "set2",
        "allocation.set",
        json!({"editId": edit_id, "exam": "IELTS", "testType": "Writing", "value": 0}),
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "allocation.save",
        json!({"editId": edit_id}),
    );
    let plan_id = saved["planId"].as_str().expect("planId").to_string();
    assert_eq!(saved["ops"].as_array().expect("ops").len(), 2);

    request_ok(&mut stdin, &mut reader, "n1", "commit.next", json!({"planId": plan_id}));
    request_ok(&mut stdin, &mut reader, "a1", "commit.ack", json!({"planId": plan_id}));

    let failed = request_ok(
        &mut stdin,
        &mut reader,
        "fail",
        "commit.fail",
        json!({"planId": plan_id, "error": "backend 500"}),
    );
    assert_eq!(failed["frozen"], true);
    assert_eq!(failed["done"], false);
    assert_eq!(failed["failure"], "backend 500");
    assert_eq!(failed["completedOps"].as_array().expect("completed").len(), 1);
    assert_eq!(failed["remainingOps"].as_array().expect("remaining").len(), 1);
    // The first op committed server-side; the revoke was never attempted.
    assert_eq!(failed["completedOps"][0]["direction"], "allocate");
    assert_eq!(failed["remainingOps"][0]["direction"], "revoke");

    let err = request_err(
        &mut stdin,
        &mut reader,
        "n2",
        "commit.next",
        json!({"planId": plan_id}),
    );
    assert_eq!(err["code"], "plan_frozen");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn saving_without_changes_creates_no_plan() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    load_session(&mut stdin, &mut reader, json!({"3": {"remaining": 3}}));

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "allocation.open",
        json!({"student": {"userId": 7, "quotas": {"IELTS": {"Writing": 2}}}}),
    );
    let edit_id = opened["editId"].as_str().expect("editId").to_string();

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "allocation.save",
        json!({"editId": edit_id}),
    );
    assert!(saved["planId"].is_null());
    assert_eq!(saved["ops"].as_array().expect("ops").len(), 0);

    // The edit session is consumed either way.
    let err = request_err(
        &mut stdin,
        &mut reader,
        "save2",
        "allocation.save",
        json!({"editId": edit_id}),
    );
    assert_eq!(err["code"], "not_found");

    drop(stdin);
    let _ = child.wait();
}
