
use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request, request_err, request_ok, spawn_sidecar};

fn open_batch(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    writing_remaining: i64,
    student_writing: i64,
) -> String {
    request_ok(
        stdin,
        reader,
        "load",
        "session.load",
        json!({
            "orgId": 7,
            "currency": "IDR",
            "summary": {
                "ielts": {
                    "totalTopup": 100,
                    "totalRemaining": writing_remaining,
                    "perType": {"3": {"remaining": writing_remaining}}
                },
                "toefl": {}
            }
        }),
    );
    let opened = request_ok(
        stdin,
        reader,
        "open",
        "batch.open",
        json!({"student": {"userId": 11, "quotas": {"IELTS": {"Writing": student_writing}}}}),
    );
    opened["editId"].as_str().expect("editId").to_string()
}

fn adjust(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    edit_id: &str,
    direction: &str,
) -> serde_json::Value {
    request(
        stdin,
        reader,
        id,
        "batch.adjust",
        json!({
            "editId": edit_id,
            "exam": "IELTS",
            "testType": "Writing",
            "direction": direction,
        }),
    )
}

#[test]
fn stepper_moves_in_whole_batches() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let edit_id = open_batch(&mut stdin, &mut reader, 12, 7);

    let up = adjust(&mut stdin, &mut reader, "up1", &edit_id, "increment");
    assert_eq!(up["ok"], true);
    assert_eq!(up["result"]["value"], 12);
    assert_eq!(up["result"]["remaining"], 7);
    // 12 is not a multiple of 5 because the starting value was not.
    assert_eq!(up["result"]["offBatchMultiple"], true);

    let up = adjust(&mut stdin, &mut reader, "up2", &edit_id, "increment");
    assert_eq!(up["result"]["value"], 17);
    assert_eq!(up["result"]["remaining"], 2);

    let down = adjust(&mut stdin, &mut reader, "down1", &edit_id, "decrement");
    assert_eq!(down["result"]["value"], 12);
    assert_eq!(down["result"]["remaining"], 7);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn increment_requires_a_full_batch_spare() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let edit_id = open_batch(&mut stdin, &mut reader, 4, 0);

    let up = adjust(&mut stdin, &mut reader, "up", &edit_id, "increment");
    assert_eq!(up["ok"], false);
    assert_eq!(up["error"]["code"], "insufficient_quota");
    assert_eq!(up["error"]["details"]["remaining"], 4);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn decrement_from_off_multiple_clamps_at_zero() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let edit_id = open_batch(&mut stdin, &mut reader, 20, 7);

    let down = adjust(&mut stdin, &mut reader, "d1", &edit_id, "decrement");
    assert_eq!(down["result"]["value"], 2);

    // 2 < one batch, so the minus stop is reached.
    let down = adjust(&mut stdin, &mut reader, "d2", &edit_id, "decrement");
    assert_eq!(down["ok"], false);
    assert_eq!(down["error"]["code"], "bad_params");
    assert_eq!(down["error"]["details"]["current"], 2);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn batch_fields_expose_stepper_enablement() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "load",
        "session.load",
        json!({
            "orgId": 7,
            "currency": "IDR",
            "summary": {
                "ielts": {
                    "totalTopup": 100,
                    "totalRemaining": 3,
                    "perType": {"3": {"remaining": 3}, "2": {"remaining": 9}}
                },
                "toefl": {}
            }
        }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "open",
        "batch.open",
        json!({"student": {"userId": 11, "quotas": {"IELTS": {"Writing": 10}}}}),
    );
    let fields = opened["fields"].as_array().expect("fields");

    let writing = fields
        .iter()
        .find(|f| f["exam"] == "IELTS" && f["testType"] == "Writing")
        .expect("writing field");
    assert_eq!(writing["value"], 10);
    assert_eq!(writing["offBatchMultiple"], false);
    assert_eq!(writing["minusEnabled"], true);
    // Only 3 spare in the org, below one batch.
    assert_eq!(writing["plusEnabled"], false);

    let reading = fields
        .iter()
        .find(|f| f["exam"] == "IELTS" && f["testType"] == "Reading")
        .expect("reading field");
    assert_eq!(reading["value"], 0);
    assert_eq!(reading["minusEnabled"], false);
    assert_eq!(reading["plusEnabled"], true);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn batch_save_emits_net_difference_ops() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let edit_id = open_batch(&mut stdin, &mut reader, 20, 5);

    adjust(&mut stdin, &mut reader, "u1", &edit_id, "increment");
    adjust(&mut stdin, &mut reader, "u2", &edit_id, "increment");
    adjust(&mut stdin, &mut reader, "d1", &edit_id, "decrement");

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "batch.save",
        json!({"editId": edit_id, "adminId": 3}),
    );
    let ops = saved["ops"].as_array().expect("ops");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["direction"], "allocate");
    assert_eq!(ops[0]["amount"], 5);
    assert_eq!(ops[0]["testTypeId"], 3);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn allocation_set_rejects_batch_sessions() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let edit_id = open_batch(&mut stdin, &mut reader, 20, 5);

    let err = request_err(
        &mut stdin,
        &mut reader,
        "set",
        "allocation.set",
        json!({"editId": edit_id, "exam": "IELTS", "testType": "Writing", "value": 9}),
    );
    assert_eq!(err["code"], "bad_params");

    drop(stdin);
    let _ = child.wait();
}
