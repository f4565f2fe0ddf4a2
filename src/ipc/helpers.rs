use serde_json::{json, Value};
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, EditKind, Request};
use crate::ledger::{skills, type_id_for_label, Exam, OrgQuotaPool};
use crate::batch;
use crate::reconcile::{CommitPlan, EditSession, Operation};

pub fn int_param(params: &Value, key: &str) -> Option<i64> {
    let v = params.get(key)?;
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(f) = v.as_f64() {
        if f.is_finite() {
            return Some(f.trunc() as i64);
        }
    }
    v.as_str().and_then(|s| s.trim().parse::<i64>().ok())
}

pub fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub fn exam_param(req: &Request) -> Result<Exam, Value> {
    let Some(s) = str_param(&req.params, "exam") else {
        return Err(err(&req.id, "bad_params", "missing params.exam", None));
    };
    Exam::from_str(s).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("unknown exam: {s}"),
            None,
        )
    })
}

/// Resolves a skill from `testTypeId` or the `testType` display label.
pub fn skill_param(req: &Request, exam: Exam) -> Result<i64, Value> {
    if let Some(id) = int_param(&req.params, "testTypeId") {
        if crate::ledger::skill_label(exam, id).is_some() {
            return Ok(id);
        }
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} type_id {} not recognized", exam.as_str(), id),
            None,
        ));
    }
    let Some(label) = str_param(&req.params, "testType") else {
        return Err(err(
            &req.id,
            "bad_params",
            "missing params.testType or params.testTypeId",
            None,
        ));
    };
    type_id_for_label(exam, label).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("unknown {} test type: {label}", exam.as_str()),
            None,
        )
    })
}

/// Per-skill editor rows for an edit session. Batch editors additionally get
/// stepper enablement and the off-multiple warning flag.
pub fn field_rows(edit: &EditSession, pool: &OrgQuotaPool, kind: EditKind) -> Value {
    let mut fields = Vec::new();
    for exam in [Exam::Ielts, Exam::Toefl] {
        for (type_id, label) in skills(exam) {
            let original = edit.original_count(exam, *type_id);
            let base_available = pool.remaining(exam, *type_id);
            let value = edit.current(exam, *type_id);
            let remaining = edit.remaining(pool, exam, *type_id);
            let mut field = json!({
                "exam": exam.as_str(),
                "testType": label,
                "testTypeId": type_id,
                "value": value,
                "max": original + base_available,
                "remaining": remaining,
                "disabled": base_available == 0 && original == 0,
            });
            if kind == EditKind::Batch {
                field["offBatchMultiple"] = json!(batch::off_batch_multiple(value));
                field["minusEnabled"] = json!(value >= batch::BATCH_SIZE);
                field["plusEnabled"] = json!(remaining >= batch::BATCH_SIZE);
            }
            fields.push(field);
        }
    }
    Value::Array(fields)
}

/// Shared open logic for both editor kinds: normalize the student's quota
/// shapes, register the edit session, return the initial field rows.
pub fn open_edit(state: &mut AppState, req: &Request, kind: EditKind) -> Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "no organization session loaded", None);
    };
    let Some(student) = req.params.get("student") else {
        return err(&req.id, "bad_params", "missing params.student", None);
    };
    let Some(user_id) = int_param(student, "userId") else {
        return err(&req.id, "bad_params", "missing params.student.userId", None);
    };
    let quotas = student.get("quotas").cloned().unwrap_or(Value::Null);
    let allocation = crate::ledger::StudentAllocation::from_json(&quotas);
    let edit = EditSession::new(user_id, allocation);

    let edit_id = Uuid::new_v4().to_string();
    let fields = field_rows(&edit, &session.pool, kind);
    state.edits.insert(
        edit_id.clone(),
        crate::ipc::types::Edit { kind, session: edit },
    );
    ok(&req.id, json!({ "editId": edit_id, "fields": fields }))
}

/// Shared save logic: turn the edit's diff into a commit plan. An unchanged
/// edit produces no plan and simply closes.
pub fn save_edit(state: &mut AppState, req: &Request, kind: EditKind) -> Value {
    let Some(edit_id) = str_param(&req.params, "editId") else {
        return err(&req.id, "bad_params", "missing params.editId", None);
    };
    let admin_id = int_param(&req.params, "adminId");

    let Some(edit) = state.edits.get(edit_id) else {
        return err(&req.id, "not_found", format!("unknown editId: {edit_id}"), None);
    };
    if edit.kind != kind {
        return err(&req.id, "bad_params", "edit session kind mismatch", None);
    }

    let ops = edit.session.diff_ops();
    let user_id = edit.session.user_id;
    state.edits.remove(edit_id);

    if ops.is_empty() {
        return ok(&req.id, json!({ "planId": null, "ops": [] }));
    }

    let ops_json: Vec<Value> = ops.iter().map(op_json).collect();
    let plan = CommitPlan::new(user_id, admin_id, ops);
    let plan_id = plan.id.clone();
    state.plans.insert(plan_id.clone(), plan);
    ok(&req.id, json!({ "planId": plan_id, "ops": ops_json }))
}

pub fn op_json(op: &Operation) -> Value {
    // Serialize derives camelCase; attach the display label for the UI.
    let mut v = serde_json::to_value(op).unwrap_or_default();
    if let Some(label) = crate::ledger::skill_label(op.exam, op.test_type_id) {
        v["testType"] = json!(label);
    }
    v
}

/// The wire body the UI sends to the allocate/revoke endpoint for one
/// operation.
pub fn op_body(plan: &CommitPlan, op: &Operation) -> Value {
    json!({
        "test": op.exam.as_str(),
        "user_id": plan.user_id,
        "test_type_id": op.test_type_id,
        "amount": op.amount,
        "admin_id": plan.admin_id,
    })
}

pub fn plan_state_json(plan: &CommitPlan) -> Value {
    json!({
        "planId": plan.id,
        "userId": plan.user_id,
        "createdAt": plan.created_at.to_rfc3339(),
        "done": plan.is_done(),
        "frozen": plan.is_frozen(),
        "failure": plan.failure(),
        "completedOps": plan.completed_ops().iter().map(op_json).collect::<Vec<_>>(),
        "remainingOps": plan.remaining_ops().iter().map(op_json).collect::<Vec<_>>(),
    })
}

/// Resolves the (editId, exam, skill) triple shared by the set/adjust
/// methods, without touching the edit yet.
pub fn edit_field_params(req: &Request) -> Result<(String, Exam, i64), Value> {
    let Some(edit_id) = str_param(&req.params, "editId") else {
        return Err(err(&req.id, "bad_params", "missing params.editId", None));
    };
    let exam = exam_param(req)?;
    let type_id = skill_param(req, exam)?;
    Ok((edit_id.to_string(), exam, type_id))
}
