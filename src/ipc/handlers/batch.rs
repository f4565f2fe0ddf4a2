use serde_json::json;

use crate::batch::{off_batch_multiple, step, StepDirection, StepError};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{edit_field_params, open_edit, save_edit, str_param};
use crate::ipc::types::{AppState, EditKind, Request};
use crate::ledger::skill_label;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "batch.open" => Some(open_edit(state, req, EditKind::Batch)),
        "batch.adjust" => Some(adjust(state, req)),
        "batch.save" => Some(save_edit(state, req, EditKind::Batch)),
        _ => None,
    }
}

/// One stepper click. Increments need a full batch spare in the live org
/// remaining; decrements need a full batch on the student. A pre-existing
/// off-multiple value is reported but never corrected.
fn adjust(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (edit_id, exam, type_id) = match edit_field_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(direction) =
        str_param(&req.params, "direction").and_then(StepDirection::from_str)
    else {
        return err(
            &req.id,
            "bad_params",
            "params.direction must be \"increment\" or \"decrement\"",
            None,
        );
    };

    let AppState {
        session, edits, ..
    } = state;
    let Some(session) = session.as_ref() else {
        return err(&req.id, "no_session", "no organization session loaded", None);
    };
    let Some(edit) = edits.get_mut(&edit_id) else {
        return err(&req.id, "not_found", format!("unknown editId: {edit_id}"), None);
    };
    if edit.kind != EditKind::Batch {
        return err(&req.id, "bad_params", "not a batch edit session", None);
    }

    let current = edit.session.current(exam, type_id);
    let live_remaining = edit.session.remaining(&session.pool, exam, type_id);
    let label = skill_label(exam, type_id).unwrap_or("?");

    match step(current, direction, live_remaining) {
        Ok(value) => {
            edit.session.set_raw(exam, type_id, value);
            let remaining = edit.session.remaining(&session.pool, exam, type_id);
            ok(
                &req.id,
                json!({
                    "value": value,
                    "remaining": remaining,
                    "offBatchMultiple": off_batch_multiple(value),
                }),
            )
        }
        Err(StepError::InsufficientQuota { remaining }) => err(
            &req.id,
            "insufficient_quota",
            format!(
                "{} {}: not enough organization quota for a batch (remaining {})",
                exam.as_str(),
                label,
                remaining
            ),
            Some(json!({ "remaining": remaining })),
        ),
        Err(StepError::BelowBatch { current }) => err(
            &req.id,
            "bad_params",
            format!(
                "{} {}: cannot decrement below a full batch (current {})",
                exam.as_str(),
                label,
                current
            ),
            Some(json!({ "current": current })),
        ),
    }
}
