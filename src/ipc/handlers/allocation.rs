use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{edit_field_params, int_param, open_edit, save_edit, str_param};
use crate::ipc::types::{AppState, EditKind, Request};
use crate::ledger::Exam;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "allocation.open" => Some(open_edit(state, req, EditKind::Free)),
        "allocation.set" => Some(set(state, req)),
        "allocation.totals" => Some(totals(state, req)),
        "allocation.save" => Some(save_edit(state, req, EditKind::Free)),
        _ => None,
    }
}

/// Applies one edited field value, clamped to `[0, student + orgAvailable]`,
/// and reports the live remaining-for-others figure.
fn set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (edit_id, exam, type_id) = match edit_field_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(value) = int_param(&req.params, "value") else {
        return err(&req.id, "bad_params", "missing params.value", None);
    };

    // Pool and edit live in different AppState fields; split the borrow.
    let AppState {
        session, edits, ..
    } = state;
    let Some(session) = session.as_ref() else {
        return err(&req.id, "no_session", "no organization session loaded", None);
    };
    let Some(edit) = edits.get_mut(&edit_id) else {
        return err(&req.id, "not_found", format!("unknown editId: {edit_id}"), None);
    };
    if edit.kind != EditKind::Free {
        return err(
            &req.id,
            "bad_params",
            "batch edits change values via batch.adjust",
            None,
        );
    }

    let (value, remaining) = edit.session.set(&session.pool, exam, type_id, value);
    ok(&req.id, json!({ "value": value, "remaining": remaining }))
}

fn totals(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(edit_id) = str_param(&req.params, "editId") else {
        return err(&req.id, "bad_params", "missing params.editId", None);
    };
    let Some(edit) = state.edits.get(edit_id) else {
        return err(&req.id, "not_found", format!("unknown editId: {edit_id}"), None);
    };
    ok(
        &req.id,
        json!({
            "ielts": edit.session.total(Exam::Ielts),
            "toefl": edit.session.total(Exam::Toefl),
        }),
    )
}
