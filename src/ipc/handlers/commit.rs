use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{op_body, op_json, plan_state_json, str_param};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "commit.state" => Some(plan_state(state, req)),
        "commit.next" => Some(next(state, req)),
        "commit.ack" => Some(ack(state, req)),
        "commit.fail" => Some(fail(state, req)),
        _ => None,
    }
}

fn plan_id_param<'a>(req: &'a Request) -> Result<&'a str, serde_json::Value> {
    str_param(&req.params, "planId")
        .ok_or_else(|| err(&req.id, "bad_params", "missing params.planId", None))
}

fn plan_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let plan_id = match plan_id_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(plan) = state.plans.get(plan_id) else {
        return err(&req.id, "not_found", format!("unknown planId: {plan_id}"), None);
    };
    ok(&req.id, plan_state_json(plan))
}

/// The operation the UI should send next, with the ready-to-post wire body.
/// A frozen plan never hands out another operation.
fn next(state: &mut AppState, req: &Request) -> serde_json::Value {
    let plan_id = match plan_id_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(plan) = state.plans.get(plan_id) else {
        return err(&req.id, "not_found", format!("unknown planId: {plan_id}"), None);
    };
    if plan.is_frozen() {
        return err(
            &req.id,
            "plan_frozen",
            "plan failed part-way; re-fetch the organization snapshot and start over",
            Some(plan_state_json(plan)),
        );
    }
    match plan.next_op() {
        Some(op) => ok(
            &req.id,
            json!({ "done": false, "op": op_json(op), "body": op_body(plan, op) }),
        ),
        None => ok(&req.id, json!({ "done": true })),
    }
}

/// Marks the in-flight operation as committed server-side. Completing the
/// last operation makes the session snapshot stale.
fn ack(state: &mut AppState, req: &Request) -> serde_json::Value {
    let plan_id = match plan_id_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let AppState {
        session, plans, ..
    } = state;
    let Some(plan) = plans.get_mut(plan_id) else {
        return err(&req.id, "not_found", format!("unknown planId: {plan_id}"), None);
    };
    if !plan.ack() {
        return err(
            &req.id,
            "bad_params",
            "no operation in flight to acknowledge",
            None,
        );
    }
    if plan.is_done() {
        if let Some(session) = session.as_mut() {
            session.stale = true;
        }
    }
    ok(&req.id, plan_state_json(plan))
}

/// Records a failed operation. The cursor freezes: completed operations stay
/// committed on the backend, the rest are never attempted, and the caller is
/// expected to re-fetch ground truth before editing again.
fn fail(state: &mut AppState, req: &Request) -> serde_json::Value {
    let plan_id = match plan_id_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let message = str_param(&req.params, "error").unwrap_or("operation failed");
    let Some(plan) = state.plans.get_mut(plan_id) else {
        return err(&req.id, "not_found", format!("unknown planId: {plan_id}"), None);
    };
    plan.fail(message);
    ok(&req.id, plan_state_json(plan))
}
