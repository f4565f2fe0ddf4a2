use serde_json::{json, Value};
use std::collections::HashMap;

use crate::bulk;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request, Session};
use crate::ledger::{skills, Exam};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "bulk.load" => Some(load(state, req)),
        "bulk.revalidate" => Some(revalidate(state, req)),
        "bulk.payload" => Some(payload(state, req)),
        _ => None,
    }
}

/// Parses raw spreadsheet rows and runs the sequential quota simulation
/// against the current pool snapshot. Parse failures drop their row but
/// never the file.
fn load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "no organization session loaded", None);
    };
    let Some(raw_rows) = req.params.get("rows").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing params.rows", None);
    };

    let outcome = bulk::parse_rows(raw_rows);
    session.bulk_rows = outcome.rows;
    session.bulk_errors = outcome.errors;
    bulk::validate_rows(&mut session.bulk_rows, &session.pool);

    ok(&req.id, view(session))
}

/// Re-runs the simulation against the (possibly re-fetched) pool without
/// re-parsing the file.
fn revalidate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "no organization session loaded", None);
    };
    bulk::validate_rows(&mut session.bulk_rows, &session.pool);
    ok(&req.id, view(session))
}

/// Backend bulk-add-members body. Strict policy: one flagged row blocks the
/// whole batch.
fn payload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "no organization session loaded", None);
    };
    match bulk::build_payload(&session.bulk_rows) {
        Ok(body) => ok(&req.id, body),
        Err(e) => {
            let issues: Vec<Value> = session
                .bulk_rows
                .iter()
                .filter(|r| !r.quota_ok)
                .map(|r| {
                    json!({
                        "excelRow": r.excel_row,
                        "issues": r.quota_issues,
                    })
                })
                .collect();
            err(
                &req.id,
                "invalid_rows",
                e.to_string(),
                Some(json!({ "rows": issues })),
            )
        }
    }
}

fn view(session: &Session) -> Value {
    let demand = bulk::compute_demand(&session.bulk_rows);
    let rows: Vec<Value> = session
        .bulk_rows
        .iter()
        .map(|r| {
            let mut v = serde_json::to_value(r).unwrap_or_default();
            v["quotaLabels"] = json!(r
                .quotas
                .iter()
                .map(bulk::quota_label)
                .collect::<Vec<String>>());
            v
        })
        .collect();
    let has_over_quota = bulk::has_over_quota(&session.bulk_rows);

    json!({
        "rows": rows,
        "errors": session.bulk_errors,
        "demand": demand_json(&demand),
        "summaryLines": bulk::summary_lines(&demand, &session.pool),
        "hasOverQuota": has_over_quota,
        "submitEnabled": !session.bulk_rows.is_empty() && !has_over_quota,
    })
}

/// Demand keyed the way the editor displays it: exam name, then skill label,
/// every canonical skill present even at zero.
fn demand_json(demand: &HashMap<(Exam, i64), i64>) -> Value {
    let mut out = json!({});
    for exam in [Exam::Ielts, Exam::Toefl] {
        let mut exam_obj = json!({});
        for (type_id, label) in skills(exam) {
            exam_obj[*label] = json!(demand.get(&(exam, *type_id)).copied().unwrap_or(0));
        }
        out[exam.as_str()] = exam_obj;
    }
    out
}
