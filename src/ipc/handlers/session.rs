use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{int_param, str_param};
use crate::ipc::types::{AppState, Request, Session};
use crate::ledger::{skills, Exam, OrgQuotaPool};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.load" => Some(load(state, req)),
        "session.summary" => Some(summary(state, req)),
        _ => None,
    }
}

/// Installs a freshly fetched organization quota summary as the working
/// snapshot. Edits and plans from the previous snapshot are dropped; parsed
/// bulk rows survive a same-org reload so the import preview can revalidate
/// against the new pool.
fn load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(org_id) = int_param(&req.params, "orgId") else {
        return err(&req.id, "bad_params", "missing params.orgId", None);
    };
    let Some(summary) = req.params.get("summary") else {
        return err(&req.id, "bad_params", "missing params.summary", None);
    };
    let pool: OrgQuotaPool = match serde_json::from_value(summary.clone()) {
        Ok(p) => p,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("malformed quota summary: {e}"),
                None,
            )
        }
    };
    let currency = str_param(&req.params, "currency")
        .unwrap_or("IDR")
        .to_string();

    let (bulk_rows, bulk_errors) = match state.session.take() {
        Some(prev) if prev.org_id == org_id => (prev.bulk_rows, prev.bulk_errors),
        _ => (Vec::new(), Vec::new()),
    };
    state.edits.clear();
    state.plans.clear();

    let session = Session {
        org_id,
        currency: currency.clone(),
        pool,
        stale: false,
        bulk_rows,
        bulk_errors,
    };
    let result = json!({
        "orgId": org_id,
        "currency": currency,
        "stale": false,
        "ielts": exam_summary(&session, Exam::Ielts),
        "toefl": exam_summary(&session, Exam::Toefl),
    });
    state.session = Some(session);
    ok(&req.id, result)
}

fn summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "no organization session loaded", None);
    };
    ok(
        &req.id,
        json!({
            "orgId": session.org_id,
            "currency": session.currency,
            "stale": session.stale,
            "ielts": exam_summary(session, Exam::Ielts),
            "toefl": exam_summary(session, Exam::Toefl),
        }),
    )
}

fn exam_summary(session: &Session, exam: Exam) -> serde_json::Value {
    let pool = session.pool.exam(exam);
    let per_skill: Vec<serde_json::Value> = skills(exam)
        .iter()
        .map(|(type_id, label)| {
            json!({
                "testType": label,
                "testTypeId": type_id,
                "remaining": session.pool.remaining(exam, *type_id),
            })
        })
        .collect();
    json!({
        "totalTopup": pool.total_topup,
        "totalUsed": pool.total_used,
        "totalRemaining": pool.total_remaining,
        "quotaPercent": session.pool.quota_percent(exam),
        "perSkill": per_skill,
    })
}
