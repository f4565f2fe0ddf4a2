use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{int_param, str_param};
use crate::ipc::types::{AppState, Request};
use crate::ledger::Exam;
use crate::pricing;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "pricing.prepare" => Some(prepare(state, req, "codes")),
        "pricing.quantity" => Some(prepare(state, req, "appliedCodes")),
        "pricing.interpret" => Some(interpret(req)),
        "pricing.perTest" => Some(per_test(req)),
        "pricing.custom" => Some(custom(req)),
        _ => None,
    }
}

/// Builds (or declines to build) the voucher-apply request body. Quantity
/// changes re-enter here with the already-applied code list: the service is
/// always re-asked against the new base amount, never scaled locally.
fn prepare(state: &mut AppState, req: &Request, codes_key: &str) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "no organization session loaded", None);
    };
    let Some(user_id) = int_param(&req.params, "userId") else {
        return err(&req.id, "bad_params", "missing params.userId", None);
    };
    let Some(unit_price) = int_param(&req.params, "unitPrice") else {
        return err(&req.id, "bad_params", "missing params.unitPrice", None);
    };
    let quantity = int_param(&req.params, "quantity").unwrap_or(0);
    let Some(test_type) = str_param(&req.params, "testType").and_then(Exam::from_str) else {
        return err(
            &req.id,
            "bad_params",
            "params.testType must be IELTS or TOEFL",
            None,
        );
    };
    let codes: Vec<String> = req
        .params
        .get(codes_key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    match pricing::prepare(
        user_id,
        &session.currency,
        unit_price,
        quantity,
        &codes,
        test_type,
    ) {
        pricing::Prepare::Cleared => ok(&req.id, json!({ "cleared": true, "request": null })),
        pricing::Prepare::CurrencyBlocked => err(
            &req.id,
            "voucher_currency",
            pricing::CURRENCY_GATE_MESSAGE,
            Some(json!({ "currency": session.currency })),
        ),
        pricing::Prepare::Request(request) => {
            let base_amount = request.base_amount;
            match serde_json::to_value(&request) {
                Ok(body) => ok(
                    &req.id,
                    json!({ "cleared": false, "baseAmount": base_amount, "request": body }),
                ),
                Err(e) => err(&req.id, "bad_params", e.to_string(), None),
            }
        }
    }
}

/// Interprets the voucher service's answer into applied codes and a
/// user-facing message.
fn interpret(req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("response") else {
        return err(&req.id, "bad_params", "missing params.response", None);
    };
    let response: pricing::ApplyResponse = match serde_json::from_value(raw.clone()) {
        Ok(r) => r,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("malformed voucher response: {e}"),
                None,
            )
        }
    };
    let outcome = pricing::interpret(&response);
    let ok_flag = outcome.error.is_none();
    match serde_json::to_value(&outcome) {
        Ok(mut v) => {
            v["ok"] = json!(ok_flag);
            ok(&req.id, v)
        }
        Err(e) => err(&req.id, "bad_params", e.to_string(), None),
    }
}

fn per_test(req: &Request) -> serde_json::Value {
    let Some(price) = int_param(&req.params, "price") else {
        return err(&req.id, "bad_params", "missing params.price", None);
    };
    let quota = int_param(&req.params, "quota").unwrap_or(0);
    ok(
        &req.id,
        json!({ "perTest": pricing::price_per_test(price, quota) }),
    )
}

fn custom(req: &Request) -> serde_json::Value {
    let Some(per_test) = int_param(&req.params, "perTest") else {
        return err(&req.id, "bad_params", "missing params.perTest", None);
    };
    let quantity = int_param(&req.params, "quantity").unwrap_or(0);
    let quote = pricing::custom_quote(per_test, quantity);
    match serde_json::to_value(&quote) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "bad_params", e.to_string(), None),
    }
}
