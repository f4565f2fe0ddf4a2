use serde::{Deserialize, Serialize};

use crate::ledger::Exam;

/// Vouchers are a home-currency (IDR) feature; any other purchase currency
/// short-circuits before a request is built.
pub const HOME_CURRENCY: &str = "IDR";
pub const CURRENCY_GATE_MESSAGE: &str = "Voucher only applies for IDR prices.";
pub const CANNOT_APPLY_MESSAGE: &str = "Voucher cannot be applied.";

/// Minimum quantity for a custom quota purchase.
pub const MIN_CUSTOM_QTY: i64 = 5;

/// Purchase quantity is never zero or negative; bad input buys one.
pub fn coerce_quantity(raw: i64) -> i64 {
    if raw <= 0 {
        1
    } else {
        raw
    }
}

pub fn base_amount(unit_price: i64, quantity: i64) -> i64 {
    unit_price * coerce_quantity(quantity)
}

/// Trim, uppercase, drop empties, dedupe keeping first-submission order.
pub fn normalize_codes(codes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for code in codes {
        let c = code.trim().to_uppercase();
        if c.is_empty() || out.contains(&c) {
            continue;
        }
        out.push(c);
    }
    out
}

/// Body for the backend voucher-apply call. Field casing follows the wire
/// contract, which mixes camelCase and snake_case.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyRequest {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub codes: Vec<String>,
    #[serde(rename = "baseAmount")]
    pub base_amount: i64,
    pub platform_type: &'static str,
    pub test_type: Exam,
}

#[derive(Debug)]
pub enum Prepare {
    /// No codes left after normalization; caller clears voucher state.
    Cleared,
    /// Wrong purchase currency; no request may be issued.
    CurrencyBlocked,
    Request(ApplyRequest),
}

/// Builds the voucher-apply request, or decides that none may be sent.
/// Discounts are never computed locally; the pricing service is re-asked on
/// every quantity or code-list change.
pub fn prepare(
    user_id: i64,
    currency: &str,
    unit_price: i64,
    quantity: i64,
    codes: &[String],
    test_type: Exam,
) -> Prepare {
    let codes = normalize_codes(codes);
    if codes.is_empty() {
        return Prepare::Cleared;
    }
    if currency != HOME_CURRENCY {
        return Prepare::CurrencyBlocked;
    }
    Prepare::Request(ApplyRequest {
        user_id,
        codes,
        base_amount: base_amount(unit_price, quantity),
        platform_type: "B2B",
        test_type,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedVoucher {
    pub voucher_id: i64,
    pub code: String,
    /// `NOMINAL_NUMBERS` or `PERCENTAGE`; opaque to this engine.
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub discount_value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    #[serde(default)]
    pub base_amount: f64,
    #[serde(default)]
    pub final_amount: f64,
    #[serde(default)]
    pub total_discount: f64,
    #[serde(default)]
    pub applied: Vec<AppliedVoucher>,
    #[serde(default)]
    pub invalid_codes: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpretation {
    pub final_amount: f64,
    pub total_discount: f64,
    pub applied_codes: Vec<String>,
    /// User-facing message; valid codes in `applied_codes` still count even
    /// when this is set.
    pub error: Option<String>,
}

/// Reads the service's answer. The service is the source of truth for the
/// combined discount; this only composes messages and extracts the applied
/// code list.
pub fn interpret(resp: &ApplyResponse) -> Interpretation {
    let applied_codes: Vec<String> = resp
        .applied
        .iter()
        .map(|a| a.code.to_uppercase())
        .collect();

    let error = if !resp.invalid_codes.is_empty() {
        Some(format!(
            "Invalid or unusable codes: {}",
            resp.invalid_codes.join(", ")
        ))
    } else if applied_codes.is_empty() {
        Some(
            resp.message
                .clone()
                .unwrap_or_else(|| CANNOT_APPLY_MESSAGE.to_string()),
        )
    } else {
        None
    };

    Interpretation {
        final_amount: resp.final_amount,
        total_discount: resp.total_discount,
        applied_codes,
        error,
    }
}

/// Rounded per-test price for a package; 0 when the package has no quota.
pub fn price_per_test(price: i64, quota: i64) -> i64 {
    if quota <= 0 {
        return 0;
    }
    ((price as f64) / (quota as f64)).round() as i64
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomQuote {
    pub effective_qty: i64,
    pub total: i64,
    /// The entered quantity was below the floor and was raised to it.
    pub below_minimum: bool,
}

/// Custom quota purchases have a quantity floor; totals are always computed
/// against the effective quantity.
pub fn custom_quote(per_test: i64, quantity: i64) -> CustomQuote {
    let entered = quantity.max(0);
    let effective_qty = if entered > 0 {
        entered.max(MIN_CUSTOM_QTY)
    } else {
        MIN_CUSTOM_QTY
    };
    CustomQuote {
        effective_qty,
        total: per_test * effective_qty,
        below_minimum: entered < MIN_CUSTOM_QTY,
    }
}
