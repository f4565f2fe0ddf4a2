use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::ledger::{skill_label, skills, Exam, OrgQuotaPool};

/// Recognized quota columns in the import spreadsheet, in template order.
const QUOTA_COLUMNS: &[(&str, Exam, i64)] = &[
    ("ielts_listening", Exam::Ielts, 1),
    ("ielts_reading", Exam::Ielts, 2),
    ("ielts_writing", Exam::Ielts, 3),
    ("ielts_speaking", Exam::Ielts, 4),
    ("toefl_listening", Exam::Toefl, 1),
    ("toefl_structure", Exam::Toefl, 2),
    ("toefl_reading", Exam::Toefl, 3),
];

#[derive(Debug, Clone, Serialize)]
pub struct QuotaRequest {
    pub test_name: Exam,
    pub test_type_id: i64,
    pub quota: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_language: Option<String>,
    pub quotas: Vec<QuotaRequest>,
    /// 1-based spreadsheet row, counting the header as row 1.
    #[serde(rename = "_excelRow")]
    pub excel_row: usize,
    #[serde(rename = "_quotaOk")]
    pub quota_ok: bool,
    #[serde(rename = "_quotaIssues")]
    pub quota_issues: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub rows: Vec<ImportRow>,
    /// Per-row parse failures; they drop the row but never abort the file.
    pub errors: Vec<String>,
}

/// Spreadsheet headers arrive in whatever casing/spacing the template editor
/// left them in. `"IELTS Listening "` and `"ielts_listening"` are the same
/// column.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut pending_sep = false;
    for c in key.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

fn parse_quota_cell(v: Option<&Value>, field: &str) -> Result<i64> {
    let Some(v) = v else {
        return Ok(0);
    };
    let n = match v {
        Value::Null => return Ok(0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| anyhow!("{field} must be a number"))?,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(0);
            }
            t.parse::<f64>()
                .map_err(|_| anyhow!("{field} must be a number"))?
        }
        _ => return Err(anyhow!("{field} must be a number")),
    };
    if !n.is_finite() {
        return Err(anyhow!("{field} must be a number"));
    }
    if n < 0.0 {
        return Err(anyhow!("{field} must not be negative"));
    }
    Ok(n.trunc() as i64)
}

fn quotas_from_row(rn: &HashMap<String, Value>) -> Result<Vec<QuotaRequest>> {
    let mut quotas = Vec::new();
    for (key, exam, type_id) in QUOTA_COLUMNS {
        let q = parse_quota_cell(rn.get(*key), key)?;
        if q > 0 {
            quotas.push(QuotaRequest {
                test_name: *exam,
                test_type_id: *type_id,
                quota: q,
            });
        }
    }
    Ok(quotas)
}

fn text_field(rn: &HashMap<String, Value>, key: &str) -> Option<String> {
    let v = rn.get(key)?;
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_one(rn: &HashMap<String, Value>, excel_row: usize) -> Result<ImportRow> {
    let name = text_field(rn, "name");
    let username = text_field(rn, "username");
    let email = text_field(rn, "email");
    let (Some(name), Some(username), Some(email)) = (name, username, email) else {
        return Err(anyhow!("name, username, email are required"));
    };

    let quotas = quotas_from_row(rn)?;
    if quotas.is_empty() {
        return Err(anyhow!("at least one quota must be > 0"));
    }

    Ok(ImportRow {
        name,
        username,
        email,
        phone: text_field(rn, "phone"),
        nationality: text_field(rn, "nationality"),
        country_origin: text_field(rn, "country_origin"),
        first_language: text_field(rn, "first_language"),
        quotas,
        excel_row,
        quota_ok: true,
        quota_issues: Vec::new(),
    })
}

/// Parses raw spreadsheet rows (one JSON object per data row). Malformed
/// rows are reported and skipped; the rest continue.
pub fn parse_rows(raw_rows: &[Value]) -> ParseOutcome {
    let mut out = ParseOutcome::default();
    for (idx, raw) in raw_rows.iter().enumerate() {
        // Header is spreadsheet row 1, first data row is 2.
        let excel_row = idx + 2;
        let Some(obj) = raw.as_object() else {
            out.errors.push(format!("Row {excel_row}: row must be an object"));
            continue;
        };
        let mut rn: HashMap<String, Value> = HashMap::new();
        for (k, v) in obj {
            rn.insert(normalize_key(k), v.clone());
        }
        match parse_one(&rn, excel_row) {
            Ok(row) => out.rows.push(row),
            Err(e) => out.errors.push(format!("Row {excel_row}: {e}")),
        }
    }
    out
}

/// First-come-first-served simulation against one shared pool copy. Rows are
/// checked in file order; only a fully-valid row consumes its totals before
/// the next row is evaluated.
pub fn validate_rows(rows: &mut [ImportRow], pool: &OrgQuotaPool) {
    let mut remaining = pool.clone();

    for row in rows.iter_mut() {
        // A row can list the same skill twice; demand is the summed total.
        let mut need: Vec<((Exam, i64), i64)> = Vec::new();
        for q in &row.quotas {
            let key = (q.test_name, q.test_type_id);
            match need.iter_mut().find(|(k, _)| *k == key) {
                Some((_, total)) => *total += q.quota,
                None => need.push((key, q.quota)),
            }
        }

        let mut issues = Vec::new();
        for ((exam, type_id), total) in &need {
            let Some(label) = skill_label(*exam, *type_id) else {
                issues.push(format!(
                    "{} type_id {} not recognized",
                    exam.as_str(),
                    type_id
                ));
                continue;
            };
            let avail = remaining.remaining(*exam, *type_id);
            if *total > avail {
                issues.push(format!(
                    "{} {} requested {}, remaining {}",
                    exam.as_str(),
                    label,
                    total,
                    avail
                ));
            }
        }

        row.quota_ok = issues.is_empty();
        row.quota_issues = issues;

        if row.quota_ok {
            for ((exam, type_id), total) in need {
                remaining.deduct(exam, type_id, total);
            }
        }
    }
}

/// Unconditional per-skill demand across ALL rows, valid or not. This is the
/// "what you asked for in total" view and can legitimately disagree with the
/// sequential simulation above.
pub fn compute_demand(rows: &[ImportRow]) -> HashMap<(Exam, i64), i64> {
    let mut demand = HashMap::new();
    for row in rows {
        for q in &row.quotas {
            if skill_label(q.test_name, q.test_type_id).is_none() {
                continue;
            }
            *demand.entry((q.test_name, q.test_type_id)).or_insert(0) += q.quota;
        }
    }
    demand
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryLine {
    pub label: String,
    pub need: i64,
    pub avail: i64,
    pub after: i64,
    pub is_bad: bool,
}

/// Requested-vs-remaining table rows, one per skill in canonical order,
/// keeping only skills with any demand or any balance.
pub fn summary_lines(
    demand: &HashMap<(Exam, i64), i64>,
    pool: &OrgQuotaPool,
) -> Vec<SummaryLine> {
    let mut lines = Vec::new();
    for exam in [Exam::Ielts, Exam::Toefl] {
        for (type_id, label) in skills(exam) {
            let need = demand.get(&(exam, *type_id)).copied().unwrap_or(0);
            let avail = pool.remaining(exam, *type_id);
            if need == 0 && avail == 0 {
                continue;
            }
            lines.push(SummaryLine {
                label: format!("{} {}", exam.as_str(), label),
                need,
                avail,
                after: avail - need,
                is_bad: need > avail,
            });
        }
    }
    lines
}

pub fn has_over_quota(rows: &[ImportRow]) -> bool {
    rows.iter().any(|r| !r.quota_ok)
}

/// Backend bulk-add-members body. Refuses while any row is still flagged;
/// the batch submits whole or not at all.
pub fn build_payload(rows: &[ImportRow]) -> Result<Value> {
    if rows.is_empty() {
        return Err(anyhow!("no rows to submit"));
    }
    if has_over_quota(rows) {
        return Err(anyhow!("some rows exceed the organization quota"));
    }
    let users: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "name": r.name,
                "username": r.username,
                "email": r.email,
                "phone": r.phone,
                "nationality": r.nationality,
                "country_origin": r.country_origin,
                "first_language": r.first_language,
                "quotas": r.quotas,
                "currency": "IDR",
            })
        })
        .collect();
    Ok(json!({ "users": users }))
}

/// Short display label for one quota request, e.g. `IELTS Listening: 3`.
pub fn quota_label(q: &QuotaRequest) -> String {
    match skill_label(q.test_name, q.test_type_id) {
        Some(label) => format!("{} {}: {}", q.test_name.as_str(), label, q.quota),
        None => format!("{} type {}: {}", q.test_name.as_str(), q.test_type_id, q.quota),
    }
}
