use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exam {
    #[serde(rename = "IELTS")]
    Ielts,
    #[serde(rename = "TOEFL")]
    Toefl,
}

impl Exam {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exam::Ielts => "IELTS",
            Exam::Toefl => "TOEFL",
        }
    }

    pub fn from_str(s: &str) -> Option<Exam> {
        match s {
            "IELTS" => Some(Exam::Ielts),
            "TOEFL" => Some(Exam::Toefl),
            _ => None,
        }
    }
}

/// Skill labels and test_type_id assignments as used by the backend quota
/// service. The label order is the display order of the allocation editor,
/// which is also the canonical iteration order for diff operations.
const IELTS_SKILLS: &[(i64, &str)] = &[
    (2, "Reading"),
    (1, "Listening"),
    (3, "Writing"),
    (4, "Speaking"),
    (5, "Complete"),
];

const TOEFL_SKILLS: &[(i64, &str)] = &[
    (3, "Reading"),
    (1, "Listening"),
    (2, "Structure & Written Expression"),
    (4, "Complete"),
];

pub fn skills(exam: Exam) -> &'static [(i64, &'static str)] {
    match exam {
        Exam::Ielts => IELTS_SKILLS,
        Exam::Toefl => TOEFL_SKILLS,
    }
}

pub fn skill_label(exam: Exam, test_type_id: i64) -> Option<&'static str> {
    skills(exam)
        .iter()
        .find(|(id, _)| *id == test_type_id)
        .map(|(_, label)| *label)
}

pub fn type_id_for_label(exam: Exam, label: &str) -> Option<i64> {
    skills(exam)
        .iter()
        .find(|(_, l)| *l == label)
        .map(|(id, _)| *id)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SkillQuota {
    #[serde(default)]
    pub topup: i64,
    #[serde(default)]
    pub used: i64,
    #[serde(default)]
    pub remaining: i64,
}

/// One exam's slice of the organization quota summary, as returned by the
/// backend. `per_type` is keyed by stringified test_type_id on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPool {
    #[serde(default)]
    pub total_topup: i64,
    #[serde(default)]
    pub total_used: i64,
    #[serde(default)]
    pub total_remaining: i64,
    #[serde(default)]
    pub per_type: HashMap<String, SkillQuota>,
}

/// Read-only snapshot of the organization-wide quota pool, fetched per
/// editing session. Local mutation only previews availability; the backend
/// ledger stays the source of truth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgQuotaPool {
    #[serde(default)]
    pub ielts: ExamPool,
    #[serde(default)]
    pub toefl: ExamPool,
}

impl OrgQuotaPool {
    pub fn exam(&self, exam: Exam) -> &ExamPool {
        match exam {
            Exam::Ielts => &self.ielts,
            Exam::Toefl => &self.toefl,
        }
    }

    fn exam_mut(&mut self, exam: Exam) -> &mut ExamPool {
        match exam {
            Exam::Ielts => &mut self.ielts,
            Exam::Toefl => &mut self.toefl,
        }
    }

    /// Remaining balance for one (exam, skill); 0 when the skill is absent
    /// from the snapshot.
    pub fn remaining(&self, exam: Exam, test_type_id: i64) -> i64 {
        self.exam(exam)
            .per_type
            .get(&test_type_id.to_string())
            .map(|q| q.remaining)
            .unwrap_or(0)
    }

    /// Consumes from the local preview copy. Used by the bulk-import
    /// simulation; never pushed back to the backend.
    pub fn deduct(&mut self, exam: Exam, test_type_id: i64, amount: i64) {
        let entry = self
            .exam_mut(exam)
            .per_type
            .entry(test_type_id.to_string())
            .or_default();
        entry.remaining -= amount;
    }

    /// Share of an exam's topup still unspent, clamped to [0, 100].
    pub fn quota_percent(&self, exam: Exam) -> f64 {
        let e = self.exam(exam);
        if e.total_topup <= 0 {
            return 0.0;
        }
        let pct = 100.0 * (e.total_remaining as f64) / (e.total_topup as f64);
        pct.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaValue {
    pub count: i64,
    pub expiry: Option<NaiveDate>,
}

/// Member rows carry quota values in two shapes: a bare number (legacy) or a
/// `{count, expiry}` object (current). Everything past this function only
/// ever sees `QuotaValue`.
pub fn normalize_quota_value(v: &serde_json::Value) -> QuotaValue {
    if let Some(n) = v.as_i64() {
        return QuotaValue {
            count: n.max(0),
            expiry: None,
        };
    }
    if let Some(obj) = v.as_object() {
        let count = obj.get("count").and_then(|c| c.as_i64()).unwrap_or(0).max(0);
        let expiry = obj
            .get("expiry")
            .and_then(|e| e.as_str())
            .and_then(parse_expiry);
        return QuotaValue { count, expiry };
    }
    QuotaValue::default()
}

// Accepts plain dates and ISO datetimes; anything else reads as no expiry.
// `get` keeps the prefix slice char-boundary safe for non-ASCII input.
fn parse_expiry(s: &str) -> Option<NaiveDate> {
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// A student's currently allocated, unconsumed attempts per (exam, skill).
#[derive(Debug, Clone, Default)]
pub struct StudentAllocation {
    values: HashMap<(Exam, i64), QuotaValue>,
}

impl StudentAllocation {
    /// Ingests the member record's `quotas` object
    /// (`{IELTS: {label: value}, TOEFL: {label: value}}`). Unrecognized exam
    /// or skill labels are skipped; values normalize through
    /// [`normalize_quota_value`].
    pub fn from_json(v: &serde_json::Value) -> StudentAllocation {
        let mut values = HashMap::new();
        let Some(obj) = v.as_object() else {
            return StudentAllocation { values };
        };
        for (exam_key, exam_val) in obj {
            let Some(exam) = Exam::from_str(exam_key) else {
                continue;
            };
            let Some(exam_obj) = exam_val.as_object() else {
                continue;
            };
            for (label, raw) in exam_obj {
                let Some(type_id) = type_id_for_label(exam, label) else {
                    continue;
                };
                values.insert((exam, type_id), normalize_quota_value(raw));
            }
        }
        StudentAllocation { values }
    }

    pub fn count(&self, exam: Exam, test_type_id: i64) -> i64 {
        self.values
            .get(&(exam, test_type_id))
            .map(|v| v.count)
            .unwrap_or(0)
    }

    pub fn expiry(&self, exam: Exam, test_type_id: i64) -> Option<NaiveDate> {
        self.values.get(&(exam, test_type_id)).and_then(|v| v.expiry)
    }
}
