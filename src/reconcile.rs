use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::ledger::{skills, Exam, OrgQuotaPool, StudentAllocation};

/// Clamps a requested per-student quota value. A student can always be
/// reduced to 0, and can grow by at most what the organization currently has
/// spare on top of what this student already holds.
pub fn clamp(edited: i64, original_student: i64, org_available: i64) -> i64 {
    edited.max(0).min(original_student + org_available)
}

/// Live "remaining for others" figure while editing, before commit.
pub fn remaining_after_edit(org_available: i64, original_student: i64, edited: i64) -> i64 {
    (org_available - (edited - original_student)).max(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Allocate,
    Revoke,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub exam: Exam,
    pub test_type_id: i64,
    pub direction: Direction,
    pub amount: i64,
}

/// One in-progress quota edit for a single student. Holds the original
/// allocation and the edited counts; everything else derives from those.
#[derive(Debug, Clone)]
pub struct EditSession {
    pub user_id: i64,
    original: StudentAllocation,
    edited: HashMap<(Exam, i64), i64>,
}

impl EditSession {
    pub fn new(user_id: i64, original: StudentAllocation) -> EditSession {
        let mut edited = HashMap::new();
        for exam in [Exam::Ielts, Exam::Toefl] {
            for (type_id, _) in skills(exam) {
                edited.insert((exam, *type_id), original.count(exam, *type_id));
            }
        }
        EditSession {
            user_id,
            original,
            edited,
        }
    }

    pub fn original_count(&self, exam: Exam, test_type_id: i64) -> i64 {
        self.original.count(exam, test_type_id)
    }

    pub fn current(&self, exam: Exam, test_type_id: i64) -> i64 {
        self.edited
            .get(&(exam, test_type_id))
            .copied()
            .unwrap_or(0)
    }

    /// Org remaining for one skill, adjusted live for this session's
    /// uncommitted delta.
    pub fn remaining(&self, pool: &OrgQuotaPool, exam: Exam, test_type_id: i64) -> i64 {
        remaining_after_edit(
            pool.remaining(exam, test_type_id),
            self.original_count(exam, test_type_id),
            self.current(exam, test_type_id),
        )
    }

    /// Applies a requested value, clamped against org availability. Returns
    /// the value actually stored and the post-edit remaining.
    pub fn set(
        &mut self,
        pool: &OrgQuotaPool,
        exam: Exam,
        test_type_id: i64,
        value: i64,
    ) -> (i64, i64) {
        let original = self.original_count(exam, test_type_id);
        let available = pool.remaining(exam, test_type_id);
        let safe = clamp(value, original, available);
        self.edited.insert((exam, test_type_id), safe);
        (safe, remaining_after_edit(available, original, safe))
    }

    /// Stores a value without clamping. The batch policy validates steps
    /// itself before calling this.
    pub fn set_raw(&mut self, exam: Exam, test_type_id: i64, value: i64) {
        self.edited.insert((exam, test_type_id), value.max(0));
    }

    pub fn total(&self, exam: Exam) -> i64 {
        skills(exam)
            .iter()
            .map(|(id, _)| self.current(exam, *id))
            .sum()
    }

    /// One operation per nonzero delta, iterating exams and skills in
    /// canonical order so the sequence is deterministic.
    pub fn diff_ops(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        for exam in [Exam::Ielts, Exam::Toefl] {
            for (type_id, _) in skills(exam) {
                let old = self.original_count(exam, *type_id);
                let new = self.current(exam, *type_id);
                let diff = new - old;
                if diff == 0 {
                    continue;
                }
                ops.push(Operation {
                    exam,
                    test_type_id: *type_id,
                    direction: if diff > 0 {
                        Direction::Allocate
                    } else {
                        Direction::Revoke
                    },
                    amount: diff.abs(),
                });
            }
        }
        ops
    }
}

/// An ordered operation list with a cursor. The caller sends one operation
/// per network call, strictly sequentially, acking or failing each. A failure
/// freezes the cursor: the first `cursor` ops are committed server-side, the
/// rest were never attempted, and the plan can only be inspected afterwards.
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub id: String,
    pub user_id: i64,
    pub admin_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    ops: Vec<Operation>,
    cursor: usize,
    failure: Option<String>,
}

impl CommitPlan {
    pub fn new(user_id: i64, admin_id: Option<i64>, ops: Vec<Operation>) -> CommitPlan {
        CommitPlan {
            id: Uuid::new_v4().to_string(),
            user_id,
            admin_id,
            created_at: Utc::now(),
            ops,
            cursor: 0,
            failure: None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.failure.is_some()
    }

    pub fn is_done(&self) -> bool {
        self.failure.is_none() && self.cursor >= self.ops.len()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// The operation the caller should send next, if any.
    pub fn next_op(&self) -> Option<&Operation> {
        if self.is_frozen() {
            return None;
        }
        self.ops.get(self.cursor)
    }

    /// Marks the current operation as committed server-side.
    pub fn ack(&mut self) -> bool {
        if self.is_frozen() || self.cursor >= self.ops.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Records a failed operation and freezes the cursor permanently.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.cursor < self.ops.len() && self.failure.is_none() {
            self.failure = Some(message.into());
        }
    }

    pub fn completed_ops(&self) -> &[Operation] {
        &self.ops[..self.cursor]
    }

    pub fn remaining_ops(&self) -> &[Operation] {
        &self.ops[self.cursor..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pool(writing_remaining: i64) -> OrgQuotaPool {
        serde_json::from_value(json!({
            "ielts": {
                "totalTopup": 20,
                "totalRemaining": writing_remaining,
                "perType": {"3": {"remaining": writing_remaining}}
            },
            "toefl": {}
        }))
        .unwrap()
    }

    #[test]
    fn clamp_stays_in_range() {
        for org in 0..6 {
            for orig in 0..6 {
                for edited in -10..16 {
                    let v = clamp(edited, orig, org);
                    assert!(v >= 0);
                    assert!(v <= orig + org);
                }
            }
        }
        assert_eq!(clamp(10, 2, 3), 5);
        assert_eq!(clamp(-4, 2, 3), 0);
    }

    #[test]
    fn remaining_after_edit_never_negative() {
        assert_eq!(remaining_after_edit(3, 2, 5), 0);
        assert_eq!(remaining_after_edit(3, 2, 10), 0);
        assert_eq!(remaining_after_edit(3, 2, 0), 5);
        assert_eq!(remaining_after_edit(0, 0, 0), 0);
    }

    #[test]
    fn unchanged_session_emits_no_ops() {
        let alloc = StudentAllocation::from_json(&json!({
            "IELTS": {"Writing": 2, "Reading": {"count": 1, "expiry": null}}
        }));
        let session = EditSession::new(7, alloc);
        assert!(session.diff_ops().is_empty());
    }

    #[test]
    fn writing_scenario_clamps_then_emits_single_allocate() {
        let pool = pool(3);
        let alloc = StudentAllocation::from_json(&json!({"IELTS": {"Writing": 2}}));
        let mut session = EditSession::new(7, alloc);

        let (value, remaining) = session.set(&pool, Exam::Ielts, 3, 10);
        assert_eq!(value, 5);
        assert_eq!(remaining, 0);

        let ops = session.diff_ops();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].exam, Exam::Ielts);
        assert_eq!(ops[0].test_type_id, 3);
        assert_eq!(ops[0].direction, Direction::Allocate);
        assert_eq!(ops[0].amount, 3);
    }

    #[test]
    fn diff_is_reversible_per_skill() {
        let pool = pool(10);
        let alloc = StudentAllocation::from_json(&json!({
            "IELTS": {"Writing": 4, "Reading": 2}
        }));
        let mut session = EditSession::new(7, alloc);
        session.set(&pool, Exam::Ielts, 3, 9);
        session.set(&pool, Exam::Ielts, 2, 0);

        for op in session.diff_ops() {
            let signed = match op.direction {
                Direction::Allocate => op.amount,
                Direction::Revoke => -op.amount,
            };
            assert_eq!(
                session.original_count(op.exam, op.test_type_id) + signed,
                session.current(op.exam, op.test_type_id)
            );
        }
    }

    #[test]
    fn diff_order_follows_canonical_skill_order() {
        let alloc = StudentAllocation::from_json(&json!({}));
        let mut session = EditSession::new(7, alloc);
        // Edit out of order; ops must still come back Reading (2) before
        // Writing (3) per the IELTS display order.
        session.set_raw(Exam::Ielts, 3, 1);
        session.set_raw(Exam::Ielts, 2, 1);

        let ops = session.diff_ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].test_type_id, 2);
        assert_eq!(ops[1].test_type_id, 3);
    }

    #[test]
    fn plan_cursor_freezes_on_failure() {
        let ops = vec![
            Operation {
                exam: Exam::Ielts,
                test_type_id: 2,
                direction: Direction::Allocate,
                amount: 1,
            },
            Operation {
                exam: Exam::Ielts,
                test_type_id: 3,
                direction: Direction::Revoke,
                amount: 2,
            },
        ];
        let mut plan = CommitPlan::new(7, None, ops);
        assert!(plan.ack());
        plan.fail("backend 500");

        assert!(plan.is_frozen());
        assert!(!plan.is_done());
        assert_eq!(plan.completed_ops().len(), 1);
        assert_eq!(plan.remaining_ops().len(), 1);
        assert_eq!(plan.failure(), Some("backend 500"));
        assert!(plan.next_op().is_none());
        assert!(!plan.ack());
    }

    #[test]
    fn plan_completes_after_all_acks() {
        let ops = vec![Operation {
            exam: Exam::Toefl,
            test_type_id: 4,
            direction: Direction::Allocate,
            amount: 5,
        }];
        let mut plan = CommitPlan::new(7, Some(1), ops);
        assert!(!plan.is_done());
        assert!(plan.next_op().is_some());
        assert!(plan.ack());
        assert!(plan.is_done());
        assert!(plan.next_op().is_none());
    }
}
