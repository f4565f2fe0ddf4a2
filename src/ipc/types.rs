use serde::Deserialize;
use std::collections::HashMap;

use crate::bulk::ImportRow;
use crate::ledger::OrgQuotaPool;
use crate::reconcile::{CommitPlan, EditSession};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Snapshot-backed working state for one organization. Replaced on every
/// `session.load`; `stale` flips on after a completed commit to tell the UI
/// its snapshot no longer matches the backend ledger.
pub struct Session {
    pub org_id: i64,
    pub currency: String,
    pub pool: OrgQuotaPool,
    pub stale: bool,
    pub bulk_rows: Vec<ImportRow>,
    pub bulk_errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    /// Free-form numeric entry, clamped on set.
    Free,
    /// Stepper constrained to batch-size increments.
    Batch,
}

pub struct Edit {
    pub kind: EditKind,
    pub session: EditSession,
}

#[derive(Default)]
pub struct AppState {
    pub session: Option<Session>,
    pub edits: HashMap<String, Edit>,
    pub plans: HashMap<String, CommitPlan>,
}
