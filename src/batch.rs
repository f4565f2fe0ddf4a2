use serde::Serialize;

/// Fixed batch size for stepper-style allocation.
pub const BATCH_SIZE: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Increment,
    Decrement,
}

impl StepDirection {
    pub fn from_str(s: &str) -> Option<StepDirection> {
        match s {
            "increment" => Some(StepDirection::Increment),
            "decrement" => Some(StepDirection::Decrement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepError {
    /// Increment needs a full batch spare in the org pool.
    InsufficientQuota { remaining: i64 },
    /// Decrement below a full batch is never allowed; a pre-existing
    /// remainder stays put.
    BelowBatch { current: i64 },
}

/// A value set outside the batch UI (direct API write, historical data) can
/// arrive as a non-multiple of the batch size. Warn-only; never corrected.
pub fn off_batch_multiple(value: i64) -> bool {
    value % BATCH_SIZE != 0
}

/// Applies one stepper click against the current value and the live org
/// remaining for that skill. Returns the new value.
pub fn step(current: i64, direction: StepDirection, org_remaining: i64) -> Result<i64, StepError> {
    match direction {
        StepDirection::Increment => {
            if org_remaining < BATCH_SIZE {
                return Err(StepError::InsufficientQuota {
                    remaining: org_remaining,
                });
            }
            Ok(current + BATCH_SIZE)
        }
        StepDirection::Decrement => {
            if current < BATCH_SIZE {
                return Err(StepError::BelowBatch { current });
            }
            Ok((current - BATCH_SIZE).max(0))
        }
    }
}
