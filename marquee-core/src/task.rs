use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable delayed-release record, armed in the same transaction that
/// creates its booking. One task per booking, keyed by booking id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseTask {
    pub booking_id: Uuid,
    /// Earliest instant the release step may run.
    pub run_at: DateTime<Utc>,
    pub state: TaskState,
    pub attempts: i32,
    /// Last state change; `Running` rows stuck past a threshold are swept
    /// back to `Armed`.
    pub updated_at: DateTime<Utc>,
}

/// `Armed -> Running -> Done`; a failed run re-arms with backoff, and a
/// `Running` task whose runner died is swept back to `Armed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskState {
    Armed,
    Running,
    Done,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Armed => "ARMED",
            TaskState::Running => "RUNNING",
            TaskState::Done => "DONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ARMED" => Some(TaskState::Armed),
            "RUNNING" => Some(TaskState::Running),
            "DONE" => Some(TaskState::Done),
            _ => None,
        }
    }
}
