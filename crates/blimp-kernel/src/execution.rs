//! Execution records and their status state machine.
//!
//! ```text
//!   pending ──► running ──► completed
//!      │           │
//!      └───────────┴──────► failed
//! ```
//!
//! `completed` and `failed` are terminal. No edge re-enters `pending` or
//! `running`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KernelError, Result};

/// Lifecycle state of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Convert to the string stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from the string stored in SQLite.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Validate `self -> next`.
    pub fn check_transition(&self, next: ExecutionStatus) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(KernelError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution id (UUID v7), generated fresh per request.
    pub id: String,
    pub user_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    /// Caller-supplied parameters, passed through to the handler.
    pub parameters: serde_json::Value,
    /// Handler output on success, structured error detail on failure.
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// A fresh `pending` record with a new execution id.
    pub fn pending(
        user_id: impl Into<String>,
        workflow_id: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            parameters,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ExecutionStatus; 4] = [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
    ];

    #[test]
    fn allowed_edges() {
        use ExecutionStatus::*;
        let allowed: Vec<(ExecutionStatus, ExecutionStatus)> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            allowed,
            vec![
                (Pending, Running),
                (Pending, Failed),
                (Running, Completed),
                (Running, Failed)
            ]
        );
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [ExecutionStatus::Completed, ExecutionStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn nothing_reenters_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(ExecutionStatus::Pending));
        }
        let err = ExecutionStatus::Running
            .check_transition(ExecutionStatus::Pending)
            .unwrap_err();
        assert!(err.to_string().contains("running -> pending"));
    }

    #[test]
    fn parse_matches_as_str() {
        for status in ALL {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ExecutionStatus::parse("cancelled"), None);
    }

    #[test]
    fn pending_records_get_distinct_ids() {
        let a = ExecutionRecord::pending("u", "wf", serde_json::json!({}));
        let b = ExecutionRecord::pending("u", "wf", serde_json::json!({}));
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, ExecutionStatus::Pending);
        assert!(a.result.is_none());
    }
}
