use chrono::NaiveDateTime;
use serde::Serialize;

/// Per-issue analysis row, keyed by `issue_key`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueAnalysis {
    pub issue_key: String,
    pub project_key: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub assignee_account_id: Option<String>,
    pub assignee_name: Option<String>,
    pub assignee_email: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    /// Set once the issue reaches a resolved state upstream.
    pub resolved_at: Option<NaiveDateTime>,
    pub time_taken_hours: Option<f64>,
    /// Rate used the last time cost was computed for this row.
    pub assignee_hourly_cost: Option<f64>,
    pub total_cost: Option<f64>,
    /// In [0.0, 1.0].
    pub efficiency_score: Option<f64>,
    pub last_synced_at: NaiveDateTime,
}

impl IssueAnalysis {
    pub fn is_completed(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Per-assignee aggregate row, keyed by `account_id`.
///
/// Everything except `hourly_cost` is derived from the account's completed
/// issues and rewritten on every aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssigneePerformance {
    pub account_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub hourly_cost: f64,
    pub total_issues_completed: u64,
    pub average_time_hours: f64,
    pub average_efficiency_score: f64,
    pub total_cost_incurred: f64,
    pub last_updated_at: NaiveDateTime,
}

/// Outcome of a full aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    /// Accounts whose performance row was created or rewritten.
    pub assignees_updated: u64,
    /// Accounts seen on issues but without any completed issue.
    pub assignees_skipped: u64,
}

/// Outcome of an hourly rate change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateUpdate {
    pub account_id: String,
    pub hourly_cost: f64,
    /// Issue rows whose cost was recomputed.
    pub issues_repriced: u64,
}
