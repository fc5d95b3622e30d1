//! Fixtures shared by the unit tests.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::jira::{RawFields, RawIssue, RawProjectRef, RawStatus, RawUser};
use crate::keys;
use crate::metrics::types::{AssigneePerformance, IssueAnalysis};

pub fn created_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

pub fn synced_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 2, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// An in-progress issue, optionally assigned.
pub fn open_issue(key: &str, account_id: Option<&str>) -> IssueAnalysis {
    IssueAnalysis {
        issue_key: key.to_string(),
        project_key: keys::project_key_from_issue_key(key)
            .unwrap_or(keys::UNKNOWN_PROJECT)
            .to_string(),
        summary: Some(format!("Summary of {key}")),
        description: None,
        status: Some("In Progress".to_string()),
        assignee_account_id: account_id.map(str::to_string),
        assignee_name: account_id.map(|id| format!("Name {id}")),
        assignee_email: account_id.map(|id| format!("{id}@example.com")),
        created_at: Some(created_at()),
        resolved_at: None,
        time_taken_hours: None,
        assignee_hourly_cost: None,
        total_cost: None,
        efficiency_score: None,
        last_synced_at: synced_at(),
    }
}

/// A resolved issue that took `hours` (minute resolution).
pub fn completed_issue(key: &str, account_id: Option<&str>, hours: f64) -> IssueAnalysis {
    let minutes = (hours * 60.0).round() as i64;
    IssueAnalysis {
        status: Some("Done".to_string()),
        resolved_at: Some(created_at() + Duration::minutes(minutes)),
        time_taken_hours: Some(hours),
        ..open_issue(key, account_id)
    }
}

pub fn performance(account_id: &str, hourly_cost: f64) -> AssigneePerformance {
    AssigneePerformance {
        account_id: account_id.to_string(),
        name: Some(format!("Name {account_id}")),
        email: Some(format!("{account_id}@example.com")),
        hourly_cost,
        total_issues_completed: 0,
        average_time_hours: 0.0,
        average_efficiency_score: 0.0,
        total_cost_incurred: 0.0,
        last_updated_at: synced_at(),
    }
}

/// A raw Jira record as returned by the search endpoint.
pub fn raw_issue(
    key: &str,
    account_id: Option<&str>,
    created: Option<&str>,
    resolved: Option<&str>,
) -> RawIssue {
    RawIssue {
        id: Some(format!("id-{key}")),
        key: Some(key.to_string()),
        fields: Some(RawFields {
            summary: Some(format!("Summary of {key}")),
            description: None,
            status: Some(RawStatus {
                name: Some(if resolved.is_some() { "Done" } else { "To Do" }.to_string()),
            }),
            assignee: account_id.map(|id| RawUser {
                account_id: Some(id.to_string()),
                display_name: Some(format!("Name {id}")),
                email_address: Some(format!("{id}@example.com")),
            }),
            created: created.map(str::to_string),
            resolution_date: resolved.map(str::to_string),
            project: keys::project_key_from_issue_key(key).map(|k| RawProjectRef {
                key: Some(k.to_string()),
                name: None,
            }),
        }),
    }
}
