use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::Result;
use crate::metrics::types::{AssigneePerformance, IssueAnalysis};
use crate::storage::repository;
use crate::storage::Database;

/// Snapshot of analysis and performance data handed to the query service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryContext {
    pub issues: Vec<ContextIssue>,
    pub assignees: Vec<ContextAssignee>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextIssue {
    pub issue_key: String,
    pub project_key: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub assignee_name: Option<String>,
    pub assignee_email: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub resolved_at: Option<NaiveDateTime>,
    pub time_taken_hours: Option<f64>,
    pub total_cost: Option<f64>,
    pub efficiency_score: Option<f64>,
}

impl ContextIssue {
    pub fn is_completed(&self) -> bool {
        self.resolved_at.is_some()
    }
}

impl From<IssueAnalysis> for ContextIssue {
    fn from(issue: IssueAnalysis) -> Self {
        Self {
            issue_key: issue.issue_key,
            project_key: issue.project_key,
            summary: issue.summary,
            description: issue.description,
            assignee_name: issue.assignee_name,
            assignee_email: issue.assignee_email,
            status: issue.status,
            created_at: issue.created_at,
            resolved_at: issue.resolved_at,
            time_taken_hours: issue.time_taken_hours,
            total_cost: issue.total_cost,
            efficiency_score: issue.efficiency_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAssignee {
    pub account_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub hourly_cost: f64,
    pub total_issues_completed: u64,
    pub average_time_hours: f64,
    pub average_efficiency_score: f64,
    pub total_cost_incurred: f64,
}

impl From<AssigneePerformance> for ContextAssignee {
    fn from(perf: AssigneePerformance) -> Self {
        Self {
            account_id: perf.account_id,
            name: perf.name,
            email: perf.email,
            hourly_cost: perf.hourly_cost,
            total_issues_completed: perf.total_issues_completed,
            average_time_hours: perf.average_time_hours,
            average_efficiency_score: perf.average_efficiency_score,
            total_cost_incurred: perf.total_cost_incurred,
        }
    }
}

impl QueryContext {
    pub fn new(issues: Vec<IssueAnalysis>, assignees: Vec<AssigneePerformance>) -> Self {
        Self {
            issues: issues.into_iter().map(ContextIssue::from).collect(),
            assignees: assignees.into_iter().map(ContextAssignee::from).collect(),
        }
    }
}

/// Read the issues (optionally one project's) and every assignee row.
pub async fn build_query_context(db: &Database, project_key: Option<&str>) -> Result<QueryContext> {
    let project_key = project_key.map(str::to_string);
    let (issues, assignees) = db
        .reader()
        .call(move |conn| {
            let issues = repository::list_issue_analysis(conn, project_key.as_deref())?;
            let assignees = repository::list_assignee_performance(conn)?;
            Ok::<_, rusqlite::Error>((issues, assignees))
        })
        .await?;
    Ok(QueryContext::new(issues, assignees))
}
