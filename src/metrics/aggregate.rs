use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::config::{self, EngineConfig};
use crate::error::{Error, Result};
use crate::metrics::cost;
use crate::metrics::types::{AggregateReport, AssigneePerformance, IssueAnalysis, RateUpdate};
use crate::storage::repository;
use crate::storage::Database;

/// Build an account's performance row from its completed issues.
///
/// `completed` must be non-empty and in scan order; name and email come from
/// its first entry.
pub fn summarize_assignee(
    account_id: &str,
    completed: &[IssueAnalysis],
    hourly_cost: f64,
    now: NaiveDateTime,
) -> AssigneePerformance {
    let times: Vec<f64> = completed.iter().filter_map(|i| i.time_taken_hours).collect();
    let scores: Vec<f64> = completed.iter().filter_map(|i| i.efficiency_score).collect();
    let first = completed.first();

    AssigneePerformance {
        account_id: account_id.to_string(),
        name: first.and_then(|i| i.assignee_name.clone()),
        email: first.and_then(|i| i.assignee_email.clone()),
        hourly_cost,
        total_issues_completed: completed.len() as u64,
        average_time_hours: mean(&times),
        average_efficiency_score: mean(&scores),
        total_cost_incurred: completed
            .iter()
            .filter_map(|i| i.total_cost)
            .fold(0.0, |acc, c| acc + c),
        last_updated_at: now,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Recompute every assignee's performance row from the stored issues.
///
/// Runs as one transaction on the writer. Accounts without a completed issue
/// get no row; existing rows keep their hourly cost.
pub async fn recalculate_all(db: &Database, config: &EngineConfig) -> Result<AggregateReport> {
    let default_rate = config.default_hourly_cost;
    let now = chrono::Local::now().naive_local();

    let report = db
        .writer()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let issues = repository::list_issue_analysis(&tx, None)?;

            let mut by_account: BTreeMap<String, Vec<IssueAnalysis>> = BTreeMap::new();
            for issue in issues {
                if let Some(account_id) = issue.assignee_account_id.clone() {
                    by_account.entry(account_id).or_default().push(issue);
                }
            }

            let mut report = AggregateReport::default();
            for (account_id, issues) in by_account {
                let completed: Vec<IssueAnalysis> =
                    issues.into_iter().filter(|i| i.is_completed()).collect();
                if completed.is_empty() {
                    report.assignees_skipped += 1;
                    continue;
                }

                let hourly_cost = repository::get_assignee_performance(&tx, &account_id)?
                    .map(|p| p.hourly_cost)
                    .unwrap_or(default_rate);
                let perf = summarize_assignee(&account_id, &completed, hourly_cost, now);
                repository::upsert_assignee_performance(&tx, &perf)?;
                report.assignees_updated += 1;
            }

            tx.commit()?;
            Ok::<_, rusqlite::Error>(report)
        })
        .await?;

    log::info!(
        "Recalculated {} assignees ({} without completed issues)",
        report.assignees_updated,
        report.assignees_skipped
    );
    Ok(report)
}

/// Change an account's hourly rate and reprice its issues that have a known time.
///
/// Efficiency scores and the aggregate row's totals are left as they are until
/// the next [`recalculate_all`].
pub async fn update_hourly_cost(db: &Database, account_id: &str, rate: f64) -> Result<RateUpdate> {
    config::validate_rate(rate)?;
    let now = chrono::Local::now().naive_local();

    let repriced: Option<u64> = db
        .writer()
        .call({
            let account_id = account_id.to_string();
            move |conn| {
                let tx = conn.transaction()?;
                if !repository::set_hourly_cost(&tx, &account_id, rate, now)? {
                    return Ok(None);
                }

                let mut repriced = 0;
                for issue in repository::list_issues_by_assignee(&tx, &account_id)? {
                    if issue.time_taken_hours.is_none() {
                        continue;
                    }
                    let total = cost::total_cost(Some(rate), issue.time_taken_hours);
                    repository::update_issue_cost(&tx, &issue.issue_key, rate, total)?;
                    repriced += 1;
                }

                tx.commit()?;
                Ok::<_, rusqlite::Error>(Some(repriced))
            }
        })
        .await?;

    match repriced {
        Some(issues_repriced) => {
            log::info!("Set hourly cost of {account_id} to {rate}; repriced {issues_repriced} issues");
            Ok(RateUpdate {
                account_id: account_id.to_string(),
                hourly_cost: rate,
                issues_repriced,
            })
        }
        None => Err(Error::UnknownAccount(account_id.to_string())),
    }
}
