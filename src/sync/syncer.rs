use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::jira::{self, IssueSource};
use crate::metrics::aggregate;
use crate::metrics::cost;
use crate::metrics::types::IssueAnalysis;
use crate::storage::repository;
use crate::storage::Database;
use crate::sync::mapper;
use crate::sync::{SyncProgress, SyncReport, SyncStatus};

/// Fetch, map, price and upsert every issue of a project, then recompute
/// all assignee aggregates.
///
/// The pass is logged in `sync_runs`: the row is opened before the fetch and
/// closed as `success` or `failed`. A fetch failure returns the error without
/// touching issue or performance rows.
pub async fn sync_project(
    db: &Database,
    source: &dyn IssueSource,
    project_key: &str,
    config: &EngineConfig,
    progress: &dyn SyncProgress,
) -> Result<SyncReport> {
    let run_id = db
        .writer()
        .call({
            let project_key = project_key.to_string();
            move |conn| repository::insert_sync_run(conn, &project_key)
        })
        .await?;

    let outcome = apply_project(db, source, project_key, config, progress).await;

    let (status, counts, error) = match &outcome {
        Ok(report) => (
            SyncStatus::Success,
            (report.issues_fetched, report.issues_synced, report.issues_skipped),
            None,
        ),
        Err(e) => (SyncStatus::Failed, (0, 0, 0), Some(e.to_string())),
    };
    db.writer()
        .call({
            let project_key = project_key.to_string();
            move |conn| {
                let (fetched, synced, skipped) = counts;
                repository::finish_sync_run(
                    conn,
                    run_id,
                    status.as_str(),
                    fetched,
                    synced,
                    skipped,
                    error.as_deref(),
                )?;
                if status == SyncStatus::Success {
                    repository::update_monitored_project_sync_time(conn, &project_key)?;
                }
                Ok::<(), rusqlite::Error>(())
            }
        })
        .await?;

    outcome
}

async fn apply_project(
    db: &Database,
    source: &dyn IssueSource,
    project_key: &str,
    config: &EngineConfig,
    progress: &dyn SyncProgress,
) -> Result<SyncReport> {
    let batch = source.list_issues(&jira::project_jql(project_key)).await?;
    let issues_fetched = batch.fetched();
    progress.on_issues_fetched(project_key, issues_fetched as usize);
    log::info!("Fetched {issues_fetched} issues for {project_key}");

    let synced_at = chrono::Local::now().naive_local();
    let issues: Vec<IssueAnalysis> = batch
        .issues
        .iter()
        .filter_map(|raw| mapper::map_issue(raw, synced_at))
        .collect();
    let issues_synced = issues.len() as u64;
    let issues_skipped = issues_fetched - issues_synced;
    if issues_skipped > 0 {
        log::debug!("Skipped {issues_skipped} malformed records for {project_key}");
    }

    let engine_config = config.clone();
    db.writer()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // History is the stored completed set with this batch laid over it
            // (batch rows replace stored rows by key), so re-running a batch
            // scores identically.
            let batch_keys: HashSet<String> = issues.iter().map(|i| i.issue_key.clone()).collect();
            let mut batch_completed: HashMap<String, Vec<IssueAnalysis>> = HashMap::new();
            for issue in issues.iter().filter(|i| i.is_completed()) {
                if let Some(ref account_id) = issue.assignee_account_id {
                    batch_completed
                        .entry(account_id.clone())
                        .or_default()
                        .push(issue.clone());
                }
            }

            let mut histories: HashMap<String, (Option<f64>, Vec<IssueAnalysis>)> =
                HashMap::new();
            for mut issue in issues {
                let (stored_rate, history) = match issue.assignee_account_id.clone() {
                    Some(account_id) => {
                        if !histories.contains_key(&account_id) {
                            let stored_rate =
                                repository::get_assignee_performance(&tx, &account_id)?
                                    .map(|p| p.hourly_cost);
                            let mut merged: BTreeMap<String, IssueAnalysis> =
                                repository::list_completed_issues_by_assignee(&tx, &account_id)?
                                    .into_iter()
                                    .filter(|i| !batch_keys.contains(&i.issue_key))
                                    .map(|i| (i.issue_key.clone(), i))
                                    .collect();
                            if let Some(batch) = batch_completed.get(&account_id) {
                                merged.extend(batch.iter().map(|i| (i.issue_key.clone(), i.clone())));
                            }
                            histories.insert(
                                account_id.clone(),
                                (stored_rate, merged.into_values().collect()),
                            );
                        }
                        histories
                            .get(&account_id)
                            .map(|(rate, history)| (*rate, history.as_slice()))
                            .unwrap_or((None, &[][..]))
                    }
                    None => (None, &[][..]),
                };

                cost::apply(&mut issue, stored_rate, history, &engine_config);
                repository::upsert_issue_analysis(&tx, &issue)?;
            }

            tx.commit()?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;

    let aggregates = aggregate::recalculate_all(db, config).await?;

    log::info!("Synced {issues_synced} issues for {project_key}");

    Ok(SyncReport {
        project_key: project_key.to_string(),
        status: SyncStatus::Success,
        issues_fetched,
        issues_synced,
        issues_skipped,
        assignees_updated: aggregates.assignees_updated,
        error: None,
    })
}

/// Sync every monitored project in turn. A failing project yields a `Failed`
/// report and does not stop the rest.
pub async fn sync_all(
    db: &Database,
    source: &dyn IssueSource,
    config: &EngineConfig,
    progress: &dyn SyncProgress,
) -> Result<Vec<SyncReport>> {
    let projects = db
        .reader()
        .call(|conn| repository::list_monitored_projects(conn))
        .await?;

    let total = projects.len();
    let mut reports = Vec::with_capacity(total);
    for (i, project) in projects.iter().enumerate() {
        progress.on_project_start(&project.project_key, i, total);

        let report = match sync_project(db, source, &project.project_key, config, progress).await
        {
            Ok(report) => report,
            Err(e) => {
                log::error!("Failed to sync {}: {e}", project.project_key);
                SyncReport::failed(&project.project_key, e.to_string())
            }
        };
        progress.on_project_complete(&report);
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::jira::{IssueBatch, RawIssue};
    use crate::sync::NoopProgress;
    use crate::test_support::raw_issue;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory issue source that records the JQL it was asked for.
    struct FakeSource {
        issues: Mutex<Vec<RawIssue>>,
        malformed: u64,
        delay: Option<Duration>,
        fail: bool,
        queries: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn new(issues: Vec<RawIssue>) -> Self {
            Self {
                issues: Mutex::new(issues),
                malformed: 0,
                delay: None,
                fail: false,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }

        fn replace(&self, issues: Vec<RawIssue>) {
            *self.issues.lock().unwrap() = issues;
        }
    }

    #[async_trait]
    impl IssueSource for FakeSource {
        async fn list_issues(&self, jql: &str) -> Result<IssueBatch> {
            self.queries.lock().unwrap().push(jql.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(Error::Api("GET rest/api/3/search/jql returned 503".into()));
            }
            Ok(IssueBatch {
                issues: self.issues.lock().unwrap().clone(),
                malformed: self.malformed,
            })
        }
    }

    async fn all_issues(db: &Database) -> Vec<IssueAnalysis> {
        db.reader()
            .call(|conn| repository::list_issue_analysis(conn, None))
            .await
            .unwrap()
    }

    fn without_sync_time(mut issues: Vec<IssueAnalysis>) -> Vec<IssueAnalysis> {
        let epoch = chrono::NaiveDateTime::default();
        for issue in &mut issues {
            issue.last_synced_at = epoch;
        }
        issues
    }

    fn sample_batch() -> Vec<RawIssue> {
        vec![
            raw_issue(
                "MW-1",
                Some("acc-1"),
                Some("2024-01-10T09:00:00.000+0000"),
                Some("2024-01-10T11:00:00.000+0000"),
            ),
            raw_issue(
                "MW-2",
                Some("acc-1"),
                Some("2024-01-11T09:00:00.000+0000"),
                Some("2024-01-11T15:00:00.000+0000"),
            ),
            raw_issue("MW-3", Some("acc-2"), Some("2024-01-12T09:00:00.000+0000"), None),
            raw_issue("MW-4", None, Some("2024-01-12T09:00:00.000+0000"), None),
        ]
    }

    #[tokio::test]
    async fn test_sync_project_writes_rows_and_aggregates() {
        let db = Database::open_memory().await.unwrap();
        let source = FakeSource::new(sample_batch());

        let report = sync_project(&db, &source, "MW", &EngineConfig::default(), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(report.status, SyncStatus::Success);
        assert_eq!(report.issues_fetched, 4);
        assert_eq!(report.issues_synced, 4);
        assert_eq!(report.issues_skipped, 0);
        assert_eq!(report.assignees_updated, 1);
        assert_eq!(
            source.queries.lock().unwrap().as_slice(),
            ["project=\"MW\" ORDER BY created DESC"]
        );

        let issues = all_issues(&db).await;
        assert_eq!(issues.len(), 4);

        // MW-1 (2h) against MW-2 (6h): faster than average, capped.
        assert_eq!(issues[0].time_taken_hours, Some(2.0));
        assert_eq!(issues[0].assignee_hourly_cost, Some(50.0));
        assert_eq!(issues[0].total_cost, Some(100.0));
        assert_eq!(issues[0].efficiency_score, Some(1.0));
        // MW-2 (6h) against MW-1 (2h).
        assert_eq!(issues[1].efficiency_score, Some(2.0 / 6.0));
        // Open issue: default rate recorded, nothing else derived.
        assert_eq!(issues[2].assignee_hourly_cost, Some(50.0));
        assert_eq!(issues[2].total_cost, None);
        assert_eq!(issues[2].efficiency_score, None);
        // Unassigned.
        assert_eq!(issues[3].assignee_hourly_cost, None);

        let perf = db
            .reader()
            .call(|conn| repository::list_assignee_performance(conn))
            .await
            .unwrap();
        // acc-2 has no completed issue and gets no row.
        assert_eq!(perf.len(), 1);
        assert_eq!(perf[0].account_id, "acc-1");
        assert_eq!(perf[0].total_issues_completed, 2);
        assert_eq!(perf[0].average_time_hours, 4.0);
        assert_eq!(perf[0].total_cost_incurred, 400.0);

        let runs = db
            .reader()
            .call(|conn| repository::list_recent_sync_runs(conn, 5))
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "success");
        assert_eq!(runs[0].issues_synced, 4);
    }

    #[tokio::test]
    async fn test_sync_project_is_idempotent() {
        let db = Database::open_memory().await.unwrap();
        let source = FakeSource::new(sample_batch());
        let config = EngineConfig::default();

        sync_project(&db, &source, "MW", &config, &NoopProgress).await.unwrap();
        let first = without_sync_time(all_issues(&db).await);

        sync_project(&db, &source, "MW", &config, &NoopProgress).await.unwrap();
        let second = without_sync_time(all_issues(&db).await);

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_mw12_scenario() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_assignee_performance(
                    conn,
                    &crate::test_support::performance("acc-1", 40.0),
                )
            })
            .await
            .unwrap();

        let source = FakeSource::new(vec![raw_issue(
            "MW-12",
            Some("acc-1"),
            Some("2024-01-15T10:30:00.000Z"),
            Some("2024-01-15T13:00:00.000Z"),
        )]);
        sync_project(&db, &source, "MW", &EngineConfig::default(), &NoopProgress)
            .await
            .unwrap();

        let issue = db
            .reader()
            .call(|conn| repository::get_issue_analysis(conn, "MW-12"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(issue.time_taken_hours, Some(2.5));
        assert_eq!(issue.assignee_hourly_cost, Some(40.0));
        assert_eq!(issue.total_cost, Some(100.0));
        assert_eq!(issue.efficiency_score, Some(0.5));
    }

    #[tokio::test]
    async fn test_null_key_is_dropped() {
        let db = Database::open_memory().await.unwrap();
        let mut malformed = raw_issue("MW-9", Some("acc-1"), None, None);
        malformed.key = None;
        let source = FakeSource::new(vec![malformed, RawIssue::default()]);

        let report = sync_project(&db, &source, "MW", &EngineConfig::default(), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(report.status, SyncStatus::Success);
        assert_eq!(report.issues_fetched, 2);
        assert_eq!(report.issues_synced, 0);
        assert_eq!(report.issues_skipped, 2);
        assert!(all_issues(&db).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_data_untouched() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| repository::add_monitored_project(conn, "MW", None))
            .await
            .unwrap();
        let source = FakeSource::failing();

        let err = sync_project(&db, &source, "MW", &EngineConfig::default(), &NoopProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(_)));

        assert!(all_issues(&db).await.is_empty());
        let (runs, projects, perf) = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((
                    repository::list_recent_sync_runs(conn, 5)?,
                    repository::list_monitored_projects(conn)?,
                    repository::list_assignee_performance(conn)?,
                ))
            })
            .await
            .unwrap();
        assert!(perf.is_empty());
        assert!(projects[0].last_sync_at.is_none());

        // The failed pass is still logged, with the error.
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "failed");
        assert!(runs[0].completed_at.is_some());
        assert_eq!(runs[0].issues_fetched, 0);
        assert!(runs[0].error_message.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_sync_run_spans_the_fetch() {
        let db = Database::open_memory().await.unwrap();
        let source = FakeSource {
            delay: Some(Duration::from_millis(1100)),
            ..FakeSource::new(sample_batch())
        };

        sync_project(&db, &source, "MW", &EngineConfig::default(), &NoopProgress)
            .await
            .unwrap();

        let runs = db
            .reader()
            .call(|conn| repository::list_recent_sync_runs(conn, 5))
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "success");
        assert!(runs[0].error_message.is_none());
        // Both are `YYYY-MM-DD HH:MM:SS`, so text order is time order.
        let completed_at = runs[0].completed_at.as_deref().unwrap();
        assert!(runs[0].started_at.as_str() < completed_at);
    }

    #[tokio::test]
    async fn test_undecodable_records_count_as_skipped() {
        let db = Database::open_memory().await.unwrap();
        let source = FakeSource {
            malformed: 2,
            ..FakeSource::new(sample_batch())
        };

        let report = sync_project(&db, &source, "MW", &EngineConfig::default(), &NoopProgress)
            .await
            .unwrap();
        assert_eq!(report.issues_fetched, 6);
        assert_eq!(report.issues_synced, 4);
        assert_eq!(report.issues_skipped, 2);
        assert_eq!(all_issues(&db).await.len(), 4);
    }

    #[tokio::test]
    async fn test_resync_uses_current_rate() {
        let db = Database::open_memory().await.unwrap();
        let source = FakeSource::new(sample_batch());
        let config = EngineConfig::default();

        sync_project(&db, &source, "MW", &config, &NoopProgress).await.unwrap();
        aggregate::update_hourly_cost(&db, "acc-1", 90.0).await.unwrap();
        sync_project(&db, &source, "MW", &config, &NoopProgress).await.unwrap();

        let issues = all_issues(&db).await;
        assert_eq!(issues[0].assignee_hourly_cost, Some(90.0));
        assert_eq!(issues[0].total_cost, Some(180.0));
        // acc-2 still has no performance row, so the default applies.
        assert_eq!(issues[2].assignee_hourly_cost, Some(50.0));
    }

    #[tokio::test]
    async fn test_resync_reflects_upstream_changes() {
        let db = Database::open_memory().await.unwrap();
        let source = FakeSource::new(sample_batch());
        let config = EngineConfig::default();
        sync_project(&db, &source, "MW", &config, &NoopProgress).await.unwrap();

        // MW-2 is reopened upstream: it leaves MW-1's history.
        let mut batch = sample_batch();
        batch[1] = raw_issue("MW-2", Some("acc-1"), Some("2024-01-11T09:00:00.000+0000"), None);
        source.replace(batch);
        sync_project(&db, &source, "MW", &config, &NoopProgress).await.unwrap();

        let issues = all_issues(&db).await;
        assert_eq!(issues[0].efficiency_score, Some(0.5));
        assert_eq!(issues[1].resolved_at, None);
        assert_eq!(issues[1].total_cost, None);
        assert_eq!(issues[1].efficiency_score, None);
    }

    #[tokio::test]
    async fn test_sync_all_continues_after_failure() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::add_monitored_project(conn, "MW", Some("Middleware"))?;
                repository::add_monitored_project(conn, "OPS", None)?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let reports = sync_all(&db, &FakeSource::failing(), &EngineConfig::default(), &NoopProgress)
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status == SyncStatus::Failed));
        assert!(reports.iter().all(|r| r.error.is_some()));

        let source = FakeSource::new(sample_batch());
        let reports = sync_all(&db, &source, &EngineConfig::default(), &NoopProgress)
            .await
            .unwrap();
        assert!(reports.iter().all(|r| r.status == SyncStatus::Success));
        assert_eq!(source.queries.lock().unwrap().len(), 2);
    }
}
