pub mod config;
pub mod date_util;
pub mod error;
pub mod jira;
pub mod keys;
pub mod llm;
pub mod metrics;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use jira::{IssueBatch, IssueSource, JiraClient, JiraProject};
pub use llm::{Answer, AnswerSource, LlmSettings, QueryContext, QueryService};
pub use metrics::{AggregateReport, AssigneePerformance, IssueAnalysis, RateUpdate};
pub use storage::Database;
pub use sync::{NoopProgress, SyncProgress, SyncReport, SyncStatus};

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::{MonitoredProject, SyncRun};

use serde::Serialize;
use storage::repository;
use sync::{mapper, syncer};

/// Config keys accepted by [`JiraPerf::config_set`].
pub const CONFIG_KEYS: &[&str] = &[
    config::DEFAULT_HOURLY_COST_KEY,
    "llm_provider",
    "llm_model",
    "llm_server_url",
    "llm_timeout_secs",
];

/// Counts shown by `jiraperf status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub issues_total: u64,
    pub issues_completed: u64,
    pub assignees: u64,
    pub monitored_projects: Vec<MonitoredProject>,
    pub recent_runs: Vec<SyncRun>,
}

/// Main entry point: Jira sync plus cost and efficiency analysis.
pub struct JiraPerf {
    db: Database,
    source: Option<Box<dyn IssueSource>>,
}

impl JiraPerf {
    /// An engine without a remote source. Sync operations fail until one is set.
    pub fn new(db: Database) -> Self {
        Self { db, source: None }
    }

    pub fn with_source(mut self, source: Box<dyn IssueSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    fn source(&self) -> Result<&dyn IssueSource> {
        self.source.as_deref().ok_or_else(|| {
            Error::Config(
                "Jira is not configured. Set JIRA_BASE_URL, JIRA_EMAIL and JIRA_API_TOKEN".into(),
            )
        })
    }

    pub async fn engine_config(&self) -> Result<EngineConfig> {
        EngineConfig::load(&self.db).await
    }

    // ── Sync commands ──────────────────────────────────────────────

    /// Sync one project, given its key or a Jira URL.
    pub async fn sync_project(
        &self,
        identifier: &str,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        let project_key = keys::resolve_project_key(identifier)?;
        let config = self.engine_config().await?;
        progress.on_project_start(&project_key, 0, 1);
        let report =
            syncer::sync_project(&self.db, self.source()?, &project_key, &config, progress).await?;
        progress.on_project_complete(&report);
        Ok(report)
    }

    pub async fn sync_all(&self, progress: &dyn SyncProgress) -> Result<Vec<SyncReport>> {
        let config = self.engine_config().await?;
        syncer::sync_all(&self.db, self.source()?, &config, progress).await
    }

    /// Fetch an account's unresolved issues from Jira without storing them.
    pub async fn preview_assignee_issues(&self, account_id: &str) -> Result<Vec<IssueAnalysis>> {
        let batch = self
            .source()?
            .list_issues(&jira::assignee_jql(account_id))
            .await?;
        let now = chrono::Local::now().naive_local();
        Ok(batch
            .issues
            .iter()
            .filter_map(|r| mapper::map_issue(r, now))
            .collect())
    }

    // ── Aggregates ─────────────────────────────────────────────────

    pub async fn recalculate_all(&self) -> Result<AggregateReport> {
        let config = self.engine_config().await?;
        metrics::aggregate::recalculate_all(&self.db, &config).await
    }

    pub async fn update_hourly_cost(&self, account_id: &str, rate: f64) -> Result<RateUpdate> {
        metrics::aggregate::update_hourly_cost(&self.db, account_id, rate).await
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub async fn get_analysis(&self, project: Option<&str>) -> Result<Vec<IssueAnalysis>> {
        let project_key = project.map(keys::resolve_project_key).transpose()?;
        let issues = self
            .db
            .reader()
            .call(move |conn| repository::list_issue_analysis(conn, project_key.as_deref()))
            .await?;
        Ok(issues)
    }

    pub async fn get_performance(&self) -> Result<Vec<AssigneePerformance>> {
        let rows = self
            .db
            .reader()
            .call(|conn| repository::list_assignee_performance(conn))
            .await?;
        Ok(rows)
    }

    pub async fn build_query_context(&self, project: Option<&str>) -> Result<QueryContext> {
        let project_key = project.map(keys::resolve_project_key).transpose()?;
        llm::build_query_context(&self.db, project_key.as_deref()).await
    }

    // ── Questions ──────────────────────────────────────────────────

    /// Ask the configured query service about the current data.
    ///
    /// Falls back to the local summary when the service cannot be reached or
    /// cannot be constructed (missing cloud credentials).
    pub async fn ask(&self, prompt: &str, project: Option<&str>) -> Result<Answer> {
        let settings = LlmSettings::load(&self.db).await?;
        let context = self.build_query_context(project).await?;

        match llm::create_query_service(&settings).await {
            Ok(service) => {
                Ok(llm::ask_with_fallback(service.as_ref(), prompt, &context, settings.timeout).await)
            }
            Err(e @ Error::Config(_)) => Err(e),
            Err(e) => {
                log::warn!("Query service unavailable, using fallback: {e}");
                Ok(Answer {
                    text: llm::fallback::summarize(prompt, &context),
                    source: AnswerSource::Fallback,
                })
            }
        }
    }

    /// Ask a specific query service (used by tests and embedding callers).
    pub async fn ask_with(
        &self,
        service: &dyn QueryService,
        prompt: &str,
        project: Option<&str>,
    ) -> Result<Answer> {
        let settings = LlmSettings::load(&self.db).await?;
        let context = self.build_query_context(project).await?;
        Ok(llm::ask_with_fallback(service, prompt, &context, settings.timeout).await)
    }

    // ── Monitor commands ───────────────────────────────────────────

    pub async fn monitor_add(&self, identifier: &str, display_name: Option<&str>) -> Result<String> {
        let project_key = keys::resolve_project_key(identifier)?;
        self.db
            .writer()
            .call({
                let project_key = project_key.clone();
                let display_name = display_name.map(str::to_string);
                move |conn| {
                    repository::add_monitored_project(conn, &project_key, display_name.as_deref())
                }
            })
            .await?;
        Ok(project_key)
    }

    pub async fn monitor_remove(&self, identifier: &str) -> Result<bool> {
        let project_key = keys::resolve_project_key(identifier)?;
        let removed = self
            .db
            .writer()
            .call(move |conn| repository::remove_monitored_project(conn, &project_key))
            .await?;
        Ok(removed)
    }

    pub async fn monitor_list(&self) -> Result<Vec<MonitoredProject>> {
        let projects = self
            .db
            .reader()
            .call(|conn| repository::list_monitored_projects(conn))
            .await?;
        Ok(projects)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await?;
        Ok(value)
    }

    /// Store a config value after checking the key is known and the value parses.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        validate_config(key, value)?;
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.trim().to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await?;
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        let entries = self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?;
        Ok(entries)
    }

    // ── Status ─────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<StatusReport> {
        let report = self
            .db
            .reader()
            .call(|conn| {
                let (issues_total, issues_completed) = repository::count_issue_analysis(conn)?;
                let assignees = repository::list_assignee_performance(conn)?.len() as u64;
                Ok::<_, rusqlite::Error>(StatusReport {
                    issues_total,
                    issues_completed,
                    assignees,
                    monitored_projects: repository::list_monitored_projects(conn)?,
                    recent_runs: repository::list_recent_sync_runs(conn, 10)?,
                })
            })
            .await?;
        Ok(report)
    }
}

fn validate_config(key: &str, value: &str) -> Result<()> {
    match key {
        config::DEFAULT_HOURLY_COST_KEY => config::parse_rate(value).map(|_| ()),
        "llm_provider" => match value.trim() {
            "http" | "bedrock" | "anthropic" => Ok(()),
            other => Err(Error::InvalidInput(format!(
                "llm_provider must be http, bedrock or anthropic (got {other})"
            ))),
        },
        "llm_timeout_secs" => value
            .trim()
            .parse::<u64>()
            .map(|_| ())
            .map_err(|_| Error::InvalidInput(format!("llm_timeout_secs must be whole seconds (got {value})"))),
        "llm_model" => llm::agent::AgentModel::parse(value)
            .map(|_| ())
            .map_err(|e| Error::InvalidInput(e.to_string())),
        "llm_server_url" => Ok(()),
        other => Err(Error::InvalidInput(format!(
            "unknown config key: {other} (known keys: {})",
            CONFIG_KEYS.join(", ")
        ))),
    }
}
