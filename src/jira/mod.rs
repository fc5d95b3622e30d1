pub mod rate_limit;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};
pub use types::{JiraProject, RawFields, RawIssue, RawProjectRef, RawStatus, RawUser};
use types::{ErrorBody, SearchResponse};

/// Fields requested on every issue search.
const ISSUE_FIELDS: &str = "summary,description,status,assignee,created,resolutiondate,project";

const DEFAULT_PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Issues returned by a search.
#[derive(Debug, Clone, Default)]
pub struct IssueBatch {
    pub issues: Vec<RawIssue>,
    /// Records that came back but did not decode as an issue.
    pub malformed: u64,
}

impl IssueBatch {
    /// Every record the source returned, decodable or not.
    pub fn fetched(&self) -> u64 {
        self.issues.len() as u64 + self.malformed
    }
}

impl From<Vec<RawIssue>> for IssueBatch {
    fn from(issues: Vec<RawIssue>) -> Self {
        Self {
            issues,
            malformed: 0,
        }
    }
}

/// Anything that can list raw issues for a JQL filter.
#[async_trait]
pub trait IssueSource: Send + Sync {
    async fn list_issues(&self, jql: &str) -> Result<IssueBatch>;
}

/// JQL selecting every issue of a project, newest first.
pub fn project_jql(project_key: &str) -> String {
    format!(
        "project=\"{}\" ORDER BY created DESC",
        escape_jql(project_key)
    )
}

/// JQL selecting the unresolved issues assigned to an account.
pub fn assignee_jql(account_id: &str) -> String {
    format!(
        "assignee=\"{}\" AND resolution=Unresolved ORDER BY created DESC",
        escape_jql(account_id)
    )
}

fn escape_jql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Minimal Jira Cloud REST v3 client (basic auth with an API token).
#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base_url: Url,
    email: String,
    api_token: String,
    page_size: u32,
}

impl JiraClient {
    pub fn new(base_url: &str, email: &str, api_token: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| Error::Config(format!("invalid Jira URL: {e}")))?;
        // Keep any context path (`https://host/jira`) when joining endpoint paths.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            email: email.to_string(),
            api_token: api_token.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Build a client from `JIRA_BASE_URL`, `JIRA_EMAIL` and `JIRA_API_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let base_url = require_env("JIRA_BASE_URL")?;
        let email = require_env("JIRA_EMAIL")?;
        let api_token = require_env("JIRA_API_TOKEN")?;
        Self::new(&base_url, &email, &api_token)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Run a JQL search and follow `nextPageToken` until the last page.
    pub async fn search(&self, jql: &str) -> Result<IssueBatch> {
        let mut batch = IssueBatch::default();
        let mut next_page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("jql", jql.to_string()),
                ("maxResults", self.page_size.to_string()),
                ("fields", ISSUE_FIELDS.to_string()),
            ];
            if let Some(ref token) = next_page_token {
                query.push(("nextPageToken", token.clone()));
            }

            let page: SearchResponse = self.get_json("rest/api/3/search/jql", &query).await?;
            let page_len = page.issues.len();
            for record in page.issues {
                match serde_json::from_value::<RawIssue>(record) {
                    Ok(issue) => batch.issues.push(issue),
                    Err(e) => {
                        log::debug!("Skipping undecodable issue record: {e}");
                        batch.malformed += 1;
                    }
                }
            }
            log::debug!("Fetched {page_len} issues ({} total) for `{jql}`", batch.fetched());

            match page.next_page_token {
                Some(token)
                    if !page.is_last.unwrap_or(false)
                        && page_len > 0
                        && next_page_token.as_deref() != Some(token.as_str()) =>
                {
                    next_page_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(batch)
    }

    /// List every project visible to the API user.
    pub async fn list_projects(&self) -> Result<Vec<JiraProject>> {
        self.get_json("rest/api/3/project", &[]).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid Jira endpoint {path}: {e}")))?;

        let mut attempt: u32 = 0;
        loop {
            let response = self
                .http
                .get(url.clone())
                .basic_auth(&self.email, Some(&self.api_token))
                .header(ACCEPT, "application/json")
                .query(query)
                .send()
                .await?;

            let status = response.status();
            if rate_limit::is_rate_limited(status) && attempt < rate_limit::MAX_RETRIES {
                let wait = rate_limit::retry_delay(attempt, response.headers().get(RETRY_AFTER));
                rate_limit::backoff_sleep(wait, attempt).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let detail = serde_json::from_str::<ErrorBody>(&body)
                    .ok()
                    .and_then(|b| b.describe())
                    .unwrap_or(body);
                return Err(Error::Api(format!(
                    "GET {path} returned {}: {detail}",
                    status.as_u16()
                )));
            }

            return Ok(response.json::<T>().await?);
        }
    }
}

#[async_trait]
impl IssueSource for JiraClient {
    async fn list_issues(&self, jql: &str) -> Result<IssueBatch> {
        self.search(jql).await
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(Error::Config(format!("{name} is not set"))),
    }
}
