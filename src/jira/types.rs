use serde::{Deserialize, Serialize};

/// One issue as returned by Jira's search endpoint.
///
/// Every field is optional: the API can return partially-shaped records and
/// the mapper decides what to drop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawIssue {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub fields: Option<RawFields>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFields {
    #[serde(default)]
    pub summary: Option<String>,
    /// Plain string on older instances, an ADF document on REST v3.
    #[serde(default)]
    pub description: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<RawStatus>,
    #[serde(default)]
    pub assignee: Option<RawUser>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default, rename = "resolutiondate")]
    pub resolution_date: Option<String>,
    #[serde(default)]
    pub project: Option<RawProjectRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStatus {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProjectRef {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Page of `GET /rest/api/3/search/jql`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Decoded one record at a time so a single odd record cannot fail the page.
    #[serde(default)]
    pub issues: Vec<serde_json::Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub is_last: Option<bool>,
}

/// Entry of `GET /rest/api/3/project`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraProject {
    pub id: String,
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub project_type_key: Option<String>,
}

/// Error body Jira attaches to non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub error_messages: Vec<String>,
    #[serde(default)]
    pub errors: std::collections::BTreeMap<String, String>,
}

impl ErrorBody {
    pub fn describe(&self) -> Option<String> {
        let mut parts: Vec<String> = self.error_messages.clone();
        parts.extend(self.errors.iter().map(|(field, msg)| format!("{field}: {msg}")));
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}
