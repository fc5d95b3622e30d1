use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Fallback project key for issues whose key carries no `-` prefix.
pub const UNKNOWN_PROJECT: &str = "UNKNOWN";

static RE_PROJECT_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]+$").unwrap());
static RE_ISSUE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][A-Z0-9_]+)-\d+$").unwrap());

pub fn is_project_key(s: &str) -> bool {
    RE_PROJECT_KEY.is_match(s)
}

/// Project key derived from an issue key: the part before the first `-`.
///
/// Returns `None` when the key has no `-` or starts with one.
pub fn project_key_from_issue_key(issue_key: &str) -> Option<&str> {
    match issue_key.split_once('-') {
        Some((prefix, _)) if !prefix.is_empty() => Some(prefix),
        _ => None,
    }
}

/// Accept a project key (`MW`, `mw`), an issue key (`MW-12`), or a Jira URL
/// and return the normalized project key.
///
/// Supported URL patterns:
/// - `https://<site>.atlassian.net/browse/MW-12`
/// - `https://<site>.atlassian.net/browse/MW`
/// - `https://<site>.atlassian.net/jira/software/projects/MW/boards/1`
/// - `https://<site>.atlassian.net/jira/software/c/projects/MW/issues`
/// - `https://<site>.atlassian.net/projects/MW`
pub fn resolve_project_key(input: &str) -> Result<String> {
    let input = input.trim();
    if input.contains("://") {
        return parse_jira_url(input);
    }

    let upper = input.to_ascii_uppercase();
    if is_project_key(&upper) {
        return Ok(upper);
    }
    if let Some(caps) = RE_ISSUE_KEY.captures(&upper) {
        return Ok(caps[1].to_string());
    }
    Err(Error::InvalidProjectKey(input.to_string()))
}

fn parse_jira_url(input: &str) -> Result<String> {
    let url = url::Url::parse(input)
        .map_err(|e| Error::InvalidProjectKey(format!("{input}: {e}")))?;

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    // /browse/<KEY> or /browse/<KEY>-<n>
    if let Some(pos) = segments.iter().position(|s| *s == "browse") {
        if let Some(target) = segments.get(pos + 1) {
            let upper = target.to_ascii_uppercase();
            if let Some(caps) = RE_ISSUE_KEY.captures(&upper) {
                return Ok(caps[1].to_string());
            }
            if is_project_key(&upper) {
                return Ok(upper);
            }
        }
    }

    // .../projects/<KEY>/...
    if let Some(pos) = segments.iter().position(|s| *s == "projects") {
        if let Some(target) = segments.get(pos + 1) {
            let upper = target.to_ascii_uppercase();
            if is_project_key(&upper) {
                return Ok(upper);
            }
        }
    }

    Err(Error::InvalidProjectKey(format!(
        "no project key in URL: {input}"
    )))
}
