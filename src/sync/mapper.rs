use chrono::NaiveDateTime;
use serde_json::Value;

use crate::date_util::{hours_between, parse_remote_timestamp};
use crate::jira::RawIssue;
use crate::keys::{self, UNKNOWN_PROJECT};
use crate::metrics::types::IssueAnalysis;

/// ADF node types rendered on their own line.
const BLOCK_NODES: &[&str] = &[
    "paragraph",
    "heading",
    "blockquote",
    "codeBlock",
    "listItem",
    "tableRow",
    "panel",
    "rule",
];

/// Map a raw Jira record onto an analysis row.
///
/// Records without a key or a field block are dropped (`None`). Cost,
/// rate and efficiency are left empty for the calculator to fill.
pub fn map_issue(raw: &RawIssue, synced_at: NaiveDateTime) -> Option<IssueAnalysis> {
    let issue_key = raw.key.as_deref().map(str::trim).filter(|k| !k.is_empty());
    let (Some(issue_key), Some(fields)) = (issue_key, raw.fields.as_ref()) else {
        log::debug!(
            "Dropping malformed issue record (id={:?}, key={:?})",
            raw.id,
            raw.key
        );
        return None;
    };

    let project_key = fields
        .project
        .as_ref()
        .and_then(|p| p.key.as_deref())
        .filter(|k| !k.is_empty())
        .or_else(|| keys::project_key_from_issue_key(issue_key))
        .unwrap_or(UNKNOWN_PROJECT)
        .to_string();

    let created_at = parse_remote_timestamp(fields.created.as_deref());
    let resolved_at = parse_remote_timestamp(fields.resolution_date.as_deref());
    let time_taken_hours = match (created_at, resolved_at) {
        (Some(created), Some(resolved)) => Some(hours_between(created, resolved)),
        _ => None,
    };

    let assignee = fields
        .assignee
        .as_ref()
        .filter(|a| a.account_id.as_deref().is_some_and(|id| !id.is_empty()));

    Some(IssueAnalysis {
        issue_key: issue_key.to_string(),
        project_key,
        summary: fields.summary.clone(),
        description: fields.description.as_ref().and_then(description_text),
        status: fields.status.as_ref().and_then(|s| s.name.clone()),
        assignee_account_id: assignee.and_then(|a| a.account_id.clone()),
        assignee_name: assignee.and_then(|a| a.display_name.clone()),
        assignee_email: assignee.and_then(|a| a.email_address.clone()),
        created_at,
        resolved_at,
        time_taken_hours,
        assignee_hourly_cost: None,
        total_cost: None,
        efficiency_score: None,
        last_synced_at: synced_at,
    })
}

/// Plain text of a description that is either a string or an ADF document.
///
/// Strings are kept verbatim. Flattened ADF is trimmed, and a document with
/// no text maps to `None`.
pub fn description_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => {
            let mut out = String::new();
            flatten_adf(value, &mut out);
            let trimmed = out.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn flatten_adf(node: &Value, out: &mut String) {
    let node_type = node.get("type").and_then(Value::as_str).unwrap_or("");
    match node_type {
        "text" => {
            if let Some(text) = node.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        "hardBreak" => out.push('\n'),
        "mention" | "emoji" => {
            if let Some(text) = node
                .get("attrs")
                .and_then(|a| a.get("text"))
                .and_then(Value::as_str)
            {
                out.push_str(text);
            }
        }
        _ => {}
    }

    if let Some(children) = node.get("content").and_then(Value::as_array) {
        for child in children {
            flatten_adf(child, out);
        }
    }

    if BLOCK_NODES.contains(&node_type) && !out.ends_with('\n') {
        out.push('\n');
    }
}
