use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::metrics::types::{AssigneePerformance, IssueAnalysis};

// ── Issue Analysis ─────────────────────────────────────────────────

const ISSUE_COLUMNS: &str = "issue_key, project_key, summary, description, status,
    assignee_account_id, assignee_name, assignee_email,
    created_at, resolved_at, time_taken_hours,
    assignee_hourly_cost, total_cost, efficiency_score, last_synced_at";

/// Insert or fully replace the analysis row for `issue.issue_key`.
///
/// Every mutable column is overwritten with the new values, including NULLs:
/// a re-synced issue never keeps stale fields from a previous pass.
pub fn upsert_issue_analysis(
    conn: &Connection,
    issue: &IssueAnalysis,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO issue_analysis (
            issue_key, project_key, summary, description, status,
            assignee_account_id, assignee_name, assignee_email,
            created_at, resolved_at, time_taken_hours,
            assignee_hourly_cost, total_cost, efficiency_score, last_synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(issue_key) DO UPDATE SET
            project_key=excluded.project_key, summary=excluded.summary,
            description=excluded.description, status=excluded.status,
            assignee_account_id=excluded.assignee_account_id,
            assignee_name=excluded.assignee_name, assignee_email=excluded.assignee_email,
            created_at=excluded.created_at, resolved_at=excluded.resolved_at,
            time_taken_hours=excluded.time_taken_hours,
            assignee_hourly_cost=excluded.assignee_hourly_cost,
            total_cost=excluded.total_cost, efficiency_score=excluded.efficiency_score,
            last_synced_at=excluded.last_synced_at",
        params![
            issue.issue_key,
            issue.project_key,
            issue.summary,
            issue.description,
            issue.status,
            issue.assignee_account_id,
            issue.assignee_name,
            issue.assignee_email,
            issue.created_at,
            issue.resolved_at,
            issue.time_taken_hours,
            issue.assignee_hourly_cost,
            issue.total_cost,
            issue.efficiency_score,
            issue.last_synced_at,
        ],
    )?;
    Ok(())
}

pub fn get_issue_analysis(
    conn: &Connection,
    issue_key: &str,
) -> Result<Option<IssueAnalysis>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {ISSUE_COLUMNS} FROM issue_analysis WHERE issue_key = ?1"),
        params![issue_key],
        issue_from_row,
    )
    .optional()
}

/// All analysis rows, optionally restricted to one project, ordered by issue key.
pub fn list_issue_analysis(
    conn: &Connection,
    project_key: Option<&str>,
) -> Result<Vec<IssueAnalysis>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ISSUE_COLUMNS} FROM issue_analysis
         WHERE (?1 IS NULL OR project_key = ?1)
         ORDER BY issue_key"
    ))?;
    let rows = stmt.query_map(params![project_key], issue_from_row)?;
    rows.collect()
}

pub fn list_issues_by_assignee(
    conn: &Connection,
    account_id: &str,
) -> Result<Vec<IssueAnalysis>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ISSUE_COLUMNS} FROM issue_analysis
         WHERE assignee_account_id = ?1
         ORDER BY issue_key"
    ))?;
    let rows = stmt.query_map(params![account_id], issue_from_row)?;
    rows.collect()
}

/// Issues of `account_id` that have a resolved timestamp, ordered by issue key.
pub fn list_completed_issues_by_assignee(
    conn: &Connection,
    account_id: &str,
) -> Result<Vec<IssueAnalysis>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ISSUE_COLUMNS} FROM issue_analysis
         WHERE assignee_account_id = ?1 AND resolved_at IS NOT NULL
         ORDER BY issue_key"
    ))?;
    let rows = stmt.query_map(params![account_id], issue_from_row)?;
    rows.collect()
}

/// Overwrite the cost snapshot of a single issue.
pub fn update_issue_cost(
    conn: &Connection,
    issue_key: &str,
    hourly_cost: f64,
    total_cost: Option<f64>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE issue_analysis SET assignee_hourly_cost = ?2, total_cost = ?3
         WHERE issue_key = ?1",
        params![issue_key, hourly_cost, total_cost],
    )?;
    Ok(())
}

/// `(total, completed)` analysis row counts.
pub fn count_issue_analysis(conn: &Connection) -> Result<(u64, u64), rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*), COUNT(resolved_at) FROM issue_analysis",
        [],
        |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
    )
}

fn issue_from_row(row: &Row<'_>) -> Result<IssueAnalysis, rusqlite::Error> {
    Ok(IssueAnalysis {
        issue_key: row.get(0)?,
        project_key: row.get(1)?,
        summary: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        assignee_account_id: row.get(5)?,
        assignee_name: row.get(6)?,
        assignee_email: row.get(7)?,
        created_at: row.get(8)?,
        resolved_at: row.get(9)?,
        time_taken_hours: row.get(10)?,
        assignee_hourly_cost: row.get(11)?,
        total_cost: row.get(12)?,
        efficiency_score: row.get(13)?,
        last_synced_at: row.get(14)?,
    })
}

// ── Assignee Performance ───────────────────────────────────────────

const PERFORMANCE_COLUMNS: &str = "account_id, name, email, hourly_cost,
    total_issues_completed, average_time_hours, average_efficiency_score,
    total_cost_incurred, last_updated_at";

pub fn upsert_assignee_performance(
    conn: &Connection,
    perf: &AssigneePerformance,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO assignee_performance (
            account_id, name, email, hourly_cost,
            total_issues_completed, average_time_hours, average_efficiency_score,
            total_cost_incurred, last_updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(account_id) DO UPDATE SET
            name=excluded.name, email=excluded.email, hourly_cost=excluded.hourly_cost,
            total_issues_completed=excluded.total_issues_completed,
            average_time_hours=excluded.average_time_hours,
            average_efficiency_score=excluded.average_efficiency_score,
            total_cost_incurred=excluded.total_cost_incurred,
            last_updated_at=excluded.last_updated_at",
        params![
            perf.account_id,
            perf.name,
            perf.email,
            perf.hourly_cost,
            perf.total_issues_completed as i64,
            perf.average_time_hours,
            perf.average_efficiency_score,
            perf.total_cost_incurred,
            perf.last_updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_assignee_performance(
    conn: &Connection,
    account_id: &str,
) -> Result<Option<AssigneePerformance>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {PERFORMANCE_COLUMNS} FROM assignee_performance WHERE account_id = ?1"),
        params![account_id],
        performance_from_row,
    )
    .optional()
}

pub fn list_assignee_performance(
    conn: &Connection,
) -> Result<Vec<AssigneePerformance>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PERFORMANCE_COLUMNS} FROM assignee_performance ORDER BY account_id"
    ))?;
    let rows = stmt.query_map([], performance_from_row)?;
    rows.collect()
}

/// Set the hourly rate on an existing performance row. Returns `false` when
/// the account has no row.
pub fn set_hourly_cost(
    conn: &Connection,
    account_id: &str,
    hourly_cost: f64,
    updated_at: NaiveDateTime,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE assignee_performance SET hourly_cost = ?2, last_updated_at = ?3
         WHERE account_id = ?1",
        params![account_id, hourly_cost, updated_at],
    )?;
    Ok(count > 0)
}

fn performance_from_row(row: &Row<'_>) -> Result<AssigneePerformance, rusqlite::Error> {
    Ok(AssigneePerformance {
        account_id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        hourly_cost: row.get(3)?,
        total_issues_completed: row.get::<_, i64>(4)? as u64,
        average_time_hours: row.get(5)?,
        average_efficiency_score: row.get(6)?,
        total_cost_incurred: row.get(7)?,
        last_updated_at: row.get(8)?,
    })
}

// ── Monitored Projects ─────────────────────────────────────────────

pub fn add_monitored_project(
    conn: &Connection,
    project_key: &str,
    display_name: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO monitored_projects (project_key, display_name, added_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(project_key) DO UPDATE SET
           display_name = COALESCE(excluded.display_name, monitored_projects.display_name)",
        params![project_key, display_name],
    )?;
    Ok(())
}

pub fn remove_monitored_project(
    conn: &Connection,
    project_key: &str,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM monitored_projects WHERE project_key = ?1",
        params![project_key],
    )?;
    Ok(count > 0)
}

pub fn list_monitored_projects(
    conn: &Connection,
) -> Result<Vec<MonitoredProject>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT project_key, display_name, added_at, last_sync_at
         FROM monitored_projects ORDER BY added_at, project_key",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(MonitoredProject {
            project_key: row.get(0)?,
            display_name: row.get(1)?,
            added_at: row.get(2)?,
            last_sync_at: row.get(3)?,
        })
    })?;
    rows.collect()
}

/// No-op for projects that are synced without being monitored.
pub fn update_monitored_project_sync_time(
    conn: &Connection,
    project_key: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE monitored_projects SET last_sync_at = datetime('now') WHERE project_key = ?1",
        params![project_key],
    )?;
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MonitoredProject {
    pub project_key: String,
    pub display_name: Option<String>,
    pub added_at: String,
    pub last_sync_at: Option<String>,
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Sync Runs ──────────────────────────────────────────────────────

pub fn insert_sync_run(conn: &Connection, project_key: &str) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_runs (project_key, status, started_at)
         VALUES (?1, 'running', datetime('now'))",
        params![project_key],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_sync_run(
    conn: &Connection,
    run_id: i64,
    status: &str,
    issues_fetched: u64,
    issues_synced: u64,
    issues_skipped: u64,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sync_runs SET
            status = ?2, completed_at = datetime('now'),
            issues_fetched = ?3, issues_synced = ?4, issues_skipped = ?5,
            error_message = ?6
         WHERE id = ?1",
        params![
            run_id,
            status,
            issues_fetched as i64,
            issues_synced as i64,
            issues_skipped as i64,
            error_message,
        ],
    )?;
    Ok(())
}

pub fn list_recent_sync_runs(
    conn: &Connection,
    limit: u32,
) -> Result<Vec<SyncRun>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, project_key, status, started_at, completed_at,
                issues_fetched, issues_synced, issues_skipped, error_message
         FROM sync_runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(SyncRun {
            id: row.get(0)?,
            project_key: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            completed_at: row.get(4)?,
            issues_fetched: row.get::<_, i64>(5)? as u64,
            issues_synced: row.get::<_, i64>(6)? as u64,
            issues_skipped: row.get::<_, i64>(7)? as u64,
            error_message: row.get(8)?,
        })
    })?;
    rows.collect()
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SyncRun {
    pub id: i64,
    pub project_key: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub issues_fetched: u64,
    pub issues_synced: u64,
    pub issues_skipped: u64,
    pub error_message: Option<String>,
}
