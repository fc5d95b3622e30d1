use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jiraperf", about = "Jira cost and efficiency analytics CLI")]
struct Cli {
    /// Database path (default: ~/.jiraperf/jiraperf.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Page size for Jira search requests (default: 100)
    #[arg(long)]
    page_size: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl jiraperf::SyncProgress for StderrProgress {
    fn on_project_start(&self, project_key: &str, index: usize, total: usize) {
        eprintln!("[{}/{}] Syncing {}...", index + 1, total, project_key);
    }

    fn on_issues_fetched(&self, _project_key: &str, count: usize) {
        eprintln!("  Fetched {} issues", count);
    }

    fn on_project_complete(&self, report: &jiraperf::SyncReport) {
        eprintln!(
            "  Done: {} issues synced, {} skipped",
            report.issues_synced, report.issues_skipped
        );
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sync Jira issues into the local database
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },
    /// Manage monitored projects
    Monitor {
        #[command(subcommand)]
        action: MonitorAction,
    },
    /// Rebuild every assignee's performance aggregate
    Recalculate,
    /// Manage assignee hourly rates
    Rate {
        #[command(subcommand)]
        action: RateAction,
    },
    /// List per-issue cost and efficiency
    Analysis {
        /// Project key or Jira URL
        #[arg(long)]
        project: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List per-assignee performance aggregates
    Performance {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the data snapshot sent to the query service
    Context {
        /// Project key or Jira URL
        #[arg(long)]
        project: Option<String>,
    },
    /// Ask a question about the synced data
    Ask {
        /// Natural-language question
        prompt: String,
        /// Restrict the issue data to one project
        #[arg(long)]
        project: Option<String>,
    },
    /// Read data directly from Jira without storing it
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show database status
    Status,
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Sync one project's issues
    Project {
        /// Project key (e.g. MW) or Jira URL
        identifier: String,
    },
    /// Sync all monitored projects
    All,
}

#[derive(Subcommand)]
enum MonitorAction {
    /// Add a project to monitoring
    Add {
        /// Project key or Jira URL
        identifier: String,
        /// Display name shown in listings
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a project from monitoring
    Remove {
        /// Project key or Jira URL
        identifier: String,
    },
    /// List monitored projects
    List,
}

#[derive(Subcommand)]
enum RateAction {
    /// Set an assignee's hourly cost and reprice their issues
    Set {
        /// Jira account id
        account_id: String,
        /// Hourly cost (non-negative)
        rate: String,
        /// Rebuild performance aggregates afterwards
        #[arg(long)]
        recalculate: bool,
    },
}

#[derive(Subcommand)]
enum RemoteAction {
    /// List projects visible to the configured Jira account
    Projects,
    /// Preview an assignee's unresolved issues
    Issues {
        /// Jira account id
        #[arg(long)]
        assignee: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => jiraperf::Database::open_at(path).await?,
        None => jiraperf::Database::open().await?,
    };

    match cli.command {
        Commands::Status => {
            let engine = jiraperf::JiraPerf::new(db);
            print_status(&engine).await?;
        }
        Commands::Config { action } => {
            let engine = jiraperf::JiraPerf::new(db);
            handle_config(&engine, action).await?;
        }
        Commands::Monitor { action } => {
            let engine = jiraperf::JiraPerf::new(db);
            handle_monitor(&engine, action).await?;
        }
        Commands::Sync { target } => {
            let client = jira_client(cli.page_size)?;
            let engine = jiraperf::JiraPerf::new(db).with_source(Box::new(client));
            handle_sync(&engine, target).await?;
        }
        Commands::Remote { action } => {
            let client = jira_client(cli.page_size)?;
            let engine = jiraperf::JiraPerf::new(db).with_source(Box::new(client.clone()));
            handle_remote(&engine, &client, action).await?;
        }
        Commands::Recalculate => {
            let engine = jiraperf::JiraPerf::new(db);
            let report = engine.recalculate_all().await?;
            println!(
                "Recalculated {} assignees ({} without completed issues skipped).",
                report.assignees_updated, report.assignees_skipped
            );
        }
        Commands::Rate { action } => {
            let engine = jiraperf::JiraPerf::new(db);
            handle_rate(&engine, action).await?;
        }
        Commands::Analysis { project, json } => {
            let engine = jiraperf::JiraPerf::new(db);
            let issues = engine.get_analysis(project.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&issues)?);
            } else {
                print_issues(&issues);
            }
        }
        Commands::Performance { json } => {
            let engine = jiraperf::JiraPerf::new(db);
            let rows = engine.get_performance().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_performance(&rows);
            }
        }
        Commands::Context { project } => {
            let engine = jiraperf::JiraPerf::new(db);
            let context = engine.build_query_context(project.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&context)?);
        }
        Commands::Ask { prompt, project } => {
            let engine = jiraperf::JiraPerf::new(db);
            let answer = engine.ask(&prompt, project.as_deref()).await?;
            if answer.source == jiraperf::AnswerSource::Fallback {
                eprintln!("(query service unavailable; answering from local data)");
            }
            println!("{}", answer.text);
        }
    }

    Ok(())
}

fn jira_client(page_size: Option<u32>) -> anyhow::Result<jiraperf::JiraClient> {
    let client = jiraperf::JiraClient::from_env()?;
    Ok(match page_size {
        Some(size) => client.with_page_size(size),
        None => client,
    })
}

async fn print_status(engine: &jiraperf::JiraPerf) -> anyhow::Result<()> {
    let status = engine.status().await?;
    println!("jiraperf status");
    println!("  Issues:     {}", status.issues_total);
    println!("  Completed:  {}", status.issues_completed);
    println!("  Assignees:  {}", status.assignees);
    println!("  Monitored:  {}", status.monitored_projects.len());

    match status.recent_runs.first() {
        Some(run) => println!(
            "  Last sync:  {} {} ({})",
            run.project_key,
            run.status,
            run.completed_at.as_deref().unwrap_or(&run.started_at)
        ),
        None => println!("  Last sync:  never"),
    }
    Ok(())
}

async fn handle_config(engine: &jiraperf::JiraPerf, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match engine.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            engine.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = engine.config_list().await?;
            if items.is_empty() {
                println!("No config values set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn handle_monitor(engine: &jiraperf::JiraPerf, action: MonitorAction) -> anyhow::Result<()> {
    match action {
        MonitorAction::Add { identifier, name } => {
            let key = engine.monitor_add(&identifier, name.as_deref()).await?;
            println!("Added: {key}");
        }
        MonitorAction::Remove { identifier } => {
            if engine.monitor_remove(&identifier).await? {
                println!("Removed: {identifier}");
            } else {
                println!("Not found: {identifier}");
            }
        }
        MonitorAction::List => {
            let projects = engine.monitor_list().await?;
            if projects.is_empty() {
                println!("No monitored projects.");
            } else {
                for p in projects {
                    let name = p.display_name.as_deref().unwrap_or("");
                    let last = p.last_sync_at.as_deref().unwrap_or("never");
                    println!("{} {} (last sync: {})", p.project_key, name, last);
                }
            }
        }
    }
    Ok(())
}

async fn handle_sync(engine: &jiraperf::JiraPerf, target: SyncTarget) -> anyhow::Result<()> {
    let progress = StderrProgress;
    match target {
        SyncTarget::Project { identifier } => {
            let report = engine.sync_project(&identifier, &progress).await?;
            print_sync_report(&report);
        }
        SyncTarget::All => {
            let reports = engine.sync_all(&progress).await?;
            for report in &reports {
                print_sync_report(report);
                println!();
            }
            if reports.is_empty() {
                println!("No monitored projects to sync. Use 'monitor add' first.");
            }
        }
    }
    Ok(())
}

async fn handle_rate(engine: &jiraperf::JiraPerf, action: RateAction) -> anyhow::Result<()> {
    match action {
        RateAction::Set {
            account_id,
            rate,
            recalculate,
        } => {
            let rate = jiraperf::config::parse_rate(&rate)?;
            let update = engine.update_hourly_cost(&account_id, rate).await?;
            println!(
                "Set {} to ${:.2}/h; repriced {} issues.",
                update.account_id, update.hourly_cost, update.issues_repriced
            );
            if recalculate {
                let report = engine.recalculate_all().await?;
                println!("Recalculated {} assignees.", report.assignees_updated);
            } else {
                println!("Run 'jiraperf recalculate' to refresh performance totals.");
            }
        }
    }
    Ok(())
}

async fn handle_remote(
    engine: &jiraperf::JiraPerf,
    client: &jiraperf::JiraClient,
    action: RemoteAction,
) -> anyhow::Result<()> {
    match action {
        RemoteAction::Projects => {
            let projects = client.list_projects().await?;
            if projects.is_empty() {
                println!("No projects visible.");
            }
            for p in projects {
                println!("{} {}", p.key, p.name);
            }
        }
        RemoteAction::Issues { assignee } => {
            let issues = engine.preview_assignee_issues(&assignee).await?;
            print_issues(&issues);
        }
    }
    Ok(())
}

fn print_issues(issues: &[jiraperf::IssueAnalysis]) {
    if issues.is_empty() {
        println!("No issues found.");
        return;
    }
    for issue in issues {
        let state = if issue.is_completed() { "done" } else { "open" };
        let assignee = issue
            .assignee_name
            .as_deref()
            .or(issue.assignee_account_id.as_deref())
            .unwrap_or("unassigned");
        println!(
            "{:<12} [{state}] {:<20} {:>8} {:>10} {:>5}  {}",
            issue.issue_key,
            assignee,
            fmt_opt(issue.time_taken_hours, "h"),
            issue
                .total_cost
                .map(|c| format!("${c:.2}"))
                .unwrap_or_else(|| "-".into()),
            issue
                .efficiency_score
                .map(|e| format!("{e:.2}"))
                .unwrap_or_else(|| "-".into()),
            issue.summary.as_deref().unwrap_or("")
        );
    }
}

fn print_performance(rows: &[jiraperf::AssigneePerformance]) {
    if rows.is_empty() {
        println!("No assignee performance data. Run 'jiraperf sync' first.");
        return;
    }
    for p in rows {
        println!("{}", p.name.as_deref().unwrap_or(&p.account_id));
        println!("  Account:    {}", p.account_id);
        println!("  Rate:       ${:.2}/h", p.hourly_cost);
        println!("  Completed:  {}", p.total_issues_completed);
        println!("  Avg time:   {:.2}h", p.average_time_hours);
        println!("  Efficiency: {:.2}", p.average_efficiency_score);
        println!("  Total cost: ${:.2}", p.total_cost_incurred);
    }
}

fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
    value
        .map(|v| format!("{v:.2}{suffix}"))
        .unwrap_or_else(|| "-".into())
}

fn print_sync_report(report: &jiraperf::SyncReport) {
    println!("Sync: {}", report.project_key);
    println!("  Status:    {}", report.status.as_str());
    println!("  Fetched:   {} issues", report.issues_fetched);
    println!("  Synced:    {} issues", report.issues_synced);
    println!("  Skipped:   {} issues", report.issues_skipped);
    println!("  Assignees: {}", report.assignees_updated);
    if let Some(ref err) = report.error {
        println!("  Error:     {err}");
    }
}
