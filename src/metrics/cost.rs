use crate::config::EngineConfig;
use crate::metrics::types::IssueAnalysis;

/// Score given when there is nothing to compare against.
pub const NEUTRAL_EFFICIENCY: f64 = 0.5;

/// Rate to charge for an issue: the assignee's stored rate, else the
/// configured default. Unassigned issues have no rate.
pub fn resolve_rate(
    account_id: Option<&str>,
    stored_rate: Option<f64>,
    config: &EngineConfig,
) -> Option<f64> {
    account_id?;
    Some(stored_rate.unwrap_or(config.default_hourly_cost))
}

pub fn total_cost(rate: Option<f64>, time_taken_hours: Option<f64>) -> Option<f64> {
    Some(rate? * time_taken_hours?)
}

/// Efficiency of one issue relative to the assignee's other completed issues.
///
/// `history` may contain the issue itself and open issues; both are ignored.
/// Returns `None` without a known time or account.
pub fn efficiency_score(issue: &IssueAnalysis, history: &[IssueAnalysis]) -> Option<f64> {
    let this_time = issue.time_taken_hours?;
    issue.assignee_account_id.as_ref()?;

    let others: Vec<&IssueAnalysis> = history
        .iter()
        .filter(|h| h.issue_key != issue.issue_key && h.is_completed())
        .collect();
    if others.is_empty() {
        return Some(NEUTRAL_EFFICIENCY);
    }

    let times: Vec<f64> = others.iter().filter_map(|h| h.time_taken_hours).collect();
    let mean = if times.is_empty() {
        this_time
    } else {
        times.iter().sum::<f64>() / times.len() as f64
    };

    if mean > 0.0 {
        let ratio = mean / this_time;
        if ratio.is_nan() {
            Some(NEUTRAL_EFFICIENCY)
        } else {
            Some(ratio.clamp(0.0, 1.0))
        }
    } else {
        Some(NEUTRAL_EFFICIENCY)
    }
}

/// Fill the rate, cost and efficiency of a freshly mapped issue.
pub fn apply(
    issue: &mut IssueAnalysis,
    stored_rate: Option<f64>,
    history: &[IssueAnalysis],
    config: &EngineConfig,
) {
    let rate = resolve_rate(issue.assignee_account_id.as_deref(), stored_rate, config);
    issue.assignee_hourly_cost = rate;
    issue.total_cost = total_cost(rate, issue.time_taken_hours);
    issue.efficiency_score = efficiency_score(issue, history);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{completed_issue, open_issue};

    #[test]
    fn test_resolve_rate() {
        let config = EngineConfig::default();
        assert_eq!(resolve_rate(Some("acc-1"), Some(40.0), &config), Some(40.0));
        assert_eq!(resolve_rate(Some("acc-1"), None, &config), Some(50.0));
        assert_eq!(resolve_rate(None, Some(40.0), &config), None);

        let config = EngineConfig {
            default_hourly_cost: 65.0,
        };
        assert_eq!(resolve_rate(Some("acc-1"), None, &config), Some(65.0));
    }

    #[test]
    fn test_total_cost() {
        assert_eq!(total_cost(Some(40.0), Some(2.5)), Some(100.0));
        assert_eq!(total_cost(None, Some(2.5)), None);
        assert_eq!(total_cost(Some(40.0), None), None);
    }

    #[test]
    fn test_first_issue_is_neutral() {
        let issue = completed_issue("MW-1", Some("acc-1"), 3.0);
        assert_eq!(efficiency_score(&issue, &[]), Some(0.5));

        // Only itself and open issues in history.
        let history = vec![issue.clone(), open_issue("MW-2", Some("acc-1"))];
        assert_eq!(efficiency_score(&issue, &history), Some(0.5));
    }

    #[test]
    fn test_average_time_scores_one() {
        let issue = completed_issue("MW-2", Some("acc-1"), 4.0);
        let history = vec![completed_issue("MW-1", Some("acc-1"), 4.0)];
        assert_eq!(efficiency_score(&issue, &history), Some(1.0));
    }

    #[test]
    fn test_slower_than_average() {
        let issue = completed_issue("MW-3", Some("acc-1"), 8.0);
        let history = vec![
            completed_issue("MW-1", Some("acc-1"), 2.0),
            completed_issue("MW-2", Some("acc-1"), 6.0),
        ];
        assert_eq!(efficiency_score(&issue, &history), Some(0.5));
    }

    #[test]
    fn test_faster_than_average_is_capped() {
        let issue = completed_issue("MW-2", Some("acc-1"), 1.0);
        let history = vec![completed_issue("MW-1", Some("acc-1"), 10.0)];
        assert_eq!(efficiency_score(&issue, &history), Some(1.0));
    }

    #[test]
    fn test_degenerate_times() {
        let history = vec![completed_issue("MW-1", Some("acc-1"), 2.0)];

        let instant = completed_issue("MW-2", Some("acc-1"), 0.0);
        assert_eq!(efficiency_score(&instant, &history), Some(1.0));

        let negative = completed_issue("MW-3", Some("acc-1"), -1.5);
        assert_eq!(efficiency_score(&negative, &history), Some(0.0));

        let zero_history = vec![completed_issue("MW-1", Some("acc-1"), 0.0)];
        let issue = completed_issue("MW-4", Some("acc-1"), 2.0);
        assert_eq!(efficiency_score(&issue, &zero_history), Some(0.5));
    }

    #[test]
    fn test_history_without_times_uses_own_time() {
        let mut untimed = completed_issue("MW-1", Some("acc-1"), 2.0);
        untimed.time_taken_hours = None;
        let issue = completed_issue("MW-2", Some("acc-1"), 3.0);
        assert_eq!(efficiency_score(&issue, &[untimed]), Some(1.0));
    }

    #[test]
    fn test_requires_time_and_account() {
        let history = vec![completed_issue("MW-1", Some("acc-1"), 2.0)];
        assert_eq!(efficiency_score(&open_issue("MW-2", Some("acc-1")), &history), None);
        assert_eq!(
            efficiency_score(&completed_issue("MW-3", None, 2.0), &history),
            None
        );
    }

    #[test]
    fn test_apply_mw12() {
        let mut issue = completed_issue("MW-12", Some("acc-1"), 2.5);
        apply(&mut issue, Some(40.0), &[], &EngineConfig::default());
        assert_eq!(issue.assignee_hourly_cost, Some(40.0));
        assert_eq!(issue.total_cost, Some(100.0));
        assert_eq!(issue.efficiency_score, Some(0.5));
    }

    #[test]
    fn test_apply_records_default_rate() {
        let mut issue = open_issue("MW-1", Some("acc-1"));
        apply(&mut issue, None, &[], &EngineConfig::default());
        assert_eq!(issue.assignee_hourly_cost, Some(50.0));
        assert_eq!(issue.total_cost, None);
        assert_eq!(issue.efficiency_score, None);

        let mut unassigned = completed_issue("MW-2", None, 2.0);
        apply(&mut unassigned, None, &[], &EngineConfig::default());
        assert_eq!(unassigned.assignee_hourly_cost, None);
        assert_eq!(unassigned.total_cost, None);
        assert_eq!(unassigned.efficiency_score, None);
    }
}
