use crate::llm::context::QueryContext;

/// Deterministic answer built from the context when the query service is
/// unavailable. Routed on keywords in the prompt.
pub fn summarize(prompt: &str, ctx: &QueryContext) -> String {
    let prompt = prompt.to_lowercase();
    let issue_count = ctx.issues.len();
    let assignee_count = ctx.assignees.len();

    if prompt.contains("cost") || prompt.contains("expensive") {
        return format!(
            "The total cost across all issues is ${:.2}. There are {issue_count} issues and {assignee_count} assignees in the system.",
            total_cost(ctx)
        );
    }

    if prompt.contains("efficien") || prompt.contains("performance") {
        let top = ctx.assignees.iter().max_by(|a, b| {
            a.average_efficiency_score
                .total_cmp(&b.average_efficiency_score)
        });
        return match top {
            Some(a) => format!(
                "The most efficient assignee is {} with an average efficiency score of {:.2}. They completed {} issues with an average time of {:.2} hours.",
                a.name.as_deref().unwrap_or(&a.account_id),
                a.average_efficiency_score,
                a.total_issues_completed,
                a.average_time_hours
            ),
            None => "No assignee performance data available. Please sync issues first.".to_string(),
        };
    }

    if prompt.contains("issue") || prompt.contains("task") {
        let completed = ctx.issues.iter().filter(|i| i.is_completed()).count();
        let ratio = if issue_count == 0 {
            0.0
        } else {
            completed as f64 / issue_count as f64 * 100.0
        };
        return format!(
            "There are {issue_count} issues in the system. {completed} are completed ({ratio:.0}%). The average time per completed issue is {:.2} hours.",
            average_time(ctx)
        );
    }

    format!(
        "Based on the project data: There are {issue_count} issues and {assignee_count} assignees. The total cost is ${:.2}. Would you like more specific information about costs, efficiency, or issues?",
        total_cost(ctx)
    )
}

fn total_cost(ctx: &QueryContext) -> f64 {
    ctx.issues
        .iter()
        .filter_map(|i| i.total_cost)
        .fold(0.0, |acc, c| acc + c)
}

fn average_time(ctx: &QueryContext) -> f64 {
    let times: Vec<f64> = ctx.issues.iter().filter_map(|i| i.time_taken_hours).collect();
    if times.is_empty() {
        0.0
    } else {
        times.iter().sum::<f64>() / times.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{completed_issue, open_issue, performance};

    fn sample() -> QueryContext {
        let mut a = completed_issue("MW-1", Some("acc-1"), 2.0);
        a.total_cost = Some(100.0);
        let mut b = completed_issue("MW-2", Some("acc-2"), 4.0);
        b.total_cost = Some(250.5);

        let mut fast = performance("acc-1", 50.0);
        fast.average_efficiency_score = 0.9;
        fast.total_issues_completed = 1;
        fast.average_time_hours = 2.0;
        let mut slow = performance("acc-2", 62.5);
        slow.average_efficiency_score = 0.4;

        QueryContext::new(vec![a, b, open_issue("MW-3", None)], vec![slow, fast])
    }

    #[test]
    fn test_cost_question() {
        assert_eq!(
            summarize("Which issues were most EXPENSIVE?", &sample()),
            "The total cost across all issues is $350.50. There are 3 issues and 2 assignees in the system."
        );
    }

    #[test]
    fn test_cost_question_without_data() {
        assert_eq!(
            summarize("total cost?", &QueryContext::default()),
            "The total cost across all issues is $0.00. There are 0 issues and 0 assignees in the system."
        );
    }

    #[test]
    fn test_efficiency_question() {
        assert_eq!(
            summarize("Who is the most efficient?", &sample()),
            "The most efficient assignee is Name acc-1 with an average efficiency score of 0.90. They completed 1 issues with an average time of 2.00 hours."
        );
        assert_eq!(
            summarize("team performance?", &QueryContext::default()),
            "No assignee performance data available. Please sync issues first."
        );
    }

    #[test]
    fn test_issue_question() {
        assert_eq!(
            summarize("How many tasks are done?", &sample()),
            "There are 3 issues in the system. 2 are completed (67%). The average time per completed issue is 3.00 hours."
        );
        assert_eq!(
            summarize("issues?", &QueryContext::default()),
            "There are 0 issues in the system. 0 are completed (0%). The average time per completed issue is 0.00 hours."
        );
    }

    #[test]
    fn test_general_question() {
        assert_eq!(
            summarize("hello", &sample()),
            "Based on the project data: There are 3 issues and 2 assignees. The total cost is $350.50. Would you like more specific information about costs, efficiency, or issues?"
        );
    }
}
