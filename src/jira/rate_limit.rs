use std::time::Duration;

use reqwest::header::HeaderValue;
use reqwest::StatusCode;

pub const MAX_RETRIES: u32 = 3;
const BACKOFF_SECONDS: &[u64] = &[60, 120, 240];

/// Jira Cloud signals throttling with a plain 429.
pub fn is_rate_limited(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
}

/// How long to wait before retry `attempt` (0-based).
///
/// A numeric `Retry-After` header wins; otherwise the fixed backoff schedule
/// is used, capped at its last step.
pub fn retry_delay(attempt: u32, retry_after: Option<&HeaderValue>) -> Duration {
    if let Some(secs) = retry_after
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
    {
        return Duration::from_secs(secs);
    }
    let wait = BACKOFF_SECONDS
        .get(attempt as usize)
        .copied()
        .unwrap_or(240);
    Duration::from_secs(wait)
}

pub async fn backoff_sleep(wait: Duration, attempt: u32) {
    log::warn!(
        "Rate limited (429). Waiting {}s before retry {}/{}",
        wait.as_secs(),
        attempt + 1,
        MAX_RETRIES
    );
    tokio::time::sleep(wait).await;
}
