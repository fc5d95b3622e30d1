pub mod agent;
pub mod context;
pub mod fallback;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;
pub use context::{build_query_context, QueryContext};

pub const DEFAULT_PROVIDER: &str = "http";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Environment variable holding the bearer key for the HTTP query server.
pub const API_KEY_ENV: &str = "LLM_API_KEY";

/// Answers natural-language questions about a data snapshot.
#[async_trait]
pub trait QueryService: Send + Sync {
    fn name(&self) -> &str;
    async fn ask(&self, prompt: &str, context: &QueryContext) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Service,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

/// Ask `service`, substituting the local summary on error or timeout.
pub async fn ask_with_fallback(
    service: &dyn QueryService,
    prompt: &str,
    context: &QueryContext,
    timeout: Duration,
) -> Answer {
    match tokio::time::timeout(timeout, service.ask(prompt, context)).await {
        Ok(Ok(text)) => Answer {
            text,
            source: AnswerSource::Service,
        },
        Ok(Err(e)) => {
            log::warn!("Query service '{}' failed, using fallback: {e}", service.name());
            fallback_answer(prompt, context)
        }
        Err(_) => {
            log::warn!(
                "Query service '{}' timed out after {}s, using fallback",
                service.name(),
                timeout.as_secs()
            );
            fallback_answer(prompt, context)
        }
    }
}

fn fallback_answer(prompt: &str, context: &QueryContext) -> Answer {
    Answer {
        text: fallback::summarize(prompt, context),
        source: AnswerSource::Fallback,
    }
}

/// Query-service settings read from `app_config`.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub provider: String,
    pub model: String,
    pub server_url: String,
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            server_url: DEFAULT_SERVER_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl LlmSettings {
    pub async fn load(db: &Database) -> Result<Self> {
        let (provider, model, server_url, timeout) = db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((
                    repository::get_config(conn, "llm_provider")?,
                    repository::get_config(conn, "llm_model")?,
                    repository::get_config(conn, "llm_server_url")?,
                    repository::get_config(conn, "llm_timeout_secs")?,
                ))
            })
            .await?;

        let defaults = Self::default();
        let timeout = match timeout {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    Error::Config(format!("llm_timeout_secs must be whole seconds, got {raw}"))
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.timeout,
        };

        Ok(Self {
            provider: provider.unwrap_or(defaults.provider),
            model: model.unwrap_or(defaults.model),
            server_url: server_url.unwrap_or(defaults.server_url),
            timeout,
        })
    }
}

/// Create the query service selected by `llm_provider`.
pub async fn create_query_service(settings: &LlmSettings) -> Result<Box<dyn QueryService>> {
    match settings.provider.as_str() {
        "http" => {
            let api_key = std::env::var(API_KEY_ENV).ok();
            let service = http::HttpQueryService::new(&settings.server_url, api_key, settings.timeout)?;
            Ok(Box::new(service))
        }
        provider => {
            let service = agent::AgentQueryService::new(provider, &settings.model).await?;
            Ok(Box::new(service))
        }
    }
}
