use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::llm::context::QueryContext;
use crate::llm::QueryService;

/// Query service backed by a mixtape agent (Bedrock or Anthropic).
pub struct AgentQueryService {
    agent: mixtape_core::Agent,
    provider: String,
}

impl AgentQueryService {
    pub async fn new(provider: &str, model_name: &str) -> Result<Self> {
        let agent = build_agent(provider, model_name).await?;
        Ok(Self {
            agent,
            provider: provider.to_string(),
        })
    }
}

#[async_trait]
impl QueryService for AgentQueryService {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn ask(&self, prompt: &str, context: &QueryContext) -> Result<String> {
        let context_json = serde_json::to_string_pretty(context)
            .map_err(|e| Error::Llm(format!("failed to encode context: {e}")))?;
        let response = self
            .agent
            .run(&build_prompt(prompt, &context_json))
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        Ok(response.text().trim().to_string())
    }
}

fn build_prompt(question: &str, context_json: &str) -> String {
    format!(
        r#"You are analysing cost and efficiency data synced from Jira.

Data (JSON). "issues" are per-issue rows: timeTakenHours is the time from creation to
resolution, totalCost is hourly cost times that time, efficiencyScore is in [0, 1] where
1 means at or faster than the assignee's own average. "assignees" are per-person
aggregates over completed issues.

{context_json}

Answer the question below using only this data. Be concise and quote numbers with two
decimals.

Question: {question}"#
    )
}

/// Cloud backends a mixtape agent can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentProvider {
    Bedrock,
    Anthropic,
}

impl AgentProvider {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "bedrock" => Ok(Self::Bedrock),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(Error::Config(format!("unknown llm_provider: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bedrock => "bedrock",
            Self::Anthropic => "anthropic",
        }
    }
}

/// Models accepted in `llm_model`, with their short aliases.
const AGENT_MODELS: &[(&str, &[&str], AgentModel)] = &[
    ("claude-sonnet-4-5", &["sonnet", "claude-sonnet"], AgentModel::Sonnet),
    ("claude-haiku-4-5", &["haiku", "claude-haiku"], AgentModel::Haiku),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentModel {
    Sonnet,
    Haiku,
}

impl AgentModel {
    /// Resolve an `llm_model` value (full id or alias, any case).
    pub fn parse(value: &str) -> Result<Self> {
        let wanted = value.trim().to_lowercase();
        AGENT_MODELS
            .iter()
            .find(|(id, aliases, _)| *id == wanted || aliases.contains(&wanted.as_str()))
            .map(|(_, _, model)| *model)
            .ok_or_else(|| {
                let known: Vec<&str> = AGENT_MODELS.iter().map(|(id, _, _)| *id).collect();
                Error::Config(format!(
                    "unknown llm_model: {value} (known models: {})",
                    known.join(", ")
                ))
            })
    }

    pub fn id(&self) -> &'static str {
        AGENT_MODELS
            .iter()
            .find(|(_, _, model)| model == self)
            .map(|(id, _, _)| *id)
            .unwrap_or("unknown")
    }
}

async fn build_agent(provider: &str, model_name: &str) -> Result<mixtape_core::Agent> {
    let provider = AgentProvider::parse(provider)?;
    let model = AgentModel::parse(model_name)?;
    log::debug!("Building {} agent on {}", model.id(), provider.as_str());

    // Model types differ per arm, so each pairing gets its own builder chain.
    let built = match (provider, model) {
        (AgentProvider::Bedrock, AgentModel::Sonnet) => mixtape_core::Agent::builder()
            .bedrock(mixtape_core::ClaudeSonnet4_5)
            .build()
            .await,
        (AgentProvider::Bedrock, AgentModel::Haiku) => mixtape_core::Agent::builder()
            .bedrock(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await,
        (AgentProvider::Anthropic, AgentModel::Sonnet) => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeSonnet4_5)
            .build()
            .await,
        (AgentProvider::Anthropic, AgentModel::Haiku) => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await,
    };
    built.map_err(|e| {
        Error::Llm(format!(
            "failed to start {} agent on {}: {e}",
            model.id(),
            provider.as_str()
        ))
    })
}
