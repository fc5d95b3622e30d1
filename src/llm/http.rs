use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::llm::context::QueryContext;
use crate::llm::QueryService;

#[derive(Serialize)]
struct ChatRequest<'a> {
    prompt: &'a str,
    context: &'a QueryContext,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for a chat server exposing `POST /api/chat`.
#[derive(Debug, Clone)]
pub struct HttpQueryService {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpQueryService {
    pub fn new(server_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(server_url)
            .map_err(|e| Error::Config(format!("invalid llm_server_url {server_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("api/chat")
            .map_err(|e| Error::Config(format!("invalid llm_server_url {server_url}: {e}")))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl QueryService for HttpQueryService {
    fn name(&self) -> &str {
        "http"
    }

    async fn ask(&self, prompt: &str, context: &QueryContext) -> Result<String> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&ChatRequest { prompt, context });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!(
                "query server returned {}: {body}",
                status.as_u16()
            )));
        }

        let body: ChatResponse = response.json().await?;
        if let Some(error) = body.error.filter(|e| !e.is_empty()) {
            return Err(Error::Llm(format!("query server error: {error}")));
        }
        body.response
            .ok_or_else(|| Error::Llm("query server returned no response".into()))
    }
}
