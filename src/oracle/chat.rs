//! Chat-completions oracle (OpenAI compatible HTTP API).

use super::{instruction, interpret_answer, Oracle, OracleError};
use crate::category::Category;
use crate::config::OracleConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct ChatOracle {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AnswerMessage,
}

#[derive(Deserialize)]
struct AnswerMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatOracle {
    /// Build the client. Fails without credentials so a misconfigured
    /// deployment stops at startup rather than at the first escalation.
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = config.resolved_api_key().ok_or(OracleError::MissingCredentials)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }

    fn request_body<'a>(&'a self, line: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instruction(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Log line: {line}"),
                },
            ],
            temperature: 0.0,
        }
    }
}

fn transport_error(e: reqwest::Error) -> OracleError {
    if e.is_timeout() {
        OracleError::Timeout
    } else {
        OracleError::Transport(e.to_string())
    }
}

#[async_trait::async_trait]
impl Oracle for ChatOracle {
    async fn classify(&self, line: &str) -> Result<Category, OracleError> {
        debug!(model = %self.model, line_len = line.len(), "sending oracle request");

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(line))
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::MalformedResponse("no answer in response".into()))?;

        debug!(answer = %answer.trim(), "oracle answered");
        Ok(interpret_answer(line, &answer))
    }
}
