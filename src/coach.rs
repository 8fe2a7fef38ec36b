// Coaching messages for a student's weakest metric.
//
// Providers are fallible and may be slow; `coaching_message` bounds each call
// with a timeout and turns any failure into FALLBACK_MESSAGE so the numeric
// result is always returned.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::CoachSettings;
use crate::error::CoachError;
use crate::models::{metric_label, Zone};

pub const FALLBACK_MESSAGE: &str = "Motivational message could not be generated.";

#[derive(Debug, Clone, PartialEq)]
pub struct CoachRequest {
    pub weakest_metric: String,
    pub zone: Zone,
}

#[async_trait]
pub trait CoachMessageProvider: Send + Sync {
    async fn message(&self, request: &CoachRequest) -> Result<String, CoachError>;

    fn name(&self) -> &str;
}

/// Asks the provider for a message, falling back on error or timeout.
pub async fn coaching_message(
    provider: &dyn CoachMessageProvider,
    request: &CoachRequest,
    timeout: Duration,
) -> String {
    let outcome = match tokio::time::timeout(timeout, provider.message(request)).await {
        Ok(result) => result,
        Err(_) => Err(CoachError::Timeout(timeout.as_secs())),
    };

    match outcome {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(
                provider = provider.name(),
                metric = %request.weakest_metric,
                "Motivational message generation failed: {err}"
            );
            FALLBACK_MESSAGE.to_string()
        }
    }
}

pub fn build_provider(settings: &CoachSettings) -> anyhow::Result<Box<dyn CoachMessageProvider>> {
    match &settings.api_key {
        Some(api_key) => {
            tracing::info!(model = %settings.model, "Using OpenAI coaching provider");
            Ok(Box::new(OpenAiCoach::new(
                api_key.clone(),
                settings.base_url.clone(),
                settings.model.clone(),
                settings.timeout,
            )?))
        }
        None => {
            tracing::info!("OPENAI_API_KEY not set, using offline zone coach");
            Ok(Box::new(ZoneCoach))
        }
    }
}

fn prompt_for(request: &CoachRequest) -> String {
    format!(
        "The student's weakest metric is: {}.\n\
         Write a motivational message (at least 15 tokens) that encourages the student to \
         improve in this area. Be optimistic, specific, and helpful. Only return the message text.",
        request.weakest_metric.replace('_', " ")
    )
}

/// Chat-completions client for OpenAI-compatible APIs.
pub struct OpenAiCoach {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCoach {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
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
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl CoachMessageProvider for OpenAiCoach {
    async fn message(&self, request: &CoachRequest) -> Result<String, CoachError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt_for(request),
            }],
            temperature: 0.7,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoachError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        parse_reply(&text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Offline provider with fixed guidance per zone.
pub struct ZoneCoach;

#[async_trait]
impl CoachMessageProvider for ZoneCoach {
    async fn message(&self, request: &CoachRequest) -> Result<String, CoachError> {
        let focus = metric_label(&request.weakest_metric).to_lowercase();
        let message = match request.zone {
            Zone::Red => format!(
                "Your motivation is very low. Let's talk to your teacher and set small, \
                 achievable goals, starting with your {focus}."
            ),
            Zone::Yellow => format!(
                "You're on your way! A little more consistency with your {focus} and you'll be \
                 in the green zone soon."
            ),
            Zone::Green => format!(
                "Excellent performance! Keep up the great work, and keep an eye on your {focus}."
            ),
        };
        Ok(message)
    }

    fn name(&self) -> &str {
        "zone"
    }
}

/// Extracts the first choice's message from a chat-completions body.
fn parse_reply(body: &str) -> Result<String, CoachError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|err| CoachError::Malformed(err.to_string()))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CoachError::Malformed("no choices in response".to_string()))?
        .message
        .content
        .unwrap_or_default();

    non_empty(content)
}

fn non_empty(message: String) -> Result<String, CoachError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(CoachError::Empty);
    }
    Ok(trimmed.to_string())
}
