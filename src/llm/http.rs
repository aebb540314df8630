//! HTTP model gateway — posts chat-completion requests to a configured
//! serving endpoint with bearer auth and normalizes whatever JSON shape
//! comes back into plain reply text.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ConfigError, LlmError};
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, ResponseShape,
};

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 256;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Name used for this provider in logs and errors.
const PROVIDER: &str = "serving-endpoint";

/// Gateway configuration. Required fields are checked once, at construction.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint_url: Url,
    pub auth_token: SecretString,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(endpoint_url: &str, auth_token: &str) -> Result<Self, ConfigError> {
        if endpoint_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "endpoint_url".to_string(),
                hint: "Set DATABRICKS_ENDPOINT_URL to the model serving URL.".to_string(),
            });
        }
        if auth_token.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "auth_token".to_string(),
                hint: "Set DATABRICKS_API_TOKEN to a bearer token for the endpoint.".to_string(),
            });
        }
        let endpoint_url = Url::parse(endpoint_url.trim()).map_err(|e| ConfigError::InvalidValue {
            key: "endpoint_url".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            endpoint_url,
            auth_token: SecretString::from(auth_token.trim().to_string()),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABRICKS_ENDPOINT_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABRICKS_ENDPOINT_URL".to_string()))?;
        let token = lookup("DATABRICKS_API_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABRICKS_API_TOKEN".to_string()))?;

        let mut config = Self::new(&url, &token)?;
        if let Some(t) = parse_var::<f32, _>(&lookup, "SURVEY_TEMPERATURE")? {
            config.temperature = t;
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, "SURVEY_MAX_TOKENS")? {
            config.max_tokens = n;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SURVEY_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}

/// Request body sent to the endpoint.
#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

/// `LlmProvider` backed by a plain HTTPS serving endpoint.
pub struct HttpEndpointProvider {
    client: Client,
    config: GatewayConfig,
}

impl HttpEndpointProvider {
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                provider: PROVIDER.to_string(),
                timeout: self.config.timeout,
            }
        } else {
            LlmError::Transport {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl LlmProvider for HttpEndpointProvider {
    fn model_name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatBody {
            messages: &request.messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
        };

        let resp = self
            .client
            .post(self.config.endpoint_url.clone())
            .bearer_auth(self.config.auth_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            // Body is logged, never returned: it may echo request content.
            let detail = resp.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                body = %detail.chars().take(200).collect::<String>(),
                "Model endpoint returned an error status"
            );
            return Err(LlmError::Transport {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let raw = resp.text().await.map_err(|e| self.transport_error(e))?;
        let payload: Value =
            serde_json::from_str(&raw).map_err(|e| LlmError::MalformedResponse {
                provider: PROVIDER.to_string(),
                reason: format!("body is not JSON: {e}"),
            })?;

        let (content, shape) =
            extract_reply_text(&payload).ok_or_else(|| LlmError::MalformedResponse {
                provider: PROVIDER.to_string(),
                reason: "no recognized reply field".to_string(),
            })?;

        debug!(?shape, chars = content.len(), "Model reply extracted");
        Ok(CompletionResponse { content, shape })
    }
}

/// Pull reply text out of any of the payload layouts the endpoint may use.
///
/// Tried in order: `choices[0].message.content`, `text`, `generated_text`,
/// `predictions[0]` (a string, or an object with `content` or `text`).
/// Blank strings do not count as a match.
pub fn extract_reply_text(payload: &Value) -> Option<(String, ResponseShape)> {
    let candidates = [
        (
            payload.pointer("/choices/0/message/content"),
            ResponseShape::ChatChoices,
        ),
        (payload.get("text"), ResponseShape::Text),
        (payload.get("generated_text"), ResponseShape::GeneratedText),
        (prediction_text(payload), ResponseShape::Predictions),
    ];

    candidates.into_iter().find_map(|(value, shape)| {
        let text = value?.as_str()?.trim();
        (!text.is_empty()).then(|| (text.to_string(), shape))
    })
}

fn prediction_text(payload: &Value) -> Option<&Value> {
    let first = payload.pointer("/predictions/0")?;
    if first.is_string() {
        return Some(first);
    }
    first
        .get("content")
        .filter(|v| v.as_str().is_some_and(|s| !s.trim().is_empty()))
        .or_else(|| first.get("text"))
}
