use std::fmt;

use async_trait::async_trait;
use gn_core::{
    Error, GlobeArticle, InferenceModel, LlmArticleData, LlmConfig, Result, Secret, TokenUsage,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::prompts::PromptTemplate;
use crate::rate_limit::RateLimiter;
use crate::retry::{is_retryable_error, is_retryable_status, retry_after, RetryPolicy};

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Metadata extraction through an Azure OpenAI chat deployment in JSON mode.
pub struct AzureOpenAiModel {
    client: Client,
    api_key: Secret,
    endpoint: Url,
    api_version: String,
    deployment: String,
    temperature: f32,
    max_tokens: u32,
    prompt: PromptTemplate,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
}

impl AzureOpenAiModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("Azure OpenAI API key is not set in the configuration".to_string()))?;
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| Error::Config("Azure OpenAI endpoint is not set in the configuration".to_string()))?;

        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            api_key,
            endpoint,
            api_version: config.api_version.clone(),
            deployment: config.deployment.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            prompt: PromptTemplate::load(config)?,
            rate_limiter: RateLimiter::new(config.requests_per_second, config.max_burst)?,
            retry_policy: RetryPolicy::exponential(config.max_retries),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint.as_str().trim_end_matches('/'),
            self.deployment
        )
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = self.completions_url();
        let attempts = self.retry_policy.max_retries + 1;

        for attempt in 0..attempts {
            self.rate_limiter.acquire().await;

            let sent = self
                .client
                .post(&url)
                .query(&[("api-version", self.api_version.as_str())])
                .header("api-key", self.api_key.expose())
                .json(request)
                .send()
                .await;

            match sent {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.json::<ChatResponse>().await?);
                }
                Ok(response) => {
                    let status = response.status();
                    if is_retryable_status(status) && attempt + 1 < attempts {
                        let delay = self
                            .retry_policy
                            .calculate_delay(attempt, retry_after(response.headers()));
                        warn!(
                            "Azure OpenAI returned {} (attempt {}/{}). Retrying in {:?}",
                            status,
                            attempt + 1,
                            attempts,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Inference(format!("Azure OpenAI returned {status}: {body}")));
                }
                Err(e) if is_retryable_error(&e) && attempt + 1 < attempts => {
                    let delay = self.retry_policy.calculate_delay(attempt, None);
                    warn!(
                        "Azure OpenAI request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Inference(format!(
            "Azure OpenAI request failed after {attempts} attempts"
        )))
    }
}

impl fmt::Debug for AzureOpenAiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureOpenAiModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .field("rate_limiter", &self.rate_limiter)
            .finish()
    }
}

#[async_trait]
impl InferenceModel for AzureOpenAiModel {
    fn name(&self) -> &str {
        "AzureOpenAI"
    }

    async fn extract_metadata(&self, article: &GlobeArticle) -> Result<(LlmArticleData, TokenUsage)> {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: self.prompt.render(&article.content),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        };

        let response = self.complete(&request).await?;
        let usage = response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        let output = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Inference(format!("Empty completion for article {}", article.id)))?;

        let data = LlmArticleData::from_json(&output).map_err(|e| {
            warn!(
                "Failed to parse LLMArticleData from LLM response to article {}: {}",
                article.id, output
            );
            e
        })?;

        debug!("Processed article {} with {} tokens", article.id, usage.total());
        Ok((data, usage))
    }
}
