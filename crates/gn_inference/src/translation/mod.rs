use std::fmt;

use async_trait::async_trait;
use gn_core::{Error, LanguageCode, Result, Secret, TranslatorConfig, Translator};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

use crate::retry::{is_retryable_error, retry_after, RetryPolicy};

const API_VERSION: &str = "3.0";

#[derive(Serialize)]
struct TranslateText<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TranslateResult {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
struct Translation {
    text: String,
}

/// Client for the Azure Translator v3 `translate` endpoint.
pub struct AzureTranslator {
    client: Client,
    api_key: Secret,
    endpoint: Url,
    location: String,
    retry_policy: RetryPolicy,
}

impl AzureTranslator {
    pub fn new(config: &TranslatorConfig) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(config.request_timeout).build()?,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            location: config.location.clone(),
            retry_policy: RetryPolicy::exponential(config.max_retries),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn translate_url(&self) -> String {
        format!("{}/translate", self.endpoint.as_str().trim_end_matches('/'))
    }
}

impl fmt::Debug for AzureTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureTranslator")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint.as_str())
            .field("location", &self.location)
            .finish()
    }
}

#[async_trait]
impl Translator for AzureTranslator {
    async fn translate(&self, text: &str, from: &LanguageCode, to: &LanguageCode) -> Result<String> {
        let url = self.translate_url();
        let body = [TranslateText { text }];
        let attempts = self.retry_policy.max_retries + 1;

        for attempt in 0..attempts {
            let sent = self
                .client
                .post(&url)
                .query(&[
                    ("api-version", API_VERSION),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                ])
                .header("Ocp-Apim-Subscription-Key", self.api_key.expose())
                .header("Ocp-Apim-Subscription-Region", &self.location)
                .header("X-ClientTraceId", Uuid::new_v4().to_string())
                .json(&body)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) if is_retryable_error(&e) && attempt + 1 < attempts => {
                    let delay = self.retry_policy.calculate_delay(attempt, None);
                    warn!("Azure Translator request failed: {}. Retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(Error::Translation(format!("Translation failed: {e}"))),
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt + 1 == attempts {
                    break;
                }
                let delay = self
                    .retry_policy
                    .calculate_delay(attempt, retry_after(response.headers()));
                warn!(
                    "Azure Translator Service rate limit hit, retrying after {:?}.",
                    delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            if !status.is_success() {
                error!("Translation failed: {}", status);
                return Err(Error::Translation(format!("Translation failed: {status}")));
            }

            let results: Vec<TranslateResult> = response
                .json()
                .await
                .map_err(|e| Error::Translation(format!("Translation failed: {e}")))?;
            let translated = results
                .into_iter()
                .next()
                .and_then(|r| r.translations.into_iter().next())
                .map(|t| t.text)
                .unwrap_or_default();

            if translated.is_empty() {
                return Err(Error::Translation("Translation failed: Empty response received".to_string()));
            }
            debug!("Successfully translated text from {} to {}", from, to);
            return Ok(translated);
        }

        Err(Error::Translation(format!(
            "Translation failed: rate limited {attempts} times"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn translator(endpoint: &str, max_retries: u32) -> AzureTranslator {
        AzureTranslator::new(&TranslatorConfig {
            api_key: Secret::new("mock_translator_key"),
            endpoint: Url::parse(endpoint).unwrap(),
            location: "eastus".to_string(),
            max_retries,
            request_timeout: Duration::from_millis(500),
        })
        .unwrap()
        .with_retry_policy(RetryPolicy::exponential(max_retries).with_base_delay(Duration::from_millis(1)))
    }

    fn czech() -> LanguageCode {
        "cs".parse().unwrap()
    }

    fn translated(text: &str) -> serde_json::Value {
        serde_json::json!([{"translations": [{"text": text, "to": "en"}]}])
    }

    #[tokio::test]
    async fn test_translate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(query_param("api-version", "3.0"))
            .and(query_param("from", "cs"))
            .and(query_param("to", "en"))
            .and(header("Ocp-Apim-Subscription-Key", "mock_translator_key"))
            .and(header("Ocp-Apim-Subscription-Region", "eastus"))
            .and(header_exists("X-ClientTraceId"))
            .and(body_json(serde_json::json!([{"text": "Dobrý den"}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(translated("Good day")))
            .expect(1)
            .mount(&server)
            .await;

        let result = translator(&server.uri(), 5)
            .translate("Dobrý den", &czech(), &LanguageCode::english())
            .await
            .unwrap();
        assert_eq!(result, "Good day");
    }

    #[tokio::test]
    async fn test_empty_translation_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(translated("")))
            .mount(&server)
            .await;

        let err = translator(&server.uri(), 5)
            .translate("Ahoj", &czech(), &LanguageCode::english())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Empty response received"));
    }

    #[tokio::test]
    async fn test_honours_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(translated("Hello")))
            .mount(&server)
            .await;

        let start = Instant::now();
        let result = translator(&server.uri(), 5)
            .translate("Ahoj", &czech(), &LanguageCode::english())
            .await
            .unwrap();
        assert_eq!(result, "Hello");
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retries_after_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(translated("Too late"))
                    .set_delay(Duration::from_secs(2)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(translated("Hello")))
            .mount(&server)
            .await;

        let result = translator(&server.uri(), 2)
            .translate("Ahoj", &czech(), &LanguageCode::english())
            .await
            .unwrap();
        assert_eq!(result, "Hello");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_when_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let err = translator(&server.uri(), 2)
            .translate("Ahoj", &czech(), &LanguageCode::english())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Translation(_)));
    }

    #[tokio::test]
    async fn test_other_http_errors_fail_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = translator(&server.uri(), 5)
            .translate("Ahoj", &czech(), &LanguageCode::english())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
