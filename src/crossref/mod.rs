//! Crossref works API client with bounded retries and exponential backoff.
//!
//! Outcome taxonomy: 404 is an authoritative answer and fails immediately;
//! 429 and 5xx are retried on the backoff schedule and fail with their own
//! kinds once the budget is spent; transport failures retry on a slightly
//! shorter schedule; any other non-2xx fails immediately.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;

use crate::config::CrossrefConfig;
use crate::errors::MetaError;

/// Crossref works client. Cheap to clone; the underlying connection pool is
/// shared.
#[derive(Debug, Clone)]
pub struct CrossrefClient {
    http: reqwest::Client,
    config: CrossrefConfig,
}

impl CrossrefClient {
    pub fn new(config: CrossrefConfig) -> Result<Self, MetaError> {
        // Identification per the Crossref etiquette convention.
        let user_agent = format!(
            "{}/{} (mailto:{})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            config.mailto
        );
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|err| MetaError::Unknown(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, config })
    }

    /// Fetch the `message` object for one DOI.
    pub async fn fetch_metadata(&self, doi: &str) -> Result<CrossrefWork, MetaError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(doi)
        );
        let total_attempts = self.config.max_retries + 1;

        for attempt in 0..total_attempts {
            let response = match self.http.get(&url).send().await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(
                        "Crossref request failed ({}/{}): {err}",
                        attempt + 1,
                        total_attempts
                    );
                    if attempt + 1 == total_attempts {
                        return Err(MetaError::CrossrefRequestFailed(format!(
                            "Crossref request failed for DOI {doi}: {err}"
                        )));
                    }
                    sleep(self.backoff_delay(attempt)).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(MetaError::CrossrefNotFound(doi.to_string()));
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!(
                    "Crossref rate limit encountered for {doi} ({}/{})",
                    attempt + 1,
                    total_attempts
                );
                if attempt + 1 == total_attempts {
                    return Err(MetaError::CrossrefRateLimit(
                        "Crossref rate limit reached. Try again shortly.".to_string(),
                    ));
                }
                sleep(self.backoff_delay(attempt + 1)).await;
                continue;
            }
            if status.is_server_error() {
                tracing::warn!(
                    "Crossref server error {status} for {doi} ({}/{})",
                    attempt + 1,
                    total_attempts
                );
                if attempt + 1 == total_attempts {
                    return Err(MetaError::CrossrefServerError(format!(
                        "Crossref temporary error ({status}) for DOI {doi}"
                    )));
                }
                sleep(self.backoff_delay(attempt + 1)).await;
                continue;
            }
            if !status.is_success() {
                return Err(MetaError::CrossrefRequestFailed(format!(
                    "Crossref request error ({status}) for DOI {doi}"
                )));
            }

            let envelope: CrossrefEnvelope = response.json().await.map_err(|err| {
                MetaError::CrossrefRequestFailed(format!(
                    "Crossref returned an undecodable body for DOI {doi}: {err}"
                ))
            })?;
            return Ok(envelope.message);
        }

        Err(MetaError::CrossrefRequestFailed(format!(
            "Crossref request failed for DOI {doi}"
        )))
    }

    fn backoff_delay(&self, exponent: u32) -> Duration {
        Duration::from_secs_f64(self.config.backoff.powi(exponent as i32))
    }
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefEnvelope {
    #[serde(default)]
    message: CrossrefWork,
}

/// The `message` object of a Crossref works response. Transient: consumed by
/// the normalizer, never persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefWork {
    #[serde(default)]
    pub title: Vec<String>,

    #[serde(default)]
    pub author: Vec<CrossrefAuthor>,

    #[serde(default)]
    pub issued: CrossrefDate,

    #[serde(default, rename = "container-title")]
    pub container_title: Vec<String>,

    #[serde(default, rename = "DOI")]
    pub doi: Option<String>,

    /// May carry JATS/HTML tags; may be missing or malformed upstream.
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<Value>,

    #[serde(default, rename = "URL")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefAuthor {
    #[serde(default)]
    pub given: Option<String>,

    #[serde(default)]
    pub family: Option<String>,
}

/// `issued` carries nested date parts; the first entry of the first list is
/// the year, as a number or digit string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrossrefDate {
    #[serde(default, rename = "date-parts")]
    pub date_parts: Vec<Vec<Value>>,
}
