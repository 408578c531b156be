use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{errors::AnalysisError, models::RawVerdict, settings::AnalysisSettings};

use super::ImagePayload;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Remote fact-checking collaborator.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, image: &ImagePayload) -> Result<RawVerdict, AnalysisError>;
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    success: bool,
    #[serde(default)]
    result: Option<RawVerdict>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Maps a raw HTTP exchange onto the service contract: non-2xx is a transport
/// failure, unparseable or incomplete success bodies are malformed.
pub fn interpret_response(status: u16, body: &str) -> Result<RawVerdict, AnalysisError> {
    if !(200..300).contains(&status) {
        return Err(AnalysisError::Transport {
            status: Some(status),
            message: format!("Server error: {status}"),
        });
    }

    let response: AnalyzeResponse = serde_json::from_str(body)
        .map_err(|err| AnalysisError::Malformed(format!("invalid body: {err}")))?;

    match response {
        AnalyzeResponse {
            success: true,
            result: Some(result),
            ..
        } => Ok(result),
        AnalyzeResponse {
            success: true,
            result: None,
            ..
        } => Err(AnalysisError::Malformed(
            "success without a result".to_string(),
        )),
        AnalyzeResponse {
            success: false,
            error,
            ..
        } => Err(AnalysisError::Rejected(
            error.unwrap_or_else(|| "Unknown error occurred".to_string()),
        )),
    }
}

pub struct HttpAnalysisService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build analysis HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /health`; true only when the backend reports itself healthy.
    pub async fn health(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .context("health probe failed")?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let health: HealthResponse = response
            .json()
            .await
            .context("health probe returned an unexpected body")?;
        Ok(health.status == "healthy")
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, image: &ImagePayload) -> Result<RawVerdict, AnalysisError> {
        let url = format!("{}/analyze", self.base_url);
        log_info!("Posting {} base64 bytes to {}", image.len(), url);

        let response = self
            .client
            .post(&url)
            .json(&AnalyzeRequest {
                image: image.as_str(),
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        interpret_response(status, &body).inspect_err(|err| {
            log_warn!("Analysis request to {} failed: {}", url, err);
        })
    }
}

/// Offline stand-in for the backend used in demos and development builds.
pub struct MockAnalysisService {
    delay: Duration,
}

impl MockAnalysisService {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockAnalysisService {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

#[async_trait]
impl AnalysisService for MockAnalysisService {
    async fn analyze(&self, _image: &ImagePayload) -> Result<RawVerdict, AnalysisError> {
        tokio::time::sleep(self.delay).await;

        let truth_score = rand::thread_rng().gen_range(0..30u8);
        Ok(RawVerdict {
            claim: "Florida aliens discovered".to_string(),
            truth_score: f64::from(truth_score),
            summary: "No credible evidence found. This appears to be misinformation or a hoax."
                .to_string(),
            sources: vec![
                "Reuters".to_string(),
                "Snopes".to_string(),
                "FactCheck.org".to_string(),
            ],
        })
    }
}

/// The mock in demo mode, the HTTP backend otherwise.
pub fn service_from_settings(settings: &AnalysisSettings) -> Result<Arc<dyn AnalysisService>> {
    if settings.use_mock {
        log_info!("Using mock analysis service ({}ms delay)", settings.mock_delay_ms);
        return Ok(Arc::new(MockAnalysisService::new(settings.mock_delay())));
    }

    log_info!("Using analysis backend at {}", settings.base_url);
    let service = HttpAnalysisService::new(settings.base_url.clone(), settings.timeout())?;
    Ok(Arc::new(service))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_status_is_transport_failure() {
        match interpret_response(500, "") {
            Err(AnalysisError::Transport { status, message }) => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "Server error: 500");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn success_with_result_parses_verdict() {
        let body = r#"{"success":true,"result":{"claim":"X","truthScore":15,"summary":"No evidence found","sources":["Reuters"]}}"#;
        let verdict = interpret_response(200, body).unwrap();
        assert_eq!(verdict.claim, "X");
        assert_eq!(verdict.truth_score, 15.0);
    }

    #[test]
    fn success_flag_false_is_rejected() {
        let body = r#"{"success":false,"error":"Server error: 500"}"#;
        assert!(matches!(
            interpret_response(200, body),
            Err(AnalysisError::Rejected(msg)) if msg == "Server error: 500"
        ));
        assert!(matches!(
            interpret_response(200, r#"{"success":false}"#),
            Err(AnalysisError::Rejected(msg)) if msg == "Unknown error occurred"
        ));
    }

    #[test]
    fn missing_fields_are_malformed() {
        assert!(matches!(
            interpret_response(200, r#"{"success":true}"#),
            Err(AnalysisError::Malformed(_))
        ));
        assert!(matches!(
            interpret_response(200, r#"{"success":true,"result":{"claim":"X"}}"#),
            Err(AnalysisError::Malformed(_))
        ));
        assert!(matches!(
            interpret_response(200, "<html>"),
            Err(AnalysisError::Malformed(_))
        ));
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let service =
            HttpAnalysisService::new("https://api.example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(service.base_url(), "https://api.example.com");
    }

    #[tokio::test]
    async fn settings_pick_the_mock() {
        let settings = AnalysisSettings {
            mock_delay_ms: 0,
            ..Default::default()
        };
        let service = service_from_settings(&settings).unwrap();
        let verdict = service
            .analyze(&ImagePayload::from_base64(""))
            .await
            .unwrap();
        assert_eq!(verdict.claim, "Florida aliens discovered");

        let http = AnalysisSettings {
            use_mock: false,
            ..Default::default()
        };
        assert!(service_from_settings(&http).is_ok());
    }

    #[tokio::test]
    async fn mock_returns_low_score_verdict() {
        let service = MockAnalysisService::new(Duration::ZERO);
        let verdict = service
            .analyze(&ImagePayload::from_base64(""))
            .await
            .unwrap();
        assert!((0.0..30.0).contains(&verdict.truth_score));
        assert_eq!(verdict.sources.len(), 3);
    }
}
