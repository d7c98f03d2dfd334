use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use super::ApiError;

/// Best candidate returned by the recognition service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BestMatch {
    pub name: String,
    pub confidence: f32,
}

/// Reply of `POST /recognize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecognitionReply {
    #[serde(default)]
    pub match_success: bool,
    #[serde(default)]
    pub best_match: Option<BestMatch>,
}

impl RecognitionReply {
    /// The identity label, only when the service reports a positive match.
    pub fn positive_match(&self) -> Option<&BestMatch> {
        if !self.match_success {
            return None;
        }
        self.best_match
            .as_ref()
            .filter(|best| !best.name.trim().is_empty())
    }
}

/// Face recognition endpoint. Best-effort: every failure is per-request.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn recognize(&self, image_base64: &str) -> Result<RecognitionReply, ApiError>;
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    image: &'a str,
}

/// HTTP client for the external recognition process. No request timeout is set.
#[derive(Clone)]
pub struct RecognitionClient {
    client: Client,
    endpoint: Url,
}

impl RecognitionClient {
    pub fn new(service_url: &str) -> Result<Self> {
        let mut endpoint = Url::parse(service_url)
            .with_context(|| format!("invalid recognition url '{service_url}'"))?;
        endpoint
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("recognition url '{service_url}' cannot carry a path"))?
            .pop_if_empty()
            .push("recognize");

        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RecognitionService for RecognitionClient {
    async fn recognize(&self, image_base64: &str) -> Result<RecognitionReply, ApiError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&RecognizeRequest {
                image: image_base64,
            })
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: format!("recognition server error - HTTP {}", status.as_u16()),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_points_at_recognize() {
        let client = RecognitionClient::new("http://localhost:8000").unwrap();
        assert_eq!(client.endpoint().as_str(), "http://localhost:8000/recognize");
    }

    #[test]
    fn positive_match_requires_flag_and_name() {
        let reply: RecognitionReply = serde_json::from_str(
            r#"{"match_success": true, "best_match": {"name": "STU2026001", "confidence": 0.92}}"#,
        )
        .unwrap();
        assert_eq!(reply.positive_match().map(|m| m.name.as_str()), Some("STU2026001"));

        let miss: RecognitionReply =
            serde_json::from_str(r#"{"match_success": false, "best_match": null}"#).unwrap();
        assert!(miss.positive_match().is_none());

        let unnamed: RecognitionReply = serde_json::from_str(
            r#"{"match_success": true, "best_match": {"name": " ", "confidence": 0.5}}"#,
        )
        .unwrap();
        assert!(unnamed.positive_match().is_none());
    }
}
