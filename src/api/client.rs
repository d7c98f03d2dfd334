use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{
    auth::CredentialProvider,
    error::{error_for_status, UNREADABLE_BODY},
    ApiError,
};

/// HTTP client for the directory, attendance and auth endpoints.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpBackend {
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid api base url '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("api base url '{base_url}' cannot carry a path");
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            credentials,
        })
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    /// Base url extended with percent-encoded path segments.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Endpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends with the bearer token attached. `Ok(None)` means an empty body (e.g. 204).
    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        let request = match self.credentials.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        self.dispatch(request).await
    }

    pub(crate) async fn send_unauthenticated<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        self.dispatch(request).await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = read_body(response).await;
        if !status.is_success() {
            let err = error_for_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown"),
                &body,
            );
            if err.is_auth() {
                self.credentials.invalidate();
            }
            return Err(err);
        }

        decode_body(body)
    }
}

/// JSON bodies are parsed as-is; anything else is wrapped as `{"message": text}`.
async fn read_body(response: Response) -> Value {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false);

    if is_json {
        response
            .json::<Value>()
            .await
            .unwrap_or_else(|_| json!({ "message": UNREADABLE_BODY }))
    } else {
        match response.text().await {
            Ok(text) => json!({ "message": text }),
            Err(_) => json!({ "message": UNREADABLE_BODY }),
        }
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: Value) -> Result<Option<T>, ApiError> {
    if body.is_null() {
        return Ok(None);
    }
    serde_json::from_value(body)
        .map(Some)
        .map_err(|err| ApiError::Decode(err.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct StaticToken(pub Option<String>);

    impl CredentialProvider for StaticToken {
        fn bearer_token(&self) -> Option<String> {
            self.0.clone()
        }

        fn invalidate(&self) {}
    }

    pub(crate) fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(base, Arc::new(StaticToken(None))).unwrap()
    }

    #[test]
    fn endpoint_appends_encoded_segments() {
        let backend = backend("http://localhost:8080/api");
        let url = backend.endpoint(&["students", "code", "A B/1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/students/code/A%20B%2F1");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let backend = backend("http://localhost:8080/api/");
        let url = backend.endpoint(&["auth", "login"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/auth/login");
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(HttpBackend::new("mailto:office@school.eg", Arc::new(StaticToken(None))).is_err());
        assert!(HttpBackend::new("not a url", Arc::new(StaticToken(None))).is_err());
    }

    #[test]
    fn null_body_decodes_to_none() {
        let decoded: Option<Value> = decode_body(Value::Null).unwrap();
        assert!(decoded.is_none());
    }
}
