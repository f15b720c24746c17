use crate::config::{Config, ConfigError};
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, Credential, CustomEndpointRegistry, ImageResponse,
};
use crate::vision::throttle::Throttle;

use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Authentication failed: {message}")]
    Auth {
        status: Option<u16>,
        message: String,
    },
    #[error("Not connected: call connect() before requesting an analysis")]
    NotConnected,
    #[error("Analysis request failed with HTTP {status}: {body}")]
    Request { status: u16, body: String },
    #[error("Unexpected response format: {0}")]
    ResponseFormat(String),
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error reading image: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Client for the EyeEm Vision API.
///
/// Holds the bearer credential set by [`VisionClient::connect`] and the
/// registry of personalized models used for `CUSTOM_ENDPOINTS`.
#[derive(Debug)]
pub struct VisionClient {
    http: Client,
    api_base_url: String,
    credential: Option<Credential>,
    custom_endpoints: CustomEndpointRegistry,
    throttle: Option<Throttle>,
}

impl VisionClient {
    pub fn new(api_base_url: impl Into<String>, timeout: Duration) -> Result<Self, VisionError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            credential: None,
            custom_endpoints: CustomEndpointRegistry::new(),
            throttle: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, VisionError> {
        config.validate()?;

        let mut client = Self::new(config.api_base_url.clone(), config.request_timeout())?
            .with_custom_endpoints(config.custom_endpoint_registry()?);

        if let Some(interval) = config.throttle_interval() {
            client = client.with_throttle(interval);
        }

        Ok(client)
    }

    pub fn with_custom_endpoints(mut self, registry: CustomEndpointRegistry) -> Self {
        self.custom_endpoints = registry;
        self
    }

    /// Space analysis requests at least `interval` apart.
    pub fn with_throttle(mut self, interval: Duration) -> Self {
        self.throttle = Some(Throttle::new(interval));
        self
    }

    pub fn custom_endpoints(&self) -> &CustomEndpointRegistry {
        &self.custom_endpoints
    }

    pub fn custom_endpoints_mut(&mut self) -> &mut CustomEndpointRegistry {
        &mut self.custom_endpoints
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    pub fn is_connected(&self) -> bool {
        self.credential.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path)
    }

    /// Exchange client credentials for an access token.
    ///
    /// The token lasts up to 72 hours; reconnect to refresh it. On failure the
    /// previously stored credential is left untouched.
    pub async fn connect(
        &mut self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<&Credential, VisionError> {
        let url = self.endpoint("token");
        debug!("Requesting access token from {}", url);

        let response = self
            .http
            .post(&url)
            .form(&[("clientId", client_id), ("clientSecret", client_secret)])
            .send()
            .await?;

        // Check response status
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Token request rejected: HTTP {}", status);
            return Err(VisionError::Auth {
                status: Some(status.as_u16()),
                message: format!("token endpoint returned HTTP {status}: {body}"),
            });
        }

        let body: Value = response.json().await.map_err(|e| VisionError::Auth {
            status: Some(status.as_u16()),
            message: format!("token response is not valid JSON: {e}"),
        })?;

        // Both fields are required to build the Authorization header
        let field = |name: &str| -> Result<String, VisionError> {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| VisionError::Auth {
                    status: Some(status.as_u16()),
                    message: format!("token response is missing '{name}'"),
                })
        };

        let credential = Credential::new(field("token_type")?, field("access_token")?);
        info!("EyeEm API token updated");

        Ok(self.credential.insert(credential))
    }

    /// POST one analyze payload and return the first entry of `responses`.
    pub(crate) async fn fetch_analysis(
        &self,
        request: &AnalyzeRequest,
    ) -> Result<ImageResponse, VisionError> {
        let credential = self.credential.as_ref().ok_or(VisionError::NotConnected)?;

        // Respect the configured request rate
        if let Some(throttle) = &self.throttle {
            throttle.wait().await;
        }

        let url = self.endpoint("analyze");
        debug!(
            "Sending analysis request to {} ({} task(s))",
            url,
            request.requests.iter().map(|r| r.tasks.len()).sum::<usize>()
        );

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, credential.header_value())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Analysis request failed: HTTP {}", status);
            return Err(VisionError::Request {
                status: status.as_u16(),
                body,
            });
        }

        // Parse response
        let body = response.text().await?;
        debug!("Analysis response received: {} bytes", body.len());

        let parsed: AnalyzeResponse = serde_json::from_str(&body).map_err(|e| {
            VisionError::ResponseFormat(format!("expected an object with 'responses': {e}"))
        })?;

        parsed
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| VisionError::ResponseFormat("'responses' is empty".to_string()))
    }
}
