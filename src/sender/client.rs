use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_key: String,
    pub request_timeout: Duration,
    pub connection_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://collector.example.com/v1/events".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            user_agent: concat!("pulse-telemetry/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP session shared by every batch transmission: validated collector
/// URL, auth key, and a pooled reqwest client with the configured timeouts.
#[derive(Debug, Clone)]
pub struct HttpClient {
    pub client: Client,
    pub endpoint_url: Url,
    pub api_key: String,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let endpoint_url: Url = config
            .endpoint
            .parse()
            .map_err(|e| ClientError::InvalidConfiguration(format!("Invalid endpoint URL: {e}")))?;

        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .connect_timeout(config.connection_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint_url,
            api_key: config.api_key,
        })
    }
}
