// HTTP JSON source implementation
use crate::application::errors::FetchError;
use crate::application::json_source::JsonSource;
use crate::infrastructure::config::HttpSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpJsonSource {
    client: Client,
}

impl HttpJsonSource {
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(settings.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonSource for HttpJsonSource {
    async fn get_json(&self, url: &str, headers: &[(String, String)]) -> Result<Value, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "upstream returned an error status");
            return Err(FetchError::http_status(status.as_u16(), &body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}
