// Port for fetching JSON documents over the network
use crate::application::errors::FetchError;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait JsonSource: Send + Sync {
    /// GET `url` with the given headers and parse the body as JSON.
    async fn get_json(&self, url: &str, headers: &[(String, String)]) -> Result<Value, FetchError>;
}
