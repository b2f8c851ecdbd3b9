//! One-shot webhook provider for swag requests.
//!
//! Only `create` is implemented. The resource has two states, absent and created;
//! update, read and delete fall through to the trait defaults and are refused.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use super::{CreateResult, ProviderError, ResourceProvider};
use crate::models::{Outputs, ResourceKind, SwagProps};

/// Posts swag submissions to a configured webhook endpoint.
#[derive(Debug, Clone)]
pub struct SwagProvider {
    endpoint: String,
    client: Client,
}

impl SwagProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, Client::new())
    }

    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ResourceProvider for SwagProvider {
    /// POST the props as JSON. Anything but `200 OK` is fatal.
    async fn create(
        &self,
        name: &str,
        _kind: ResourceKind,
        inputs: &Value,
    ) -> Result<CreateResult, ProviderError> {
        let props: SwagProps = serde_json::from_value(inputs.clone())
            .map_err(|e| ProviderError::Rejected(format!("Invalid swag request props: {}", e)))?;

        tracing::info!(resource = name, "Sending swag request");
        let response = self.client.post(&self.endpoint).json(&props).send().await?;
        let status = response.status();
        tracing::debug!(resource = name, %status, "Swag webhook responded");

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Fatal(format!(
                "Swag webhook responded with {}: {}",
                status, body
            )));
        }

        let outputs: Outputs = match inputs {
            Value::Object(map) => map.clone().into_iter().collect(),
            _ => Outputs::new(),
        };
        Ok(CreateResult {
            id: props.email,
            outputs,
        })
    }
}
