//! HTTP client for the extraction service.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

use crate::{
    config::ExtractionConfig,
    extraction::{ExtractionRequest, ExtractionResponse, ExtractionService},
    Error, Result,
};

pub struct HttpExtractionService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpExtractionService {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse> {
        debug!(
            column_id = %request.column_id,
            rows = request.row_payload.len(),
            documents = request.document_ids.len(),
            "Calling extraction service"
        );

        let mut http_request = self.client.post(&self.endpoint).json(request);
        if let Some(api_key) = &self.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "Extraction service returned an error");
            return Err(Error::Extraction {
                column_id: request.column_id.clone(),
                message: format!("extraction service returned {status}"),
                request: serde_json::to_value(request)?,
                response: serde_json::json!({ "status": status.as_u16(), "body": body }),
            });
        }

        Ok(response.json::<ExtractionResponse>().await?)
    }
}
