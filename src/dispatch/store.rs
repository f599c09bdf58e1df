//! HTTP upload target for async job results.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::AsyncStoreConfig;
use crate::error::{DevkitError, Result};
use crate::protocol::CONTENT_TYPE;

use super::hooks::ResultStore;

/// Placeholder replaced by the job id in store URL templates.
pub const JOB_ID_PLACEHOLDER: &str = "{job_id}";

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Uploads each result with `PUT` to a templated URL.
#[derive(Debug, Clone)]
pub struct HttpResultStore {
    client: Client,
    upload_url: String,
    result_url: String,
}

impl HttpResultStore {
    pub fn new(config: &AsyncStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| DevkitError::Store(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            upload_url: config.upload_url.clone(),
            result_url: config.result_url.clone(),
        })
    }

    fn upload_url(&self, job_id: &str) -> String {
        fill_template(&self.upload_url, job_id)
    }
}

#[async_trait]
impl ResultStore for HttpResultStore {
    async fn upload(&self, job_id: &str, payload: Vec<u8>) -> Result<()> {
        let url = self.upload_url(job_id);
        let size = payload.len();

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(payload)
            .send()
            .await
            .map_err(|e| DevkitError::Store(format!("Failed to upload job {}: {}", job_id, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DevkitError::Store(format!(
                "Result store returned HTTP {} for job {}: {}",
                status, job_id, body
            )));
        }

        debug!(job_id, size, "Uploaded job result");
        Ok(())
    }

    fn result_url(&self, job_id: &str) -> String {
        fill_template(&self.result_url, job_id)
    }
}

fn fill_template(template: &str, job_id: &str) -> String {
    template.replace(JOB_ID_PLACEHOLDER, job_id)
}
