use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;

use crate::config::model::ApiSettings;
use crate::error::{Result, SnapcycleError};
use crate::report::RunSummary;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const SUMMARY_FILE_NAME: &str = "backup.json";

/// Posts run summaries as `multipart/form-data` with fields `hostname`,
/// `backup_type` and the summary as file part `backuplog`.
pub struct ApiClient {
    settings: ApiSettings,
    hostname: String,
    client: Client,
}

impl ApiClient {
    pub fn new(settings: ApiSettings, hostname: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| SnapcycleError::message(format!("http client: {}", e)))?;
        Ok(Self {
            settings,
            hostname: hostname.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    fn form(&self, summary: &RunSummary) -> Result<Form> {
        let body = summary.to_json()?;
        let part = Part::bytes(body.into_bytes())
            .file_name(SUMMARY_FILE_NAME)
            .mime_str("application/json")
            .map_err(|e| SnapcycleError::message(format!("build upload: {}", e)))?;
        Ok(Form::new()
            .text("hostname", self.hostname.clone())
            .text("backup_type", self.settings.backup_type.clone())
            .part("backuplog", part))
    }

    /// Returns the response body on 200 or 201.
    pub fn post_summary(&self, summary: &RunSummary) -> Result<String> {
        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.token)
            .multipart(self.form(summary)?)
            .send()
            .map_err(|e| SnapcycleError::message(format!("upload to {}: {}", self.settings.endpoint, e)))?;
        let status = response.status();
        let body = response.text().unwrap_or_default();
        match status.as_u16() {
            200 | 201 => Ok(body),
            code => Err(SnapcycleError::message(format!("upload rejected: HTTP {}: {}", code, body.trim()))),
        }
    }
}
