use std::path::Path;

use chrono::Local;

use crate::config::load::load_config;
use crate::config::model::RuntimeConfig;
use crate::error::{ConfigError, Result};
use crate::journal::RunLog;
use crate::report::upload::ApiClient;
use crate::report::RunSummary;

pub fn run_test_api(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let log = RunLog::new(Local::now().format("%Y%m%d%H%M%S").to_string());
    let body = test_api(&cfg, &log)?;
    if !body.trim().is_empty() {
        println!("{}", body.trim());
    }
    Ok(())
}

/// Uploads a placeholder summary and returns the endpoint's reply.
pub fn test_api(cfg: &RuntimeConfig, log: &RunLog) -> Result<String> {
    let api = cfg
        .api
        .clone()
        .ok_or_else(|| ConfigError::Invalid("api upload is not enabled".to_string()))?;
    log.info(format!("testing upload to {}", api.endpoint));
    let summary = RunSummary::connectivity_test(&cfg.host_label, &cfg.source, cfg.max_differentials, log);
    let client = ApiClient::new(api, cfg.host_label.clone())?;
    match client.post_summary(&summary) {
        Ok(body) => {
            log.success(format!("upload accepted by {}", client.endpoint()));
            Ok(body)
        }
        Err(err) => {
            log.error(format!("upload test failed: {}", err));
            Err(err)
        }
    }
}
