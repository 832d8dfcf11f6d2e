use serde::Serialize;

use procura_core::config::{AppConfig, LoadOptions};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    database_url: String,
    database_max_connections: u32,
    llm_provider: &'static str,
    llm_model: String,
    llm_base_url: Option<String>,
    llm_api_key: &'static str,
    external_timeout_secs: u64,
    blob_root: String,
    log_level: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let effective = EffectiveConfig {
        database_url: config.database.url.clone(),
        database_max_connections: config.database.max_connections,
        llm_provider: config.llm.provider.as_str(),
        llm_model: config.llm.model.clone(),
        llm_base_url: config.llm.base_url.clone(),
        // Secrets never leave the process; report presence only.
        llm_api_key: if config.llm.api_key.is_some() { "<set>" } else { "<unset>" },
        external_timeout_secs: config.external.timeout_secs,
        blob_root: config.blob.root.display().to_string(),
        log_level: config.logging.level.clone(),
    };

    match serde_json::to_string_pretty(&effective) {
        Ok(output) => CommandResult::raw(0, output),
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 2),
    }
}
