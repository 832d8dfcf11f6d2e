use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use procura_core::config::{AppConfig, LoadOptions};
use procura_db::{connect, SqlRequestStore, SqlRoleDirectory};
use procura_docint::{
    FsBlobStore, HttpLlmClient, LlmOrderProducer, LlmReceiptReconciler, Utf8TextExtractor,
};
use procura_engine::{EngineDeps, LifecycleEngine};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct BackfillOutput {
    command: &'static str,
    status: &'static str,
    generated: Vec<String>,
    failed: Vec<FailedEntry>,
}

#[derive(Debug, Serialize)]
struct FailedEntry {
    request: String,
    error: String,
}

/// Recovery path for the documented approval/generation split: approvals
/// commit first, so a generator outage can leave APPROVED requests without
/// a purchase order. This scans and regenerates them.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "backfill-pos",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match crate::commands::runtime() {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let llm = Arc::new(
            HttpLlmClient::from_config(&config.llm)
                .map_err(|error| ("llm_client", format!("{error:#}"), 6u8))?,
        );

        let engine = LifecycleEngine::new(
            EngineDeps {
                store: Arc::new(SqlRequestStore::new(pool.clone())),
                roles: Arc::new(SqlRoleDirectory::new(pool.clone())),
                orders: Arc::new(LlmOrderProducer::new(llm.clone())),
                extractor: Arc::new(Utf8TextExtractor),
                reconciler: Arc::new(LlmReceiptReconciler::new(llm)),
                blobs: Arc::new(FsBlobStore::new(config.blob.root.clone())),
            },
            Duration::from_secs(config.external.timeout_secs),
        )
        .map_err(|error| ("engine_init", format!("{error:#}"), 6u8))?;

        let report = engine
            .backfill_orders()
            .await
            .map_err(|error| ("backfill", error.to_string(), 7u8))?;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(report)
    });

    match result {
        Ok(report) => {
            let any_failed = !report.failed.is_empty();
            let output = BackfillOutput {
                command: "backfill-pos",
                status: if any_failed { "partial" } else { "ok" },
                generated: report.generated.into_iter().map(|id| id.0).collect(),
                failed: report
                    .failed
                    .into_iter()
                    .map(|(id, error)| FailedEntry { request: id.0, error })
                    .collect(),
            };
            let rendered = serde_json::to_string(&output)
                .unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
            CommandResult::raw(u8::from(any_failed), rendered)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("backfill-pos", error_class, message, exit_code)
        }
    }
}
