use serde::Serialize;

use procura_core::config::{AppConfig, LoadOptions};
use procura_db::{connect, migrations};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    status: &'static str,
    detail: String,
}

impl Check {
    fn ok(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, status: "ok", detail: detail.into() }
    }

    fn failed(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, status: "failed", detail: detail.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    command: &'static str,
    status: &'static str,
    checks: Vec<Check>,
}

pub fn run(json: bool) -> CommandResult {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(Check::ok("config", "configuration loaded and validated"));
            Some(config)
        }
        Err(error) => {
            checks.push(Check::failed("config", error.to_string()));
            None
        }
    };

    if let Some(config) = &config {
        match crate::commands::runtime() {
            Ok(runtime) => runtime.block_on(async {
                match connect(&config.database).await {
                    Ok(pool) => {
                        checks.push(Check::ok(
                            "database",
                            format!("connected to {}", config.database.url),
                        ));

                        match migrations::schema_ready(&pool).await {
                            Ok(true) => {
                                checks.push(Check::ok("schema", "baseline tables present"));
                            }
                            Ok(false) => checks.push(Check::failed(
                                "schema",
                                "baseline tables missing; run `procura migrate`",
                            )),
                            Err(error) => checks.push(Check::failed("schema", error.to_string())),
                        }

                        pool.close().await;
                    }
                    Err(error) => checks.push(Check::failed("database", error.to_string())),
                }
            }),
            Err(result) => return result,
        }

        match std::fs::create_dir_all(&config.blob.root) {
            Ok(()) => checks.push(Check::ok(
                "blob_storage",
                format!("writable at {}", config.blob.root.display()),
            )),
            Err(error) => checks.push(Check::failed("blob_storage", error.to_string())),
        }
    }

    let healthy = checks.iter().all(|check| check.status == "ok");
    let report = DoctorReport {
        command: "doctor",
        status: if healthy { "ok" } else { "error" },
        checks,
    };

    let output = if json {
        serde_json::to_string(&report).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    } else {
        let mut lines = vec![format!("doctor: {}", report.status)];
        for check in &report.checks {
            lines.push(format!("  [{}] {} - {}", check.status, check.name, check.detail));
        }
        lines.join("\n")
    };

    CommandResult::raw(u8::from(!healthy), output)
}
