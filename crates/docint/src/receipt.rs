use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use procura_core::domain::order::OrderContent;
use procura_core::domain::receipt::ReconciliationReport;

use crate::llm::LlmClient;

/// Pulls searchable text out of an uploaded receipt before anything is
/// persisted. PDF extraction sits behind this same trait in deployments that
/// need it.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String>;
}

/// Treats the upload as UTF-8 text. Rejects binary garbage outright, which
/// is exactly the failure the engine must surface without touching the
/// request.
#[derive(Clone, Debug, Default)]
pub struct Utf8TextExtractor;

#[async_trait]
impl TextExtractor for Utf8TextExtractor {
    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| anyhow!("receipt `{filename}` is not valid utf-8 text"))?;
        if text.trim().is_empty() {
            return Err(anyhow!("receipt `{filename}` contains no extractable text"));
        }
        Ok(text.to_string())
    }
}

/// Compares extracted receipt text against the stored order content.
#[async_trait]
pub trait ReceiptReconciler: Send + Sync {
    async fn validate(
        &self,
        order: &OrderContent,
        receipt_text: &str,
    ) -> Result<ReconciliationReport>;
}

#[derive(Deserialize)]
struct LlmVerdict {
    is_valid: bool,
    #[serde(default)]
    discrepancies: Vec<String>,
}

/// Asks the model for a strict-JSON verdict. An unparseable reply is an
/// error, never a pass.
pub struct LlmReceiptReconciler {
    llm: Arc<dyn LlmClient>,
}

impl LlmReceiptReconciler {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

fn verdict_prompt(order: &OrderContent, receipt_text: &str) -> String {
    let order_json = serde_json::to_string_pretty(order).unwrap_or_default();
    format!(
        "Compare this receipt against the purchase order and report every \
         discrepancy (vendor, line items, quantities, amounts).\n\n\
         PURCHASE ORDER:\n{order_json}\n\n\
         RECEIPT TEXT:\n{receipt_text}\n\n\
         Reply with JSON only, no prose, shaped exactly like:\n\
         {{\"is_valid\": true, \"discrepancies\": []}}"
    )
}

/// Models love wrapping JSON in markdown fences; strip them before parsing.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[async_trait]
impl ReceiptReconciler for LlmReceiptReconciler {
    async fn validate(
        &self,
        order: &OrderContent,
        receipt_text: &str,
    ) -> Result<ReconciliationReport> {
        let reply = self
            .llm
            .complete(&verdict_prompt(order, receipt_text))
            .await
            .context("requesting reconciliation verdict")?;

        let verdict: LlmVerdict = serde_json::from_str(strip_code_fences(&reply))
            .with_context(|| format!("reconciler returned an unparseable verdict: {reply}"))?;

        Ok(ReconciliationReport {
            is_valid: verdict.is_valid && verdict.discrepancies.is_empty(),
            discrepancies: verdict.discrepancies,
        })
    }
}

/// Deterministic reconciler: substring checks for vendor, each line item
/// name and the order total. Used in tests and as an offline fallback.
#[derive(Clone, Debug, Default)]
pub struct RuleBasedReconciler;

#[async_trait]
impl ReceiptReconciler for RuleBasedReconciler {
    async fn validate(
        &self,
        order: &OrderContent,
        receipt_text: &str,
    ) -> Result<ReconciliationReport> {
        let haystack = receipt_text.to_lowercase();
        let mut discrepancies = Vec::new();

        if !haystack.contains(&order.vendor.to_lowercase()) {
            discrepancies.push(format!("vendor `{}` not found on receipt", order.vendor));
        }
        for line in &order.lines {
            if !haystack.contains(&line.name.to_lowercase()) {
                discrepancies.push(format!("item `{}` not found on receipt", line.name));
            }
        }
        if !haystack.contains(&order.total.to_string()) {
            discrepancies.push(format!("order total {} not found on receipt", order.total));
        }

        Ok(ReconciliationReport { is_valid: discrepancies.is_empty(), discrepancies })
    }
}
