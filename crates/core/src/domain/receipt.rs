use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

/// Verdict returned by the receipt reconciler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub is_valid: bool,
    pub discrepancies: Vec<String>,
}

/// The current reconciliation outcome for a request. At most one exists per
/// request; each receipt submission overwrites it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiptValidation {
    pub request_id: RequestId,
    pub validated_at: DateTime<Utc>,
    pub result: serde_json::Value,
    pub discrepancies: Vec<String>,
    pub is_valid: bool,
}

impl ReceiptValidation {
    pub fn from_report(request_id: RequestId, report: &ReconciliationReport) -> Self {
        Self {
            request_id,
            validated_at: Utc::now(),
            result: serde_json::json!({
                "is_valid": report.is_valid,
                "discrepancies": report.discrepancies,
            }),
            discrepancies: report.discrepancies.clone(),
            is_valid: report.is_valid,
        }
    }
}
