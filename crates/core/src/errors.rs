use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::ApprovalLevel;
use crate::domain::request::RequestStatus;

/// State-machine violations. These all surface to callers as `conflict`
/// errors: the caller may retry after refreshing state, but the same illegal
/// transition is rejected deterministically every time.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("request is already finalized as {status}")]
    AlreadyFinalized { status: RequestStatus },
    #[error("approver already recorded a level {level} decision for this request")]
    DuplicateApproval { level: ApprovalLevel },
    #[error("cannot approve at Level 2 before Level 1 approval")]
    MissingLevelOneApproval,
    #[error("request has recorded approvals and can no longer be edited")]
    EditLocked,
    #[error("only approved requests can accept receipts (status is {status})")]
    ReceiptBeforeApproval { status: RequestStatus },
    #[error("purchase order has not been generated for this request yet")]
    OrderNotGenerated,
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: RequestStatus, to: RequestStatus },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Malformed or missing input, itemized per offending field. Never retried
/// automatically.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("validation failed: {}", format_fields(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { errors: vec![FieldError::new(field, message)] }
    }
}

fn format_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use crate::domain::request::RequestStatus;

    use super::{DomainError, FieldError, ValidationError};

    #[test]
    fn validation_error_lists_every_offending_field() {
        let error = ValidationError::new(vec![
            FieldError::new("items[0].name", "item name cannot be blank"),
            FieldError::new("items[1].qty", "quantity must be at least 1"),
        ]);

        let rendered = error.to_string();
        assert!(rendered.contains("items[0].name"));
        assert!(rendered.contains("items[1].qty"));
    }

    #[test]
    fn domain_errors_carry_human_readable_reasons() {
        let error = DomainError::AlreadyFinalized { status: RequestStatus::Approved };
        assert_eq!(error.to_string(), "request is already finalized as APPROVED");

        assert_eq!(
            DomainError::MissingLevelOneApproval.to_string(),
            "cannot approve at Level 2 before Level 1 approval"
        );
    }
}
