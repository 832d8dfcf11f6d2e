use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::FileRef;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request lifecycle states. `Pending` is initial; both other states are
/// terminal and a request never leaves them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: RequestId,
    pub title: String,
    pub description: String,
    pub vendor: String,
    /// Derived from the item set at last save; never accepted from callers.
    pub amount: Decimal,
    pub status: RequestStatus,
    pub created_by: UserId,
    pub last_approved_by: Option<UserId>,
    pub proforma_ref: Option<FileRef>,
    pub receipt_ref: Option<FileRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRequest {
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self.status, next),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
        )
    }

    pub fn transition_to(&mut self, next: RequestStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::actor::UserId;
    use crate::errors::DomainError;

    use super::{PurchaseRequest, RequestId, RequestStatus};

    fn request(status: RequestStatus) -> PurchaseRequest {
        let now = Utc::now();
        PurchaseRequest {
            id: RequestId("PR-1".to_string()),
            title: "Laptops for onboarding".to_string(),
            description: String::new(),
            vendor: "Acme Supplies".to_string(),
            amount: Decimal::new(310000, 2),
            status,
            created_by: UserId("u-staff".to_string()),
            last_approved_by: None,
            proforma_ref: None,
            receipt_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn pending_advances_to_approved_or_rejected() {
        let mut approved = request(RequestStatus::Pending);
        approved.transition_to(RequestStatus::Approved).expect("pending -> approved");
        assert_eq!(approved.status, RequestStatus::Approved);

        let mut rejected = request(RequestStatus::Pending);
        rejected.transition_to(RequestStatus::Rejected).expect("pending -> rejected");
        assert_eq!(rejected.status, RequestStatus::Rejected);
    }

    #[test]
    fn terminal_states_never_reverse() {
        for terminal in [RequestStatus::Approved, RequestStatus::Rejected] {
            for next in [RequestStatus::Pending, RequestStatus::Approved, RequestStatus::Rejected] {
                let mut pr = request(terminal);
                let error = pr.transition_to(next).expect_err("terminal state must not move");
                assert!(matches!(error, DomainError::InvalidTransition { .. }));
                assert_eq!(pr.status, terminal);
            }
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [RequestStatus::Pending, RequestStatus::Approved, RequestStatus::Rejected] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("DRAFT"), None);
    }
}
