//! Request lifecycle planner.
//!
//! The planner is deterministic and side-effect free: given a snapshot of a
//! request's status and its approval history, it decides whether an action
//! is legal and returns exactly what the store must persist. The store runs
//! the planner inside the transaction that holds the request's write lock,
//! so the snapshot the plan is based on cannot go stale before it is
//! executed.

mod engine;

pub use engine::{
    ensure_editable, ensure_receipt_accepted, plan_decision, Decision, DecisionInput, DecisionPlan,
};

use serde::{Deserialize, Serialize};

use crate::domain::approval::Approval;
use crate::domain::request::PurchaseRequest;

/// Header-field changes for an update. `None` leaves a field untouched.
/// Item replacement travels separately because it recomputes the amount.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.vendor.is_none()
    }
}

/// What the store hands back after executing a decision plan.
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionOutcome {
    pub request: PurchaseRequest,
    pub approval: Approval,
    /// True exactly when this decision transitioned the request to APPROVED,
    /// i.e. the purchase order must now be generated.
    pub generate_order: bool,
}
