//! Procurement workflow core - pure domain logic for the request lifecycle.
//!
//! This crate holds everything that can be decided without I/O:
//!
//! - the data model (`domain`): purchase requests, line items, approvals,
//!   purchase orders, receipt validations, actors and roles
//! - the line-item ledger (`ledger`): item validation and exact decimal totals
//! - the lifecycle planner (`lifecycle`): given a snapshot of a request and
//!   its approval history, decide whether an action is legal and what must be
//!   persisted
//! - the access policy (`policy`): role/action permission checks and per-role
//!   visibility scopes
//! - the error taxonomy (`errors`) and configuration loading (`config`)
//!
//! Persistence, external document services and orchestration live in the
//! sibling crates; they execute what this crate decides.

pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod lifecycle;
pub mod policy;

pub use domain::actor::{Actor, Role, UserId, UserProfile};
pub use domain::approval::{Approval, ApprovalId, ApprovalLevel, NewApproval};
pub use domain::order::{OrderContent, OrderId, OrderLine, PurchaseOrder};
pub use domain::receipt::{ReceiptValidation, ReconciliationReport};
pub use domain::request::{PurchaseRequest, RequestId, RequestStatus};
pub use domain::FileRef;
pub use errors::{DomainError, FieldError, ValidationError};
pub use ledger::{validate_items, ItemDraft, ValidatedItems};
pub use lifecycle::{
    plan_decision, Decision, DecisionInput, DecisionOutcome, DecisionPlan, RequestPatch,
};
pub use policy::{permits, scope_admits, visibility, LifecycleAction, VisibilityScope};
