use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use procura_core::domain::actor::{Role, UserId, UserProfile};
use procura_core::domain::approval::{Approval, ApprovalLevel};
use procura_core::domain::item::RequestItem;
use procura_core::domain::order::PurchaseOrder;
use procura_core::domain::receipt::ReceiptValidation;
use procura_core::domain::request::{PurchaseRequest, RequestId};
use procura_core::domain::FileRef;
use procura_core::errors::DomainError;
use procura_core::lifecycle::{Decision, DecisionOutcome, RequestPatch};
use procura_core::policy::VisibilityScope;

pub mod memory;
pub mod request;
pub mod role;

pub use memory::{InMemoryRequestStore, InMemoryRoleDirectory};
pub use request::SqlRequestStore;
pub use role::SqlRoleDirectory;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Lifecycle rule violated; the planner or a guard said no. Surfaces to
    /// callers as a conflict.
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("request not found: {0}")]
    MissingRequest(String),
    #[error("user not found: {0}")]
    MissingUser(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// A wholesale item replacement: the new set plus the recomputed amount,
/// applied atomically with any header changes.
#[derive(Clone, Debug)]
pub struct ItemReplacement {
    pub items: Vec<RequestItem>,
    pub amount: Decimal,
}

/// Persistence surface for the request lifecycle. `record_decision` and
/// `update_request` are transactional: they take the request's write lock,
/// re-read state under it, run the core planner/guards and either commit
/// everything or nothing.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_request(
        &self,
        request: PurchaseRequest,
        items: Vec<RequestItem>,
    ) -> Result<(), StoreError>;

    async fn fetch_request(&self, id: &RequestId) -> Result<Option<PurchaseRequest>, StoreError>;

    async fn fetch_items(&self, id: &RequestId) -> Result<Vec<RequestItem>, StoreError>;

    async fn fetch_approvals(&self, id: &RequestId) -> Result<Vec<Approval>, StoreError>;

    async fn fetch_order(&self, id: &RequestId) -> Result<Option<PurchaseOrder>, StoreError>;

    async fn fetch_receipt_validation(
        &self,
        id: &RequestId,
    ) -> Result<Option<ReceiptValidation>, StoreError>;

    /// Visibility-filtered listing, newest first.
    async fn list_requests(
        &self,
        scope: VisibilityScope,
        viewer: &UserId,
    ) -> Result<Vec<PurchaseRequest>, StoreError>;

    async fn update_request(
        &self,
        id: &RequestId,
        patch: RequestPatch,
        replacement: Option<ItemReplacement>,
    ) -> Result<PurchaseRequest, StoreError>;

    async fn record_decision(
        &self,
        id: &RequestId,
        actor: &UserId,
        level: ApprovalLevel,
        decision: Decision,
        comment: String,
    ) -> Result<DecisionOutcome, StoreError>;

    /// Idempotent: at most one order per request. If one already exists the
    /// existing row is returned untouched.
    async fn insert_order(&self, order: PurchaseOrder) -> Result<PurchaseOrder, StoreError>;

    async fn attach_order_file(
        &self,
        request_id: &RequestId,
        file: &FileRef,
    ) -> Result<(), StoreError>;

    async fn attach_receipt(
        &self,
        request_id: &RequestId,
        file: &FileRef,
    ) -> Result<(), StoreError>;

    async fn upsert_receipt_validation(
        &self,
        validation: ReceiptValidation,
    ) -> Result<(), StoreError>;

    /// Recovery scan: APPROVED requests with no purchase order yet.
    async fn approved_missing_order(&self) -> Result<Vec<PurchaseRequest>, StoreError>;
}

/// The role directory: user → role mapping. Profiles are provisioned
/// explicitly after registration (default `staff`) and changed only by the
/// admin operation.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn lookup(&self, user_id: &UserId) -> Result<Option<Role>, StoreError>;

    /// Create the profile if absent; an existing profile is returned as-is.
    async fn provision(&self, user_id: &UserId, role: Role) -> Result<UserProfile, StoreError>;

    async fn change_role(&self, user_id: &UserId, role: Role) -> Result<UserProfile, StoreError>;
}
