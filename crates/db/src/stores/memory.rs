//! In-memory fakes for tests and offline tooling. They run the same core
//! planner and guards as the SQL store, with a single `RwLock` standing in
//! for the per-request write lock.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use procura_core::domain::actor::{Role, UserId, UserProfile};
use procura_core::domain::approval::{Approval, ApprovalId, ApprovalLevel};
use procura_core::domain::item::RequestItem;
use procura_core::domain::order::PurchaseOrder;
use procura_core::domain::receipt::ReceiptValidation;
use procura_core::domain::request::{PurchaseRequest, RequestId};
use procura_core::domain::FileRef;
use procura_core::lifecycle::{
    ensure_editable, plan_decision, Decision, DecisionInput, DecisionOutcome, RequestPatch,
};
use procura_core::policy::{scope_admits, VisibilityScope};

use super::{ItemReplacement, RequestStore, RoleDirectory, StoreError};

#[derive(Default)]
struct RequestState {
    requests: HashMap<String, PurchaseRequest>,
    items: HashMap<String, Vec<RequestItem>>,
    approvals: HashMap<String, Vec<Approval>>,
    orders: HashMap<String, PurchaseOrder>,
    validations: HashMap<String, ReceiptValidation>,
}

#[derive(Default)]
pub struct InMemoryRequestStore {
    state: RwLock<RequestState>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert_request(
        &self,
        request: PurchaseRequest,
        items: Vec<RequestItem>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.items.insert(request.id.0.clone(), items);
        state.approvals.insert(request.id.0.clone(), Vec::new());
        state.requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn fetch_request(&self, id: &RequestId) -> Result<Option<PurchaseRequest>, StoreError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn fetch_items(&self, id: &RequestId) -> Result<Vec<RequestItem>, StoreError> {
        let state = self.state.read().await;
        Ok(state.items.get(&id.0).cloned().unwrap_or_default())
    }

    async fn fetch_approvals(&self, id: &RequestId) -> Result<Vec<Approval>, StoreError> {
        let state = self.state.read().await;
        Ok(state.approvals.get(&id.0).cloned().unwrap_or_default())
    }

    async fn fetch_order(&self, id: &RequestId) -> Result<Option<PurchaseOrder>, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id.0).cloned())
    }

    async fn fetch_receipt_validation(
        &self,
        id: &RequestId,
    ) -> Result<Option<ReceiptValidation>, StoreError> {
        let state = self.state.read().await;
        Ok(state.validations.get(&id.0).cloned())
    }

    async fn list_requests(
        &self,
        scope: VisibilityScope,
        viewer: &UserId,
    ) -> Result<Vec<PurchaseRequest>, StoreError> {
        let state = self.state.read().await;
        let empty: Vec<Approval> = Vec::new();
        let mut visible: Vec<PurchaseRequest> = state
            .requests
            .values()
            .filter(|request| {
                let approvals = state.approvals.get(&request.id.0).unwrap_or(&empty);
                scope_admits(scope, viewer, request, approvals)
            })
            .cloned()
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(visible)
    }

    async fn update_request(
        &self,
        id: &RequestId,
        patch: RequestPatch,
        replacement: Option<ItemReplacement>,
    ) -> Result<PurchaseRequest, StoreError> {
        let mut state = self.state.write().await;

        let approval_count = state.approvals.get(&id.0).map_or(0, Vec::len);
        let request = state
            .requests
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::MissingRequest(id.0.clone()))?;

        ensure_editable(request.status, approval_count)?;

        if let Some(title) = patch.title {
            request.title = title;
        }
        if let Some(description) = patch.description {
            request.description = description;
        }
        if let Some(vendor) = patch.vendor {
            request.vendor = vendor;
        }
        request.updated_at = Utc::now();

        let updated = request.clone();
        if let Some(replacement) = replacement {
            let request = state.requests.get_mut(&id.0).expect("checked above");
            request.amount = replacement.amount;
            let updated = request.clone();
            state.items.insert(id.0.clone(), replacement.items);
            return Ok(updated);
        }

        Ok(updated)
    }

    async fn record_decision(
        &self,
        id: &RequestId,
        actor: &UserId,
        level: ApprovalLevel,
        decision: Decision,
        comment: String,
    ) -> Result<DecisionOutcome, StoreError> {
        let mut state = self.state.write().await;

        let approvals = state.approvals.get(&id.0).cloned().unwrap_or_default();
        let request = state
            .requests
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::MissingRequest(id.0.clone()))?;

        let plan = plan_decision(DecisionInput {
            status: request.status,
            approvals: &approvals,
            actor,
            level,
            decision,
            comment,
        })?;

        let approval = Approval {
            id: ApprovalId(Uuid::new_v4().to_string()),
            request_id: id.clone(),
            approver_id: plan.record.approver_id.clone(),
            level: plan.record.level,
            approved: plan.record.approved,
            comment: plan.record.comment.clone(),
            created_at: Utc::now(),
        };

        if let Some(next) = plan.transition {
            request.status = next;
            if let Some(last) = &plan.last_approved_by {
                request.last_approved_by = Some(last.clone());
            }
            request.updated_at = Utc::now();
        }

        let outcome = DecisionOutcome {
            request: request.clone(),
            approval: approval.clone(),
            generate_order: plan.generate_order,
        };

        state.approvals.entry(id.0.clone()).or_default().push(approval);

        Ok(outcome)
    }

    async fn insert_order(&self, order: PurchaseOrder) -> Result<PurchaseOrder, StoreError> {
        let mut state = self.state.write().await;
        let stored =
            state.orders.entry(order.request_id.0.clone()).or_insert(order);
        Ok(stored.clone())
    }

    async fn attach_order_file(
        &self,
        request_id: &RequestId,
        file: &FileRef,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(order) = state.orders.get_mut(&request_id.0) {
            order.file_ref = Some(file.clone());
        }
        Ok(())
    }

    async fn attach_receipt(
        &self,
        request_id: &RequestId,
        file: &FileRef,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let request = state
            .requests
            .get_mut(&request_id.0)
            .ok_or_else(|| StoreError::MissingRequest(request_id.0.clone()))?;
        request.receipt_ref = Some(file.clone());
        request.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_receipt_validation(
        &self,
        validation: ReceiptValidation,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.validations.insert(validation.request_id.0.clone(), validation);
        Ok(())
    }

    async fn approved_missing_order(&self) -> Result<Vec<PurchaseRequest>, StoreError> {
        let state = self.state.read().await;
        let mut missing: Vec<PurchaseRequest> = state
            .requests
            .values()
            .filter(|request| {
                request.status == procura_core::domain::request::RequestStatus::Approved
                    && !state.orders.contains_key(&request.id.0)
            })
            .cloned()
            .collect();
        missing.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(missing)
    }
}

#[derive(Default)]
pub struct InMemoryRoleDirectory {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RoleDirectory for InMemoryRoleDirectory {
    async fn lookup(&self, user_id: &UserId) -> Result<Option<Role>, StoreError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(&user_id.0).and_then(|profile| profile.role))
    }

    async fn provision(&self, user_id: &UserId, role: Role) -> Result<UserProfile, StoreError> {
        let mut profiles = self.profiles.write().await;
        let now = Utc::now();
        let profile = profiles.entry(user_id.0.clone()).or_insert_with(|| UserProfile {
            user_id: user_id.clone(),
            role: Some(role),
            created_at: now,
            updated_at: now,
        });
        Ok(profile.clone())
    }

    async fn change_role(&self, user_id: &UserId, role: Role) -> Result<UserProfile, StoreError> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(&user_id.0)
            .ok_or_else(|| StoreError::MissingUser(user_id.0.clone()))?;
        profile.role = Some(role);
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}
