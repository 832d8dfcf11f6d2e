use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result as AnyResult;
use chrono::Utc;
use uuid::Uuid;

use procura_core::domain::actor::{Actor, Role, UserId, UserProfile};
use procura_core::domain::approval::{Approval, ApprovalLevel};
use procura_core::domain::item::{ItemId, RequestItem};
use procura_core::domain::order::{OrderId, PurchaseOrder};
use procura_core::domain::receipt::ReceiptValidation;
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestStatus};
use procura_core::errors::{FieldError, ValidationError};
use procura_core::ledger::{validate_items, ItemDraft, MAX_NAME_LEN};
use procura_core::lifecycle::{ensure_receipt_accepted, Decision, RequestPatch};
use procura_core::policy::{permits, scope_admits, visibility, LifecycleAction};
use procura_db::stores::ItemReplacement;
use procura_db::{RequestStore, RoleDirectory};
use procura_docint::{
    BlobStore, OrderContext, OrderProducer, ReceiptReconciler, TemplateOrderRenderer,
    TextExtractor,
};

use crate::errors::EngineError;

#[derive(Clone, Debug)]
pub struct NewRequestInput {
    pub title: String,
    pub description: String,
    pub vendor: String,
    pub items: Vec<ItemDraft>,
}

/// `None` leaves a field untouched; an explicit item list replaces the set
/// wholesale and recomputes the amount.
#[derive(Clone, Debug, Default)]
pub struct UpdateRequestInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub items: Option<Vec<ItemDraft>>,
}

#[derive(Clone, Debug)]
pub struct ReceiptUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Full view of one request: the row plus everything it owns.
#[derive(Clone, Debug)]
pub struct RequestDetail {
    pub request: PurchaseRequest,
    pub items: Vec<RequestItem>,
    pub approvals: Vec<Approval>,
    pub order: Option<PurchaseOrder>,
    pub receipt_validation: Option<ReceiptValidation>,
}

/// Outcome of an approve/reject call. `order` is present exactly when this
/// call transitioned the request to APPROVED and generation succeeded.
#[derive(Clone, Debug)]
pub struct DecisionSummary {
    pub request: PurchaseRequest,
    pub approval: Approval,
    pub order: Option<PurchaseOrder>,
}

#[derive(Clone, Debug, Default)]
pub struct BackfillReport {
    pub generated: Vec<RequestId>,
    pub failed: Vec<(RequestId, String)>,
}

pub struct EngineDeps {
    pub store: Arc<dyn RequestStore>,
    pub roles: Arc<dyn RoleDirectory>,
    pub orders: Arc<dyn OrderProducer>,
    pub extractor: Arc<dyn TextExtractor>,
    pub reconciler: Arc<dyn ReceiptReconciler>,
    pub blobs: Arc<dyn BlobStore>,
}

pub struct LifecycleEngine {
    store: Arc<dyn RequestStore>,
    roles: Arc<dyn RoleDirectory>,
    orders: Arc<dyn OrderProducer>,
    extractor: Arc<dyn TextExtractor>,
    reconciler: Arc<dyn ReceiptReconciler>,
    blobs: Arc<dyn BlobStore>,
    renderer: TemplateOrderRenderer,
    external_timeout: Duration,
}

impl LifecycleEngine {
    pub fn new(deps: EngineDeps, external_timeout: Duration) -> AnyResult<Self> {
        Ok(Self {
            store: deps.store,
            roles: deps.roles,
            orders: deps.orders,
            extractor: deps.extractor,
            reconciler: deps.reconciler,
            blobs: deps.blobs,
            renderer: TemplateOrderRenderer::new()?,
            external_timeout,
        })
    }

    /// Run an external call under the configured timeout. Both failure and
    /// timeout surface as `external_service`, tagged with the service name
    /// so callers can tell which collaborator fell over.
    async fn bounded<T, F>(&self, service: &'static str, call: F) -> Result<T, EngineError>
    where
        F: Future<Output = AnyResult<T>>,
    {
        match tokio::time::timeout(self.external_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(EngineError::external(service, format!("{error:#}"))),
            Err(_) => Err(EngineError::external(
                service,
                format!("timed out after {}s", self.external_timeout.as_secs()),
            )),
        }
    }

    pub async fn create_request(
        &self,
        actor: &Actor,
        input: NewRequestInput,
    ) -> Result<RequestDetail, EngineError> {
        if !permits(actor.role, LifecycleAction::CreateRequest) {
            return Err(EngineError::NotAuthorized);
        }

        let mut errors = Vec::new();
        check_required_text(&mut errors, "title", &input.title);
        check_required_text(&mut errors, "vendor", &input.vendor);
        let validated = match validate_items(&input.items) {
            Ok(validated) => Some(validated),
            Err(error) => {
                errors.extend(error.errors);
                None
            }
        };
        if !errors.is_empty() {
            return Err(ValidationError::new(errors).into());
        }
        let validated = validated.expect("items validated when no errors collected");

        let now = Utc::now();
        let request = PurchaseRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            title: input.title,
            description: input.description,
            vendor: input.vendor,
            amount: validated.amount,
            status: RequestStatus::Pending,
            created_by: actor.user_id.clone(),
            last_approved_by: None,
            proforma_ref: None,
            receipt_ref: None,
            created_at: now,
            updated_at: now,
        };
        let items = materialize_items(&request.id, &validated.items);

        self.store.insert_request(request.clone(), items.clone()).await?;
        tracing::info!(request = %request.id, amount = %request.amount, "purchase request created");

        Ok(RequestDetail {
            request,
            items,
            approvals: Vec::new(),
            order: None,
            receipt_validation: None,
        })
    }

    pub async fn update_request(
        &self,
        actor: &Actor,
        id: &RequestId,
        input: UpdateRequestInput,
    ) -> Result<RequestDetail, EngineError> {
        let request = self.require_request(id).await?;
        let approvals = self.store.fetch_approvals(id).await?;

        // Outside the viewer's slice the request does not exist; inside it,
        // only the creator may edit.
        let scope = visibility(actor.role);
        if !scope_admits(scope, &actor.user_id, &request, &approvals) {
            return Err(EngineError::NotFound { resource: "purchase request", id: id.0.clone() });
        }
        if request.created_by != actor.user_id {
            return Err(EngineError::NotAuthorized);
        }

        let mut errors = Vec::new();
        if let Some(title) = &input.title {
            check_required_text(&mut errors, "title", title);
        }
        if let Some(vendor) = &input.vendor {
            check_required_text(&mut errors, "vendor", vendor);
        }
        let replacement = match &input.items {
            Some(items) => match validate_items(items) {
                Ok(validated) => Some(ItemReplacement {
                    items: materialize_items(id, &validated.items),
                    amount: validated.amount,
                }),
                Err(error) => {
                    errors.extend(error.errors);
                    None
                }
            },
            None => None,
        };
        if !errors.is_empty() {
            return Err(ValidationError::new(errors).into());
        }

        let patch = RequestPatch {
            title: input.title,
            description: input.description,
            vendor: input.vendor,
        };

        let updated = self.store.update_request(id, patch, replacement).await?;
        tracing::info!(request = %id, amount = %updated.amount, "purchase request updated");

        self.fetch_detail(updated).await
    }

    pub async fn list_requests(&self, actor: &Actor) -> Result<Vec<PurchaseRequest>, EngineError> {
        let scope = visibility(actor.role);
        Ok(self.store.list_requests(scope, &actor.user_id).await?)
    }

    pub async fn get_request(
        &self,
        actor: &Actor,
        id: &RequestId,
    ) -> Result<RequestDetail, EngineError> {
        let request = self.require_request(id).await?;
        let approvals = self.store.fetch_approvals(id).await?;

        let scope = visibility(actor.role);
        if !scope_admits(scope, &actor.user_id, &request, &approvals) {
            return Err(EngineError::NotFound { resource: "purchase request", id: id.0.clone() });
        }

        let items = self.store.fetch_items(id).await?;
        let order = self.store.fetch_order(id).await?;
        let receipt_validation = self.store.fetch_receipt_validation(id).await?;

        Ok(RequestDetail { request, items, approvals, order, receipt_validation })
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        id: &RequestId,
        comment: Option<String>,
    ) -> Result<DecisionSummary, EngineError> {
        self.decide(actor, id, Decision::Approve, comment).await
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        id: &RequestId,
        comment: Option<String>,
    ) -> Result<DecisionSummary, EngineError> {
        self.decide(actor, id, Decision::Reject, comment).await
    }

    async fn decide(
        &self,
        actor: &Actor,
        id: &RequestId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<DecisionSummary, EngineError> {
        let action = match decision {
            Decision::Approve => LifecycleAction::Approve,
            Decision::Reject => LifecycleAction::Reject,
        };
        if !permits(actor.role, action) {
            return Err(EngineError::NotAuthorized);
        }
        // permits() admits approver roles only, so the level is always
        // derivable here; the role decides it, never the caller.
        let level = actor
            .role
            .and_then(ApprovalLevel::for_role)
            .ok_or(EngineError::NotAuthorized)?;

        let outcome = self
            .store
            .record_decision(id, &actor.user_id, level, decision, comment.unwrap_or_default())
            .await?;

        tracing::info!(
            request = %id,
            level = %level,
            approved = outcome.approval.approved,
            status = %outcome.request.status,
            "approval decision recorded"
        );

        // The approval is committed at this point. Order generation happens
        // after the transaction; a failure here leaves the request
        // APPROVED-without-PO, which the backfill operation recovers.
        let order = if outcome.generate_order {
            Some(
                self.generate_order_for(&outcome.request, Some(actor.user_id.clone()))
                    .await?,
            )
        } else {
            None
        };

        Ok(DecisionSummary { request: outcome.request, approval: outcome.approval, order })
    }

    pub async fn submit_receipt(
        &self,
        actor: &Actor,
        id: &RequestId,
        upload: ReceiptUpload,
    ) -> Result<ReceiptValidation, EngineError> {
        if !permits(actor.role, LifecycleAction::SubmitReceipt) {
            return Err(EngineError::NotAuthorized);
        }

        let request = self.require_request(id).await?;
        if request.created_by != actor.user_id {
            return Err(EngineError::NotAuthorized);
        }
        ensure_receipt_accepted(request.status).map_err(EngineError::Conflict)?;

        if upload.bytes.is_empty() {
            return Err(ValidationError::single("receipt", "receipt file is required").into());
        }

        let order = self
            .store
            .fetch_order(id)
            .await?
            .ok_or(EngineError::Conflict(procura_core::errors::DomainError::OrderNotGenerated))?;

        // Extraction runs before anything is persisted: a bad upload leaves
        // the request untouched.
        let text = self
            .bounded("text_extractor", self.extractor.extract(&upload.filename, &upload.bytes))
            .await?;

        let key = format!("receipts/{}/{}", id.0, safe_filename(&upload.filename));
        let file_ref = self.bounded("file_store", self.blobs.put(&key, &upload.bytes)).await?;
        self.store.attach_receipt(id, &file_ref).await?;

        let report = self
            .bounded("receipt_reconciler", self.reconciler.validate(&order.content, &text))
            .await?;

        let validation = ReceiptValidation::from_report(id.clone(), &report);
        self.store.upsert_receipt_validation(validation.clone()).await?;

        tracing::info!(
            request = %id,
            is_valid = validation.is_valid,
            discrepancies = validation.discrepancies.len(),
            "receipt reconciled"
        );

        Ok(validation)
    }

    pub async fn change_role(
        &self,
        actor: &Actor,
        user_id: &UserId,
        new_role: &str,
    ) -> Result<UserProfile, EngineError> {
        if !permits(actor.role, LifecycleAction::ChangeRole) {
            return Err(EngineError::NotAuthorized);
        }

        let role = Role::parse(new_role).ok_or_else(|| {
            ValidationError::single(
                "role",
                format!("unknown role `{new_role}` (expected one of staff|approver_l1|approver_l2|finance|admin)"),
            )
        })?;

        let profile = self.roles.change_role(user_id, role).await?;
        tracing::info!(user = %user_id, role = %role, "user role changed");
        Ok(profile)
    }

    /// Maintenance recovery path: regenerate purchase orders for APPROVED
    /// requests that lost theirs to a generator failure. Per-request
    /// failures are reported, never abort the scan.
    pub async fn backfill_orders(&self) -> Result<BackfillReport, EngineError> {
        let missing = self.store.approved_missing_order().await?;
        let mut report = BackfillReport::default();

        for request in missing {
            let generated_by = request.last_approved_by.clone();
            match self.generate_order_for(&request, generated_by).await {
                Ok(_) => {
                    tracing::info!(request = %request.id, "backfilled purchase order");
                    report.generated.push(request.id);
                }
                Err(error) => {
                    tracing::warn!(request = %request.id, %error, "backfill failed");
                    report.failed.push((request.id, error.to_string()));
                }
            }
        }

        Ok(report)
    }

    async fn generate_order_for(
        &self,
        request: &PurchaseRequest,
        generated_by: Option<UserId>,
    ) -> Result<PurchaseOrder, EngineError> {
        let items = self.store.fetch_items(&request.id).await?;
        let ctx = OrderContext { request: request.clone(), items, generated_by };

        let content = self.bounded("order_producer", self.orders.generate(&ctx)).await?;

        let order = PurchaseOrder {
            id: OrderId(Uuid::new_v4().to_string()),
            request_id: request.id.clone(),
            generated_at: Utc::now(),
            generated_by: ctx.generated_by,
            content,
            file_ref: None,
        };
        // Idempotent against the UNIQUE(request_id) constraint: if a
        // concurrent path generated first, the stored row wins.
        let mut stored = self.store.insert_order(order).await?;

        // Rendering is best-effort: reconciliation reads the structured
        // content, not the document, so a render/storage failure must not
        // fail the approval that triggered generation.
        match self.render_and_attach(&stored).await {
            Ok(file_ref) => stored.file_ref = Some(file_ref),
            Err(error) => {
                tracing::warn!(request = %stored.request_id, %error, "order document attachment failed");
            }
        }

        Ok(stored)
    }

    async fn render_and_attach(
        &self,
        order: &PurchaseOrder,
    ) -> Result<procura_core::domain::FileRef, EngineError> {
        let document = self
            .renderer
            .render(&order.content)
            .map_err(|error| EngineError::external("order_renderer", format!("{error:#}")))?;
        let key = format!("orders/{}.txt", order.request_id.0);
        let file_ref = self.bounded("file_store", self.blobs.put(&key, document.as_bytes())).await?;
        self.store.attach_order_file(&order.request_id, &file_ref).await?;
        Ok(file_ref)
    }

    async fn require_request(&self, id: &RequestId) -> Result<PurchaseRequest, EngineError> {
        self.store
            .fetch_request(id)
            .await?
            .ok_or_else(|| EngineError::NotFound { resource: "purchase request", id: id.0.clone() })
    }

    async fn fetch_detail(&self, request: PurchaseRequest) -> Result<RequestDetail, EngineError> {
        let items = self.store.fetch_items(&request.id).await?;
        let approvals = self.store.fetch_approvals(&request.id).await?;
        let order = self.store.fetch_order(&request.id).await?;
        let receipt_validation = self.store.fetch_receipt_validation(&request.id).await?;
        Ok(RequestDetail { request, items, approvals, order, receipt_validation })
    }
}

fn check_required_text(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, format!("{field} cannot be blank")));
    } else if value.chars().count() > MAX_NAME_LEN {
        errors.push(FieldError::new(
            field,
            format!("{field} must be at most {MAX_NAME_LEN} characters"),
        ));
    }
}

fn materialize_items(request_id: &RequestId, drafts: &[ItemDraft]) -> Vec<RequestItem> {
    drafts
        .iter()
        .map(|draft| RequestItem {
            id: ItemId(Uuid::new_v4().to_string()),
            request_id: request_id.clone(),
            name: draft.name.clone(),
            qty: draft.qty,
            unit_price: draft.unit_price,
        })
        .collect()
}

/// Uploads name their own files; keep only the final path component so a
/// hostile filename cannot escape the blob prefix.
fn safe_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| "receipt".to_string())
}
