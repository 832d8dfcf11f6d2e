use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, Sqlite, Transaction};
use uuid::Uuid;

use procura_core::domain::actor::UserId;
use procura_core::domain::approval::{Approval, ApprovalId, ApprovalLevel};
use procura_core::domain::item::{ItemId, RequestItem};
use procura_core::domain::order::{OrderContent, OrderId, PurchaseOrder};
use procura_core::domain::receipt::ReceiptValidation;
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestStatus};
use procura_core::domain::FileRef;
use procura_core::errors::DomainError;
use procura_core::lifecycle::{
    ensure_editable, plan_decision, Decision, DecisionInput, DecisionOutcome, RequestPatch,
};
use procura_core::policy::VisibilityScope;

use super::{ItemReplacement, RequestStore, StoreError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, title, description, vendor, amount, status, created_by, \
     last_approved_by, proforma_ref, receipt_ref, created_at, updated_at";

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_decimal(field: &str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw)
        .map_err(|e| StoreError::Decode(format!("bad decimal in {field}: {raw} ({e})")))
}

fn decode_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("bad timestamp in {field}: {raw} ({e})")))
}

fn decode_status(raw: &str) -> Result<RequestStatus, StoreError> {
    RequestStatus::parse(raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown request status: {raw}")))
}

fn get_text(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<String, StoreError> {
    row.try_get(column).map_err(|e| StoreError::Decode(e.to_string()))
}

fn get_opt_text(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Option<String>, StoreError> {
    row.try_get(column).map_err(|e| StoreError::Decode(e.to_string()))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<PurchaseRequest, StoreError> {
    Ok(PurchaseRequest {
        id: RequestId(get_text(row, "id")?),
        title: get_text(row, "title")?,
        description: get_text(row, "description")?,
        vendor: get_text(row, "vendor")?,
        amount: decode_decimal("purchase_request.amount", &get_text(row, "amount")?)?,
        status: decode_status(&get_text(row, "status")?)?,
        created_by: UserId(get_text(row, "created_by")?),
        last_approved_by: get_opt_text(row, "last_approved_by")?.map(UserId),
        proforma_ref: get_opt_text(row, "proforma_ref")?.map(FileRef),
        receipt_ref: get_opt_text(row, "receipt_ref")?.map(FileRef),
        created_at: decode_timestamp("purchase_request.created_at", &get_text(row, "created_at")?)?,
        updated_at: decode_timestamp("purchase_request.updated_at", &get_text(row, "updated_at")?)?,
    })
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<RequestItem, StoreError> {
    let qty: i64 = row.try_get("qty").map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(RequestItem {
        id: ItemId(get_text(row, "id")?),
        request_id: RequestId(get_text(row, "request_id")?),
        name: get_text(row, "name")?,
        qty: u32::try_from(qty)
            .map_err(|_| StoreError::Decode(format!("negative item quantity: {qty}")))?,
        unit_price: decode_decimal("request_item.unit_price", &get_text(row, "unit_price")?)?,
    })
}

fn row_to_approval(row: &sqlx::sqlite::SqliteRow) -> Result<Approval, StoreError> {
    let level: i64 = row.try_get("level").map_err(|e| StoreError::Decode(e.to_string()))?;
    let approved: i64 = row.try_get("approved").map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(Approval {
        id: ApprovalId(get_text(row, "id")?),
        request_id: RequestId(get_text(row, "request_id")?),
        approver_id: UserId(get_text(row, "approver_id")?),
        level: ApprovalLevel::from_i64(level)
            .ok_or_else(|| StoreError::Decode(format!("unknown approval level: {level}")))?,
        approved: approved != 0,
        comment: get_text(row, "comment")?,
        created_at: decode_timestamp("approval.created_at", &get_text(row, "created_at")?)?,
    })
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<PurchaseOrder, StoreError> {
    let content: OrderContent = serde_json::from_str(&get_text(row, "content")?)
        .map_err(|e| StoreError::Decode(format!("bad order content payload: {e}")))?;
    Ok(PurchaseOrder {
        id: OrderId(get_text(row, "id")?),
        request_id: RequestId(get_text(row, "request_id")?),
        generated_at: decode_timestamp(
            "purchase_order.generated_at",
            &get_text(row, "generated_at")?,
        )?,
        generated_by: get_opt_text(row, "generated_by")?.map(UserId),
        content,
        file_ref: get_opt_text(row, "file_ref")?.map(FileRef),
    })
}

fn row_to_validation(row: &sqlx::sqlite::SqliteRow) -> Result<ReceiptValidation, StoreError> {
    let result: serde_json::Value = serde_json::from_str(&get_text(row, "result")?)
        .map_err(|e| StoreError::Decode(format!("bad validation result payload: {e}")))?;
    let discrepancies: Vec<String> = serde_json::from_str(&get_text(row, "discrepancies")?)
        .map_err(|e| StoreError::Decode(format!("bad discrepancies payload: {e}")))?;
    let is_valid: i64 = row.try_get("is_valid").map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(ReceiptValidation {
        request_id: RequestId(get_text(row, "request_id")?),
        validated_at: decode_timestamp(
            "receipt_validation.validated_at",
            &get_text(row, "validated_at")?,
        )?,
        result,
        discrepancies,
        is_valid: is_valid != 0,
    })
}

async fn fetch_request_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: &RequestId,
) -> Result<PurchaseRequest, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS} FROM purchase_request WHERE id = ?"
    ))
    .bind(&id.0)
    .fetch_optional(&mut **tx)
    .await?;

    match row {
        Some(ref r) => row_to_request(r),
        None => Err(StoreError::MissingRequest(id.0.clone())),
    }
}

async fn fetch_approvals_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: &RequestId,
) -> Result<Vec<Approval>, StoreError> {
    let rows = sqlx::query(
        "SELECT id, request_id, approver_id, level, approved, comment, created_at
         FROM approval WHERE request_id = ? ORDER BY created_at ASC",
    )
    .bind(&id.0)
    .fetch_all(&mut **tx)
    .await?;

    rows.iter().map(row_to_approval).collect()
}

/// First statement of every decision/update transaction: a write against the
/// request row. Under SQLite this acquires the database write lock, so
/// concurrent transactions queue here (bounded by busy_timeout) and re-read
/// committed state - the stand-in for a per-row SELECT ... FOR UPDATE.
async fn claim_request_row(
    tx: &mut Transaction<'_, Sqlite>,
    id: &RequestId,
) -> Result<(), StoreError> {
    let claimed = sqlx::query("UPDATE purchase_request SET updated_at = updated_at WHERE id = ?")
        .bind(&id.0)
        .execute(&mut **tx)
        .await?;
    if claimed.rows_affected() == 0 {
        return Err(StoreError::MissingRequest(id.0.clone()));
    }
    Ok(())
}

async fn insert_items_tx(
    tx: &mut Transaction<'_, Sqlite>,
    items: &[RequestItem],
) -> Result<(), StoreError> {
    for item in items {
        sqlx::query(
            "INSERT INTO request_item (id, request_id, name, qty, unit_price)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&item.id.0)
        .bind(&item.request_id.0)
        .bind(&item.name)
        .bind(i64::from(item.qty))
        .bind(item.unit_price.to_string())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl RequestStore for SqlRequestStore {
    async fn insert_request(
        &self,
        request: PurchaseRequest,
        items: Vec<RequestItem>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO purchase_request (id, title, description, vendor, amount, status,
                                           created_by, last_approved_by, proforma_ref,
                                           receipt_ref, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.vendor)
        .bind(request.amount.to_string())
        .bind(request.status.as_str())
        .bind(&request.created_by.0)
        .bind(request.last_approved_by.as_ref().map(|u| u.0.as_str()))
        .bind(request.proforma_ref.as_ref().map(|f| f.0.as_str()))
        .bind(request.receipt_ref.as_ref().map(|f| f.0.as_str()))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        insert_items_tx(&mut tx, &items).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_request(&self, id: &RequestId) -> Result<Option<PurchaseRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM purchase_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn fetch_items(&self, id: &RequestId) -> Result<Vec<RequestItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, request_id, name, qty, unit_price
             FROM request_item WHERE request_id = ? ORDER BY rowid ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    async fn fetch_approvals(&self, id: &RequestId) -> Result<Vec<Approval>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, request_id, approver_id, level, approved, comment, created_at
             FROM approval WHERE request_id = ? ORDER BY created_at ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
    }

    async fn fetch_order(&self, id: &RequestId) -> Result<Option<PurchaseOrder>, StoreError> {
        let row = sqlx::query(
            "SELECT id, request_id, generated_at, generated_by, content, file_ref
             FROM purchase_order WHERE request_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_order(r)?)),
            None => Ok(None),
        }
    }

    async fn fetch_receipt_validation(
        &self,
        id: &RequestId,
    ) -> Result<Option<ReceiptValidation>, StoreError> {
        let row = sqlx::query(
            "SELECT request_id, validated_at, result, discrepancies, is_valid
             FROM receipt_validation WHERE request_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_validation(r)?)),
            None => Ok(None),
        }
    }

    async fn list_requests(
        &self,
        scope: VisibilityScope,
        viewer: &UserId,
    ) -> Result<Vec<PurchaseRequest>, StoreError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = match scope {
            VisibilityScope::Nothing => Vec::new(),
            VisibilityScope::OwnOnly => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM purchase_request
                     WHERE created_by = ? ORDER BY created_at DESC"
                ))
                .bind(&viewer.0)
                .fetch_all(&self.pool)
                .await?
            }
            VisibilityScope::All => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM purchase_request ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
            VisibilityScope::LevelOneApproved => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM purchase_request
                     WHERE id IN (SELECT request_id FROM approval
                                  WHERE level = 1 AND approved = 1)
                     ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
            VisibilityScope::ApprovedOnly => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM purchase_request
                     WHERE status = 'APPROVED' ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_request).collect()
    }

    async fn update_request(
        &self,
        id: &RequestId,
        patch: RequestPatch,
        replacement: Option<ItemReplacement>,
    ) -> Result<PurchaseRequest, StoreError> {
        let mut tx = self.pool.begin().await?;

        claim_request_row(&mut tx, id).await?;
        let request = fetch_request_tx(&mut tx, id).await?;

        let approval_count: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM approval WHERE request_id = ?")
                .bind(&id.0)
                .fetch_one(&mut *tx)
                .await?
                .try_get("count")
                .map_err(|e| StoreError::Decode(e.to_string()))?;

        ensure_editable(request.status, approval_count as usize)?;

        if let Some(title) = &patch.title {
            sqlx::query("UPDATE purchase_request SET title = ? WHERE id = ?")
                .bind(title)
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(description) = &patch.description {
            sqlx::query("UPDATE purchase_request SET description = ? WHERE id = ?")
                .bind(description)
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(vendor) = &patch.vendor {
            sqlx::query("UPDATE purchase_request SET vendor = ? WHERE id = ?")
                .bind(vendor)
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(replacement) = replacement {
            // Wholesale replacement: old set out, new set in, amount updated,
            // all in this one transaction.
            sqlx::query("DELETE FROM request_item WHERE request_id = ?")
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
            insert_items_tx(&mut tx, &replacement.items).await?;
            sqlx::query("UPDATE purchase_request SET amount = ? WHERE id = ?")
                .bind(replacement.amount.to_string())
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE purchase_request SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        let updated = fetch_request_tx(&mut tx, id).await?;
        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;

        claim_request_row(&mut tx, id).await?;
        let mut request = fetch_request_tx(&mut tx, id).await?;
        let approvals = fetch_approvals_tx(&mut tx, id).await?;

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

        let inserted = sqlx::query(
            "INSERT INTO approval (id, request_id, approver_id, level, approved, comment, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&approval.id.0)
        .bind(&approval.request_id.0)
        .bind(&approval.approver_id.0)
        .bind(approval.level.as_i64())
        .bind(i64::from(approval.approved))
        .bind(&approval.comment)
        .bind(approval.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            // The planner already checked under the lock; the UNIQUE index is
            // the constraint-level backstop for the same invariant.
            if is_unique_violation(&error) {
                return Err(StoreError::Domain(DomainError::DuplicateApproval { level }));
            }
            return Err(error.into());
        }

        if let Some(next) = plan.transition {
            let now = Utc::now();
            let updated = sqlx::query(
                "UPDATE purchase_request
                 SET status = ?, last_approved_by = COALESCE(?, last_approved_by), updated_at = ?
                 WHERE id = ? AND status = 'PENDING'",
            )
            .bind(next.as_str())
            .bind(plan.last_approved_by.as_ref().map(|u| u.0.as_str()))
            .bind(now.to_rfc3339())
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(StoreError::Domain(DomainError::AlreadyFinalized {
                    status: request.status,
                }));
            }

            request.status = next;
            if let Some(last) = &plan.last_approved_by {
                request.last_approved_by = Some(last.clone());
            }
            request.updated_at = now;
        }

        tx.commit().await?;

        Ok(DecisionOutcome { request, approval, generate_order: plan.generate_order })
    }

    async fn insert_order(&self, order: PurchaseOrder) -> Result<PurchaseOrder, StoreError> {
        let content = serde_json::to_string(&order.content)
            .map_err(|e| StoreError::Decode(format!("unserializable order content: {e}")))?;

        sqlx::query(
            "INSERT INTO purchase_order (id, request_id, generated_at, generated_by, content, file_ref)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(request_id) DO NOTHING",
        )
        .bind(&order.id.0)
        .bind(&order.request_id.0)
        .bind(order.generated_at.to_rfc3339())
        .bind(order.generated_by.as_ref().map(|u| u.0.as_str()))
        .bind(content)
        .bind(order.file_ref.as_ref().map(|f| f.0.as_str()))
        .execute(&self.pool)
        .await?;

        // Return whichever row won; callers treat the stored order as truth.
        self.fetch_order(&order.request_id)
            .await?
            .ok_or_else(|| StoreError::MissingRequest(order.request_id.0.clone()))
    }

    async fn attach_order_file(
        &self,
        request_id: &RequestId,
        file: &FileRef,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE purchase_order SET file_ref = ? WHERE request_id = ?")
            .bind(&file.0)
            .bind(&request_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn attach_receipt(
        &self,
        request_id: &RequestId,
        file: &FileRef,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE purchase_request SET receipt_ref = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&file.0)
        .bind(Utc::now().to_rfc3339())
        .bind(&request_id.0)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::MissingRequest(request_id.0.clone()));
        }
        Ok(())
    }

    async fn upsert_receipt_validation(
        &self,
        validation: ReceiptValidation,
    ) -> Result<(), StoreError> {
        let result = serde_json::to_string(&validation.result)
            .map_err(|e| StoreError::Decode(format!("unserializable validation result: {e}")))?;
        let discrepancies = serde_json::to_string(&validation.discrepancies)
            .map_err(|e| StoreError::Decode(format!("unserializable discrepancies: {e}")))?;

        sqlx::query(
            "INSERT INTO receipt_validation (request_id, validated_at, result, discrepancies, is_valid)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(request_id) DO UPDATE SET
                 validated_at = excluded.validated_at,
                 result = excluded.result,
                 discrepancies = excluded.discrepancies,
                 is_valid = excluded.is_valid",
        )
        .bind(&validation.request_id.0)
        .bind(validation.validated_at.to_rfc3339())
        .bind(result)
        .bind(discrepancies)
        .bind(i64::from(validation.is_valid))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn approved_missing_order(&self) -> Result<Vec<PurchaseRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM purchase_request
             WHERE status = 'APPROVED'
               AND id NOT IN (SELECT request_id FROM purchase_order)
             ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use procura_core::domain::actor::UserId;
    use procura_core::domain::approval::ApprovalLevel;
    use procura_core::domain::item::{ItemId, RequestItem};
    use procura_core::domain::order::{OrderContent, OrderId, OrderLine, PurchaseOrder};
    use procura_core::domain::receipt::{ReceiptValidation, ReconciliationReport};
    use procura_core::domain::request::{PurchaseRequest, RequestId, RequestStatus};
    use procura_core::errors::DomainError;
    use procura_core::lifecycle::{Decision, RequestPatch};
    use procura_core::policy::VisibilityScope;

    use super::SqlRequestStore;
    use crate::stores::{ItemReplacement, RequestStore, StoreError};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlRequestStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlRequestStore::new(pool)
    }

    fn sample_request(id: &str, created_by: &str) -> PurchaseRequest {
        let now = Utc::now();
        PurchaseRequest {
            id: RequestId(id.to_string()),
            title: "Laptops for onboarding".to_string(),
            description: "Two laptops, five mice".to_string(),
            vendor: "Acme Supplies".to_string(),
            amount: Decimal::new(310000, 2),
            status: RequestStatus::Pending,
            created_by: UserId(created_by.to_string()),
            last_approved_by: None,
            proforma_ref: None,
            receipt_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_items(request_id: &str) -> Vec<RequestItem> {
        vec![
            RequestItem {
                id: ItemId(Uuid::new_v4().to_string()),
                request_id: RequestId(request_id.to_string()),
                name: "Laptop".to_string(),
                qty: 2,
                unit_price: Decimal::new(150000, 2),
            },
            RequestItem {
                id: ItemId(Uuid::new_v4().to_string()),
                request_id: RequestId(request_id.to_string()),
                name: "Mouse".to_string(),
                qty: 5,
                unit_price: Decimal::new(2000, 2),
            },
        ]
    }

    fn sample_order(request_id: &str, generated_by: Option<&str>) -> PurchaseOrder {
        PurchaseOrder {
            id: OrderId(Uuid::new_v4().to_string()),
            request_id: RequestId(request_id.to_string()),
            generated_at: Utc::now(),
            generated_by: generated_by.map(|u| UserId(u.to_string())),
            content: OrderContent {
                po_number: format!("PO-{request_id}"),
                title: "Laptops for onboarding".to_string(),
                vendor: "Acme Supplies".to_string(),
                lines: vec![OrderLine {
                    name: "Laptop".to_string(),
                    qty: 2,
                    unit_price: Decimal::new(150000, 2),
                    total: Decimal::new(300000, 2),
                }],
                total: Decimal::new(310000, 2),
                terms: "Net 30".to_string(),
            },
            file_ref: None,
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trip() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-1", "u-staff"), sample_items("PR-1"))
            .await
            .expect("insert");

        let fetched = store
            .fetch_request(&RequestId("PR-1".to_string()))
            .await
            .expect("fetch")
            .expect("exists");
        assert_eq!(fetched.amount.to_string(), "3100.00");
        assert_eq!(fetched.status, RequestStatus::Pending);

        let items = store.fetch_items(&RequestId("PR-1".to_string())).await.expect("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Laptop");
    }

    #[tokio::test]
    async fn update_replaces_items_wholesale_and_recomputes_amount() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-1", "u-staff"), sample_items("PR-1"))
            .await
            .expect("insert");

        let replacement = ItemReplacement {
            items: vec![RequestItem {
                id: ItemId(Uuid::new_v4().to_string()),
                request_id: RequestId("PR-1".to_string()),
                name: "Monitor".to_string(),
                qty: 3,
                unit_price: Decimal::new(25000, 2),
            }],
            amount: Decimal::new(75000, 2),
        };

        let updated = store
            .update_request(
                &RequestId("PR-1".to_string()),
                RequestPatch { title: Some("Monitors instead".to_string()), ..Default::default() },
                Some(replacement),
            )
            .await
            .expect("update");

        assert_eq!(updated.title, "Monitors instead");
        assert_eq!(updated.amount.to_string(), "750.00");

        let items = store.fetch_items(&RequestId("PR-1".to_string())).await.expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Monitor");
    }

    #[tokio::test]
    async fn update_is_rejected_once_an_approval_exists() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-1", "u-staff"), sample_items("PR-1"))
            .await
            .expect("insert");

        store
            .record_decision(
                &RequestId("PR-1".to_string()),
                &UserId("u-l1".to_string()),
                ApprovalLevel::One,
                Decision::Approve,
                String::new(),
            )
            .await
            .expect("L1 approval");

        let error = store
            .update_request(
                &RequestId("PR-1".to_string()),
                RequestPatch { title: Some("Too late".to_string()), ..Default::default() },
                None,
            )
            .await
            .expect_err("edit locked");

        assert!(matches!(error, StoreError::Domain(DomainError::EditLocked)));
    }

    #[tokio::test]
    async fn decision_flow_l1_then_l2_approves_exactly_once() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-1", "u-staff"), sample_items("PR-1"))
            .await
            .expect("insert");
        let id = RequestId("PR-1".to_string());

        let l1 = store
            .record_decision(
                &id,
                &UserId("u-l1".to_string()),
                ApprovalLevel::One,
                Decision::Approve,
                "ok".to_string(),
            )
            .await
            .expect("L1");
        assert_eq!(l1.request.status, RequestStatus::Pending);
        assert!(!l1.generate_order);

        let l2 = store
            .record_decision(
                &id,
                &UserId("u-l2".to_string()),
                ApprovalLevel::Two,
                Decision::Approve,
                String::new(),
            )
            .await
            .expect("L2");
        assert_eq!(l2.request.status, RequestStatus::Approved);
        assert_eq!(l2.request.last_approved_by, Some(UserId("u-l2".to_string())));
        assert!(l2.generate_order);

        let approvals = store.fetch_approvals(&id).await.expect("approvals");
        assert_eq!(approvals.len(), 2);

        // Any further decision hits the terminal-status gate.
        let error = store
            .record_decision(
                &id,
                &UserId("u-l1-b".to_string()),
                ApprovalLevel::One,
                Decision::Approve,
                String::new(),
            )
            .await
            .expect_err("already finalized");
        assert!(matches!(
            error,
            StoreError::Domain(DomainError::AlreadyFinalized { status: RequestStatus::Approved })
        ));
    }

    #[tokio::test]
    async fn duplicate_decision_keeps_exactly_one_row() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-1", "u-staff"), sample_items("PR-1"))
            .await
            .expect("insert");
        let id = RequestId("PR-1".to_string());
        let approver = UserId("u-l1".to_string());

        store
            .record_decision(&id, &approver, ApprovalLevel::One, Decision::Approve, String::new())
            .await
            .expect("first approval");

        let error = store
            .record_decision(&id, &approver, ApprovalLevel::One, Decision::Approve, String::new())
            .await
            .expect_err("duplicate");
        assert!(matches!(
            error,
            StoreError::Domain(DomainError::DuplicateApproval { level: ApprovalLevel::One })
        ));

        let approvals = store.fetch_approvals(&id).await.expect("approvals");
        assert_eq!(approvals.len(), 1);
    }

    #[tokio::test]
    async fn level_two_without_level_one_is_rejected() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-1", "u-staff"), sample_items("PR-1"))
            .await
            .expect("insert");
        let id = RequestId("PR-1".to_string());

        let error = store
            .record_decision(
                &id,
                &UserId("u-l2".to_string()),
                ApprovalLevel::Two,
                Decision::Approve,
                String::new(),
            )
            .await
            .expect_err("L2 before L1");
        assert!(matches!(
            error,
            StoreError::Domain(DomainError::MissingLevelOneApproval)
        ));

        let request = store.fetch_request(&id).await.expect("fetch").expect("exists");
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(store.fetch_approvals(&id).await.expect("approvals").is_empty());
    }

    #[tokio::test]
    async fn rejection_finalizes_at_either_level() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-1", "u-staff"), sample_items("PR-1"))
            .await
            .expect("insert");
        let id = RequestId("PR-1".to_string());

        let outcome = store
            .record_decision(
                &id,
                &UserId("u-l2".to_string()),
                ApprovalLevel::Two,
                Decision::Reject,
                "over budget".to_string(),
            )
            .await
            .expect("reject");
        assert_eq!(outcome.request.status, RequestStatus::Rejected);
        assert!(!outcome.approval.approved);
        assert!(!outcome.generate_order);
    }

    #[tokio::test]
    async fn unknown_request_is_reported_missing() {
        let store = setup().await;
        let error = store
            .record_decision(
                &RequestId("nope".to_string()),
                &UserId("u-l1".to_string()),
                ApprovalLevel::One,
                Decision::Approve,
                String::new(),
            )
            .await
            .expect_err("missing");
        assert!(matches!(error, StoreError::MissingRequest(_)));
    }

    #[tokio::test]
    async fn list_requests_applies_visibility_scopes() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-own", "u-alice"), sample_items("PR-own"))
            .await
            .expect("insert own");
        store
            .insert_request(sample_request("PR-other", "u-bob"), sample_items("PR-other"))
            .await
            .expect("insert other");

        // L1-approve and fully approve PR-other.
        store
            .record_decision(
                &RequestId("PR-other".to_string()),
                &UserId("u-l1".to_string()),
                ApprovalLevel::One,
                Decision::Approve,
                String::new(),
            )
            .await
            .expect("L1");
        store
            .record_decision(
                &RequestId("PR-other".to_string()),
                &UserId("u-l2".to_string()),
                ApprovalLevel::Two,
                Decision::Approve,
                String::new(),
            )
            .await
            .expect("L2");

        let viewer = UserId("u-alice".to_string());

        let own = store.list_requests(VisibilityScope::OwnOnly, &viewer).await.expect("own");
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id.0, "PR-own");

        let all = store.list_requests(VisibilityScope::All, &viewer).await.expect("all");
        assert_eq!(all.len(), 2);

        let l1_approved = store
            .list_requests(VisibilityScope::LevelOneApproved, &viewer)
            .await
            .expect("l1 approved");
        assert_eq!(l1_approved.len(), 1);
        assert_eq!(l1_approved[0].id.0, "PR-other");

        let approved =
            store.list_requests(VisibilityScope::ApprovedOnly, &viewer).await.expect("approved");
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id.0, "PR-other");

        let nothing =
            store.list_requests(VisibilityScope::Nothing, &viewer).await.expect("nothing");
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn insert_order_is_idempotent_per_request() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-1", "u-staff"), sample_items("PR-1"))
            .await
            .expect("insert");

        let first = store.insert_order(sample_order("PR-1", Some("u-l2"))).await.expect("first");
        let second =
            store.insert_order(sample_order("PR-1", Some("u-other"))).await.expect("second");

        assert_eq!(first.id, second.id);
        assert_eq!(second.generated_by, Some(UserId("u-l2".to_string())));
    }

    #[tokio::test]
    async fn receipt_validation_is_overwritten_per_request() {
        let store = setup().await;
        store
            .insert_request(sample_request("PR-1", "u-staff"), sample_items("PR-1"))
            .await
            .expect("insert");
        let id = RequestId("PR-1".to_string());

        let first = ReceiptValidation::from_report(
            id.clone(),
            &ReconciliationReport {
                is_valid: false,
                discrepancies: vec!["total mismatch".to_string()],
            },
        );
        store.upsert_receipt_validation(first).await.expect("first upsert");

        let second = ReceiptValidation::from_report(
            id.clone(),
            &ReconciliationReport { is_valid: true, discrepancies: Vec::new() },
        );
        store.upsert_receipt_validation(second).await.expect("second upsert");

        let stored = store
            .fetch_receipt_validation(&id)
            .await
            .expect("fetch")
            .expect("exists");
        assert!(stored.is_valid);
        assert!(stored.discrepancies.is_empty());
    }

    #[tokio::test]
    async fn approved_missing_order_finds_only_orderless_approved_requests() {
        let store = setup().await;
        for (id, with_order) in [("PR-a", true), ("PR-b", false)] {
            store
                .insert_request(sample_request(id, "u-staff"), sample_items(id))
                .await
                .expect("insert");
            let rid = RequestId(id.to_string());
            store
                .record_decision(
                    &rid,
                    &UserId("u-l1".to_string()),
                    ApprovalLevel::One,
                    Decision::Approve,
                    String::new(),
                )
                .await
                .expect("L1");
            store
                .record_decision(
                    &rid,
                    &UserId("u-l2".to_string()),
                    ApprovalLevel::Two,
                    Decision::Approve,
                    String::new(),
                )
                .await
                .expect("L2");
            if with_order {
                store.insert_order(sample_order(id, Some("u-l2"))).await.expect("order");
            }
        }
        // A pending request never shows up in the scan.
        store
            .insert_request(sample_request("PR-c", "u-staff"), sample_items("PR-c"))
            .await
            .expect("insert pending");

        let missing = store.approved_missing_order().await.expect("scan");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id.0, "PR-b");
    }
}
