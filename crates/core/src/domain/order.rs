use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::request::RequestId;
use crate::domain::FileRef;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub name: String,
    pub qty: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

/// The machine-readable order payload produced at approval time. This is
/// what receipts are later reconciled against, so it carries everything the
/// reconciler needs without another database read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderContent {
    pub po_number: String,
    pub title: String,
    pub vendor: String,
    pub lines: Vec<OrderLine>,
    pub total: Decimal,
    /// Free-text terms drafted by the document producer.
    pub terms: String,
}

/// One-to-one with an approved request. Created exactly once (at the
/// approval transition or by the backfill recovery path); afterwards only
/// the rendered document reference may be attached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: OrderId,
    pub request_id: RequestId,
    pub generated_at: DateTime<Utc>,
    pub generated_by: Option<UserId>,
    pub content: OrderContent,
    pub file_ref: Option<FileRef>,
}
