use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

/// A line item owned by exactly one purchase request. Items are replaced
/// wholesale while the request is pending and frozen once it leaves
/// `PENDING`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestItem {
    pub id: ItemId,
    pub request_id: RequestId,
    pub name: String,
    pub qty: u32,
    pub unit_price: Decimal,
}

impl RequestItem {
    pub fn total_price(&self) -> Decimal {
        Decimal::from(self.qty) * self.unit_price
    }
}
