//! Line-item ledger: validates item inputs and derives the request total as
//! an exact fixed-point decimal sum. No floating point anywhere in the money
//! path.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{FieldError, ValidationError};

pub const MAX_NAME_LEN: usize = 255;

/// Caller-supplied line item, not yet validated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub name: String,
    pub qty: u32,
    pub unit_price: Decimal,
}

/// A validated item list together with its derived total, rescaled to two
/// fractional digits.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedItems {
    pub items: Vec<ItemDraft>,
    pub amount: Decimal,
}

/// Validate a non-empty item list and compute Σ(qty × unit_price).
///
/// Every failing field is reported, keyed `items[i].<field>`, so callers can
/// surface the whole picture in one round trip.
pub fn validate_items(items: &[ItemDraft]) -> Result<ValidatedItems, ValidationError> {
    let mut errors = Vec::new();

    if items.is_empty() {
        errors.push(FieldError::new("items", "at least one item is required"));
    }

    let minimum_price = Decimal::new(1, 2);
    for (index, item) in items.iter().enumerate() {
        if item.name.trim().is_empty() {
            errors.push(FieldError::new(
                format!("items[{index}].name"),
                "item name cannot be blank",
            ));
        } else if item.name.chars().count() > MAX_NAME_LEN {
            errors.push(FieldError::new(
                format!("items[{index}].name"),
                format!("item name must be at most {MAX_NAME_LEN} characters"),
            ));
        }

        if item.qty < 1 {
            errors.push(FieldError::new(
                format!("items[{index}].qty"),
                "quantity must be at least 1",
            ));
        }

        if item.unit_price < minimum_price {
            errors.push(FieldError::new(
                format!("items[{index}].unit_price"),
                "unit price must be at least 0.01",
            ));
        } else if item.unit_price.normalize().scale() > 2 {
            errors.push(FieldError::new(
                format!("items[{index}].unit_price"),
                "unit price can have at most 2 decimal places",
            ));
        }
    }

    if !errors.is_empty() {
        return Err(ValidationError::new(errors));
    }

    let mut amount: Decimal =
        items.iter().map(|item| Decimal::from(item.qty) * item.unit_price).sum();
    amount.rescale(2);

    Ok(ValidatedItems { items: items.to_vec(), amount })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use std::str::FromStr;

    use super::{validate_items, ItemDraft, MAX_NAME_LEN};

    fn item(name: &str, qty: u32, unit_price: &str) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            qty,
            unit_price: Decimal::from_str(unit_price).expect("test price"),
        }
    }

    #[test]
    fn computes_exact_total_for_the_reference_scenario() {
        let validated =
            validate_items(&[item("Laptop", 2, "1500.00"), item("Mouse", 5, "20.00")])
                .expect("valid items");

        assert_eq!(validated.amount.to_string(), "3100.00");
    }

    #[test]
    fn total_is_rescaled_to_two_fractional_digits() {
        let validated = validate_items(&[item("Cable", 3, "7.5")]).expect("valid items");
        assert_eq!(validated.amount.to_string(), "22.50");
    }

    #[test]
    fn repeated_validation_has_no_rounding_drift() {
        let drafts = vec![item("Widget", 7, "0.10"), item("Gadget", 3, "19.99")];

        let first = validate_items(&drafts).expect("first pass");
        let mut amount = first.amount;
        for _ in 0..100 {
            amount = validate_items(&drafts).expect("pass").amount;
        }

        assert_eq!(amount, first.amount);
        assert_eq!(amount.to_string(), "60.67");
    }

    #[test]
    fn empty_list_is_rejected() {
        let error = validate_items(&[]).expect_err("empty list");
        assert_eq!(error.errors.len(), 1);
        assert_eq!(error.errors[0].field, "items");
    }

    #[test]
    fn every_offending_field_is_itemized() {
        let error = validate_items(&[
            item("", 0, "0.00"),
            item("Ok item", 1, "1.234"),
        ])
        .expect_err("invalid items");

        let fields: Vec<&str> = error.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"items[0].name"));
        assert!(fields.contains(&"items[0].qty"));
        assert!(fields.contains(&"items[0].unit_price"));
        assert!(fields.contains(&"items[1].unit_price"));
    }

    #[test]
    fn overlong_name_is_rejected() {
        let long_name = "x".repeat(MAX_NAME_LEN + 1);
        let error = validate_items(&[item(&long_name, 1, "1.00")]).expect_err("overlong name");
        assert_eq!(error.errors[0].field, "items[0].name");
    }

    #[test]
    fn trailing_zeroes_do_not_trip_the_scale_check() {
        // 2.500 normalizes to 2.5; the value fits in two fractional digits.
        let validated = validate_items(&[item("Stand", 1, "2.500")]).expect("valid");
        assert_eq!(validated.amount.to_string(), "2.50");
    }

    #[test]
    fn sub_cent_price_is_rejected() {
        let error = validate_items(&[item("Pin", 1, "0.001")]).expect_err("below 0.01");
        assert_eq!(error.errors[0].field, "items[0].unit_price");
    }
}
