//! Identifier repair for maintenance runs
//!
//! Reconciliation never rewrites an identifier a product already holds. When a
//! stored identifier turns out to be wrong, it is corrected here instead.

use crate::catalog::IdentifierKind;
use crate::storage::{ProductStore, StorageError, StorageResult};

/// What `reassign_identifier` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The product now holds the corrected value
    Assigned,
    /// The product already held the value
    Unchanged,
    /// Another product holds the value; this product's identifier was cleared
    Cleared { conflicting_product: i64 },
}

/// Applies a corrected identifier to a product
///
/// If a different product already holds `value`, the identifier on `product_id`
/// is set to NULL instead, leaving the other product untouched.
///
/// # Arguments
///
/// * `store` - The catalog store (callers holding a shared store lock it first)
/// * `product_id` - Product whose identifier is being corrected
/// * `kind` - SKU, EAN or VVS
/// * `value` - The corrected identifier
pub fn reassign_identifier<S: ProductStore>(
    store: &mut S,
    product_id: i64,
    kind: IdentifierKind,
    value: &str,
) -> StorageResult<RepairOutcome> {
    if kind == IdentifierKind::Url {
        return Err(StorageError::ConstraintViolation(
            "url is not a unique identifier and cannot be reassigned".to_string(),
        ));
    }

    let product = store.get_product(product_id)?;
    if product.product.identifier(kind) == Some(value) {
        return Ok(RepairOutcome::Unchanged);
    }

    if let Some(owner) = store.find_by_identifier(kind, value)? {
        tracing::warn!(
            "{} '{}' already belongs to product {}; clearing {} on product {}",
            kind,
            value,
            owner.id,
            kind,
            product_id
        );
        store.set_identifier(product_id, kind, None)?;
        return Ok(RepairOutcome::Cleared {
            conflicting_product: owner.id,
        });
    }

    store.set_identifier(product_id, kind, Some(value))?;
    tracing::info!("Product {} {} set to '{}'", product_id, kind, value);
    Ok(RepairOutcome::Assigned)
}
