//! Identity resolution and upsert
//!
//! Maps an extracted record onto zero or one persisted product and decides
//! between insert and update. Lookups run in priority order (SKU, EAN, VVS, URL)
//! and stop at the first hit; results from different lookups are never merged.

use crate::catalog::{
    ChangeEvent, IdentifierKind, Lookup, PersistedProduct, ProductPatch, ProductRecord,
    WatchedField,
};
use crate::session::lock_store;
use crate::storage::{ProductStore, StorageResult};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Result of reconciling one record
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// No existing product matched; a new one was created
    Insert(PersistedProduct),
    /// An existing product was refreshed; carries the recorded changes
    Update(PersistedProduct, Vec<ChangeEvent>),
    /// The record was not persisted
    Skip(String),
}

impl Reconciliation {
    pub fn product(&self) -> Option<&PersistedProduct> {
        match self {
            Self::Insert(p) | Self::Update(p, _) => Some(p),
            Self::Skip(_) => None,
        }
    }
}

/// Upserts extracted records into a shared store
///
/// Each reconciliation holds the store lock from lookup to the last write, so
/// two records carrying the same identifier can never both insert.
pub struct Reconciler<S: ProductStore> {
    store: Arc<Mutex<S>>,
}

impl<S: ProductStore> Reconciler<S> {
    pub fn new(store: Arc<Mutex<S>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    /// Reconciles a record against the catalog using the current time
    pub fn reconcile(&self, record: &ProductRecord) -> StorageResult<Reconciliation> {
        self.reconcile_at(record, Utc::now())
    }

    /// Reconciles a record against the catalog
    ///
    /// # Arguments
    ///
    /// * `record` - The extracted product
    /// * `now` - Timestamp applied to inserted or refreshed products
    ///
    /// # Returns
    ///
    /// * `Ok(Reconciliation)` - What happened to the record
    /// * `Err(StorageError)` - A lookup or write failed; nothing is retried
    pub fn reconcile_at(
        &self,
        record: &ProductRecord,
        now: DateTime<Utc>,
    ) -> StorageResult<Reconciliation> {
        if !record.has_identity() {
            return Ok(Reconciliation::Skip(
                "record has no sku, ean, vvs or name".to_string(),
            ));
        }

        let mut store = lock_store(&self.store)?;

        let Some((lookup, existing)) = resolve(&*store, record)? else {
            let inserted = store.insert(record, now)?;
            tracing::debug!("Inserted product {} from {}", inserted.id, record.url);
            return Ok(Reconciliation::Insert(inserted));
        };

        tracing::debug!(
            "Matched {} to product {} by {}",
            record.url,
            existing.id,
            lookup.kind()
        );

        let merged = merge(&*store, &existing, record)?;
        let seen_at = now.max(existing.last_seen_at);
        let changes = diff(&existing.product, &merged, existing.id, seen_at);

        store.apply_update(
            existing.id,
            &ProductPatch {
                product: merged.clone(),
                seen_at,
            },
            &changes,
        )?;

        Ok(Reconciliation::Update(
            PersistedProduct {
                id: existing.id,
                product: merged,
                first_seen_at: existing.first_seen_at,
                last_seen_at: seen_at,
                updated_at: seen_at,
            },
            changes,
        ))
    }
}

/// Runs the ordered lookups and returns the first hit
fn resolve<S: ProductStore>(
    store: &S,
    record: &ProductRecord,
) -> StorageResult<Option<(Lookup, PersistedProduct)>> {
    for lookup in record.lookups() {
        if let Some(found) = store.find_by_identifier(lookup.kind(), lookup.value())? {
            return Ok(Some((lookup, found)));
        }
    }
    Ok(None)
}

/// Builds the replacement attributes for a matched product
///
/// Present values overwrite, absent values keep what is stored. Identifiers are
/// only filled in where the stored product has none, and only if no other
/// product already holds the value.
fn merge<S: ProductStore>(
    store: &S,
    existing: &PersistedProduct,
    record: &ProductRecord,
) -> StorageResult<ProductRecord> {
    let old = &existing.product;
    let mut merged = ProductRecord {
        url: record.url.clone(),
        name: record.name.clone().or_else(|| old.name.clone()),
        sku: old.sku.clone(),
        ean: old.ean.clone(),
        vvs: old.vvs.clone(),
        price_text: record.price_text.clone().or_else(|| old.price_text.clone()),
        price_numeric: record.price_numeric.or(old.price_numeric),
        currency: record.currency.clone().or_else(|| old.currency.clone()),
        in_stock: record.in_stock.or(old.in_stock),
        category: record.category.clone().or_else(|| old.category.clone()),
        subcategory: record.subcategory.clone().or_else(|| old.subcategory.clone()),
        brand: record.brand.clone().or_else(|| old.brand.clone()),
    };

    for kind in IdentifierKind::unique_kinds() {
        let Some(incoming) = record.identifier(kind) else {
            continue;
        };

        match old.identifier(kind) {
            Some(stored) if stored != incoming => {
                tracing::debug!(
                    "Product {} keeps {} '{}' (page shows '{}')",
                    existing.id,
                    kind,
                    stored,
                    incoming
                );
            }
            Some(_) => {}
            None => match store.find_by_identifier(kind, incoming)? {
                Some(owner) if owner.id != existing.id => {
                    tracing::warn!(
                        "Not assigning {} '{}' to product {}: already held by product {}",
                        kind,
                        incoming,
                        existing.id,
                        owner.id
                    );
                }
                _ => set_identifier(&mut merged, kind, incoming),
            },
        }
    }

    Ok(merged)
}

fn set_identifier(record: &mut ProductRecord, kind: IdentifierKind, value: &str) {
    let slot = match kind {
        IdentifierKind::Sku => &mut record.sku,
        IdentifierKind::Ean => &mut record.ean,
        IdentifierKind::Vvs => &mut record.vvs,
        IdentifierKind::Url => {
            record.url = value.to_string();
            return;
        }
    };
    *slot = Some(value.to_string());
}

/// One event per watched field whose value differs
fn diff(
    old: &ProductRecord,
    new: &ProductRecord,
    product_id: i64,
    at: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    WatchedField::ALL
        .iter()
        .filter_map(|field| {
            let old_value = field.value_of(old);
            let new_value = field.value_of(new);
            (old_value != new_value).then(|| ChangeEvent {
                product_id,
                field: *field,
                old_value,
                new_value,
                changed_at: at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use chrono::Duration;

    fn create_test_reconciler() -> Reconciler<SqliteStore> {
        let store = SqliteStore::new_in_memory().unwrap();
        Reconciler::new(Arc::new(Mutex::new(store)))
    }

    fn record(url: &str, sku: &str, price: f64) -> ProductRecord {
        ProductRecord {
            url: url.to_string(),
            name: Some("Cordless drill 18V".to_string()),
            sku: Some(sku.to_string()),
            price_numeric: Some(price),
            in_stock: Some(true),
            category: Some("Vaerktoej".to_string()),
            ..Default::default()
        }
    }

    fn changes_of(result: &Reconciliation) -> &[ChangeEvent] {
        match result {
            Reconciliation::Update(_, changes) => changes,
            other => panic!("expected Update, got {:?}", other),
        }
    }

    #[test]
    fn test_skip_without_identity() {
        let reconciler = create_test_reconciler();
        let mut bare = ProductRecord::new("https://shop.example.com/p?id=1");
        bare.price_numeric = Some(10.0);

        let result = reconciler.reconcile(&bare).unwrap();
        assert!(matches!(result, Reconciliation::Skip(_)));

        let summary = reconciler.store().lock().unwrap().catalog_summary().unwrap();
        assert_eq!(summary.total_products, 0);
    }

    #[test]
    fn test_sku_match_updates_existing() {
        let reconciler = create_test_reconciler();
        let first = reconciler
            .reconcile(&record("https://shop.example.com/p?id=1", "123", 100.0))
            .unwrap();
        let Reconciliation::Insert(inserted) = first else {
            panic!("expected Insert");
        };

        // Different URL, same SKU
        let second = reconciler
            .reconcile(&record("https://shop.example.com/q?id=1", "123", 100.0))
            .unwrap();
        let product = second.product().unwrap();
        assert_eq!(product.id, inserted.id);
        assert_eq!(product.product.url, "https://shop.example.com/q?id=1");
    }

    #[test]
    fn test_same_sku_twice_records_only_differing_fields() {
        let reconciler = create_test_reconciler();
        let url = "https://shop.example.com/p?id=1";

        let first = reconciler.reconcile(&record(url, "123", 100.0)).unwrap();
        assert!(matches!(first, Reconciliation::Insert(_)));

        let second = reconciler.reconcile(&record(url, "123", 89.5)).unwrap();
        let changes = changes_of(&second);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, WatchedField::Price);
        assert_eq!(changes[0].old_value.as_deref(), Some("100"));
        assert_eq!(changes[0].new_value.as_deref(), Some("89.5"));

        let id = second.product().unwrap().id;
        let history = reconciler.store().lock().unwrap().get_changes(id).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let reconciler = create_test_reconciler();
        let rec = record("https://shop.example.com/p?id=1", "123", 100.0);

        reconciler.reconcile(&rec).unwrap();
        let second = reconciler.reconcile(&rec).unwrap();
        let third = reconciler.reconcile(&rec).unwrap();

        assert!(changes_of(&second).is_empty());
        assert!(changes_of(&third).is_empty());
    }

    #[test]
    fn test_absent_price_is_not_a_regression() {
        let reconciler = create_test_reconciler();
        let url = "https://shop.example.com/p?id=1";
        reconciler.reconcile(&record(url, "123", 100.0)).unwrap();

        let mut without_price = record(url, "123", 0.0);
        without_price.price_numeric = None;
        without_price.in_stock = None;

        let result = reconciler.reconcile(&without_price).unwrap();
        assert!(changes_of(&result).is_empty());
        assert_eq!(result.product().unwrap().product.price_numeric, Some(100.0));
        assert_eq!(result.product().unwrap().product.in_stock, Some(true));
    }

    #[test]
    fn test_failed_history_write_leaves_product_untouched() {
        let reconciler = create_test_reconciler();
        let url = "https://shop.example.com/p?id=1";
        reconciler.reconcile(&record(url, "123", 100.0)).unwrap();

        reconciler
            .store()
            .lock()
            .unwrap()
            .connection()
            .execute_batch(
                "CREATE TEMP TRIGGER reject_changes BEFORE INSERT ON product_changes
                 BEGIN SELECT RAISE(ABORT, 'history unavailable'); END;",
            )
            .unwrap();

        assert!(reconciler.reconcile(&record(url, "123", 80.0)).is_err());
        {
            let guard = reconciler.store().lock().unwrap();
            let stored = guard
                .find_by_identifier(IdentifierKind::Sku, "123")
                .unwrap()
                .unwrap();
            assert_eq!(stored.product.price_numeric, Some(100.0));
            guard
                .connection()
                .execute_batch("DROP TRIGGER reject_changes;")
                .unwrap();
        }

        // The change is still pending and is recorded on the next pass
        let retry = reconciler.reconcile(&record(url, "123", 80.0)).unwrap();
        let changes = changes_of(&retry);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_value.as_deref(), Some("100"));
        assert_eq!(changes[0].new_value.as_deref(), Some("80"));

        let id = retry.product().unwrap().id;
        let history = reconciler.store().lock().unwrap().get_changes(id).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_stock_and_name_changes_are_tracked() {
        let reconciler = create_test_reconciler();
        let url = "https://shop.example.com/p?id=1";
        reconciler.reconcile(&record(url, "123", 100.0)).unwrap();

        let mut changed = record(url, "123", 100.0);
        changed.in_stock = Some(false);
        changed.name = Some("Cordless drill 18V Brushless".to_string());

        let result = reconciler.reconcile(&changed).unwrap();
        let fields: Vec<_> = changes_of(&result).iter().map(|c| c.field).collect();
        assert_eq!(fields, vec![WatchedField::InStock, WatchedField::Name]);
    }

    #[test]
    fn test_sku_lookup_wins_over_ean() {
        let reconciler = create_test_reconciler();

        let by_sku = reconciler
            .reconcile(&record("https://shop.example.com/a?id=1", "SKU-A", 10.0))
            .unwrap();

        let mut other = ProductRecord::new("https://shop.example.com/b?id=2");
        other.name = Some("Hammer".to_string());
        other.ean = Some("5701234567890".to_string());
        let by_ean = reconciler.reconcile(&other).unwrap();

        let mut both = record("https://shop.example.com/a?id=1", "SKU-A", 10.0);
        both.ean = Some("5701234567890".to_string());
        let result = reconciler.reconcile(&both).unwrap();

        let product = result.product().unwrap();
        assert_eq!(product.id, by_sku.product().unwrap().id);
        assert_ne!(product.id, by_ean.product().unwrap().id);
        // The EAN already belongs to the hammer
        assert!(product.product.ean.is_none());
    }

    #[test]
    fn test_url_fallback_when_identifiers_regress() {
        let reconciler = create_test_reconciler();
        let url = "https://shop.example.com/p?id=1";
        let first = reconciler.reconcile(&record(url, "123", 100.0)).unwrap();

        let mut regressed = ProductRecord::new(url);
        regressed.name = Some("Cordless drill 18V".to_string());
        let result = reconciler.reconcile(&regressed).unwrap();

        let product = result.product().unwrap();
        assert_eq!(product.id, first.product().unwrap().id);
        assert_eq!(product.product.sku.as_deref(), Some("123"));
        assert!(changes_of(&result).is_empty());
    }

    #[test]
    fn test_missing_identifiers_are_backfilled_not_overwritten() {
        let reconciler = create_test_reconciler();
        let url = "https://shop.example.com/p?id=1";
        reconciler.reconcile(&record(url, "123", 100.0)).unwrap();

        let mut richer = ProductRecord::new(url);
        richer.name = Some("Cordless drill 18V".to_string());
        richer.vvs = Some("398012345".to_string());
        richer.ean = Some("5701234567890".to_string());
        let result = reconciler.reconcile(&richer).unwrap();
        let product = &result.product().unwrap().product;
        assert_eq!(product.vvs.as_deref(), Some("398012345"));
        assert_eq!(product.ean.as_deref(), Some("5701234567890"));

        // EAN match, conflicting SKU on the page
        let mut conflicting = ProductRecord::new(url);
        conflicting.ean = Some("5701234567890".to_string());
        conflicting.sku = Some("999".to_string());
        let result = reconciler.reconcile(&conflicting).unwrap();
        assert_eq!(
            result.product().unwrap().product.sku.as_deref(),
            Some("123")
        );
    }

    #[test]
    fn test_last_seen_never_moves_backwards() {
        let reconciler = create_test_reconciler();
        let rec = record("https://shop.example.com/p?id=1", "123", 100.0);
        let now = Utc::now();

        let first = reconciler.reconcile_at(&rec, now).unwrap();
        let first_seen = first.product().unwrap().first_seen_at;

        let earlier = now - Duration::hours(3);
        let result = reconciler.reconcile_at(&rec, earlier).unwrap();
        let product = result.product().unwrap();

        assert!(product.last_seen_at > earlier);
        assert!(product.last_seen_at >= product.first_seen_at);
        assert_eq!(product.first_seen_at.timestamp(), first_seen.timestamp());
    }

    #[test]
    fn test_concurrent_reconciliations_insert_once() {
        let reconciler = Arc::new(create_test_reconciler());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reconciler = Arc::clone(&reconciler);
                std::thread::spawn(move || {
                    let url = format!("https://shop.example.com/p?id={}", i);
                    reconciler.reconcile(&record(&url, "SHARED", 50.0)).unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let inserts = results
            .iter()
            .filter(|r| matches!(r, Reconciliation::Insert(_)))
            .count();
        assert_eq!(inserts, 1);

        let summary = reconciler.store().lock().unwrap().catalog_summary().unwrap();
        assert_eq!(summary.total_products, 1);
    }
}
