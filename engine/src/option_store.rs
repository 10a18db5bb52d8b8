//! Product option store.
//!
//! Options belong to the product they configure and are presented grouped
//! into families. Grouping happens in memory over the options of a single
//! product.

use crate::{
    models::{option_fields, Product, ProductOption},
    query::{Order, QuerySpec},
    store::Store,
    LocalStorage, SyncEngine,
};
use std::cmp::Ordering;
use std::ops::Deref;
use std::sync::Arc;

/// Page size for option queries.
const OPTION_PAGE_SIZE: usize = 100;

/// Options of one product family, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFamily {
    pub name: String,
    /// Option type of the family's first member
    pub option_type: String,
    pub options: Vec<ProductOption>,
}

/// Store for [`ProductOption`] with relationship lookups.
///
/// Dereferences to the generic [`Store`] for everything it does not override.
#[derive(Debug)]
pub struct ProductOptionStore {
    inner: Store<ProductOption>,
}

impl Deref for ProductOptionStore {
    type Target = Store<ProductOption>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl ProductOptionStore {
    pub fn new(storage: Arc<dyn LocalStorage>, sync_engine: Arc<dyn SyncEngine>) -> Self {
        Self {
            inner: Store::new(ProductOption::schema(), storage, sync_engine),
        }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        Self {
            inner: self.inner.with_page_size(page_size),
        }
    }

    pub fn store(&self) -> &Store<ProductOption> {
        &self.inner
    }

    /// Every live option, highest order number first.
    pub fn records(&self) -> Vec<ProductOption> {
        let schema = self.inner.schema();
        self.inner.run(
            QuerySpec::all(
                &schema.object_name,
                &schema.order_path,
                Order::Descending,
                OPTION_PAGE_SIZE,
            )
            .map(QuerySpec::excluding_deleted),
            0,
        )
    }

    /// Options configuring `product`, or `None` if the product has not been
    /// synced yet.
    pub fn options(&self, product: &Product) -> Option<Vec<ProductOption>> {
        let product_id = product.product_id()?;
        let schema = self.inner.schema();
        Some(self.inner.run(
            QuerySpec::exact(
                &schema.object_name,
                option_fields::CONFIGURED_PRODUCT,
                product_id,
                &schema.order_path,
                Order::Ascending,
                OPTION_PAGE_SIZE,
            )
            .map(QuerySpec::excluding_deleted),
            0,
        ))
    }

    pub fn option_for_sku(&self, sku: &str) -> Option<ProductOption> {
        let schema = self.inner.schema();
        self.inner
            .run(
                QuerySpec::exact(
                    &schema.object_name,
                    option_fields::OPTIONAL_SKU,
                    sku,
                    &schema.order_path,
                    Order::Descending,
                    1,
                )
                .map(QuerySpec::excluding_deleted),
                0,
            )
            .into_iter()
            .next()
    }

    /// Options of `product` grouped by family.
    pub fn families(&self, product: &Product) -> Option<Vec<ProductFamily>> {
        self.options(product).map(group_families)
    }
}

/// Ascending by order number; options without one go last.
fn by_order_number(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub(crate) fn sort_options(options: &mut [ProductOption]) {
    options.sort_by(|a, b| by_order_number(a.order_number, b.order_number));
}

/// Group options into families.
///
/// Options without a family are left out, as are families whose first
/// member has no option type. Families are ordered by their first member.
pub fn group_families(mut options: Vec<ProductOption>) -> Vec<ProductFamily> {
    sort_options(&mut options);

    let mut groups: Vec<(String, Vec<ProductOption>)> = Vec::new();
    for option in options {
        let Some(name) = option.product_family.clone() else {
            continue;
        };
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, members)) => members.push(option),
            None => groups.push((name, vec![option])),
        }
    }

    let mut families: Vec<ProductFamily> = groups
        .into_iter()
        .filter_map(|(name, mut options)| {
            sort_options(&mut options);
            let option_type = options.first()?.option_type.clone()?;
            Some(ProductFamily {
                name,
                option_type,
                options,
            })
        })
        .collect();

    families.sort_by(|a, b| {
        by_order_number(
            a.options.first().and_then(|o| o.order_number),
            b.options.first().and_then(|o| o.order_number),
        )
    });
    families
}
