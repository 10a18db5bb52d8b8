//! Query specifications.
//!
//! A [`QuerySpec`] is the storage-native description of a paged, ordered
//! query. Builders validate their input and return
//! [`Error::QueryConstruction`] instead of producing a query storage would
//! reject later.

use crate::{error::Result, record::field, CollectionName, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Page size used by list queries unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// A filter on one indexed path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Predicate {
    /// `path == value`
    Equals { path: String, value: Value },
    /// `path != true`, missing values included
    NotTrue { path: String },
}

impl Predicate {
    pub fn path(&self) -> &str {
        match self {
            Predicate::Equals { path, .. } | Predicate::NotTrue { path } => path,
        }
    }

    /// Evaluate against a row.
    pub fn matches(&self, row: &crate::Row) -> bool {
        match self {
            Predicate::Equals { path, value } => row.get(path) == Some(value),
            Predicate::NotTrue { path } => row.get(path) != Some(&Value::Bool(true)),
        }
    }
}

/// A paged, ordered query against one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub collection: CollectionName,
    pub predicates: Vec<Predicate>,
    pub order_path: String,
    pub order: Order,
    pub page_size: usize,
}

impl QuerySpec {
    fn build(
        collection: &str,
        predicates: Vec<Predicate>,
        order_path: &str,
        order: Order,
        page_size: usize,
    ) -> Result<Self> {
        if collection.is_empty() {
            return Err(Error::QueryConstruction("collection name is empty".into()));
        }
        if order_path.is_empty() {
            return Err(Error::QueryConstruction(format!(
                "missing order path for {collection}"
            )));
        }
        if page_size == 0 {
            return Err(Error::QueryConstruction(format!(
                "page size must be positive for {collection}"
            )));
        }
        if predicates.iter().any(|p| p.path().is_empty()) {
            return Err(Error::QueryConstruction(format!(
                "empty match path for {collection}"
            )));
        }

        Ok(Self {
            collection: collection.to_string(),
            predicates,
            order_path: order_path.to_string(),
            order,
            page_size,
        })
    }

    /// Every live (non-tombstoned) row, ascending by `order_path`.
    pub fn list(collection: &str, order_path: &str, page_size: usize) -> Result<Self> {
        Self::build(
            collection,
            vec![Predicate::NotTrue {
                path: field::LOCALLY_DELETED.to_string(),
            }],
            order_path,
            Order::Ascending,
            page_size,
        )
    }

    /// Rows where `path` equals `match_key`.
    pub fn exact(
        collection: &str,
        path: &str,
        match_key: impl Into<Value>,
        order_path: &str,
        order: Order,
        page_size: usize,
    ) -> Result<Self> {
        Self::build(
            collection,
            vec![Predicate::Equals {
                path: path.to_string(),
                value: match_key.into(),
            }],
            order_path,
            order,
            page_size,
        )
    }

    /// Every row, tombstones included.
    pub fn all(collection: &str, order_path: &str, order: Order, page_size: usize) -> Result<Self> {
        Self::build(collection, Vec::new(), order_path, order, page_size)
    }

    /// Add the tombstone filter.
    pub fn excluding_deleted(mut self) -> Self {
        let predicate = Predicate::NotTrue {
            path: field::LOCALLY_DELETED.to_string(),
        };
        if !self.predicates.contains(&predicate) {
            self.predicates.push(predicate);
        }
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::QueryConstruction(format!(
                "page size must be positive for {}",
                self.collection
            )));
        }
        self.page_size = page_size;
        Ok(self)
    }

    /// Whether a row satisfies every predicate.
    pub fn matches(&self, row: &crate::Row) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }

    /// Compare two rows by the order path, honouring the direction.
    pub fn compare(&self, a: &crate::Row, b: &crate::Row) -> Ordering {
        let ordering = compare_values(a.get(&self.order_path), b.get(&self.order_path));
        match self.order {
            Order::Ascending => ordering,
            Order::Descending => ordering.reverse(),
        }
    }
}

/// Total order over optional JSON scalars: missing/null first, then booleans,
/// numbers, strings. Composite values compare equal.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> crate::Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn list_excludes_tombstones() {
        let spec = QuerySpec::list("Quote", "Key", DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(spec.order, Order::Ascending);
        assert!(spec.matches(&row(json!({"Key": "a"}))));
        assert!(spec.matches(&row(json!({"Key": "a", "__locally_deleted__": false}))));
        assert!(!spec.matches(&row(json!({"Key": "a", "__locally_deleted__": true}))));
    }

    #[test]
    fn exact_matches_value() {
        let spec =
            QuerySpec::exact("Quote", "ExternalId", "ext-1", "Key", Order::Descending, 1).unwrap();
        assert!(spec.matches(&row(json!({"ExternalId": "ext-1"}))));
        assert!(!spec.matches(&row(json!({"ExternalId": "ext-2"}))));
        // Tombstones are visible to raw exact matches
        assert!(spec.matches(&row(json!({"ExternalId": "ext-1", "__locally_deleted__": true}))));
        assert!(!spec
            .excluding_deleted()
            .matches(&row(json!({"ExternalId": "ext-1", "__locally_deleted__": true}))));
    }

    #[test]
    fn construction_fails_closed() {
        assert!(matches!(
            QuerySpec::list("Quote", "", 10),
            Err(Error::QueryConstruction(_))
        ));
        assert!(matches!(
            QuerySpec::list("", "Key", 10),
            Err(Error::QueryConstruction(_))
        ));
        assert!(matches!(
            QuerySpec::list("Quote", "Key", 0),
            Err(Error::QueryConstruction(_))
        ));
        assert!(matches!(
            QuerySpec::exact("Quote", "", "x", "Key", Order::Ascending, 1),
            Err(Error::QueryConstruction(_))
        ));
        let spec = QuerySpec::list("Quote", "Key", 10).unwrap();
        assert!(spec.with_page_size(0).is_err());
    }

    #[test]
    fn excluding_deleted_is_idempotent() {
        let spec = QuerySpec::list("Quote", "Key", 10)
            .unwrap()
            .excluding_deleted();
        assert_eq!(spec.predicates.len(), 1);
    }

    #[test]
    fn compare_respects_order() {
        let a = row(json!({"Key": "a"}));
        let b = row(json!({"Key": "b"}));

        let asc = QuerySpec::all("Quote", "Key", Order::Ascending, 10).unwrap();
        assert_eq!(asc.compare(&a, &b), Ordering::Less);

        let desc = QuerySpec::all("Quote", "Key", Order::Descending, 10).unwrap();
        assert_eq!(desc.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn compare_values_mixed() {
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!(1.5)), Some(&json!(1))), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!(true)), Some(&json!("a"))), Ordering::Less);
        assert_eq!(compare_values(Some(&Value::Null), None), Ordering::Equal);
    }
}
