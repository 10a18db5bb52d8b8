//! Storefront entities.
//!
//! Each entity is a typed view over the server object of the same name.
//! Field names on the wire are the server's, kept in the `fields` module
//! next to each type so queries and schemas can refer to them.

use crate::{
    schema::{EntitySchema, IndexSpec},
    Entity, RecordMeta,
};
use serde::{Deserialize, Serialize};

macro_rules! entity {
    ($ty:ty) => {
        impl Entity for $ty {
            fn meta(&self) -> &RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut RecordMeta {
                &mut self.meta
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

pub mod product_fields {
    pub const NAME: &str = "Name";
    pub const FAMILY: &str = "Family";
    pub const CODE: &str = "ProductCode";
    pub const DESCRIPTION: &str = "Description";
    pub const ACTIVE: &str = "IsActive";
}

/// A sellable product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(rename = "Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Family", skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(rename = "ProductCode", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "IsActive", skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl Product {
    pub const OBJECT_NAME: &'static str = "Product2";

    pub fn new() -> Self {
        Self {
            meta: RecordMeta::new(),
            ..Self::default()
        }
    }

    /// Server id, present once the product has been synced.
    pub fn product_id(&self) -> Option<&str> {
        self.meta.server_id.as_deref()
    }

    pub fn schema() -> EntitySchema {
        use product_fields::*;
        let all = [NAME, FAMILY, CODE, DESCRIPTION, ACTIVE];
        EntitySchema::builder(Self::OBJECT_NAME)
            .index(IndexSpec::string(NAME))
            .index(IndexSpec::string(FAMILY))
            .index(IndexSpec::string(CODE))
            .create_fields([NAME, FAMILY, CODE, DESCRIPTION, ACTIVE])
            .update_fields(all)
            .read_fields(all)
            .order_path(NAME)
            .build()
    }
}

entity!(Product);

// ---------------------------------------------------------------------------
// ProductOption
// ---------------------------------------------------------------------------

pub mod option_fields {
    pub const NAME: &str = "SBQQ__ProductName__c";
    /// Id of the product this option configures
    pub const CONFIGURED_PRODUCT: &str = "SBQQ__ConfiguredSKU__c";
    /// Id of the product the option adds
    pub const OPTIONAL_SKU: &str = "SBQQ__OptionalSKU__c";
    pub const PRODUCT_FAMILY: &str = "SBQQ__ProductFamily__c";
    pub const OPTION_TYPE: &str = "SBQQ__Type__c";
    pub const ORDER_NUMBER: &str = "SBQQ__Number__c";
    pub const QUANTITY: &str = "SBQQ__Quantity__c";
}

/// One configurable option of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductOption {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(rename = "SBQQ__ProductName__c", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "SBQQ__ConfiguredSKU__c", skip_serializing_if = "Option::is_none")]
    pub configured_product: Option<String>,
    #[serde(rename = "SBQQ__OptionalSKU__c", skip_serializing_if = "Option::is_none")]
    pub optional_sku: Option<String>,
    #[serde(rename = "SBQQ__ProductFamily__c", skip_serializing_if = "Option::is_none")]
    pub product_family: Option<String>,
    #[serde(rename = "SBQQ__Type__c", skip_serializing_if = "Option::is_none")]
    pub option_type: Option<String>,
    #[serde(rename = "SBQQ__Number__c", skip_serializing_if = "Option::is_none")]
    pub order_number: Option<f64>,
    #[serde(rename = "SBQQ__Quantity__c", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
}

impl ProductOption {
    pub const OBJECT_NAME: &'static str = "SBQQ__ProductOption__c";

    pub fn new() -> Self {
        Self {
            meta: RecordMeta::new(),
            ..Self::default()
        }
    }

    pub fn option_id(&self) -> Option<&str> {
        self.meta.server_id.as_deref()
    }

    pub fn schema() -> EntitySchema {
        use option_fields::*;
        let all = [
            NAME,
            CONFIGURED_PRODUCT,
            OPTIONAL_SKU,
            PRODUCT_FAMILY,
            OPTION_TYPE,
            ORDER_NUMBER,
            QUANTITY,
        ];
        EntitySchema::builder(Self::OBJECT_NAME)
            .index(IndexSpec::string(CONFIGURED_PRODUCT))
            .index(IndexSpec::string(OPTIONAL_SKU))
            .index(IndexSpec::string(PRODUCT_FAMILY))
            .index(IndexSpec::floating(ORDER_NUMBER))
            .create_fields([CONFIGURED_PRODUCT, OPTIONAL_SKU, ORDER_NUMBER, QUANTITY])
            .update_fields(all)
            .read_fields(all)
            .order_path(ORDER_NUMBER)
            .build()
    }
}

entity!(ProductOption);

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

pub mod quote_fields {
    pub const CREATED_BY: &str = "CreatedById";
    pub const NUMBER: &str = "Name";
    pub const OWNER: &str = "OwnerId";
    pub const ACCOUNT: &str = "SBQQ__Account__c";
    pub const OPPORTUNITY: &str = "SBQQ__Opportunity2__c";
    pub const PRICEBOOK_ID: &str = "SBQQ__PricebookId__c";
    pub const PRICEBOOK: &str = "SBQQ__Pricebook__c";
    pub const STATUS: &str = "SBQQ__Status__c";
    pub const KEY: &str = "SBQQ__Key__c";
    pub const PRIMARY: &str = "SBQQ__Primary__c";
    pub const LINE_ITEMS_GROUPED: &str = "SBQQ__LineItemsGrouped__c";
    pub const NET_AMOUNT: &str = "SBQQ__NetAmount__c";
}

/// Approval stage of a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteStage {
    Draft,
    #[serde(rename = "In Review")]
    InReview,
    Approved,
    Denied,
    Presented,
    Accepted,
}

/// A sales quote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quote {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(rename = "CreatedById", skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Human-readable quote number, assigned by the server
    #[serde(rename = "Name", skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(rename = "OwnerId", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(rename = "SBQQ__Account__c", skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(rename = "SBQQ__Opportunity2__c", skip_serializing_if = "Option::is_none")]
    pub opportunity: Option<String>,
    #[serde(rename = "SBQQ__PricebookId__c", skip_serializing_if = "Option::is_none")]
    pub pricebook_id: Option<String>,
    #[serde(rename = "SBQQ__Pricebook__c", skip_serializing_if = "Option::is_none")]
    pub pricebook: Option<String>,
    #[serde(rename = "SBQQ__Status__c", skip_serializing_if = "Option::is_none")]
    pub status: Option<QuoteStage>,
    #[serde(rename = "SBQQ__Key__c", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "SBQQ__Primary__c", skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(rename = "SBQQ__LineItemsGrouped__c", skip_serializing_if = "Option::is_none")]
    pub line_items_grouped: Option<bool>,
    #[serde(rename = "SBQQ__NetAmount__c", skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<f64>,
}

impl Quote {
    pub const OBJECT_NAME: &'static str = "SBQQ__Quote__c";

    pub fn new() -> Self {
        Self {
            meta: RecordMeta::new(),
            ..Self::default()
        }
    }

    pub fn quote_id(&self) -> Option<&str> {
        self.meta.server_id.as_deref()
    }

    pub fn schema() -> EntitySchema {
        use quote_fields::*;
        let all = [
            CREATED_BY,
            NUMBER,
            OWNER,
            ACCOUNT,
            OPPORTUNITY,
            PRICEBOOK_ID,
            PRICEBOOK,
            STATUS,
            KEY,
            PRIMARY,
            LINE_ITEMS_GROUPED,
            NET_AMOUNT,
        ];
        EntitySchema::builder(Self::OBJECT_NAME)
            .index(IndexSpec::string(OPPORTUNITY))
            .index(IndexSpec::string(OWNER))
            .index(IndexSpec::string(PRICEBOOK))
            .index(IndexSpec::string(NUMBER))
            .index(IndexSpec::string(ACCOUNT))
            .index(IndexSpec::string(KEY))
            .create_fields([
                OWNER,
                ACCOUNT,
                OPPORTUNITY,
                PRICEBOOK_ID,
                STATUS,
                PRIMARY,
                LINE_ITEMS_GROUPED,
            ])
            .update_fields(all)
            .read_fields(all)
            .order_path(KEY)
            .build()
    }
}

entity!(Quote);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::field;
    use serde_json::{json, Value};

    #[test]
    fn schemas_are_valid() {
        Product::schema().validate().unwrap();
        ProductOption::schema().validate().unwrap();
        Quote::schema().validate().unwrap();
    }

    #[test]
    fn quote_row_uses_server_names() {
        let mut quote = Quote::new();
        quote.owner_id = Some("005xx".into());
        quote.status = Some(QuoteStage::InReview);
        quote.primary = Some(true);
        quote.net_amount = Some(1250.5);

        let row = quote.to_row().unwrap();
        assert_eq!(row[quote_fields::STATUS], json!("In Review"));
        assert_eq!(row[quote_fields::PRIMARY], json!(true));
        assert_eq!(row[quote_fields::NET_AMOUNT], json!(1250.5));
        assert!(row.get(quote_fields::ACCOUNT).is_none());
        assert!(row.contains_key(field::EXTERNAL_ID));

        let back = Quote::from_row(row).unwrap();
        assert_eq!(back, quote);
    }

    #[test]
    fn option_accepts_integer_order_numbers() {
        let Value::Object(row) = json!({
            "Id": "a0X1",
            "SBQQ__ConfiguredSKU__c": "01t1",
            "SBQQ__Number__c": 10,
            "SBQQ__Type__c": "Component",
            "SomethingElse": "ignored"
        }) else {
            unreachable!()
        };

        let option = ProductOption::from_row(row).unwrap();
        assert_eq!(option.option_id(), Some("a0X1"));
        assert_eq!(option.order_number, Some(10.0));
        assert_eq!(option.option_type.as_deref(), Some("Component"));
        assert_eq!(option.product_family, None);
    }

    #[test]
    fn unknown_quote_stage_fails_to_decode() {
        let Value::Object(row) = json!({"SBQQ__Status__c": "Archived"}) else {
            unreachable!()
        };
        assert!(matches!(Quote::from_row(row), Err(crate::Error::Decode(_))));
    }

    #[test]
    fn product_id_comes_from_server_id() {
        let mut product = Product::new();
        assert_eq!(product.product_id(), None);
        product.meta.server_id = Some("01t1".into());
        assert_eq!(product.product_id(), Some("01t1"));
    }
}
