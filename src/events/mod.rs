//! Event records built from purchases.
//!
//! A completed purchase becomes two records: an `identify` carrying the
//! customer traits and an `Order Completed` track carrying the order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{LIBRARY_NAME, LIBRARY_VERSION};

pub const ORDER_COMPLETED: &str = "Order Completed";
const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    pub product_id: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub category: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Purchase {
    pub order_id: String,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub total: f64,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub shipping: Option<f64>,
    #[serde(default)]
    pub tax: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub products: Vec<Product>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("purchase {0} has no user id")]
    MissingUserId(String),
    #[error("purchase has no order id")]
    MissingOrderId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub context: Value,
}

impl Envelope {
    fn new() -> Self {
        Envelope {
            message_id: new_message_id(),
            timestamp: Utc::now(),
            context: json!({
                "library": { "name": LIBRARY_NAME, "version": LIBRARY_VERSION }
            }),
        }
    }
}

/// One record handed to the transport. Serializes to the intake wire shape,
/// discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventRecord {
    #[serde(rename_all = "camelCase")]
    Identify {
        user_id: String,
        traits: Map<String, Value>,
        #[serde(flatten)]
        envelope: Envelope,
    },
    #[serde(rename_all = "camelCase")]
    Track {
        user_id: String,
        event: String,
        properties: Map<String, Value>,
        #[serde(flatten)]
        envelope: Envelope,
    },
}

impl EventRecord {
    /// Identify record with the customer traits known from the purchase.
    pub fn identify(purchase: &Purchase) -> Result<EventRecord, EventError> {
        check(purchase)?;
        let mut traits = Map::new();
        if let Some(email) = &purchase.email {
            traits.insert("email".to_string(), Value::from(email.as_str()));
        }
        if let Some(name) = &purchase.name {
            traits.insert("name".to_string(), Value::from(name.as_str()));
        }
        Ok(EventRecord::Identify {
            user_id: purchase.user_id.clone(),
            traits,
            envelope: Envelope::new(),
        })
    }

    pub fn order_completed(purchase: &Purchase) -> Result<EventRecord, EventError> {
        check(purchase)?;
        let mut properties = Map::new();
        properties.insert("order_id".to_string(), Value::from(purchase.order_id.as_str()));
        properties.insert("total".to_string(), Value::from(purchase.total));
        properties.insert(
            "revenue".to_string(),
            Value::from(purchase.revenue.unwrap_or(purchase.total)),
        );
        if let Some(shipping) = purchase.shipping {
            properties.insert("shipping".to_string(), Value::from(shipping));
        }
        if let Some(tax) = purchase.tax {
            properties.insert("tax".to_string(), Value::from(tax));
        }
        properties.insert(
            "currency".to_string(),
            Value::from(purchase.currency.as_deref().unwrap_or(DEFAULT_CURRENCY)),
        );
        let products: Vec<Value> = purchase.products.iter().map(product_properties).collect();
        properties.insert("products".to_string(), Value::Array(products));

        Ok(EventRecord::Track {
            user_id: purchase.user_id.clone(),
            event: ORDER_COMPLETED.to_string(),
            properties,
            envelope: Envelope::new(),
        })
    }

    #[must_use]
    pub fn message_id(&self) -> &str {
        match self {
            EventRecord::Identify { envelope, .. } | EventRecord::Track { envelope, .. } => {
                &envelope.message_id
            }
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            EventRecord::Identify { user_id, .. } | EventRecord::Track { user_id, .. } => user_id,
        }
    }
}

fn check(purchase: &Purchase) -> Result<(), EventError> {
    if purchase.order_id.trim().is_empty() {
        return Err(EventError::MissingOrderId);
    }
    if purchase.user_id.trim().is_empty() {
        return Err(EventError::MissingUserId(purchase.order_id.clone()));
    }
    Ok(())
}

fn product_properties(product: &Product) -> Value {
    let mut entry = Map::new();
    entry.insert("product_id".to_string(), Value::from(product.product_id.as_str()));
    if let Some(sku) = &product.sku {
        entry.insert("sku".to_string(), Value::from(sku.as_str()));
    }
    entry.insert("name".to_string(), Value::from(product.name.as_str()));
    entry.insert("price".to_string(), Value::from(product.price));
    entry.insert("quantity".to_string(), Value::from(product.quantity));
    if let Some(category) = &product.category {
        entry.insert("category".to_string(), Value::from(category.as_str()));
    }
    Value::Object(entry)
}

/// 128 random bits, hex encoded.
#[must_use]
pub fn new_message_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn purchase() -> Purchase {
        serde_json::from_str(
            r#"{
                "order_id": "o-1",
                "user_id": "u-1",
                "email": "jane@example.com",
                "name": "Jane",
                "total": 30.5,
                "tax": 2.5,
                "products": [
                    {"product_id": "p-1", "sku": "SKU-1", "name": "Mug", "price": 14.0, "quantity": 2}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_identify_shape() {
        let record = EventRecord::identify(&purchase()).unwrap();
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "identify");
        assert_eq!(value["userId"], "u-1");
        assert_eq!(value["traits"]["email"], "jane@example.com");
        assert_eq!(value["traits"]["name"], "Jane");
        assert_eq!(value["messageId"], record.message_id());
        assert_eq!(value["context"]["library"]["name"], LIBRARY_NAME);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_order_completed_shape() {
        let record = EventRecord::order_completed(&purchase()).unwrap();
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "track");
        assert_eq!(value["event"], ORDER_COMPLETED);
        assert_eq!(value["properties"]["order_id"], "o-1");
        assert_eq!(value["properties"]["revenue"], 30.5);
        assert_eq!(value["properties"]["tax"], 2.5);
        assert_eq!(value["properties"]["currency"], "USD");
        assert!(value["properties"].get("shipping").is_none());
        assert_eq!(value["properties"]["products"][0]["sku"], "SKU-1");
        assert_eq!(value["properties"]["products"][0]["quantity"], 2);
        assert!(value["properties"]["products"][0].get("category").is_none());
    }

    #[test]
    fn test_missing_user_id() {
        let mut purchase = purchase();
        purchase.user_id = " ".to_string();
        assert_eq!(
            EventRecord::identify(&purchase),
            Err(EventError::MissingUserId("o-1".to_string()))
        );
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = EventRecord::identify(&purchase()).unwrap();
        let b = EventRecord::identify(&purchase()).unwrap();
        assert_ne!(a.message_id(), b.message_id());
        assert_eq!(a.message_id().len(), 32);
    }
}
