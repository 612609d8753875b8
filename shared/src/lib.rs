use std::fmt::{Display, Formatter};

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Shopify order identifier. The platform sends it as a JSON number, some
/// relays re-encode it as a string, so both are accepted.
#[derive(Debug, Serialize, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl Display for OrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        text_or_number(deserializer).map(OrderId)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
/**
Payload of the `orders/create` webhook. Only the fields the validator reads are kept.
 */
pub struct Order {
    /**
    Order id, used in admin API urls
     */
    pub id: OrderId,

    /**
    Human facing order number (`#1001` without the hash)
     */
    #[serde(default, deserialize_with = "optional_text_or_number")]
    pub order_number: Option<String>,

    /**
    Total price as sent by the platform, e.g. `"24.90"`
     */
    #[serde(default, deserialize_with = "optional_text_or_number")]
    pub total_price: Option<String>,

    /**
    Currency the order was placed in
     */
    #[serde(default)]
    pub currency: Option<String>,

    pub line_items: Vec<LineItem>,
}

impl Order {
    /// Order number if present, the id otherwise.
    pub fn display_number(&self) -> &str {
        self.order_number.as_deref().unwrap_or(&self.id.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LineItem {
    pub title: String,
    pub quantity: u32,

    /**
    Custom properties attached at checkout. A missing or malformed list reads as empty.
     */
    #[serde(default, deserialize_with = "lenient_properties")]
    pub properties: Vec<Property>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// JSON body returned to the webhook caller.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WebhookResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WebhookResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Deserialize::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(num) => Ok(num.to_string()),
        _ => Err(de::Error::custom("Wrong type, expected string or number")),
    }
}

fn optional_text_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Deserialize::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(num) => Some(num.to_string()),
        Value::Null => None,
        _ => return Err(de::Error::custom("Wrong type, expected string or number")),
    })
}

fn lenient_properties<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Property>, D::Error> {
    let Value::Array(entries) = Deserialize::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };

    let text = |entry: &Value, key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(entries
        .iter()
        .filter(|entry| entry.is_object())
        .map(|entry| Property {
            name: text(entry, "name"),
            value: text(entry, "value"),
        })
        .collect())
}
