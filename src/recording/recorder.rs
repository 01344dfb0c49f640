//! Event record builder
//!
//! Turns a raw interaction into a normalized, redacted [`LogEntry`] stamped
//! with the creation time, the active page and the user agent.

use crate::utils::errors::{Result, TelemetryError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;
use ulid::Ulid;

/// Replacement written over sensitive values
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Kind of user interaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionType {
    Keystroke,
    Click,
    FormSubmit,
    Navigation,
    PageLoad,
    /// Any tag not covered above
    Custom(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Keystroke => "keystroke",
            ActionType::Click => "click",
            ActionType::FormSubmit => "form_submit",
            ActionType::Navigation => "navigation",
            ActionType::PageLoad => "page_load",
            ActionType::Custom(tag) => tag.as_str(),
        }
    }
}

impl From<&str> for ActionType {
    fn from(tag: &str) -> Self {
        match tag {
            "keystroke" => ActionType::Keystroke,
            "click" => ActionType::Click,
            "form_submit" => ActionType::FormSubmit,
            "navigation" => ActionType::Navigation,
            "page_load" => ActionType::PageLoad,
            other => ActionType::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(ActionType::from(tag.as_str()))
    }
}

/// One normalized, redacted record of a user interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Creation-ordered unique id, for receiver-side deduplication
    pub entry_id: Ulid,

    pub action_type: ActionType,

    /// Creation instant (RFC 3339, UTC)
    pub timestamp: DateTime<Utc>,

    /// Page path active at creation
    pub page: String,

    pub element_id: Option<String>,

    pub element_type: Option<String>,

    /// Action-specific fields, sensitive values already redacted
    pub data: Map<String, Value>,

    pub user_agent: String,
}

/// Identity of the UI element an interaction originated from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    pub id: Option<String>,
    pub element_type: Option<String>,
}

impl ElementRef {
    pub fn new(id: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            element_type: Some(element_type.into()),
        }
    }

    fn is_password(&self) -> bool {
        self.element_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case("password"))
            .unwrap_or(false)
    }
}

/// Page-level metadata stamped onto entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub page: String,
    pub user_agent: String,
}

impl PageContext {
    pub fn new(page: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// An interaction as delivered by the capture layer (one JSON line in the binary)
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub action_type: ActionType,

    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub element_id: Option<String>,

    #[serde(default)]
    pub element_type: Option<String>,

    /// When present, the page context is switched before recording
    #[serde(default)]
    pub page: Option<String>,
}

impl Interaction {
    pub fn element(&self) -> Option<ElementRef> {
        if self.element_id.is_none() && self.element_type.is_none() {
            return None;
        }
        Some(ElementRef {
            id: self.element_id.clone(),
            element_type: self.element_type.clone(),
        })
    }
}

/// Replaces sensitive values in entry data
#[derive(Debug, Clone)]
pub struct Redactor {
    /// Lowercased key fragments
    fragments: Vec<String>,
}

impl Redactor {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fragments: fragments
                .into_iter()
                .map(|f| f.as_ref().to_ascii_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        self.fragments.iter().any(|f| key.contains(f.as_str()))
    }

    /// Redact `data` in place. Password elements also lose their `value`.
    pub fn redact(&self, data: &mut Map<String, Value>, element: Option<&ElementRef>) {
        if element.map(ElementRef::is_password).unwrap_or(false) {
            if let Some(value) = data.get_mut("value") {
                *value = Value::String(REDACTION_MARKER.to_string());
            }
        }
        self.redact_map(data);
    }

    fn redact_map(&self, map: &mut Map<String, Value>) {
        for (key, value) in map.iter_mut() {
            if self.is_sensitive(key) {
                *value = Value::String(REDACTION_MARKER.to_string());
            } else {
                self.redact_value(value);
            }
        }
    }

    fn redact_value(&self, value: &mut Value) {
        match value {
            Value::Object(map) => self.redact_map(map),
            Value::Array(items) => items.iter_mut().for_each(|v| self.redact_value(v)),
            _ => {}
        }
    }
}

/// Builds log entries against the current page context
pub struct EventRecordBuilder {
    context: RwLock<PageContext>,
    redactor: Redactor,
}

impl EventRecordBuilder {
    pub fn new(context: PageContext, redactor: Redactor) -> Self {
        Self {
            context: RwLock::new(context),
            redactor,
        }
    }

    /// Switch the active page (navigation)
    pub fn set_page(&self, page: impl Into<String>) {
        let page = page.into();
        debug!("Page context changed to {}", page);
        self.context.write().page = page;
    }

    pub fn context(&self) -> PageContext {
        self.context.read().clone()
    }

    /// Build an entry. Fails without side effects if `data` does not
    /// serialize to a JSON object.
    pub fn record<T: Serialize + ?Sized>(
        &self,
        action_type: ActionType,
        data: &T,
        element: Option<ElementRef>,
    ) -> Result<LogEntry> {
        let mut data = match serde_json::to_value(data)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(TelemetryError::InvalidPayload(format!(
                    "entry data must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };
        self.redactor.redact(&mut data, element.as_ref());

        let context = self.context.read().clone();
        let element = element.unwrap_or_default();

        Ok(LogEntry {
            entry_id: Ulid::new(),
            action_type,
            timestamp: Utc::now(),
            page: context.page,
            element_id: element.id,
            element_type: element.element_type,
            data,
            user_agent: context.user_agent,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> EventRecordBuilder {
        EventRecordBuilder::new(
            PageContext::new("/dashboard/", "test-agent/1.0"),
            Redactor::new(["password", "token"]),
        )
    }

    #[test]
    fn test_record_stamps_metadata() {
        let builder = builder();
        let before = Utc::now();
        let entry = builder
            .record(ActionType::Click, &json!({"x": 10}), Some(ElementRef::new("save", "button")))
            .unwrap();

        assert_eq!(entry.action_type, ActionType::Click);
        assert_eq!(entry.page, "/dashboard/");
        assert_eq!(entry.user_agent, "test-agent/1.0");
        assert_eq!(entry.element_id.as_deref(), Some("save"));
        assert_eq!(entry.element_type.as_deref(), Some("button"));
        assert_eq!(entry.data.get("x"), Some(&json!(10)));
        assert!(entry.timestamp >= before);
    }

    #[test]
    fn test_page_captured_at_call_time() {
        let builder = builder();
        let first = builder.record(ActionType::PageLoad, &json!({}), None).unwrap();
        builder.set_page("/settings/");
        let second = builder.record(ActionType::Navigation, &json!({}), None).unwrap();

        assert_eq!(first.page, "/dashboard/");
        assert_eq!(second.page, "/settings/");
    }

    #[test]
    fn test_password_element_value_redacted() {
        let builder = builder();
        let entry = builder
            .record(
                ActionType::Keystroke,
                &json!({"value": "hunter2", "length": 7}),
                Some(ElementRef::new("login-pass", "PASSWORD")),
            )
            .unwrap();

        assert_eq!(entry.data["value"], json!(REDACTION_MARKER));
        assert_eq!(entry.data["length"], json!(7));
    }

    #[test]
    fn test_sensitive_keys_redacted_recursively() {
        let builder = builder();
        let entry = builder
            .record(
                ActionType::FormSubmit,
                &json!({
                    "fields": [
                        {"name": "email", "value": "a@b.c"},
                        {"user_password": "hunter2"}
                    ],
                    "csrf": {"Token": "abc"}
                }),
                None,
            )
            .unwrap();

        assert_eq!(entry.data["fields"][0]["value"], json!("a@b.c"));
        assert_eq!(entry.data["fields"][1]["user_password"], json!(REDACTION_MARKER));
        assert_eq!(entry.data["csrf"]["Token"], json!(REDACTION_MARKER));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let builder = builder();
        let result = builder.record(ActionType::Click, &json!([1, 2, 3]), None);
        assert!(matches!(result, Err(TelemetryError::InvalidPayload(_))));

        let entry = builder.record(ActionType::Click, &Value::Null, None).unwrap();
        assert!(entry.data.is_empty());
    }

    #[test]
    fn test_unserializable_payload_rejected() {
        use std::collections::HashMap;

        // Non-string map keys cannot become JSON object keys
        let mut data = HashMap::new();
        data.insert((1, 2), "pair");
        let result = builder().record(ActionType::Click, &data, None);
        assert!(matches!(result, Err(TelemetryError::Serialization(_))));
    }

    #[test]
    fn test_action_type_wire_format() {
        assert_eq!(serde_json::to_string(&ActionType::FormSubmit).unwrap(), "\"form_submit\"");
        let custom: ActionType = serde_json::from_str("\"scroll\"").unwrap();
        assert_eq!(custom, ActionType::Custom("scroll".to_string()));
        let known: ActionType = serde_json::from_str("\"page_load\"").unwrap();
        assert_eq!(known, ActionType::PageLoad);
    }

    #[test]
    fn test_entry_serializes_null_element_fields() {
        let entry = builder().record(ActionType::PageLoad, &json!({}), None).unwrap();
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["element_id"], Value::Null);
        assert_eq!(value["element_type"], Value::Null);
        assert_eq!(value["action_type"], json!("page_load"));
        assert!(value["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_interaction_element() {
        let interaction: Interaction =
            serde_json::from_str(r#"{"action_type": "click", "element_id": "btn"}"#).unwrap();
        let element = interaction.element().unwrap();
        assert_eq!(element.id.as_deref(), Some("btn"));
        assert!(element.element_type.is_none());

        let bare: Interaction = serde_json::from_str(r#"{"action_type": "page_load"}"#).unwrap();
        assert!(bare.element().is_none());
        assert_eq!(bare.data, Value::Null);
    }
}
