//! Contact and contact group representations.
//!
//! Records are kept as raw JSON objects so that exports round-trip every
//! field the People API returns, including ones this tool does not know about.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provenance tag for entries the account owner entered themselves
pub const SOURCE_CONTACT: &str = "CONTACT";

/// A person resource as returned by (or submitted to) the remote API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactRecord(Map<String, Value>);

impl ContactRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Entries of a multi-valued field; empty when absent or not an array
    pub fn entries(&self, field: &str) -> &[Value] {
        self.0
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn resource_name(&self) -> Option<&str> {
        self.0.get("resourceName").and_then(Value::as_str)
    }

    /// Best-effort human label, used in logs and summaries
    pub fn display_name(&self) -> Option<&str> {
        self.entries("names")
            .iter()
            .find_map(|name| name.get("displayName").and_then(Value::as_str))
            .or_else(|| {
                self.entries("emailAddresses")
                    .iter()
                    .find_map(|email| email.get("value").and_then(Value::as_str))
            })
    }
}

impl From<Map<String, Value>> for ContactRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for ContactRecord {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(other),
        }
    }
}

/// Provenance tag of a sub-record (`metadata.source.type`)
pub fn source_type(entry: &Value) -> Option<&str> {
    entry
        .get("metadata")
        .and_then(|metadata| metadata.get("source"))
        .and_then(|source| source.get("type"))
        .and_then(Value::as_str)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupType {
    SystemContactGroup,
    UserContactGroup,
    #[default]
    #[serde(other)]
    GroupTypeUnspecified,
}

impl GroupType {
    pub fn label(&self) -> &'static str {
        match self {
            GroupType::SystemContactGroup => "system",
            GroupType::UserContactGroup => "user",
            GroupType::GroupTypeUnspecified => "unspecified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactGroup {
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_name: Option<String>,
    #[serde(default)]
    pub group_type: GroupType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u32>,
}

impl ContactGroup {
    /// Whether `label` names this group, by resource name, name or formatted name
    pub fn matches(&self, label: &str) -> bool {
        self.resource_name == label
            || self.name.eq_ignore_ascii_case(label)
            || self
                .formatted_name
                .as_deref()
                .is_some_and(|formatted| formatted.eq_ignore_ascii_case(label))
    }
}
