//! Turns records read from the People API (or an export file) into records
//! that can be submitted to `createContact`/`batchCreateContacts`.
//!
//! The remote merges contact, profile and domain data into a single read view.
//! Only contact-sourced entries belong to the account owner, so everything else
//! is dropped along with server-owned identifiers.

use serde_json::{json, Map, Value};

use crate::record::{source_type, ContactRecord, SOURCE_CONTACT};

/// Membership every created contact receives
pub const DEFAULT_GROUP: &str = "contactGroups/myContacts";

/// Top-level fields owned by the server
const READ_ONLY_FIELDS: &[&str] = &[
    "metadata",
    "resourceName",
    "id",
    "etag",
    "photos",
    "coverPhotos",
];

/// Fields whose entries are filtered by provenance
const SOURCED_FIELDS: &[&str] = &["names", "emailAddresses"];

/// Identifier keys removed at any depth
const NESTED_ID_KEYS: &[&str] = &["id", "resourceName"];

#[derive(Debug, Clone, Default)]
pub struct SanitizeOptions {
    /// Group resource names to add after the default membership
    pub groups: Vec<String>,
}

impl SanitizeOptions {
    pub fn with_groups(groups: Vec<String>) -> Self {
        Self { groups }
    }
}

pub fn sanitize(record: &ContactRecord, options: &SanitizeOptions) -> ContactRecord {
    let mut fields = Map::new();

    for (key, value) in record.fields() {
        if READ_ONLY_FIELDS.contains(&key.as_str()) || key == "memberships" {
            continue;
        }

        if SOURCED_FIELDS.contains(&key.as_str()) {
            let kept = contact_sourced(value);
            if !kept.is_empty() {
                fields.insert(key.clone(), strip_nested_ids(&Value::Array(kept)));
            }
            continue;
        }

        fields.insert(key.clone(), strip_nested_ids(value));
    }

    fields.insert("memberships".to_string(), memberships(&options.groups));

    ContactRecord::new(fields)
}

/// Entries tagged `CONTACT`; anything else, including untagged entries, is dropped
fn contact_sourced(value: &Value) -> Vec<Value> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter(|entry| entry.is_object() && source_type(entry) == Some(SOURCE_CONTACT))
        .cloned()
        .collect()
}

fn memberships(groups: &[String]) -> Value {
    let mut names = vec![DEFAULT_GROUP];
    for group in groups {
        let group = group.trim();
        if group.is_empty() || names.contains(&group) {
            continue;
        }
        names.push(group);
    }

    Value::Array(names.into_iter().map(membership).collect())
}

fn membership(group: &str) -> Value {
    json!({
        "contactGroupMembership": {
            "contactGroupResourceName": group,
        }
    })
}

fn strip_nested_ids(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !NESTED_ID_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), strip_nested_ids(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nested_ids).collect()),
        other => other.clone(),
    }
}
