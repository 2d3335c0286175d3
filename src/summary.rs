//! Offline statistics over an exported contacts file.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::record::{source_type, ContactRecord};

/// Counts gathered from a set of records
#[derive(Debug, Default, PartialEq)]
pub struct DataSummary {
    pub records: usize,
    /// Records using each top-level field
    pub fields: BTreeMap<String, usize>,
    /// Name and email entries per provenance tag (`UNTAGGED` when absent)
    pub sources: BTreeMap<String, usize>,
    /// Records per group resource name
    pub memberships: BTreeMap<String, usize>,
    /// Records without a single name or email
    pub unnamed: usize,
}

const UNTAGGED: &str = "UNTAGGED";

pub fn summarize(records: &[ContactRecord]) -> DataSummary {
    let mut summary = DataSummary {
        records: records.len(),
        ..DataSummary::default()
    };

    for record in records {
        for field in record.fields().keys() {
            *summary.fields.entry(field.clone()).or_insert(0) += 1;
        }

        for field in ["names", "emailAddresses"] {
            for entry in record.entries(field) {
                let tag = source_type(entry).unwrap_or(UNTAGGED);
                *summary.sources.entry(tag.to_string()).or_insert(0) += 1;
            }
        }

        for membership in record.entries("memberships") {
            if let Some(group) = membership_group(membership) {
                *summary.memberships.entry(group.to_string()).or_insert(0) += 1;
            }
        }

        if record.display_name().is_none() {
            summary.unnamed += 1;
        }
    }

    summary
}

fn membership_group(membership: &Value) -> Option<&str> {
    membership
        .pointer("/contactGroupMembership/contactGroupResourceName")
        .and_then(Value::as_str)
}

impl DataSummary {
    pub fn print(&self) {
        println!("Records: {}", self.records);
        println!("Without name or email: {}", self.unnamed);

        if !self.fields.is_empty() {
            println!();
            println!("Fields:");
            let mut fields: Vec<_> = self.fields.iter().collect();
            fields.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (field, count) in fields {
                println!("  {:<24} {}", field, count);
            }
        }

        if !self.sources.is_empty() {
            println!();
            println!("Name/email sources:");
            for (source, count) in &self.sources {
                println!("  {:<24} {}", source, count);
            }
        }

        if !self.memberships.is_empty() {
            println!();
            println!("Memberships:");
            for (group, count) in &self.memberships {
                println!("  {:<24} {}", group, count);
            }
        }
    }
}
