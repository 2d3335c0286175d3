//! In-memory `Remote` for tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::record::{ContactGroup, ContactRecord};
use crate::remote::{Page, Remote};

/// Serves canned listing pages and records every write.
#[derive(Default)]
pub struct MockRemote {
    pub contact_pages: RefCell<VecDeque<Result<Page<ContactRecord>>>>,
    pub group_pages: RefCell<VecDeque<Result<Page<ContactGroup>>>>,
    /// `(cursor, page_size)` of every listing request
    pub list_calls: RefCell<Vec<(Option<String>, u32)>>,
    /// Records submitted per write call, in order
    pub create_calls: RefCell<Vec<Vec<ContactRecord>>>,
    /// Zero-based write call indices that fail with a transport error
    pub failing_writes: RefCell<HashSet<usize>>,
    next_id: Cell<usize>,
}

impl MockRemote {
    pub fn fail_write(&self, call: usize) {
        self.failing_writes.borrow_mut().insert(call);
    }

    pub fn with_groups(groups: Vec<ContactGroup>) -> Self {
        let remote = Self::default();
        remote.group_pages.borrow_mut().push_back(Ok(Page::last(groups)));
        remote
    }

    pub fn submitted(&self) -> Vec<ContactRecord> {
        self.create_calls.borrow().iter().flatten().cloned().collect()
    }

    fn record_write(&self, records: &[ContactRecord]) -> Result<Vec<ContactRecord>> {
        let call = {
            let mut calls = self.create_calls.borrow_mut();
            calls.push(records.to_vec());
            calls.len() - 1
        };

        if self.failing_writes.borrow().contains(&call) {
            return Err(transport_error("people.batchCreateContacts"));
        }

        Ok(records.iter().map(|record| self.assign_id(record)).collect())
    }

    fn assign_id(&self, record: &ContactRecord) -> ContactRecord {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let mut fields = record.fields().clone();
        fields.insert("resourceName".into(), Value::String(format!("people/c{id}")));
        fields.insert("etag".into(), Value::String(format!("etag-{id}")));
        ContactRecord::new(fields)
    }
}

impl Remote for MockRemote {
    async fn list_connections(
        &self,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<ContactRecord>> {
        self.list_calls.borrow_mut().push((cursor, page_size));
        self.contact_pages
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::last(Vec::new())))
    }

    async fn list_groups(
        &self,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<ContactGroup>> {
        self.list_calls.borrow_mut().push((cursor, page_size));
        self.group_pages
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::last(Vec::new())))
    }

    async fn create_contact(&self, record: &ContactRecord) -> Result<ContactRecord> {
        let mut created = self.record_write(std::slice::from_ref(record))?;
        Ok(created.remove(0))
    }

    async fn batch_create_contacts(&self, records: &[ContactRecord]) -> Result<Vec<ContactRecord>> {
        self.record_write(records)
    }
}

pub fn transport_error(endpoint: &str) -> Error {
    Error::Api {
        endpoint: endpoint.to_string(),
        status: 503,
        message: "backend unavailable".into(),
    }
}

/// A contact as the remote returns it
pub fn person(n: usize) -> ContactRecord {
    ContactRecord::try_from(json!({
        "resourceName": format!("people/r{n}"),
        "etag": format!("remote-etag-{n}"),
        "names": [{
            "metadata": {"source": {"type": "CONTACT", "id": format!("{n}")}},
            "displayName": format!("Person {n}")
        }]
    }))
    .unwrap_or_default()
}

pub fn group(name: &str) -> ContactGroup {
    ContactGroup {
        resource_name: format!("contactGroups/{name}"),
        etag: None,
        name: name.to_string(),
        formatted_name: Some(name.to_string()),
        group_type: crate::record::GroupType::UserContactGroup,
        member_count: None,
    }
}
