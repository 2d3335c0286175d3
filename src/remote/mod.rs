//! Remote contacts API abstraction.
//!
//! This module provides:
//! - `Remote` trait for the operations the sync pipeline needs
//! - `PeopleClient`, the Google People API implementation
//! - `Page`, one response of a cursor-paginated listing

pub mod people;

#[cfg(test)]
pub mod mock;

use crate::error::Result;
use crate::record::{ContactGroup, ContactRecord};

/// One page of a paginated listing
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque cursor for the next page; `None` on the final page
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self {
            items,
            next_cursor: next_cursor.filter(|cursor| !cursor.is_empty()),
        }
    }

    #[cfg(test)]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// Account-scoped contacts API
#[allow(async_fn_in_trait)]
pub trait Remote {
    /// List one page of the account's contacts
    async fn list_connections(
        &self,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<ContactRecord>>;

    /// List one page of the account's contact groups
    async fn list_groups(&self, cursor: Option<String>, page_size: u32)
        -> Result<Page<ContactGroup>>;

    /// Create a single contact, returning the stored record
    async fn create_contact(&self, record: &ContactRecord) -> Result<ContactRecord>;

    /// Create several contacts in one request, returning the stored records
    async fn batch_create_contacts(&self, records: &[ContactRecord]) -> Result<Vec<ContactRecord>>;
}
