//! Cursor pagination over the remote listings.

use std::future::Future;

use tracing::debug;

use crate::error::Result;
use crate::record::{ContactGroup, ContactRecord};
use crate::remote::{Page, Remote};

/// Largest page the connections listing accepts
pub const CONTACTS_PAGE_SIZE: u32 = 1000;
/// Largest page the contact groups listing accepts
pub const GROUPS_PAGE_SIZE: u32 = 200;

/// Every contact of the account, in server order
pub async fn fetch_contacts<R: Remote>(remote: &R) -> Result<Vec<ContactRecord>> {
    paginate("contacts", move |cursor| {
        remote.list_connections(cursor, CONTACTS_PAGE_SIZE)
    })
    .await
}

/// Every contact group of the account, in server order
pub async fn fetch_groups<R: Remote>(remote: &R) -> Result<Vec<ContactGroup>> {
    paginate("contact groups", move |cursor| {
        remote.list_groups(cursor, GROUPS_PAGE_SIZE)
    })
    .await
}

/// Request pages until the cursor runs out. The first failing request aborts
/// the whole walk; already fetched pages are discarded.
async fn paginate<T, F, Fut>(kind: &str, mut next_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = next_page(cursor.take()).await?;
        pages += 1;
        debug!(kind, page = pages, received = page.items.len(), "fetched page");

        items.extend(page.items);

        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    debug!(kind, pages, total = items.len(), "pagination complete");
    Ok(items)
}
