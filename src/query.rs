//! Search and pagination over a collection snapshot.
//!
//! Matching is a plain case-insensitive substring test against the trainee's
//! full name, phone number and national id. Results keep collection order.

use crate::app_response::{AppResponse, AppResult};
use crate::client_model::{ClientFilters, ClientPage, ClientRecord};

/// Lowercased, trimmed needle; `None` for a blank query.
fn needle(query: &str) -> Option<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

fn matches_needle(record: &ClientRecord, needle: &str) -> bool {
    record
        .searchable_fields()
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

pub fn matches_query(record: &ClientRecord, query: &str) -> bool {
    match needle(query) {
        Some(needle) => matches_needle(record, &needle),
        None => true,
    }
}

/// At most `limit` matching records, scanning stops once the limit is hit.
/// A blank query matches nothing.
pub fn search(records: &[ClientRecord], query: &str, limit: usize) -> Vec<ClientRecord> {
    let Some(needle) = needle(query) else {
        return Vec::new();
    };

    records
        .iter()
        .filter(|record| matches_needle(record, &needle))
        .take(limit)
        .cloned()
        .collect()
}

/// One 1-based page of the records passing `filters`.
pub fn paginate(
    records: &[ClientRecord],
    page: usize,
    limit: usize,
    filters: &ClientFilters,
) -> AppResult<ClientPage> {
    if page == 0 {
        return Err(AppResponse::ValidationError("page starts at 1".to_string()));
    }
    if limit == 0 {
        return Err(AppResponse::ValidationError("limit must be at least 1".to_string()));
    }

    let search = filters.search.as_deref().and_then(needle);
    let filtered: Vec<&ClientRecord> = records
        .iter()
        .filter(|record| filters.archived.map_or(true, |archived| record.archived == archived))
        .filter(|record| search.as_deref().map_or(true, |n| matches_needle(record, n)))
        .collect();

    let total = filtered.len();
    let start = (page - 1).saturating_mul(limit);
    let clients = filtered
        .into_iter()
        .skip(start)
        .take(limit)
        .cloned()
        .collect();

    Ok(ClientPage {
        clients,
        total,
        page,
        total_pages: total.div_ceil(limit).max(1),
        has_more: page.saturating_mul(limit) < total,
    })
}
