//! Header scan for criteria the protocol cannot express.
//!
//! Complexity: one header fetch per candidate not yet in the cache.

use tracing::debug;

use crate::error::Result;
use crate::parser::header::HeaderMap;
use crate::query::HeaderMatch;
use crate::store::MailStore;

use super::cache::SearchCache;
use super::idset::IdSet;

/// Keep the candidates whose `criterion.name` header contains
/// `criterion.pattern`, ignoring case.
pub fn match_headers<S: MailStore + ?Sized>(
    store: &mut S,
    cache: &mut SearchCache,
    mailbox: &str,
    candidates: &IdSet,
    criterion: &HeaderMatch,
) -> Result<IdSet> {
    let needle = criterion.pattern.to_lowercase();
    let mut matched = Vec::new();

    for uid in candidates {
        let headers = cache.headers(store, mailbox, uid)?;
        if header_contains(headers, &criterion.name, &needle) {
            matched.push(uid);
        }
    }

    debug!(
        mailbox,
        header = %criterion.name,
        candidates = candidates.len(),
        matched = matched.len(),
        "Header scan finished"
    );
    Ok(matched.into())
}

/// Case-insensitive substring test over every value of `name`.
/// `needle` must already be lower-cased.
fn header_contains(headers: &HeaderMap, name: &str, needle: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .any(|value| value.to_lowercase().contains(needle))
}
