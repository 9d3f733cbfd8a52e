//! Per-mailbox caches shared by one search session.
//!
//! Identifiers are only meaningful inside their mailbox, so every key carries
//! the mailbox name.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::parser::header::{parse_header_block, HeaderMap};
use crate::query::compile::ALL;
use crate::store::{MailStore, Uid};

use super::idset::IdSet;

/// Parsed headers and native base sets, filled lazily from the store.
#[derive(Debug, Default)]
pub struct SearchCache {
    headers: HashMap<(String, Uid), HeaderMap>,
    base_sets: HashMap<(String, String), IdSet>,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers of one message, fetched and parsed on first access.
    ///
    /// A message the store no longer has is cached as having no headers.
    pub fn headers<S: MailStore + ?Sized>(
        &mut self,
        store: &mut S,
        mailbox: &str,
        uid: Uid,
    ) -> Result<&HeaderMap> {
        let key = (mailbox.to_string(), uid);
        if !self.headers.contains_key(&key) {
            let parsed = match store.fetch_header(uid) {
                Ok(raw) => parse_header_block(&raw)?,
                Err(e) if e.is_not_found() => {
                    debug!(mailbox, uid, "Message vanished before header fetch");
                    HeaderMap::default()
                }
                Err(e) => return Err(e),
            };
            self.headers.insert(key.clone(), parsed);
        }
        Ok(&self.headers[&key])
    }

    /// Result of a native search for `flags` (or `ALL`), cached per
    /// (mailbox, flag string).
    pub fn base_set<S: MailStore + ?Sized>(
        &mut self,
        store: &mut S,
        mailbox: &str,
        flags: &str,
        charset: Option<&str>,
    ) -> Result<IdSet> {
        let criteria = if flags.is_empty() { ALL } else { flags };
        let key = (mailbox.to_string(), criteria.to_string());
        if let Some(cached) = self.base_sets.get(&key) {
            debug!(mailbox, criteria, count = cached.len(), "Base set cache hit");
            return Ok(cached.clone());
        }

        let ids: IdSet = store.search(criteria, charset)?.into();
        debug!(mailbox, criteria, count = ids.len(), "Fetched base set");
        self.base_sets.insert(key, ids.clone());
        Ok(ids)
    }

    /// Number of cached header maps.
    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    pub fn clear(&mut self) {
        self.headers.clear();
        self.base_sets.clear();
    }
}
