//! Search evaluator: runs a [`SearchQuery`] tree against a [`MailStore`].
//!
//! Each node is evaluated in a fixed order of phases, narrowing or combining
//! a running identifier set:
//!
//! 1. native search for the node's flags and criterion,
//! 2. header scan for its extended criterion,
//! 3. size filter,
//! 4. AND children (intersection, short-circuits on an empty child),
//! 5. OR children (union).
//!
//! Whether a phase replaces or intersects the running set depends on the
//! node's [`Authority`]: an empty running set means "nothing matched" only
//! once some filter has actually run.

pub mod cache;
pub mod extended;
pub mod idset;
pub mod size;

use std::time::Instant;

use tracing::{debug, info};

use crate::error::Result;
use crate::query::compile::{compile, NativeCriteria, ALL};
use crate::query::SearchQuery;
use crate::store::{MailStore, SortKey};

use self::cache::SearchCache;
use self::idset::IdSet;

/// Whether a node's running set is authoritative yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// No filter has run; the running set is a placeholder.
    Unset,
    /// A native, extended or size filter ran. Its result is authoritative,
    /// even when empty.
    Established,
    /// The first AND child supplied the base set.
    EstablishedViaAnd,
}

impl Authority {
    pub fn is_set(self) -> bool {
        self != Self::Unset
    }
}

/// Engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Charset passed with every native search.
    pub charset: Option<String>,
    /// Keep header and base-set caches across top-level calls instead of
    /// clearing them at the start of each one.
    pub reuse_cache: bool,
}

/// Running state of one node evaluation, passed by value from phase to
/// phase.
struct NodeState {
    ids: IdSet,
    authority: Authority,
}

impl NodeState {
    fn unset() -> Self {
        Self {
            ids: IdSet::new(),
            authority: Authority::Unset,
        }
    }

    fn established(ids: IdSet) -> Self {
        Self {
            ids,
            authority: Authority::Established,
        }
    }
}

/// Evaluates search trees against one store connection.
///
/// The engine owns its connection and caches; independent concurrent
/// searches need independent engines.
pub struct SearchEngine<S: MailStore> {
    store: S,
    options: SearchOptions,
    cache: SearchCache,
}

impl<S: MailStore> SearchEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, SearchOptions::default())
    }

    pub fn with_options(store: S, options: SearchOptions) -> Self {
        Self {
            store,
            options,
            cache: SearchCache::new(),
        }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    /// Select `mailbox` and return the identifiers matching `query`.
    ///
    /// Any store error aborts the whole evaluation; no partial result is
    /// returned.
    pub fn search(&mut self, query: &SearchQuery, mailbox: &str) -> Result<IdSet> {
        let start = Instant::now();
        if !self.options.reuse_cache {
            self.cache.clear();
        }
        self.store.select(mailbox)?;

        let ids = self.evaluate(query, mailbox)?;
        info!(
            mailbox,
            count = ids.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search finished"
        );
        Ok(ids)
    }

    /// Search, then order the result by a native sort of the whole mailbox.
    ///
    /// The protocol cannot sort an arbitrary subset, so the full sorted order
    /// is filtered down to the search result's members.
    pub fn search_and_sort(
        &mut self,
        query: &SearchQuery,
        mailbox: &str,
        key: SortKey,
        descending: bool,
    ) -> Result<IdSet> {
        let ids = self.search(query, mailbox)?;
        if ids.is_empty() {
            return Ok(ids);
        }
        let order = self.store.sort(key, descending)?;
        debug!(mailbox, %key, descending, sorted = order.len(), "Native sort");
        Ok(ids.ordered_by(&order))
    }

    /// Evaluate one node. Every node starts with an unset authority.
    fn evaluate(&mut self, query: &SearchQuery, mailbox: &str) -> Result<IdSet> {
        let state = self.native_phase(query)?;
        let state = self.extended_phase(query, mailbox, state)?;
        let state = self.size_phase(query, mailbox, state)?;

        let Some(state) = self.and_phase(query, mailbox, state)? else {
            return Ok(IdSet::new());
        };
        let state = self.or_phase(query, mailbox, state)?;

        Ok(state.ids)
    }

    fn native_phase(&mut self, query: &SearchQuery) -> Result<NodeState> {
        Ok(match compile(query) {
            NativeCriteria::Empty => NodeState::unset(),
            NativeCriteria::Query(criteria) => {
                NodeState::established(self.native_search(&criteria)?)
            }
            NativeCriteria::NegatedPair { flags, criterion } => {
                let with_flags = self.native_search(&flags)?;
                let excluded = self.native_search(&criterion)?;
                NodeState::established(with_flags.difference(&excluded))
            }
        })
    }

    fn extended_phase(
        &mut self,
        query: &SearchQuery,
        mailbox: &str,
        state: NodeState,
    ) -> Result<NodeState> {
        let Some(criterion) = query.extended() else {
            return Ok(state);
        };

        let candidates = if state.authority.is_set() {
            state.ids.clone()
        } else {
            self.cache.base_set(
                &mut self.store,
                mailbox,
                &query.flag_string(),
                self.options.charset.as_deref(),
            )?
        };
        let matched = extended::match_headers(
            &mut self.store,
            &mut self.cache,
            mailbox,
            &candidates,
            criterion,
        )?;

        Ok(if state.authority.is_set() {
            NodeState {
                ids: state.ids.intersect(&matched),
                authority: state.authority,
            }
        } else {
            NodeState::established(matched)
        })
    }

    fn size_phase(
        &mut self,
        query: &SearchQuery,
        mailbox: &str,
        state: NodeState,
    ) -> Result<NodeState> {
        let Some(filter) = query.size_filter() else {
            return Ok(state);
        };

        let candidates = if state.authority.is_set() {
            state.ids.clone()
        } else {
            self.cache.base_set(
                &mut self.store,
                mailbox,
                ALL,
                self.options.charset.as_deref(),
            )?
        };
        Ok(NodeState::established(size::filter_by_size(
            &mut self.store,
            &candidates,
            filter,
        )?))
    }

    /// Returns `None` when the node short-circuits to the empty set.
    fn and_phase(
        &mut self,
        query: &SearchQuery,
        mailbox: &str,
        mut state: NodeState,
    ) -> Result<Option<NodeState>> {
        let children = query.and_children();
        if children.is_empty() {
            return Ok(Some(state));
        }
        // An established empty result stays empty whatever the children match;
        // OR children still apply.
        if state.authority.is_set() && state.ids.is_empty() {
            debug!("AND skipped: established result is already empty");
            return Ok(Some(state));
        }

        for (position, child) in children.iter().enumerate() {
            let result = self.evaluate(child, mailbox)?;
            if result.is_empty() {
                debug!(
                    position,
                    skipped = children.len() - position - 1,
                    "AND short-circuit on empty child"
                );
                return Ok(None);
            }

            if state.authority.is_set() {
                state.ids = state.ids.intersect(&result);
            } else {
                state.ids = result;
                state.authority = Authority::EstablishedViaAnd;
            }
        }
        Ok(Some(state))
    }

    fn or_phase(
        &mut self,
        query: &SearchQuery,
        mailbox: &str,
        mut state: NodeState,
    ) -> Result<NodeState> {
        for child in query.or_children() {
            let result = self.evaluate(child, mailbox)?;
            if !result.is_empty() {
                state.ids.union_with(&result);
            }
        }
        Ok(state)
    }

    fn native_search(&mut self, criteria: &str) -> Result<IdSet> {
        let ids: IdSet = self
            .store
            .search(criteria, self.options.charset.as_deref())?
            .into();
        debug!(criteria, count = ids.len(), "Native search");
        Ok(ids)
    }
}
