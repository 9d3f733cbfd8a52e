//! Size filtering over a candidate set.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::query::SizeFilter;
use crate::store::{MailStore, Uid};

use super::idset::IdSet;

/// Keep the candidates whose size satisfies `filter`.
///
/// Overview data is requested for exactly the candidate set and nothing is
/// requested when it is empty. Candidates the store does not report are
/// dropped; reported identifiers outside the set are ignored.
pub fn filter_by_size<S: MailStore + ?Sized>(
    store: &mut S,
    candidates: &IdSet,
    filter: &SizeFilter,
) -> Result<IdSet> {
    if candidates.is_empty() {
        return Ok(IdSet::new());
    }

    let overview = store.fetch_overview(candidates.as_slice())?;
    let sizes: HashMap<Uid, u64> = overview.iter().map(|o| (o.uid, o.size)).collect();

    let kept: IdSet = candidates
        .iter()
        .filter(|uid| sizes.get(uid).is_some_and(|&size| filter.matches(size)))
        .collect();

    debug!(
        op = %filter.op,
        bytes = filter.bytes,
        candidates = candidates.len(),
        kept = kept.len(),
        "Size filter applied"
    );
    Ok(kept)
}
