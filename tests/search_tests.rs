//! Integration tests for the search evaluator against a scripted store.

use std::collections::{HashMap, HashSet};

use mailsift::error::{Result, SearchError};
use mailsift::query::compile::compile;
use mailsift::query::parse::parse_query;
use mailsift::query::{SearchQuery, SizeOp};
use mailsift::search::{SearchEngine, SearchOptions};
use mailsift::store::{MailStore, Overview, SortKey, Uid};

/// Store that answers from fixed tables and records every request.
#[derive(Default, Clone)]
struct ScriptedStore {
    searches: HashMap<String, Vec<Uid>>,
    headers: HashMap<Uid, String>,
    sizes: HashMap<Uid, u64>,
    sort_order: Vec<Uid>,
    /// Criteria that must never be searched.
    forbidden: HashSet<String>,
    /// UIDs whose header fetch fails with a transport error.
    broken: HashSet<Uid>,

    search_log: Vec<(String, Option<String>)>,
    header_log: Vec<Uid>,
    overview_log: Vec<Vec<Uid>>,
    selected: Vec<String>,
}

impl ScriptedStore {
    fn search(mut self, criteria: &str, ids: &[Uid]) -> Self {
        self.searches.insert(criteria.to_string(), ids.to_vec());
        self
    }

    fn header(mut self, uid: Uid, block: &str) -> Self {
        self.headers.insert(uid, block.to_string());
        self
    }

    fn size(mut self, uid: Uid, bytes: u64) -> Self {
        self.sizes.insert(uid, bytes);
        self
    }

    fn sorted(mut self, order: &[Uid]) -> Self {
        self.sort_order = order.to_vec();
        self
    }

    fn forbid(mut self, criteria: &str) -> Self {
        self.forbidden.insert(criteria.to_string());
        self
    }

    fn searched(&self) -> Vec<&str> {
        self.search_log.iter().map(|(c, _)| c.as_str()).collect()
    }
}

impl MailStore for ScriptedStore {
    fn select(&mut self, mailbox: &str) -> Result<()> {
        self.selected.push(mailbox.to_string());
        Ok(())
    }

    fn search(&mut self, criteria: &str, charset: Option<&str>) -> Result<Vec<Uid>> {
        assert!(
            !self.forbidden.contains(criteria),
            "store queried with {criteria} after evaluation should have stopped"
        );
        self.search_log
            .push((criteria.to_string(), charset.map(String::from)));
        Ok(self.searches.get(criteria).cloned().unwrap_or_default())
    }

    fn sort(&mut self, _key: SortKey, descending: bool) -> Result<Vec<Uid>> {
        let mut order = self.sort_order.clone();
        if descending {
            order.reverse();
        }
        Ok(order)
    }

    fn fetch_header(&mut self, uid: Uid) -> Result<Vec<u8>> {
        self.header_log.push(uid);
        if self.broken.contains(&uid) {
            return Err(SearchError::Transport("connection reset by peer".into()));
        }
        self.headers
            .get(&uid)
            .map(|h| h.clone().into_bytes())
            .ok_or(SearchError::MessageNotFound(uid))
    }

    fn fetch_overview(&mut self, uids: &[Uid]) -> Result<Vec<Overview>> {
        self.overview_log.push(uids.to_vec());
        Ok(uids
            .iter()
            .filter_map(|uid| self.sizes.get(uid).map(|&size| Overview::sized(*uid, size)))
            .collect())
    }
}

fn run(store: ScriptedStore, query: &SearchQuery) -> (Vec<Uid>, ScriptedStore) {
    let mut engine = SearchEngine::new(store);
    let ids = engine.search(query, "INBOX").unwrap();
    (ids.into_vec(), engine.into_store())
}

// ─── Boolean structure ──────────────────────────────────────────────

#[test]
fn test_same_query_same_responses_same_result() {
    let store = ScriptedStore::default()
        .search("UNSEEN", &[4, 2, 9])
        .search("FROM \"alice\"", &[9, 4])
        .search("FLAGGED", &[7]);
    let query = SearchQuery::new()
        .seen(false)
        .and(SearchQuery::new().header("From", "alice"))
        .or(SearchQuery::new().flagged(true));

    let (first, _) = run(store.clone(), &query);
    let (second, _) = run(store, &query);
    assert_eq!(first, vec![4, 9, 7]);
    assert_eq!(first, second);
}

#[test]
fn test_empty_and_child_stops_the_whole_node() {
    let store = ScriptedStore::default()
        .search("ALL", &[1, 2, 3])
        .search("SUBJECT \"nothing\"", &[])
        .forbid("FROM \"later\"")
        .forbid("FLAGGED");
    let query = SearchQuery::new()
        .and(SearchQuery::new().header("Subject", "nothing"))
        .and(SearchQuery::new().header("From", "later"))
        .or(SearchQuery::new().flagged(true));

    let (ids, store) = run(store, &query);
    assert!(ids.is_empty());
    assert_eq!(store.searched(), vec!["SUBJECT \"nothing\""]);
}

#[test]
fn test_or_children_commute_up_to_set_equality() {
    let store = ScriptedStore::default()
        .search("FLAGGED", &[3, 1])
        .search("ANSWERED", &[2, 3]);
    let a = SearchQuery::new().flagged(true);
    let b = SearchQuery::new().answered(true);

    let (ab, _) = run(store.clone(), &SearchQuery::new().or(a.clone()).or(b.clone()));
    let (ba, _) = run(store, &SearchQuery::new().or(b).or(a));

    let ab: HashSet<Uid> = ab.into_iter().collect();
    let ba: HashSet<Uid> = ba.into_iter().collect();
    assert_eq!(ab, ba);
    assert_eq!(ab, HashSet::from([1, 2, 3]));
}

#[test]
fn test_negated_flag_subtracts_from_all() {
    // Message 1 is seen, message 2 is not.
    let store = ScriptedStore::default()
        .search("ALL", &[1, 2])
        .search("SEEN", &[1]);
    let (ids, store) = run(store, &SearchQuery::new().seen(true).negate());
    assert_eq!(ids, vec![2]);
    assert_eq!(store.searched(), vec!["ALL", "SEEN"]);
}

#[test]
fn test_negated_criterion_keeps_flags() {
    let store = ScriptedStore::default()
        .search("UNSEEN", &[1, 2, 3])
        .search("SUBJECT \"spam\"", &[2]);
    let query = SearchQuery::new().seen(false).header("Subject", "spam").negate();
    let (ids, _) = run(store, &query);
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn test_established_empty_not_overridden_by_and_child() {
    let store = ScriptedStore::default()
        .search("FLAGGED", &[])
        .forbid("SUBJECT \"report\"");
    let query = SearchQuery::new()
        .flagged(true)
        .and(SearchQuery::new().header("Subject", "report"));
    let (ids, _) = run(store, &query);
    assert!(ids.is_empty());
}

#[test]
fn test_established_empty_keeps_or_children() {
    let with_or = |flagged: &[Uid]| {
        let store = ScriptedStore::default()
            .search("FLAGGED", flagged)
            .search("SUBJECT \"x\"", &[2])
            .search("SEEN", &[3]);
        let query = SearchQuery::new()
            .flagged(true)
            .and(SearchQuery::new().header("Subject", "x"))
            .or(SearchQuery::new().seen(true));
        run(store, &query).0
    };
    // Empty native result and a result that intersects to empty agree.
    assert_eq!(with_or(&[]), vec![3]);
    assert_eq!(with_or(&[1]), vec![3]);
}

#[test]
fn test_empty_extended_match_is_authoritative() {
    let store = ScriptedStore::default()
        .search("ALL", &[1, 2])
        .search("FROM \"alice\"", &[1, 2])
        .header(1, "X-Spam-Flag: NO\n")
        .header(2, "X-Spam-Flag: NO\n");
    let query = SearchQuery::new()
        .header("X-Spam-Flag", "yes")
        .and(SearchQuery::new().header("From", "alice"));
    let (ids, store) = run(store, &query);
    assert!(ids.is_empty());
    assert_eq!(store.searched(), vec!["ALL"]);
}

// ─── Extended criteria ──────────────────────────────────────────────

#[test]
fn test_extended_match_is_case_insensitive_substring() {
    let store = ScriptedStore::default()
        .search("ALL", &[1, 2, 3])
        .header(1, "X-Custom: HelloWorld\n")
        .header(2, "X-Custom: Goodbye\n")
        .header(3, "Subject: no custom header\n");
    let (ids, _) = run(store, &SearchQuery::new().header("x-custom:", "loWo"));
    assert_eq!(ids, vec![1]);
}

#[test]
fn test_extended_match_narrows_native_result() {
    let store = ScriptedStore::default()
        .search("UNSEEN", &[2, 3])
        .header(1, "List-Id: rust-users\n")
        .header(2, "List-Id: rust-users\n")
        .header(3, "List-Id: go-nuts\n");
    let query = SearchQuery::new().seen(false).header("List-Id", "rust");
    let (ids, store) = run(store, &query);
    assert_eq!(ids, vec![2]);
    // Only the native result's members were fetched.
    assert_eq!(store.header_log, vec![2, 3]);
}

#[test]
fn test_flags_then_extended_header() {
    let store = ScriptedStore::default()
        .search("FLAGGED", &[5])
        .header(5, "X-Priority: 1\n");
    let (ids, store) = run(store, &SearchQuery::new().flagged(true).header("X-Priority", "1"));
    assert_eq!(ids, vec![5]);
    assert_eq!(store.searched(), vec!["FLAGGED"]);
}

#[test]
fn test_vanished_message_does_not_match() {
    let store = ScriptedStore::default()
        .search("ALL", &[1, 2])
        .header(1, "X-Tag: keep\n");
    let (ids, _) = run(store, &SearchQuery::new().header("X-Tag", "keep"));
    assert_eq!(ids, vec![1]);
}

#[test]
fn test_transport_error_aborts_search() {
    let mut store = ScriptedStore::default()
        .search("ALL", &[1, 2])
        .header(1, "X-Tag: keep\n");
    store.broken.insert(2);

    let mut engine = SearchEngine::new(store);
    let err = engine
        .search(&SearchQuery::new().header("X-Tag", "keep"), "INBOX")
        .unwrap_err();
    assert!(matches!(err, SearchError::Transport(_)));
}

// ─── Size filter ────────────────────────────────────────────────────

#[test]
fn test_size_filter_requests_exactly_the_candidates() {
    let store = ScriptedStore::default()
        .search("SEEN", &[2, 4, 6])
        .size(2, 500)
        .size(4, 5000)
        .size(6, 2000);
    let query = SearchQuery::new().seen(true).size(SizeOp::Greater, 1000);
    let (ids, store) = run(store, &query);
    assert_eq!(ids, vec![4, 6]);
    assert_eq!(store.overview_log, vec![vec![2, 4, 6]]);
}

#[test]
fn test_size_filter_skips_overview_for_empty_candidates() {
    let store = ScriptedStore::default().search("FLAGGED", &[]);
    let query = SearchQuery::new().flagged(true).size(SizeOp::Less, 10);
    let (ids, store) = run(store, &query);
    assert!(ids.is_empty());
    assert!(store.overview_log.is_empty());
}

#[test]
fn test_size_only_node_filters_all() {
    let store = ScriptedStore::default()
        .search("ALL", &[1, 2, 3])
        .size(1, 10)
        .size(2, 20)
        .size(3, 30);
    let (ids, _) = run(store, &SearchQuery::new().size(SizeOp::LessOrEqual, 20));
    assert_eq!(ids, vec![1, 2]);
}

// ─── Sorting ────────────────────────────────────────────────────────

#[test]
fn test_search_and_sort_keeps_sort_order() {
    let store = ScriptedStore::default()
        .search("SEEN", &[1, 2, 5])
        .sorted(&[5, 3, 1, 4, 2]);
    let mut engine = SearchEngine::new(store);
    let ids = engine
        .search_and_sort(&SearchQuery::new().seen(true), "INBOX", SortKey::Date, false)
        .unwrap();
    assert_eq!(ids.as_slice(), &[5, 1, 2]);

    let reversed = engine
        .search_and_sort(&SearchQuery::new().seen(true), "INBOX", SortKey::Date, true)
        .unwrap();
    assert_eq!(reversed.as_slice(), &[2, 1, 5]);
}

// ─── Options and caching ────────────────────────────────────────────

#[test]
fn test_charset_sent_with_every_native_search() {
    let store = ScriptedStore::default()
        .search("ALL", &[1])
        .search("UNSEEN", &[1])
        .header(1, "X-Tag: a\n");
    let options = SearchOptions {
        charset: Some("UTF-8".to_string()),
        reuse_cache: false,
    };
    let mut engine = SearchEngine::with_options(store, options);
    let query = SearchQuery::new()
        .header("X-Tag", "a")
        .or(SearchQuery::new().seen(false));
    engine.search(&query, "INBOX").unwrap();

    let store = engine.into_store();
    assert_eq!(store.search_log.len(), 2);
    assert!(store
        .search_log
        .iter()
        .all(|(_, charset)| charset.as_deref() == Some("UTF-8")));
}

#[test]
fn test_caches_cleared_between_searches_unless_reused() {
    let store = ScriptedStore::default()
        .search("ALL", &[1])
        .header(1, "X-Tag: a\n");
    let query = SearchQuery::new().header("X-Tag", "a");

    let mut fresh = SearchEngine::new(store.clone());
    fresh.search(&query, "INBOX").unwrap();
    fresh.search(&query, "INBOX").unwrap();
    assert_eq!(fresh.store().header_log.len(), 2);

    let options = SearchOptions {
        charset: None,
        reuse_cache: true,
    };
    let mut reusing = SearchEngine::with_options(store, options);
    reusing.search(&query, "INBOX").unwrap();
    reusing.search(&query, "INBOX").unwrap();
    assert_eq!(reusing.store().header_log.len(), 1);
    assert_eq!(reusing.store().searched(), vec!["ALL"]);
    assert_eq!(reusing.store().selected, vec!["INBOX", "INBOX"]);
}

#[test]
fn test_serialized_query_compiles_and_evaluates_identically() {
    let query = SearchQuery::new()
        .seen(false)
        .header("Subject", "invoice")
        .negate()
        .and(SearchQuery::new().header("X-Mailer", "mutt"))
        .or(SearchQuery::new().flagged(true).size(SizeOp::Greater, 100));

    let json = serde_json::to_string(&query).unwrap();
    let restored: SearchQuery = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, query);
    assert_eq!(compile(&restored), compile(&query));

    let store = ScriptedStore::default()
        .search("UNSEEN", &[1, 2, 3])
        .search("SUBJECT \"invoice\"", &[3])
        .search("ALL", &[1, 2, 3, 4])
        .search("FLAGGED", &[4])
        .header(1, "X-Mailer: Mutt/2.2\n")
        .header(2, "X-Mailer: Thunderbird\n")
        .size(4, 4096);
    let (a, _) = run(store.clone(), &query);
    let (b, _) = run(store, &restored);
    assert_eq!(a, vec![1, 4]);
    assert_eq!(a, b);
}

// ─── Text queries ───────────────────────────────────────────────────

#[test]
fn test_parsed_query_end_to_end() {
    let store = ScriptedStore::default()
        .search("UNSEEN", &[1, 2, 3])
        .search("FROM \"alice\"", &[2, 3, 8])
        .search("FLAGGED", &[6]);
    let query = parse_query("from:alice is:unread OR is:flagged").unwrap();
    let (ids, _) = run(store, &query);
    assert_eq!(ids, vec![2, 3, 6]);
}

#[test]
fn test_parsed_size_filter_sees_only_criterion_hits() {
    let all: Vec<Uid> = (1..=1000).collect();
    let store = ScriptedStore::default()
        .search("ALL", &all)
        .search("FROM \"alice\"", &[1, 2, 3])
        .size(1, 512)
        .size(2, 2 * 1024 * 1024)
        .size(3, 4096);
    let query = parse_query("from:alice size:>1mb").unwrap();
    let (ids, store) = run(store, &query);
    assert_eq!(ids, vec![2]);
    assert_eq!(store.overview_log, vec![vec![1, 2, 3]]);
    assert_eq!(store.searched(), vec!["FROM \"alice\""]);
}
