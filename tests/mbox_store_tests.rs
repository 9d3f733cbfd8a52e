//! End-to-end tests: text queries evaluated against MBOX files on disk.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use mailsift::error::SearchError;
use mailsift::query::compile::explain;
use mailsift::query::parse::parse_query;
use mailsift::search::{SearchEngine, SearchOptions};
use mailsift::store::mbox::MboxStore;
use mailsift::store::{MailStore, SortKey, Uid};

const INBOX: &str = "\
From alice@example.org Thu Feb  1 10:00:00 2024
From: Alice <alice@example.org>
To: bob@example.org
Subject: Quarterly report
Date: Thu, 01 Feb 2024 10:00:00 +0000
Status: RO
X-Mailer: mutt/2.2

Numbers are up this quarter.

From carol@example.org Fri Mar  1 09:00:00 2024
From: Carol <carol@example.org>
To: bob@example.org
Cc: dave@example.org
Subject: Re: Lunch
Date: Fri, 01 Mar 2024 09:00:00 +0000
X-Status: F
List-Id: <rust-users.example.org>

Pizza at noon?

From dave@example.org Sat Jun 15 18:30:00 2024
From: Dave <dave@example.org>
To: bob@example.org
Subject: =?UTF-8?B?Q2Fmw6kgbWVudQ==?=
Status: O

";

/// Mailbox root with `INBOX` (three messages, the last one large) and an
/// empty `Archive.mbox`.
fn mail_root() -> TempDir {
    let root = TempDir::new().unwrap();
    let mut inbox = INBOX.to_string();
    for _ in 0..40 {
        inbox.push_str("Today's menu is long enough to push this message past a kilobyte.\n");
    }
    root.child("INBOX").write_str(&inbox).unwrap();
    root.child("Archive.mbox").write_str("").unwrap();
    root
}

fn search(root: &TempDir, query: &str) -> Vec<Uid> {
    let mut engine = SearchEngine::new(MboxStore::open(root.path()));
    engine
        .search(&parse_query(query).unwrap(), "INBOX")
        .unwrap()
        .into_vec()
}

#[test]
fn test_select_loads_messages_in_file_order() {
    let root = mail_root();
    let mut store = MboxStore::open(root.path());
    store.select("INBOX").unwrap();
    assert_eq!(store.message_count("INBOX"), Some(3));
    assert_eq!(store.search("ALL", None).unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_mailbox_resolution() {
    let root = mail_root();
    let mut store = MboxStore::open(root.path());
    store.select("Archive").unwrap();
    assert_eq!(store.message_count("Archive"), Some(0));
    assert!(matches!(
        store.select("Sent"),
        Err(SearchError::MailboxNotFound(name)) if name == "Sent"
    ));
}

#[test]
fn test_flag_queries_follow_status_headers() {
    let root = mail_root();
    assert_eq!(search(&root, "is:unread"), vec![2, 3]);
    assert_eq!(search(&root, "is:flagged"), vec![2]);
    assert_eq!(search(&root, "is:new"), vec![2]);
    assert_eq!(search(&root, "-is:read -is:flagged"), vec![3]);
}

#[test]
fn test_header_queries() {
    let root = mail_root();
    assert_eq!(search(&root, "from:alice"), vec![1]);
    assert_eq!(search(&root, "cc:dave"), vec![2]);
    assert_eq!(search(&root, "subject:café"), vec![3]);
    assert_eq!(search(&root, "-from:alice"), vec![2, 3]);
}

#[test]
fn test_extended_header_queries() {
    let root = mail_root();
    assert_eq!(search(&root, "X-Mailer:MUTT"), vec![1]);
    assert_eq!(search(&root, "header:List-Id=rust-users"), vec![2]);
    assert!(search(&root, "header:List-Id=go-nuts").is_empty());
}

#[test]
fn test_body_and_text_queries() {
    let root = mail_root();
    assert_eq!(search(&root, "body:pizza"), vec![2]);
    assert_eq!(search(&root, "quarterly"), vec![1]);
    assert_eq!(search(&root, "\"menu is long\""), vec![3]);
}

#[test]
fn test_date_queries_use_from_line_when_date_missing() {
    let root = mail_root();
    assert_eq!(search(&root, "since:2024-03-01"), vec![2, 3]);
    assert_eq!(search(&root, "on:2024-06-15"), vec![3]);
    assert_eq!(search(&root, "before:2024-03-01"), vec![1]);
}

#[test]
fn test_size_queries() {
    let root = mail_root();
    assert_eq!(search(&root, "size:>1kb"), vec![3]);
    assert_eq!(search(&root, "is:unread size:<1kb"), vec![2]);
}

#[test]
fn test_or_groups() {
    let root = mail_root();
    assert_eq!(search(&root, "is:flagged OR subject:report"), vec![2, 1]);
    assert_eq!(search(&root, "from:nobody OR X-Mailer:mutt"), vec![1]);
}

#[test]
fn test_search_and_sort() {
    let root = mail_root();
    let mut engine = SearchEngine::new(MboxStore::open(root.path()));
    let everything = parse_query("size:>=0").unwrap();

    let by_subject = engine
        .search_and_sort(&everything, "INBOX", SortKey::Subject, false)
        .unwrap();
    assert_eq!(by_subject.as_slice(), &[3, 2, 1]);

    let newest_first = engine
        .search_and_sort(&everything, "INBOX", SortKey::Date, true)
        .unwrap();
    assert_eq!(newest_first.as_slice(), &[3, 2, 1]);

    let unread_by_size = engine
        .search_and_sort(&parse_query("is:unread").unwrap(), "INBOX", SortKey::Size, false)
        .unwrap();
    assert_eq!(unread_by_size.as_slice(), &[2, 3]);
}

#[test]
fn test_fetch_operations() {
    let root = mail_root();
    let mut store = MboxStore::open(root.path());
    store.select("INBOX").unwrap();

    let header = String::from_utf8(store.fetch_header(2).unwrap()).unwrap();
    assert!(header.starts_with("From: Carol"));
    assert!(!header.contains("Pizza"));
    assert!(matches!(
        store.fetch_header(9),
        Err(SearchError::MessageNotFound(9))
    ));

    let overview = store.fetch_overview(&[3, 9, 1]).unwrap();
    let uids: Vec<Uid> = overview.iter().map(|o| o.uid).collect();
    assert_eq!(uids, vec![3, 1]);
    assert_eq!(overview[0].subject.as_deref(), Some("Café menu"));
    assert!(overview[0].size > 1024);
}

#[test]
fn test_unsupported_charset_is_rejected() {
    let root = mail_root();
    let options = SearchOptions {
        charset: Some("ISO-8859-1".to_string()),
        reuse_cache: false,
    };
    let mut engine = SearchEngine::with_options(MboxStore::open(root.path()), options);
    let err = engine
        .search(&parse_query("from:alice").unwrap(), "INBOX")
        .unwrap_err();
    assert!(matches!(err, SearchError::Rejected(_)));
    assert!(predicate::str::contains("BADCHARSET").eval(&err.to_string()));
}

#[test]
fn test_explain_describes_each_phase() {
    let query = parse_query("is:unread X-Mailer:mutt size:>1kb OR from:alice").unwrap();
    let plan = explain(&query);
    assert!(predicate::str::contains("UNSEEN").eval(&plan));
    assert!(predicate::str::contains("x-mailer").eval(&plan));
    assert!(predicate::str::contains("FROM \"alice\"").eval(&plan));
}
