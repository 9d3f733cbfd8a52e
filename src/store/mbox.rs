//! Offline [`MailStore`] over a directory of MBOX files.
//!
//! Each file under the root is a mailbox named after the file (with or
//! without a `.mbox` extension). A mailbox is scanned once, on first
//! select; its messages get UIDs `1..=n` in file order. Headers are kept in
//! memory, bodies are read back and decoded on demand through an LRU cache.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use lru::LruCache;
use tracing::{debug, info, warn};

use crate::error::{Result, SearchError};
use crate::parser::header::{parse_date, parse_from_line_date, parse_header_block, HeaderMap};
use crate::parser::mbox::{read_message_at, MboxScanner, MessageSpan};
use crate::parser::mime;

use super::criteria::{check_charset, parse_criteria, MessageFlags, SearchTarget};
use super::{MailStore, Overview, SortKey, Uid};

/// Default number of decoded bodies kept in memory.
pub const DEFAULT_BODY_CACHE: usize = 64;

/// One message of a loaded mailbox.
#[derive(Debug, Clone)]
struct StoredMessage {
    uid: Uid,
    span: MessageSpan,
    headers: HeaderMap,
    flags: MessageFlags,
    date: Option<DateTime<Utc>>,
}

impl StoredMessage {
    fn from_span(uid: Uid, span: MessageSpan) -> Self {
        let headers = parse_header_block(&span.header).unwrap_or_else(|e| {
            warn!(uid, offset = span.offset, error = %e, "Unreadable header block");
            HeaderMap::default()
        });
        let flags = MessageFlags::from_status(headers.get("status"), headers.get("x-status"));
        let date = headers
            .get("date")
            .and_then(parse_date)
            .or_else(|| parse_from_line_date(&span.from_line()));

        Self {
            uid,
            span,
            headers,
            flags,
            date,
        }
    }

    fn size(&self) -> u64 {
        self.span.message_size()
    }

    /// Header block without the mbox separator line.
    fn raw_header(&self) -> &[u8] {
        let start = (self.span.from_line_len as usize).min(self.span.header.len());
        &self.span.header[start..]
    }
}

#[derive(Debug)]
struct Mailbox {
    path: PathBuf,
    messages: Vec<StoredMessage>,
}

impl Mailbox {
    fn get(&self, uid: Uid) -> Option<&StoredMessage> {
        let index = (uid as usize).checked_sub(1)?;
        self.messages.get(index)
    }
}

/// Mail store backed by MBOX files under one root directory.
pub struct MboxStore {
    root: PathBuf,
    mailboxes: HashMap<String, Mailbox>,
    selected: Option<String>,
    bodies: LruCache<(String, Uid), Arc<str>>,
}

impl MboxStore {
    pub fn open(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            mailboxes: HashMap::new(),
            selected: None,
            bodies: LruCache::new(body_cache_capacity(DEFAULT_BODY_CACHE)),
        }
    }

    /// Keep up to `size` decoded bodies (at least one).
    pub fn with_body_cache(mut self, size: usize) -> Self {
        self.bodies = LruCache::new(body_cache_capacity(size));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The currently selected mailbox, if any.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Number of messages in a loaded mailbox.
    pub fn message_count(&self, mailbox: &str) -> Option<usize> {
        self.mailboxes.get(mailbox).map(|m| m.messages.len())
    }

    /// File backing `mailbox`: `root/<mailbox>` or `root/<mailbox>.mbox`.
    pub fn resolve(&self, mailbox: &str) -> Result<PathBuf> {
        let plain = self.root.join(mailbox);
        let with_ext = self.root.join(format!("{mailbox}.mbox"));
        [plain, with_ext]
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| SearchError::MailboxNotFound(mailbox.to_string()))
    }

    /// Scan a mailbox into memory unless already loaded. Returns its message
    /// count. `progress` receives `(bytes_read, file_size)`.
    pub fn load_mailbox(
        &mut self,
        mailbox: &str,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<usize> {
        if let Some(loaded) = self.mailboxes.get(mailbox) {
            return Ok(loaded.messages.len());
        }

        let path = self.resolve(mailbox)?;
        let scanner = MboxScanner::new(&path)?;
        let mut messages = Vec::new();
        scanner.scan(
            &mut |span: MessageSpan| {
                let uid = messages.len() as Uid + 1;
                messages.push(StoredMessage::from_span(uid, span));
                true
            },
            progress,
        )?;

        info!(
            mailbox,
            path = %path.display(),
            messages = messages.len(),
            "Mailbox loaded"
        );
        let count = messages.len();
        self.mailboxes
            .insert(mailbox.to_string(), Mailbox { path, messages });
        Ok(count)
    }

    fn current(&self) -> Result<&Mailbox> {
        let name = self.selected.as_deref().ok_or_else(no_selection)?;
        self.mailboxes
            .get(name)
            .ok_or_else(|| SearchError::MailboxNotFound(name.to_string()))
    }
}

fn no_selection() -> SearchError {
    SearchError::Transport("no mailbox selected".into())
}

fn body_cache_capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
}

/// A stored message plus what it takes to read its body lazily.
struct MessageView<'a> {
    mailbox: &'a str,
    path: &'a Path,
    message: &'a StoredMessage,
    bodies: &'a mut LruCache<(String, Uid), Arc<str>>,
}

impl SearchTarget for MessageView<'_> {
    fn flags(&self) -> MessageFlags {
        self.message.flags
    }

    fn headers(&self) -> &HeaderMap {
        &self.message.headers
    }

    fn internal_date(&self) -> Option<NaiveDate> {
        self.message.date.map(|d| d.date_naive())
    }

    fn size(&self) -> u64 {
        self.message.size()
    }

    fn body_text(&mut self) -> Result<Arc<str>> {
        let key = (self.mailbox.to_string(), self.message.uid);
        if let Some(body) = self.bodies.get(&key) {
            return Ok(Arc::clone(body));
        }

        let span = &self.message.span;
        let raw = read_message_at(
            self.path,
            span.offset + span.from_line_len,
            span.message_size(),
        )?;
        let body: Arc<str> = Arc::from(mime::body_text(&raw));
        debug!(mailbox = self.mailbox, uid = self.message.uid, bytes = body.len(), "Decoded body");
        self.bodies.put(key, Arc::clone(&body));
        Ok(body)
    }
}

impl MailStore for MboxStore {
    fn select(&mut self, mailbox: &str) -> Result<()> {
        self.load_mailbox(mailbox, None)?;
        self.selected = Some(mailbox.to_string());
        Ok(())
    }

    fn search(&mut self, criteria: &str, charset: Option<&str>) -> Result<Vec<Uid>> {
        check_charset(charset)?;
        let key = parse_criteria(criteria)?;

        let name = self.selected.as_deref().ok_or_else(no_selection)?;
        let mailbox = self
            .mailboxes
            .get(name)
            .ok_or_else(|| SearchError::MailboxNotFound(name.to_string()))?;
        let bodies = &mut self.bodies;

        let mut matched = Vec::new();
        for message in &mailbox.messages {
            let mut view = MessageView {
                mailbox: name,
                path: &mailbox.path,
                message,
                bodies: &mut *bodies,
            };
            if key.matches(&mut view)? {
                matched.push(message.uid);
            }
        }
        debug!(mailbox = name, criteria, matched = matched.len(), "Mbox search");
        Ok(matched)
    }

    fn sort(&mut self, key: SortKey, descending: bool) -> Result<Vec<Uid>> {
        let mailbox = self.current()?;
        let mut order: Vec<&StoredMessage> = mailbox.messages.iter().collect();

        match key {
            SortKey::Arrival => {}
            SortKey::Date => order.sort_by_key(|m| m.date),
            SortKey::Size => order.sort_by_key(|m| m.size()),
            SortKey::Subject => {
                order.sort_by_cached_key(|m| base_subject(m.headers.get("subject").unwrap_or("")))
            }
            SortKey::From | SortKey::To | SortKey::Cc => {
                let header = key.as_atom().to_lowercase();
                order.sort_by_cached_key(|m| {
                    first_mailbox(m.headers.get(&header).unwrap_or(""))
                });
            }
        }

        let mut uids: Vec<Uid> = order.into_iter().map(|m| m.uid).collect();
        if descending {
            uids.reverse();
        }
        Ok(uids)
    }

    fn fetch_header(&mut self, uid: Uid) -> Result<Vec<u8>> {
        let mailbox = self.current()?;
        mailbox
            .get(uid)
            .map(|m| m.raw_header().to_vec())
            .ok_or(SearchError::MessageNotFound(uid))
    }

    fn fetch_overview(&mut self, uids: &[Uid]) -> Result<Vec<Overview>> {
        let mailbox = self.current()?;
        Ok(uids
            .iter()
            .filter_map(|&uid| mailbox.get(uid))
            .map(|m| Overview {
                uid: m.uid,
                size: m.size(),
                subject: m.headers.get("subject").map(String::from),
                from: m.headers.get("from").map(String::from),
                date: m.date.map(|d| d.to_rfc2822()),
            })
            .collect())
    }
}

/// Subject with reply and forward markers removed, lower-cased
/// (RFC 5256 base subject, simplified).
pub fn base_subject(subject: &str) -> String {
    let mut s = subject.trim().to_lowercase();
    loop {
        let trimmed = ["re:", "fwd:", "fw:"]
            .iter()
            .find_map(|prefix| s.strip_prefix(prefix))
            .map(|rest| rest.trim_start().to_string())
            .or_else(|| s.strip_suffix("(fwd)").map(|rest| rest.trim_end().to_string()));
        match trimmed {
            Some(next) => s = next,
            None => return s,
        }
    }
}

/// Lower-cased address of the first mailbox in an address header.
fn first_mailbox(value: &str) -> String {
    let first = value.split(',').next().unwrap_or("").trim();
    let address = match (first.find('<'), first.rfind('>')) {
        (Some(open), Some(close)) if open < close => &first[open + 1..close],
        _ => first,
    };
    address.trim().to_lowercase()
}
