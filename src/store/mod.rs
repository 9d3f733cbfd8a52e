//! Mail store boundary: the operations the search engine needs from a
//! connection, plus an offline implementation over mbox files.

pub mod criteria;
pub mod mbox;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stable message identifier within one mailbox (an IMAP UID).
pub type Uid = u32;

/// Lightweight per-message metadata returned by [`MailStore::fetch_overview`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    pub uid: Uid,
    /// Message size in octets (RFC822.SIZE).
    pub size: u64,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub date: Option<String>,
}

impl Overview {
    /// Overview carrying only a size, as servers return for `FETCH (RFC822.SIZE)`.
    pub fn sized(uid: Uid, size: u64) -> Self {
        Self {
            uid,
            size,
            subject: None,
            from: None,
            date: None,
        }
    }
}

/// Sort criteria understood by native sort (RFC 5256).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Arrival,
    Cc,
    Date,
    From,
    Size,
    Subject,
    To,
}

impl SortKey {
    /// The protocol atom for this key.
    pub fn as_atom(self) -> &'static str {
        match self {
            Self::Arrival => "ARRIVAL",
            Self::Cc => "CC",
            Self::Date => "DATE",
            Self::From => "FROM",
            Self::Size => "SIZE",
            Self::Subject => "SUBJECT",
            Self::To => "TO",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_atom())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arrival" => Ok(Self::Arrival),
            "cc" => Ok(Self::Cc),
            "date" => Ok(Self::Date),
            "from" => Ok(Self::From),
            "size" => Ok(Self::Size),
            "subject" => Ok(Self::Subject),
            "to" => Ok(Self::To),
            other => Err(format!(
                "unknown sort key '{other}' (expected arrival, cc, date, from, size, subject, to)"
            )),
        }
    }
}

/// A connection to a mail store.
///
/// Every operation takes `&mut self`: the underlying protocol is stateful and
/// line-oriented, so requests on one connection are strictly sequential.
/// Identifiers are always UIDs of the currently selected mailbox.
pub trait MailStore {
    /// Position the connection on `mailbox`.
    fn select(&mut self, mailbox: &str) -> Result<()>;

    /// Run a native search with a protocol criteria string
    /// (e.g. `UNSEEN FROM "alice"`). `charset` names the charset of any
    /// string arguments.
    fn search(&mut self, criteria: &str, charset: Option<&str>) -> Result<Vec<Uid>>;

    /// Sort the whole selected mailbox by `key`.
    fn sort(&mut self, key: SortKey, descending: bool) -> Result<Vec<Uid>>;

    /// Raw, unparsed header block of one message.
    fn fetch_header(&mut self, uid: Uid) -> Result<Vec<u8>>;

    /// Size and summary data for exactly the requested messages.
    fn fetch_overview(&mut self, uids: &[Uid]) -> Result<Vec<Overview>>;
}

impl<S: MailStore + ?Sized> MailStore for &mut S {
    fn select(&mut self, mailbox: &str) -> Result<()> {
        (**self).select(mailbox)
    }

    fn search(&mut self, criteria: &str, charset: Option<&str>) -> Result<Vec<Uid>> {
        (**self).search(criteria, charset)
    }

    fn sort(&mut self, key: SortKey, descending: bool) -> Result<Vec<Uid>> {
        (**self).sort(key, descending)
    }

    fn fetch_header(&mut self, uid: Uid) -> Result<Vec<u8>> {
        (**self).fetch_header(uid)
    }

    fn fetch_overview(&mut self, uids: &[Uid]) -> Result<Vec<Overview>> {
        (**self).fetch_overview(uids)
    }
}
