//! Search query tree.
//!
//! A [`SearchQuery`] is one node of a boolean search expression. A node holds
//! at most one criterion of each kind and may carry ordered lists of AND and
//! OR children, which are themselves full nodes:
//!
//! ```
//! use mailsift::query::{SearchQuery, SizeOp};
//!
//! // Unseen mail from alice, larger than 1 MB, or anything flagged.
//! let query = SearchQuery::new()
//!     .seen(false)
//!     .header("From", "alice")
//!     .size(SizeOp::Greater, 1024 * 1024)
//!     .or(SearchQuery::new().flagged(true));
//! assert_eq!(query.or_children().len(), 1);
//! ```
//!
//! Nodes are immutable by convention: builder methods consume and return the
//! node.

pub mod compile;
pub mod parse;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Message flags the protocol can search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Recent,
    /// Recent and not seen.
    New,
}

/// A flag that must be set (`set == true`) or clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagPredicate {
    pub flag: Flag,
    pub set: bool,
}

impl FlagPredicate {
    /// The search key for this predicate.
    pub fn as_atom(&self) -> &'static str {
        match (self.flag, self.set) {
            (Flag::Answered, true) => "ANSWERED",
            (Flag::Answered, false) => "UNANSWERED",
            (Flag::Deleted, true) => "DELETED",
            (Flag::Deleted, false) => "UNDELETED",
            (Flag::Draft, true) => "DRAFT",
            (Flag::Draft, false) => "UNDRAFT",
            (Flag::Flagged, true) => "FLAGGED",
            (Flag::Flagged, false) => "UNFLAGGED",
            (Flag::Seen, true) => "SEEN",
            (Flag::Seen, false) => "UNSEEN",
            (Flag::Recent, true) => "RECENT",
            (Flag::Recent, false) => "OLD",
            (Flag::New, true) => "NEW",
            (Flag::New, false) => "NOT NEW",
        }
    }
}

/// Headers the protocol can match natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardHeader {
    To,
    Cc,
    From,
    Subject,
}

impl StandardHeader {
    /// Recognise a header name, ignoring case and a trailing colon.
    pub fn from_name(name: &str) -> Option<Self> {
        match normalize_header_name(name).as_str() {
            "to" => Some(Self::To),
            "cc" => Some(Self::Cc),
            "from" => Some(Self::From),
            "subject" => Some(Self::Subject),
            _ => None,
        }
    }

    pub fn as_atom(self) -> &'static str {
        match self {
            Self::To => "TO",
            Self::Cc => "CC",
            Self::From => "FROM",
            Self::Subject => "SUBJECT",
        }
    }
}

/// Date comparison against the message's internal date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateOp {
    Before,
    Since,
    On,
}

impl DateOp {
    pub fn as_atom(self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::Since => "SINCE",
            Self::On => "ON",
        }
    }
}

/// The single protocol-expressible criterion a node may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    Header {
        field: StandardHeader,
        pattern: String,
    },
    Body(String),
    Text(String),
    Date {
        op: DateOp,
        date: NaiveDate,
    },
}

/// Header match the protocol cannot express; evaluated by scanning headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMatch {
    /// Lower-cased header name without a trailing colon.
    pub name: String,
    pub pattern: String,
}

/// Size comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeOp {
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
}

impl SizeOp {
    /// Compare a message size against a threshold.
    pub fn compare(self, size: u64, threshold: u64) -> bool {
        match self {
            Self::Less => size < threshold,
            Self::LessOrEqual => size <= threshold,
            Self::Equal => size == threshold,
            Self::GreaterOrEqual => size >= threshold,
            Self::Greater => size > threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Equal => "=",
            Self::GreaterOrEqual => ">=",
            Self::Greater => ">",
        }
    }
}

impl fmt::Display for SizeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for SizeOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Self::Less),
            "<=" => Ok(Self::LessOrEqual),
            "=" => Ok(Self::Equal),
            ">=" => Ok(Self::GreaterOrEqual),
            ">" => Ok(Self::Greater),
            other => Err(format!("unknown size operator '{other}'")),
        }
    }
}

/// Size criterion: `size <op> bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeFilter {
    pub op: SizeOp,
    pub bytes: u64,
}

impl SizeFilter {
    pub fn matches(&self, size: u64) -> bool {
        self.op.compare(size, self.bytes)
    }
}

/// One node of a search expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    flags: Vec<FlagPredicate>,
    criterion: Option<Criterion>,
    extended: Option<HeaderMatch>,
    size: Option<SizeFilter>,
    negate: bool,
    and: Vec<SearchQuery>,
    or: Vec<SearchQuery>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Flags ───────────────────────────────────────────────────

    /// Require `flag` to be set or clear. Replaces an earlier predicate on
    /// the same flag.
    pub fn flag(mut self, flag: Flag, set: bool) -> Self {
        let predicate = FlagPredicate { flag, set };
        match self.flags.iter_mut().find(|p| p.flag == flag) {
            Some(existing) => *existing = predicate,
            None => self.flags.push(predicate),
        }
        self
    }

    pub fn answered(self, set: bool) -> Self {
        self.flag(Flag::Answered, set)
    }

    pub fn deleted(self, set: bool) -> Self {
        self.flag(Flag::Deleted, set)
    }

    pub fn draft(self, set: bool) -> Self {
        self.flag(Flag::Draft, set)
    }

    pub fn flagged(self, set: bool) -> Self {
        self.flag(Flag::Flagged, set)
    }

    pub fn seen(self, set: bool) -> Self {
        self.flag(Flag::Seen, set)
    }

    /// `recent(false)` selects old messages.
    pub fn recent(self, set: bool) -> Self {
        self.flag(Flag::Recent, set)
    }

    /// Messages that are recent and unseen.
    pub fn new_messages(self) -> Self {
        self.flag(Flag::New, true)
    }

    // ── Criteria ────────────────────────────────────────────────

    /// Match a header value by substring.
    ///
    /// To, Cc, From and Subject become the node's native criterion; any other
    /// header becomes its extended criterion. An empty pattern is ignored.
    pub fn header(mut self, name: &str, pattern: &str) -> Self {
        if pattern.is_empty() {
            return self;
        }
        match StandardHeader::from_name(name) {
            Some(field) => {
                self.criterion = Some(Criterion::Header {
                    field,
                    pattern: pattern.to_string(),
                });
            }
            None => {
                self.extended = Some(HeaderMatch {
                    name: normalize_header_name(name),
                    pattern: pattern.to_string(),
                });
            }
        }
        self
    }

    pub fn body(mut self, text: &str) -> Self {
        self.criterion = Some(Criterion::Body(text.to_string()));
        self
    }

    /// Match anywhere in headers or body.
    pub fn text(mut self, text: &str) -> Self {
        self.criterion = Some(Criterion::Text(text.to_string()));
        self
    }

    pub fn before(self, date: NaiveDate) -> Self {
        self.date(DateOp::Before, date)
    }

    pub fn since(self, date: NaiveDate) -> Self {
        self.date(DateOp::Since, date)
    }

    pub fn on(self, date: NaiveDate) -> Self {
        self.date(DateOp::On, date)
    }

    pub fn date(mut self, op: DateOp, date: NaiveDate) -> Self {
        self.criterion = Some(Criterion::Date { op, date });
        self
    }

    pub fn size(mut self, op: SizeOp, bytes: u64) -> Self {
        self.size = Some(SizeFilter { op, bytes });
        self
    }

    /// Negate this node's flags and criterion. Extended, size, AND and OR
    /// parts are unaffected.
    pub fn negate(self) -> Self {
        self.negated(true)
    }

    pub fn negated(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    // ── Composition ─────────────────────────────────────────────

    pub fn and(mut self, child: SearchQuery) -> Self {
        self.and.push(child);
        self
    }

    pub fn and_all(mut self, children: impl IntoIterator<Item = SearchQuery>) -> Self {
        self.and.extend(children);
        self
    }

    pub fn or(mut self, child: SearchQuery) -> Self {
        self.or.push(child);
        self
    }

    pub fn or_all(mut self, children: impl IntoIterator<Item = SearchQuery>) -> Self {
        self.or.extend(children);
        self
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn flags(&self) -> &[FlagPredicate] {
        &self.flags
    }

    /// Flag atoms joined by spaces (empty when no flags are set).
    pub fn flag_string(&self) -> String {
        self.flags
            .iter()
            .map(FlagPredicate::as_atom)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn criterion(&self) -> Option<&Criterion> {
        self.criterion.as_ref()
    }

    pub fn extended(&self) -> Option<&HeaderMatch> {
        self.extended.as_ref()
    }

    pub fn size_filter(&self) -> Option<&SizeFilter> {
        self.size.as_ref()
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn and_children(&self) -> &[SearchQuery] {
        &self.and
    }

    pub fn or_children(&self) -> &[SearchQuery] {
        &self.or
    }

    /// True when the node carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
            && self.criterion.is_none()
            && self.extended.is_none()
            && self.size.is_none()
            && self.and.is_empty()
            && self.or.is_empty()
    }
}

/// Lower-case a header name and drop a trailing colon.
pub fn normalize_header_name(name: &str) -> String {
    name.trim().trim_end_matches(':').trim().to_lowercase()
}
