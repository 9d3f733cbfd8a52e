//! Native search criteria: parsing a protocol criteria string such as
//! `UNSEEN OR FROM "alice" (SUBJECT report LARGER 1024)` and evaluating it
//! against one stored message.
//!
//! # Supported keys
//!
//! - `ALL`
//! - flags: `ANSWERED`, `DELETED`, `DRAFT`, `FLAGGED`, `SEEN`, `RECENT`,
//!   `NEW`, `OLD` and the `UN…` forms
//! - `FROM`, `TO`, `CC`, `BCC`, `SUBJECT`, `HEADER name value`
//! - `BODY`, `TEXT`
//! - `BEFORE`, `SINCE`, `ON` with a `1-Feb-2024` date
//! - `LARGER n`, `SMALLER n`
//! - `NOT key`, `OR key key`, `( key… )`
//!
//! Adjacent keys are ANDed. String matching is a case-insensitive substring
//! test. String arguments are atoms, quoted strings or `{n}`/`{n+}` literals.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{Result, SearchError};
use crate::parser::header::HeaderMap;
use crate::query::{DateOp, Flag, FlagPredicate};

/// Charsets accepted for string arguments.
const SUPPORTED_CHARSETS: [&str; 2] = ["US-ASCII", "UTF-8"];

/// One parsed search key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    All,
    Flag(FlagPredicate),
    /// Substring match on a header; the name is lower-cased.
    Header { name: String, pattern: String },
    Body(String),
    /// Headers or body.
    Text(String),
    Date { op: DateOp, date: NaiveDate },
    Larger(u64),
    Smaller(u64),
    Not(Box<SearchKey>),
    Or(Box<SearchKey>, Box<SearchKey>),
    And(Vec<SearchKey>),
}

/// System flags of a stored message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFlags {
    pub answered: bool,
    pub deleted: bool,
    pub draft: bool,
    pub flagged: bool,
    pub seen: bool,
    pub recent: bool,
}

impl MessageFlags {
    /// Flags from the mbox `Status:` and `X-Status:` headers.
    ///
    /// `Status: R` is seen, `O` marks the message as no longer recent; a
    /// message without `Status:` has never been looked at and is recent.
    /// `X-Status:` carries `A`nswered, `F`lagged, `D`eleted and `T` (draft).
    pub fn from_status(status: Option<&str>, x_status: Option<&str>) -> Self {
        let status = status.unwrap_or("");
        let x_status = x_status.unwrap_or("");
        Self {
            seen: status.contains('R'),
            recent: !status.contains('O'),
            answered: x_status.contains('A'),
            flagged: x_status.contains('F'),
            deleted: x_status.contains('D'),
            draft: x_status.contains('T'),
        }
    }

    pub fn has(&self, flag: Flag) -> bool {
        match flag {
            Flag::Answered => self.answered,
            Flag::Deleted => self.deleted,
            Flag::Draft => self.draft,
            Flag::Flagged => self.flagged,
            Flag::Seen => self.seen,
            Flag::Recent => self.recent,
            Flag::New => self.recent && !self.seen,
        }
    }
}

/// What a search key needs to know about a message.
pub trait SearchTarget {
    fn flags(&self) -> MessageFlags;
    fn headers(&self) -> &HeaderMap;
    /// Internal date, used by `BEFORE`, `SINCE` and `ON`.
    fn internal_date(&self) -> Option<NaiveDate>;
    fn size(&self) -> u64;
    /// Decoded body text; may read from disk.
    fn body_text(&mut self) -> Result<Arc<str>>;
}

impl SearchKey {
    /// Evaluate against one message. Only body access can fail.
    pub fn matches(&self, target: &mut dyn SearchTarget) -> Result<bool> {
        Ok(match self {
            Self::All => true,
            Self::Flag(predicate) => target.flags().has(predicate.flag) == predicate.set,
            Self::Header { name, pattern } => {
                let needle = pattern.to_lowercase();
                let values = target.headers().get_all(name);
                // An empty pattern matches any message carrying the header.
                if needle.is_empty() {
                    !values.is_empty()
                } else {
                    values.iter().any(|v| v.to_lowercase().contains(&needle))
                }
            }
            Self::Body(text) => contains_ignore_case(&target.body_text()?, text),
            Self::Text(text) => {
                let needle = text.to_lowercase();
                target
                    .headers()
                    .values()
                    .any(|v| v.to_lowercase().contains(&needle))
                    || contains_ignore_case(&target.body_text()?, text)
            }
            Self::Date { op, date } => match target.internal_date() {
                Some(internal) => match op {
                    DateOp::Before => internal < *date,
                    DateOp::Since => internal >= *date,
                    DateOp::On => internal == *date,
                },
                None => false,
            },
            Self::Larger(n) => target.size() > *n,
            Self::Smaller(n) => target.size() < *n,
            Self::Not(key) => !key.matches(target)?,
            Self::Or(left, right) => left.matches(target)? || right.matches(target)?,
            Self::And(keys) => {
                for key in keys {
                    if !key.matches(target)? {
                        return Ok(false);
                    }
                }
                true
            }
        })
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Refuse charsets the store cannot match in, the way servers answer
/// `NO [BADCHARSET]`.
pub fn check_charset(charset: Option<&str>) -> Result<()> {
    match charset {
        Some(name)
            if !SUPPORTED_CHARSETS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(name)) =>
        {
            Err(SearchError::Rejected(format!(
                "[BADCHARSET ({})] unsupported charset {name}",
                SUPPORTED_CHARSETS.join(" ")
            )))
        }
        _ => Ok(()),
    }
}

/// Parse a criteria string into a single key (an `And` when several keys
/// are listed).
pub fn parse_criteria(input: &str) -> Result<SearchKey> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut keys = Vec::new();
    while !parser.at_end() {
        keys.push(parser.key()?);
    }
    match keys.len() {
        0 => Err(SearchError::Rejected("empty search criteria".into())),
        1 => Ok(keys.remove(0)),
        _ => Ok(SearchKey::And(keys)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Atom(String),
    Quoted(String),
    Open,
    Close,
}

/// Split into atoms, quoted strings (with `\"` and `\\` escapes), literals and
/// parentheses.
fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(SearchError::Rejected("unterminated quoted string".into()));
                }
                tokens.push(Token::Quoted(value));
            }
            '{' => {
                chars.next();
                tokens.push(Token::Quoted(literal(&mut chars)?));
            }
            _ => {
                let mut atom = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                        break;
                    }
                    atom.push(c);
                    chars.next();
                }
                tokens.push(Token::Atom(atom));
            }
        }
    }
    Ok(tokens)
}

/// Read the rest of a literal after its `{`: `n}` or `n+}`, CRLF, then
/// exactly `n` octets.
fn literal(chars: &mut Peekable<Chars<'_>>) -> Result<String> {
    let bad = |why: &str| SearchError::Rejected(format!("bad literal: {why}"));

    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    let len: usize = digits.parse().map_err(|_| bad("missing length"))?;
    chars.next_if_eq(&'+');
    if chars.next() != Some('}') {
        return Err(bad("expected '}'"));
    }
    if chars.next() != Some('\r') || chars.next() != Some('\n') {
        return Err(bad("expected CRLF after length"));
    }

    let mut value = String::with_capacity(len);
    while value.len() < len {
        let c = chars.next().ok_or_else(|| bad("truncated"))?;
        value.push(c);
    }
    if value.len() != len {
        return Err(bad("length splits a character"));
    }
    Ok(value)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn key(&mut self) -> Result<SearchKey> {
        match self.next() {
            Some(Token::Open) => self.list(),
            Some(Token::Atom(atom)) => self.keyword(&atom),
            Some(Token::Close) => Err(SearchError::Rejected("unexpected ')'".into())),
            Some(Token::Quoted(s)) => Err(SearchError::Rejected(format!(
                "expected a search key, found \"{s}\""
            ))),
            None => Err(SearchError::Rejected("missing search key".into())),
        }
    }

    /// Keys up to the matching `)`.
    fn list(&mut self) -> Result<SearchKey> {
        let mut keys = Vec::new();
        loop {
            match self.tokens.get(self.pos) {
                Some(Token::Close) => {
                    self.pos += 1;
                    break;
                }
                Some(_) => keys.push(self.key()?),
                None => return Err(SearchError::Rejected("missing ')'".into())),
            }
        }
        if keys.is_empty() {
            return Err(SearchError::Rejected("empty parenthesised list".into()));
        }
        Ok(SearchKey::And(keys))
    }

    fn keyword(&mut self, atom: &str) -> Result<SearchKey> {
        let upper = atom.to_ascii_uppercase();
        let flag = |flag, set| Ok(SearchKey::Flag(FlagPredicate { flag, set }));

        match upper.as_str() {
            "ALL" => Ok(SearchKey::All),
            "ANSWERED" => flag(Flag::Answered, true),
            "UNANSWERED" => flag(Flag::Answered, false),
            "DELETED" => flag(Flag::Deleted, true),
            "UNDELETED" => flag(Flag::Deleted, false),
            "DRAFT" => flag(Flag::Draft, true),
            "UNDRAFT" => flag(Flag::Draft, false),
            "FLAGGED" => flag(Flag::Flagged, true),
            "UNFLAGGED" => flag(Flag::Flagged, false),
            "SEEN" => flag(Flag::Seen, true),
            "UNSEEN" => flag(Flag::Seen, false),
            "RECENT" => flag(Flag::Recent, true),
            "OLD" => flag(Flag::Recent, false),
            "NEW" => flag(Flag::New, true),
            "NOT" => Ok(SearchKey::Not(Box::new(self.key()?))),
            "OR" => {
                let left = self.key()?;
                let right = self.key()?;
                Ok(SearchKey::Or(Box::new(left), Box::new(right)))
            }
            "FROM" | "TO" | "CC" | "BCC" | "SUBJECT" => Ok(SearchKey::Header {
                name: upper.to_lowercase(),
                pattern: self.string(&upper)?,
            }),
            "HEADER" => {
                let name = self.string(&upper)?.to_lowercase();
                let pattern = self.string(&upper)?;
                Ok(SearchKey::Header { name, pattern })
            }
            "BODY" => Ok(SearchKey::Body(self.string(&upper)?)),
            "TEXT" => Ok(SearchKey::Text(self.string(&upper)?)),
            "BEFORE" => self.date(DateOp::Before, &upper),
            "SINCE" => self.date(DateOp::Since, &upper),
            "ON" => self.date(DateOp::On, &upper),
            "LARGER" => Ok(SearchKey::Larger(self.number(&upper)?)),
            "SMALLER" => Ok(SearchKey::Smaller(self.number(&upper)?)),
            _ => Err(SearchError::Rejected(format!("unknown search key {atom}"))),
        }
    }

    /// An astring argument.
    fn string(&mut self, key: &str) -> Result<String> {
        match self.next() {
            Some(Token::Atom(s)) | Some(Token::Quoted(s)) => Ok(s),
            _ => Err(SearchError::Rejected(format!("{key} needs a string argument"))),
        }
    }

    fn date(&mut self, op: DateOp, key: &str) -> Result<SearchKey> {
        let raw = self.string(key)?;
        let date = NaiveDate::parse_from_str(&raw, "%d-%b-%Y")
            .map_err(|_| SearchError::Rejected(format!("{key}: bad date {raw}")))?;
        Ok(SearchKey::Date { op, date })
    }

    fn number(&mut self, key: &str) -> Result<u64> {
        let raw = self.string(key)?;
        raw.parse()
            .map_err(|_| SearchError::Rejected(format!("{key}: bad number {raw}")))
    }
}
