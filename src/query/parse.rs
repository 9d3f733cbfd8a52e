//! Text query parser.
//!
//! Parses user-typed query strings into a [`SearchQuery`] tree.
//!
//! # Supported syntax
//!
//! **Plain words**: `invoice` searches the full text (headers and body).
//!
//! **Standard headers**: `from:`, `to:`, `cc:`, `subject:`
//!
//! **Other headers** (scanned locally):
//! - `header:List-Id=rust-users`
//! - `X-Mailer:mutt` (any `Name:value` whose name contains a `-`)
//!
//! **Content**: `body:text`, `text:text`
//!
//! **Flags**: `is:seen`, `is:unread`, `is:flagged`, `-is:answered`, …
//!
//! **Dates**: `before:2024-06-01`, `since:2024-01-01`, `on:2024-03-15`
//!
//! **Size**: `size:>1mb`, `size:<=100kb`, `size:=512`
//!
//! **Operators**:
//! - `term1 term2`: implicit AND
//! - `term1 OR term2`: OR between groups of terms
//! - `-term`: NOT
//! - `"exact phrase"`: quoted phrase

use chrono::NaiveDate;

use crate::error::{Result, SearchError};

use super::{DateOp, Flag, SearchQuery, SizeOp};

/// Parse a query string into a [`SearchQuery`].
///
/// Each `OR`-separated group becomes one node holding the group's flags, with
/// every header/text/date term as an AND child. A size filter goes on the
/// first positive term so it only sees that term's matches; without terms it
/// stays on the group node.
pub fn parse_query(input: &str) -> Result<SearchQuery> {
    let tokens = tokenize(input.trim());
    if tokens.is_empty() {
        return Err(SearchError::InvalidQuery("empty query".into()));
    }

    let mut groups: Vec<SearchQuery> = Vec::new();
    for group in tokens.split(|t| t == "OR") {
        if group.is_empty() {
            return Err(SearchError::InvalidQuery(
                "OR needs a term on both sides".into(),
            ));
        }
        groups.push(parse_group(group)?);
    }

    if groups.len() == 1 {
        Ok(groups.remove(0))
    } else {
        Ok(SearchQuery::new().or_all(groups))
    }
}

/// Parse one AND group.
fn parse_group(tokens: &[String]) -> Result<SearchQuery> {
    let mut node = SearchQuery::new();
    let mut children = Vec::new();
    let mut size = None;

    for token in tokens {
        let (negated, token) = if let Some(stripped) = token.strip_prefix('-') {
            (true, stripped)
        } else {
            (false, token.as_str())
        };
        if token.is_empty() {
            continue;
        }

        if let Some(value) = token.strip_prefix("is:") {
            let (flag, set) = parse_flag(value)?;
            node = node.flag(flag, set != negated);
        } else if let Some(value) = token.strip_prefix("size:") {
            if negated {
                return Err(SearchError::InvalidQuery(format!(
                    "size filters cannot be negated: -{token}"
                )));
            }
            let (op, bytes) = parse_size_filter(value).ok_or_else(|| {
                SearchError::InvalidQuery(format!("bad size filter '{value}'"))
            })?;
            size = Some((op, bytes));
        } else {
            let child = parse_criterion(token, negated)?;
            children.push(child);
        }
    }

    if let Some((op, bytes)) = size {
        let target = children
            .iter()
            .position(|child| !child.is_negated())
            .or((!children.is_empty()).then_some(0));
        match target {
            Some(index) => {
                let child = children.remove(index);
                children.insert(index, child.size(op, bytes));
            }
            None => node = node.size(op, bytes),
        }
    }

    Ok(node.and_all(children))
}

/// Parse a header/text/date term into its own node.
fn parse_criterion(token: &str, negated: bool) -> Result<SearchQuery> {
    let child = SearchQuery::new().negated(negated);

    for field in ["from:", "to:", "cc:", "subject:"] {
        if let Some(value) = token.strip_prefix(field) {
            return header_term(child, field, &unquote(value), negated);
        }
    }

    if let Some(value) = token.strip_prefix("body:") {
        return Ok(child.body(&unquote(value)));
    }
    if let Some(value) = token.strip_prefix("text:") {
        return Ok(child.text(&unquote(value)));
    }

    for (prefix, op) in [
        ("before:", DateOp::Before),
        ("since:", DateOp::Since),
        ("on:", DateOp::On),
    ] {
        if let Some(value) = token.strip_prefix(prefix) {
            let date = parse_naive_date(value).ok_or_else(|| {
                SearchError::InvalidQuery(format!("bad date '{value}', expected YYYY-MM-DD"))
            })?;
            return Ok(child.date(op, date));
        }
    }

    if let Some(value) = token.strip_prefix("header:") {
        let (name, pattern) = value.split_once('=').ok_or_else(|| {
            SearchError::InvalidQuery(format!("expected header:Name=value, got '{token}'"))
        })?;
        return header_term(child, name, &unquote(pattern), negated);
    }

    // `X-Something:value`
    if let Some((name, value)) = token.split_once(':') {
        if name.contains('-') && !name.starts_with('"') {
            return header_term(child, name, &unquote(value), negated);
        }
    }

    Ok(child.text(&unquote(token)))
}

/// Build a header term; only standard headers can be negated.
fn header_term(
    child: SearchQuery,
    name: &str,
    pattern: &str,
    negated: bool,
) -> Result<SearchQuery> {
    let node = child.header(name, pattern);
    if node.is_empty() {
        return Err(SearchError::InvalidQuery(format!(
            "empty pattern for header '{name}'"
        )));
    }
    if negated && node.extended().is_some() {
        return Err(SearchError::InvalidQuery(format!(
            "header '{name}' is matched locally and cannot be negated"
        )));
    }
    Ok(node)
}

fn parse_flag(value: &str) -> Result<(Flag, bool)> {
    let parsed = match value.to_lowercase().as_str() {
        "seen" | "read" => (Flag::Seen, true),
        "unseen" | "unread" => (Flag::Seen, false),
        "answered" | "replied" => (Flag::Answered, true),
        "flagged" | "starred" => (Flag::Flagged, true),
        "deleted" => (Flag::Deleted, true),
        "draft" => (Flag::Draft, true),
        "recent" => (Flag::Recent, true),
        "old" => (Flag::Recent, false),
        "new" => (Flag::New, true),
        other => {
            return Err(SearchError::InvalidQuery(format!("unknown flag 'is:{other}'")));
        }
    };
    Ok(parsed)
}

/// Strip surrounding double quotes from a value.
fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// Tokenize input respecting quoted strings.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse a date string like `2024-01-04`.
fn parse_naive_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parse a size filter like `>1mb`, `<=100kb` or `=512`.
fn parse_size_filter(value: &str) -> Option<(SizeOp, u64)> {
    let (op, rest) = [">=", "<=", ">", "<", "="]
        .iter()
        .find_map(|sym| value.strip_prefix(sym).map(|rest| (*sym, rest)))?;
    let op: SizeOp = op.parse().ok()?;

    let rest_lower = rest.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = rest_lower.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = rest_lower.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = rest_lower.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = rest_lower.strip_suffix('b') {
        (n, 1u64)
    } else {
        (rest_lower.as_str(), 1u64)
    };

    let num: u64 = num_str.parse().ok()?;
    Some((op, num.checked_mul(multiplier)?))
}
