//! Compile the protocol-expressible part of a query node into native
//! search criteria.

use std::fmt;

use chrono::NaiveDate;

use super::{Criterion, SearchQuery};

/// Criteria string meaning "every message".
pub const ALL: &str = "ALL";

/// What a node contributes to native search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCriteria {
    /// Nothing protocol-expressible: no flags and no criterion.
    Empty,
    /// Flags and/or criterion, run as a single search.
    Query(String),
    /// Negated node. Both halves are searched separately and the result is
    /// `flags − criterion`; the protocol's own NOT is unreliable for
    /// compound keys.
    NegatedPair { flags: String, criterion: String },
}

impl NativeCriteria {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Display for NativeCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("(none)"),
            Self::Query(q) => f.write_str(q),
            Self::NegatedPair { flags, criterion } => write!(f, "[{flags}] minus [{criterion}]"),
        }
    }
}

/// Compile a node's flags, criterion and negation.
pub fn compile(query: &SearchQuery) -> NativeCriteria {
    let flags = query.flag_string();
    let criterion = query.criterion().map(render_criterion);

    match (criterion, query.is_negated()) {
        (None, _) if flags.is_empty() => NativeCriteria::Empty,
        (None, false) => NativeCriteria::Query(flags),
        // NOT flags: everything minus the flagged set.
        (None, true) => NativeCriteria::NegatedPair {
            flags: ALL.to_string(),
            criterion: flags,
        },
        (Some(criterion), false) => {
            if flags.is_empty() {
                NativeCriteria::Query(criterion)
            } else {
                NativeCriteria::Query(format!("{flags} {criterion}"))
            }
        }
        (Some(criterion), true) => NativeCriteria::NegatedPair {
            flags: if flags.is_empty() {
                ALL.to_string()
            } else {
                flags
            },
            criterion,
        },
    }
}

/// Render a single criterion in protocol syntax.
pub fn render_criterion(criterion: &Criterion) -> String {
    match criterion {
        Criterion::Header { field, pattern } => {
            format!("{} {}", field.as_atom(), quote(pattern))
        }
        Criterion::Body(text) => format!("BODY {}", quote(text)),
        Criterion::Text(text) => format!("TEXT {}", quote(text)),
        Criterion::Date { op, date } => format!("{} {}", op.as_atom(), imap_date(*date)),
    }
}

/// Quote a string argument, escaping `\` and `"`.
///
/// Text a quoted string cannot carry (CR, LF, NUL or 8-bit characters) is
/// sent as a non-synchronizing literal, `{n+}` followed by CRLF and the
/// `n` octets.
pub fn quote(value: &str) -> String {
    if needs_literal(value) {
        return format!("{{{}+}}\r\n{value}", value.len());
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

fn needs_literal(value: &str) -> bool {
    value
        .bytes()
        .any(|b| matches!(b, b'\r' | b'\n' | b'\0') || !b.is_ascii())
}

/// Format a date as a protocol date: `1-Feb-2024`.
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}

/// Human-readable evaluation plan for a query tree, one line per phase.
pub fn explain(query: &SearchQuery) -> String {
    let mut out = String::new();
    explain_node(query, 0, &mut out);
    out
}

fn explain_node(query: &SearchQuery, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    out.push_str(&format!("{pad}node\n"));

    let native = compile(query);
    if !native.is_empty() {
        out.push_str(&format!("{pad}  native: {native}\n"));
    }
    if let Some(ext) = query.extended() {
        out.push_str(&format!(
            "{pad}  header scan: {} contains {}\n",
            ext.name,
            quote(&ext.pattern)
        ));
    }
    if let Some(size) = query.size_filter() {
        out.push_str(&format!("{pad}  size {} {}\n", size.op, size.bytes));
    }
    if !query.and_children().is_empty() {
        out.push_str(&pad);
        out.push_str("  and:\n");
        for child in query.and_children() {
            explain_node(child, depth + 2, out);
        }
    }
    if !query.or_children().is_empty() {
        out.push_str(&pad);
        out.push_str("  or:\n");
        for child in query.or_children() {
            explain_node(child, depth + 2, out);
        }
    }
}
