//! `mailsift`: boolean mail search over a protocol-level mail store.
//!
//! A [`query::SearchQuery`] tree is evaluated by a [`search::SearchEngine`]
//! against any [`store::MailStore`]. Whatever the store can search natively is
//! delegated to it; header criteria it cannot express are matched locally
//! over fetched headers, and size criteria over fetched overview data.
//! [`store::mbox::MboxStore`] is an offline store over MBOX files.

pub mod config;
pub mod error;
pub mod parser;
pub mod query;
pub mod search;
pub mod store;
