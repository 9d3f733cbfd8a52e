//! Email parsing: MBOX scanning, header decoding, and MIME body extraction.

pub mod header;
pub mod mbox;
pub mod mime;
