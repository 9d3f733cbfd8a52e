//! MIME body extraction for content searches.

use mail_parser::MessageParser;

/// Decoded body text of a raw message, used for `BODY` and `TEXT` matching.
///
/// All text parts are concatenated; HTML-only parts are converted to text by
/// `mail-parser`. Messages `mail-parser` cannot parse fall back to everything
/// after the first blank line.
pub fn body_text(raw_message: &[u8]) -> String {
    let message_bytes = skip_from_line(raw_message);

    match MessageParser::default().parse(message_bytes) {
        Some(msg) => {
            let mut text = String::new();
            let mut index = 0;
            while let Some(part) = msg.body_text(index) {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&part);
                index += 1;
            }
            text
        }
        None => extract_body_fallback(message_bytes),
    }
}

/// Skip the `From ` separator line at the start of MBOX messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Everything after the first blank line.
fn extract_body_fallback(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    if let Some(pos) = text.find("\n\n") {
        text[pos + 2..].to_string()
    } else if let Some(pos) = text.find("\r\n\r\n") {
        text[pos + 4..].to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_from_line(data).starts_with(b"Subject:"));
        let bare = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(bare), bare);
    }

    #[test]
    fn test_body_text_plain() {
        let raw = b"From a@x Thu Jan  4 10:00:00 2024\nSubject: Hi\nContent-Type: text/plain\n\nQuarterly numbers attached.\n";
        assert!(body_text(raw).contains("Quarterly numbers"));
    }

    #[test]
    fn test_body_text_decodes_quoted_printable() {
        let raw = b"Subject: Hi\nContent-Type: text/plain; charset=utf-8\nContent-Transfer-Encoding: quoted-printable\n\nCaf=C3=A9 con le=C3=B1a\n";
        assert!(body_text(raw).contains("Café con leña"));
    }

    #[test]
    fn test_body_fallback() {
        assert_eq!(extract_body_fallback(b"A: b\n\nrest"), "rest");
        assert_eq!(extract_body_fallback(b"no separator"), "");
    }
}
