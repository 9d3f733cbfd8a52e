//! Streaming MBOX scanner.
//!
//! Reads MBOX files line-by-line with a large buffer and reports, for each
//! message, where it lives in the file and its header block. Bodies are never
//! held in memory; they are read back on demand with [`read_message_at`].

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, SearchError};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Report progress every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// Location and headers of one message inside an MBOX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSpan {
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    /// Total length, separator line included.
    pub length: u64,
    /// Length of the `From ` separator line itself.
    pub from_line_len: u64,
    /// Separator line plus header block, up to (not including) the blank line.
    pub header: Vec<u8>,
}

impl MessageSpan {
    /// Size of the RFC 5322 message, without the mbox separator line.
    pub fn message_size(&self) -> u64 {
        self.length.saturating_sub(self.from_line_len)
    }

    /// The `From ` separator line, without line ending.
    pub fn from_line(&self) -> String {
        let end = (self.from_line_len as usize).min(self.header.len());
        String::from_utf8_lossy(&self.header[..end])
            .trim_end()
            .to_string()
    }
}

/// Streaming MBOX scanner.
///
/// Tolerant of mixed `\n`/`\r\n` line endings, `From ` lines not preceded by
/// a blank line (logged), messages whose headers never end, and a UTF-8 BOM.
pub struct MboxScanner {
    path: PathBuf,
    file_size: u64,
}

impl MboxScanner {
    /// Create a scanner for the given MBOX file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| SearchError::io(&path, e))?;
        Ok(Self {
            path,
            file_size: metadata.len(),
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the file, calling `on_message` for each message in order.
    ///
    /// The callback returns `false` to stop early. `progress` receives
    /// `(bytes_read, file_size)`. Returns the number of messages reported.
    pub fn scan(
        &self,
        on_message: &mut dyn FnMut(MessageSpan) -> bool,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| SearchError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut offset: u64 = 0;
        let mut last_progress: u64 = 0;
        let mut prev_line_was_empty = true;
        let mut current: Option<MessageSpan> = None;
        let mut in_headers = false;
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let line_len = {
                let buf = reader
                    .fill_buf()
                    .map_err(|e| SearchError::io(&self.path, e))?;
                if buf.is_empty() {
                    break;
                }
                let consume_len = match buf.iter().position(|&b| b == b'\n') {
                    Some(pos) => pos + 1,
                    None => buf.len(),
                };
                line_buf.extend_from_slice(&buf[..consume_len]);
                reader.consume(consume_len);
                consume_len as u64
            };

            if is_mbox_separator(&line_buf) {
                if current.is_some() && !prev_line_was_empty {
                    warn!(offset, "Found 'From ' separator without preceding blank line");
                }
                if let Some(mut done) = current.take() {
                    done.length = offset - done.offset;
                    count += 1;
                    if !on_message(done) {
                        return Ok(count);
                    }
                }
                current = Some(MessageSpan {
                    offset,
                    length: 0,
                    from_line_len: line_len,
                    header: line_buf.clone(),
                });
                in_headers = true;
            } else if in_headers {
                if is_blank_line(&line_buf) {
                    in_headers = false;
                } else if let Some(span) = current.as_mut() {
                    span.header.extend_from_slice(&line_buf);
                }
            } else if current.is_none() && offset == 0 {
                warn!(path = %self.path.display(), "File does not start with a 'From ' line");
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            offset += line_len;

            if let Some(cb) = progress {
                if offset - last_progress >= PROGRESS_INTERVAL {
                    cb(offset, self.file_size);
                    last_progress = offset;
                }
            }
        }

        if let Some(mut done) = current.take() {
            done.length = offset - done.offset;
            count += 1;
            on_message(done);
        }

        if let Some(cb) = progress {
            cb(self.file_size, self.file_size);
        }

        Ok(count)
    }
}

/// Read `length` bytes at `offset`.
pub fn read_message_at(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| SearchError::io(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| SearchError::io(path, e))?;
    let mut buffer = vec![0u8; length as usize];
    file.read_exact(&mut buffer)
        .map_err(|e| SearchError::io(path, e))?;
    Ok(buffer)
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
