// Newline-delimited message framing.
//
// The arena server sends one JSON object per line; a message boundary is
// exactly one `\n`. TCP delivers arbitrary chunks, so `LineAssembler`
// buffers partial trailing data across receive events and yields only
// complete lines. `write_line` is the outbound counterpart: payload plus a
// terminating newline in a single write.
//
// A `MAX_LINE_LEN` guard (1 MiB) protects against unbounded buffering if the
// server (or something pretending to be it) streams data with no newline.
// Game-update lines are the largest expected messages and stay well under
// a few kilobytes.

use std::io::{self, Write};

use tracing::warn;

/// Maximum allowed length of a single unterminated line (1 MiB).
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Reassembles newline-delimited messages from arbitrary byte chunks.
#[derive(Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received chunk and return every line it completes, in order.
    /// The terminating newline is stripped. Partial trailing data is retained
    /// for the next call. Lines that are not valid UTF-8 are logged and
    /// dropped, like any other unparsable line.
    ///
    /// Returns `InvalidData` if the retained partial line exceeds
    /// `MAX_LINE_LEN`; the connection should be treated as failed.
    pub fn push(&mut self, data: &[u8]) -> io::Result<Vec<String>> {
        self.buf.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            match std::str::from_utf8(&line[..pos]) {
                Ok(text) => lines.push(text.to_owned()),
                // A non-UTF-8 line cannot be a valid protocol message.
                // Replacement characters must not reach parsed fields like
                // nicknames.
                Err(e) => warn!("dropping non-UTF-8 line: {e}"),
            }
        }

        if self.buf.len() > MAX_LINE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "unterminated line too long: {} bytes (max {MAX_LINE_LEN})",
                    self.buf.len()
                ),
            ));
        }
        Ok(lines)
    }

    /// Bytes currently buffered without a terminating newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Write one message line: payload followed by `\n`, flushed, as a single
/// write. Rejects payloads containing embedded newlines — those would split
/// into two wire messages.
pub fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    if line.contains('\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "message payload contains an embedded newline",
        ));
    }
    let mut framed = Vec::with_capacity(line.len() + 1);
    framed.extend_from_slice(line.as_bytes());
    framed.push(b'\n');
    writer.write_all(&framed)?;
    writer.flush()
}
