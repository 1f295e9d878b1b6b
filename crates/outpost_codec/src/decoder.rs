//! Frame decoder.

use crate::command::{FrameHeader, RawCommand};
use crate::encoder::MAX_HEADER_LEN;
use crate::error::{CodecError, CodecResult};

/// Decodes the frame starting at `*cursor` and advances the cursor past it.
///
/// This does not skip continuation markers; see [`FrameCursor`] for that.
///
/// # Errors
///
/// Returns an error for a non-numeric or out-of-range length prefix, a
/// truncated frame, or unparsable header/value JSON. The cursor is left
/// untouched on error.
pub fn decode(buf: &str, cursor: &mut usize) -> CodecResult<RawCommand> {
    let start = *cursor;
    let prefix = slice(buf, start, 2)?;
    let header_len = parse_prefix(prefix, start)?;

    let header_start = start + prefix.len();
    let header_json = slice(buf, header_start, header_len)?;
    let header: FrameHeader<'_> = serde_json::from_str(header_json)
        .map_err(|e| CodecError::malformed_header(e.to_string()))?;

    let value_start = header_start + header_json.len();
    let value_json = slice(buf, value_start, header.value_length)?;
    let value = if value_json.is_empty() {
        None
    } else {
        let value = serde_json::from_str(value_json).map_err(|e| CodecError::MalformedValue {
            name: header.name.to_string(),
            message: e.to_string(),
        })?;
        Some(value)
    };

    *cursor = value_start + value_json.len();
    Ok(RawCommand {
        name: header.name.into_owned(),
        value,
    })
}

fn parse_prefix(prefix: &str, offset: usize) -> CodecResult<usize> {
    let invalid = || CodecError::InvalidLengthPrefix {
        prefix: prefix.to_string(),
        offset,
    };
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let len: usize = prefix.parse().map_err(|_| invalid())?;
    if len == 0 || len > MAX_HEADER_LEN {
        return Err(CodecError::HeaderLength { length: len });
    }
    Ok(len)
}

/// Takes `units` UTF-16 code units of `buf` starting at byte `offset`.
///
/// Lengths on the wire count UTF-16 units, so a peer that sends raw
/// non-ASCII text still frames correctly. The walk is bounded by the
/// buffer, never by the untrusted length.
fn slice(buf: &str, offset: usize, units: usize) -> CodecResult<&str> {
    let rest = buf.get(offset..).ok_or_else(|| eof(buf, offset, units))?;
    let mut counted = 0usize;
    for (idx, ch) in rest.char_indices() {
        if counted == units {
            return Ok(&rest[..idx]);
        }
        counted += ch.len_utf16();
        if counted > units {
            return Err(CodecError::SplitCharacter { offset: offset + idx });
        }
    }
    if counted == units {
        Ok(rest)
    } else {
        Err(eof(buf, offset, units))
    }
}

fn eof(buf: &str, offset: usize, needed: usize) -> CodecError {
    CodecError::UnexpectedEof {
        offset,
        needed,
        available: buf.get(offset..).map_or(0, |rest| rest.encode_utf16().count()),
    }
}

/// A cursor over a buffer of concatenated frames.
///
/// Continuation markers are skipped transparently, so protocol code only
/// ever sees real commands.
#[derive(Debug)]
pub struct FrameCursor<'a> {
    buf: &'a str,
    pos: usize,
}

impl<'a> FrameCursor<'a> {
    /// Creates a cursor at the start of `buf`.
    pub fn new(buf: &'a str) -> Self {
        Self { buf, pos: 0 }
    }

    /// Creates a cursor at a byte offset into `buf`.
    pub fn at(buf: &'a str, pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns true when every frame has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Decodes the next non-`MORE` command, or `None` at end of buffer.
    pub fn next_command(&mut self) -> CodecResult<Option<RawCommand>> {
        while !self.is_exhausted() {
            let command = decode(self.buf, &mut self.pos)?;
            if !command.is_more() {
                return Ok(Some(command));
            }
        }
        Ok(None)
    }
}

/// Decodes every command in `buf`, dropping continuation markers.
pub fn decode_all(buf: &str) -> CodecResult<Vec<RawCommand>> {
    let mut cursor = FrameCursor::new(buf);
    let mut commands = Vec::new();
    while let Some(command) = cursor.next_command()? {
        commands.push(command);
    }
    Ok(commands)
}
