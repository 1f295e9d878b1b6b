//! Large-object framing.
//!
//! A LOB travels as one or more `LOB` commands. Text is split by
//! character and its `totalLength` counts UTF-16 code units. Binary is
//! hex-encoded first, split on even boundaries, and its `totalLength`
//! counts decoded bytes. Inbound binary chunks may split a byte; only the
//! accumulated hex length is checked.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::SyncLob;

/// A complete LOB value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobPayload {
    /// Character data.
    Text(String),
    /// Binary data.
    Binary(Vec<u8>),
}

impl LobPayload {
    /// Returns true if the payload has no content.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::Binary(b) => b.is_empty(),
        }
    }
}

/// Splits a payload into frames of at most `chunk_size` characters.
///
/// An absent or empty payload becomes a single `isNull` frame with a
/// total length of 0.
pub fn lob_frames(payload: Option<&LobPayload>, is_binary: bool, chunk_size: usize) -> Vec<SyncLob> {
    let payload = match payload {
        Some(p) if !p.is_empty() => p,
        _ => {
            return vec![SyncLob {
                is_binary,
                is_null: true,
                total_length: 0,
                txt_payload: None,
            }]
        }
    };

    let (text, is_binary, total_length, chunk_size) = match payload {
        LobPayload::Binary(bytes) => {
            // Hex chunks must hold whole bytes.
            let chunk = (chunk_size.max(2) / 2) * 2;
            (hex::encode(bytes), true, bytes.len() as u64, chunk)
        }
        LobPayload::Text(text) => (
            text.clone(),
            false,
            text.encode_utf16().count() as u64,
            chunk_size.max(1),
        ),
    };

    chunk_chars(&text, chunk_size)
        .into_iter()
        .map(|chunk| SyncLob {
            is_binary,
            is_null: false,
            total_length,
            txt_payload: Some(chunk.to_string()),
        })
        .collect()
}

fn chunk_chars(text: &str, chunk_size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == chunk_size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Progress reported by [`LobAssembler::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobProgress {
    /// More frames are needed.
    Pending,
    /// The value is complete; `None` means SQL NULL.
    Complete(Option<LobPayload>),
}

/// Reassembles a LOB from its frames.
#[derive(Debug, Default)]
pub struct LobAssembler {
    is_binary: bool,
    total_length: u64,
    /// Hex characters for binary, UTF-16 units for text.
    received_units: u64,
    buffer: String,
}

impl LobAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one frame.
    ///
    /// # Errors
    ///
    /// Fails if the accumulated length passes the announced total, or if a
    /// completed binary payload is not valid hex.
    pub fn push(&mut self, frame: SyncLob) -> ProtocolResult<LobProgress> {
        if frame.is_null {
            return Ok(LobProgress::Complete(None));
        }
        self.is_binary = frame.is_binary;
        self.total_length = frame.total_length;
        if frame.total_length == 0 {
            return Ok(LobProgress::Complete(Some(self.empty_payload())));
        }

        let chunk = frame.txt_payload.unwrap_or_default();
        self.received_units += if self.is_binary {
            chunk.len() as u64
        } else {
            chunk.encode_utf16().count() as u64
        };
        self.buffer.push_str(&chunk);

        let expected_units = if self.is_binary {
            self.total_length.saturating_mul(2)
        } else {
            self.total_length
        };
        if self.received_units > expected_units {
            return Err(ProtocolError::LobOvershoot {
                expected: self.total_length,
                received: self.received(),
            });
        }
        if self.received_units < expected_units {
            return Ok(LobProgress::Pending);
        }

        let text = std::mem::take(&mut self.buffer);
        let payload = if self.is_binary {
            LobPayload::Binary(hex::decode(text)?)
        } else {
            LobPayload::Text(text)
        };
        Ok(LobProgress::Complete(Some(payload)))
    }

    /// Error describing a stream that ended before completion.
    pub fn truncated(&self) -> ProtocolError {
        ProtocolError::LobTruncated {
            expected: self.total_length,
            received: self.received(),
        }
    }

    /// Received length in `totalLength` units, rounding a partial byte up.
    fn received(&self) -> u64 {
        if self.is_binary {
            self.received_units.div_ceil(2)
        } else {
            self.received_units
        }
    }

    fn empty_payload(&self) -> LobPayload {
        if self.is_binary {
            LobPayload::Binary(Vec::new())
        } else {
            LobPayload::Text(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assemble(frames: Vec<SyncLob>) -> ProtocolResult<Option<LobPayload>> {
        let mut assembler = LobAssembler::new();
        for frame in frames {
            if let LobProgress::Complete(value) = assembler.push(frame)? {
                return Ok(value);
            }
        }
        Err(assembler.truncated())
    }

    #[test]
    fn absent_payload_is_single_null_frame() {
        let frames = lob_frames(None, true, 16);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_null);
        assert_eq!(frames[0].total_length, 0);
        assert_eq!(assemble(frames).unwrap(), None);
    }

    #[test]
    fn binary_counts_bytes_not_hex_chars() {
        let payload = LobPayload::Binary((0u8..10).collect());
        let frames = lob_frames(Some(&payload), true, 7);
        // 20 hex chars in chunks of 6
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.total_length == 10));
        assert_eq!(assemble(frames).unwrap(), Some(payload));
    }

    #[test]
    fn binary_chunks_may_split_a_byte() {
        let frame = |hex: &str| SyncLob {
            is_binary: true,
            is_null: false,
            total_length: 2,
            txt_payload: Some(hex.into()),
        };
        let mut assembler = LobAssembler::new();
        assert_eq!(assembler.push(frame("abc")).unwrap(), LobProgress::Pending);
        assert_eq!(
            assembler.push(frame("d")).unwrap(),
            LobProgress::Complete(Some(LobPayload::Binary(vec![0xab, 0xcd])))
        );
    }

    #[test]
    fn binary_overshoot_by_one_hex_char_is_rejected() {
        let frames = vec![SyncLob {
            is_binary: true,
            is_null: false,
            total_length: 2,
            txt_payload: Some("abcde".into()),
        }];
        assert!(matches!(
            assemble(frames),
            Err(ProtocolError::LobOvershoot {
                expected: 2,
                received: 3
            })
        ));
    }

    #[test]
    fn text_length_counts_utf16_units() {
        let payload = LobPayload::Text("a🎉é".into());
        let frames = lob_frames(Some(&payload), false, 2);
        assert!(frames.iter().all(|f| f.total_length == 4));
        assert_eq!(assemble(frames).unwrap(), Some(payload));
    }

    #[test]
    fn overshoot_is_rejected() {
        let frames = vec![SyncLob {
            is_binary: false,
            is_null: false,
            total_length: 3,
            txt_payload: Some("abcd".into()),
        }];
        assert!(matches!(
            assemble(frames),
            Err(ProtocolError::LobOvershoot {
                expected: 3,
                received: 4
            })
        ));
    }

    #[test]
    fn short_stream_is_rejected() {
        let mut frames = lob_frames(Some(&LobPayload::Text("hello world".into())), false, 4);
        frames.pop();
        assert!(matches!(
            assemble(frames),
            Err(ProtocolError::LobTruncated { expected: 11, .. })
        ));
    }

    proptest! {
        #[test]
        fn text_reassembles(text in ".{1,200}", chunk in 1usize..50) {
            let payload = LobPayload::Text(text);
            let frames = lob_frames(Some(&payload), false, chunk);
            prop_assert_eq!(assemble(frames).unwrap(), Some(payload));
        }
    }
}
