//! Frame encoder.

use crate::command::{FrameHeader, RawCommand};
use crate::error::{CodecError, CodecResult};

/// Largest header the two-digit prefix can describe.
pub const MAX_HEADER_LEN: usize = 99;

/// Encodes one command into a frame.
///
/// The frame is the two-digit header length, the header JSON
/// (`{"name":..,"valueLength":..}`) and then the value JSON, if any.
/// Non-ASCII characters are written as `\uXXXX` escapes, so the frame is
/// plain ASCII and its lengths agree in bytes, chars and UTF-16 units.
///
/// # Errors
///
/// Fails when the header does not fit in 1..=99 bytes or the value cannot
/// be serialized.
pub fn encode(command: &RawCommand) -> CodecResult<String> {
    let value_json = match &command.value {
        Some(value) => {
            let json =
                serde_json::to_string(value).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
            escape_non_ascii(json)
        }
        None => String::new(),
    };

    let header = FrameHeader {
        name: command.name.as_str().into(),
        value_length: value_json.len(),
    };
    let header_json =
        serde_json::to_string(&header).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    let header_json = escape_non_ascii(header_json);

    if header_json.is_empty() || header_json.len() > MAX_HEADER_LEN {
        return Err(CodecError::HeaderLength {
            length: header_json.len(),
        });
    }

    let mut frame = String::with_capacity(2 + header_json.len() + value_json.len());
    frame.push_str(&format!("{:02}", header_json.len()));
    frame.push_str(&header_json);
    frame.push_str(&value_json);
    Ok(frame)
}

/// Rewrites non-ASCII characters of serialized JSON as `\u` escapes.
///
/// serde_json only emits non-ASCII inside string literals, where an escape
/// is equivalent.
fn escape_non_ascii(json: String) -> String {
    if json.is_ascii() {
        return json;
    }
    let mut out = String::with_capacity(json.len() + 16);
    let mut units = [0u16; 2];
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

/// The encoded continuation marker. Servers append it to a response body
/// when more data is queued.
pub const MORE_FRAME: &str = r#"31{"name":"MORE","valueLength":0}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_bare_command() {
        let frame = encode(&RawCommand::bare("END_SCHEMA")).unwrap();
        assert_eq!(frame, r#"37{"name":"END_SCHEMA","valueLength":0}"#);
    }

    #[test]
    fn encode_more_marker() {
        assert_eq!(encode(&RawCommand::more()).unwrap(), MORE_FRAME);
    }

    #[test]
    fn encode_with_value_appends_json() {
        let frame = encode(&RawCommand::with_value("INSERT", json!(12))).unwrap();
        assert_eq!(frame, r#"33{"name":"INSERT","valueLength":2}12"#);
    }

    #[test]
    fn encode_escapes_non_ascii() {
        let frame = encode(&RawCommand::with_value("ROW", json!(["é", "🎉"]))).unwrap();
        assert!(frame.is_ascii());
        assert!(frame.ends_with(r#"["\u00e9","\ud83c\udf89"]"#));
        assert!(frame.contains(r#""valueLength":25}"#));
    }

    #[test]
    fn encode_rejects_long_names() {
        let name = "N".repeat(80);
        let err = encode(&RawCommand::bare(name)).unwrap_err();
        assert!(matches!(err, CodecError::HeaderLength { length } if length > 99));
    }
}
