//! # Outpost Codec
//!
//! Length-prefixed text framing for Outpost sync commands.
//!
//! A frame is laid out as:
//!
//! ```text
//! ┌────────┬──────────────────────────────────┬──────────────┐
//! │ NN     │ {"name":"..","valueLength":L}    │ value JSON   │
//! │ 2 digit│ NN units                         │ L units      │
//! └────────┴──────────────────────────────────┴──────────────┘
//! ```
//!
//! Lengths count UTF-16 code units. Encoded frames escape non-ASCII
//! characters, so for them units and bytes coincide.
//!
//! The header must fit in 1..=99 units. A frame with `valueLength` 0
//! carries no value. The `MORE` command is a transport continuation
//! marker and is skipped by [`FrameCursor`].
//!
//! ## Usage
//!
//! ```
//! use outpost_codec::{encode, decode_all, RawCommand};
//! use serde_json::json;
//!
//! let frame = encode(&RawCommand::with_value("INSERT", json!(7))).unwrap();
//! let commands = decode_all(&frame).unwrap();
//! assert_eq!(commands[0].value, Some(json!(7)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod decoder;
mod encoder;
mod error;

pub use command::{RawCommand, MORE};
pub use decoder::{decode, decode_all, FrameCursor};
pub use encoder::{encode, MAX_HEADER_LEN, MORE_FRAME};
pub use error::{CodecError, CodecResult};
