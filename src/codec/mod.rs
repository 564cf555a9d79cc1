//! Codec module - encoding of requests and decoding of replies.
//!
//! - [`LineCodec`] - command text to a newline-terminated request, reply bytes to text
//! - [`JsonCodec`] - structured replies via `serde_json`
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the session picks its encoding at compile time.
//!
//! # Example
//!
//! ```
//! use enginepipe::codec::{JsonCodec, LineCodec};
//!
//! let line = LineCodec::encode("s 0x100").unwrap();
//! assert_eq!(&line[..], b"s 0x100\n");
//! assert_eq!(LineCodec::decode(b"0x100\n"), "0x100");
//!
//! let values: Vec<u8> = JsonCodec::decode("[1,2]").unwrap();
//! assert_eq!(values, vec![1, 2]);
//! ```

mod json;
mod line;

pub use json::JsonCodec;
pub use line::LineCodec;
