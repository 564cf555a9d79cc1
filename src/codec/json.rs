//! JSON codec for structured replies, using `serde_json`.
//!
//! # Example
//!
//! ```
//! use enginepipe::codec::JsonCodec;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Debug, PartialEq)]
//! struct Entry {
//!     vaddr: u64,
//! }
//!
//! let entries: Vec<Entry> = JsonCodec::decode(r#"[{"vaddr":4096}]"#).unwrap();
//! assert_eq!(entries, vec![Entry { vaddr: 4096 }]);
//! ```

use crate::error::Result;

/// JSON codec for structured engine output.
pub struct JsonCodec;

impl JsonCodec {
    /// Decode JSON text to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid JSON for type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode a value as compact JSON.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }
}
