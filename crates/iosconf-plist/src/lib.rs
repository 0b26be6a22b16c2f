//! Property lists for iosconf.
//!
//! This crate holds the small property-list toolkit the resolution engine
//! builds on. It is kept separate from `iosconf-sdk` so it stays free of
//! filesystem and process concerns.
//!
//! ## Overview
//!
//! | Item | Description |
//! |------|-------------|
//! | [`Value`] | Typed property-list leaf or container |
//! | [`Dictionary`] | Insertion-ordered string-keyed mapping |
//! | [`to_xml_string`] | XML property-list encoding |
//! | [`from_xml_str`] | XML property-list decoding |
//! | [`from_embedded_bytes`] | Decoding of a plist embedded in a signed blob |
//!
//! ## Example
//!
//! ```
//! use iosconf_plist::{Dictionary, Value, from_xml_str, to_xml_string};
//!
//! let mut dict = Dictionary::new();
//! dict.insert("CFBundleName", "Hello");
//! dict.insert("UIPrerenderedIcon", false);
//!
//! let xml = to_xml_string(&Value::Dictionary(dict.clone()));
//! let parsed = from_xml_str(&xml)?;
//! assert_eq!(parsed, Value::Dictionary(dict));
//! # Ok::<(), iosconf_plist::PlistError>(())
//! ```

mod reader;
mod value;
mod writer;

pub use reader::{from_embedded_bytes, from_xml_str};
pub use value::{Dictionary, Value};
pub use writer::to_xml_string;

/// Errors raised while decoding a property list.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlistError {
    /// The document ended in the middle of a value.
    #[error("unexpected end of property list while reading {0}")]
    UnexpectedEof(String),

    /// A tag, comment or declaration was opened but never closed.
    #[error("unterminated markup starting at byte {0}")]
    Unterminated(usize),

    /// An element appeared where a different one was required.
    #[error("unexpected element `{found}' (expected {expected})")]
    UnexpectedElement {
        /// What the reader was looking for.
        expected: String,
        /// What it found instead.
        found: String,
    },

    /// Character data appeared between elements.
    #[error("unexpected text {0:?} outside of a value element")]
    UnexpectedText(String),

    /// A scalar element held text that does not parse as its type.
    #[error("invalid <{element}> value {value:?}")]
    InvalidValue {
        /// Element name, e.g. `integer`.
        element: &'static str,
        /// The offending text.
        value: String,
    },

    /// No `<plist>` document could be located inside the input.
    #[error("no property list found in document")]
    NotFound,
}
