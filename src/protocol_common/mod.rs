//! Shared seams for the protocol engine
//!
//! - [`ebcdic`] - strict EBCDIC code page conversion
//! - [`traits`] - the [`Transport`] and [`CodePageConverter`] injection points
//!
//! # Examples
//!
//! ```
//! use tn5250e::protocol_common::{converter_for, CodePageConverter};
//!
//! let cp = converter_for("37").unwrap();
//! assert_eq!(cp.to_unicode(0xC1).unwrap(), 'A');
//! assert_eq!(cp.to_ebcdic('A').unwrap(), 0xC1);
//! assert!(cp.to_unicode(0xFF).is_err());
//! ```

pub mod ebcdic;
pub mod traits;

pub use ebcdic::{converter_for, decode_text, encode_text, Cp037Converter};
pub use traits::{CodePageConverter, Transport};
