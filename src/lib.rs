//! TN5250E protocol engine
//!
//! Negotiates a TN5250E telnet session, decodes the 5250 data stream into a
//! screen model with a format table and operator information area, and turns
//! keyboard text into outbound records. The engine never opens sockets:
//! bytes come and go through a caller-supplied [`Transport`].
//!
//! ```
//! use tn5250e::{ProtocolSession, SessionConfig};
//!
//! let session = ProtocolSession::new(SessionConfig::default()).unwrap();
//! // IAC DO TERMINAL-TYPE
//! let report = session.receive(&[255, 253, 24]).unwrap();
//! assert_eq!(report.outbound, vec![255, 251, 24]);
//! ```

/// Session configuration with JSON persistence
pub mod config;

/// Error types shared by every layer
pub mod error;

/// Keyboard mnemonics and the input processor
pub mod keyboard;

/// LIB5250: IBM 5250 protocol implementation
pub mod lib5250;

/// Code page conversion and the transport seam
pub mod protocol_common;

pub use config::SessionConfig;
pub use error::{
    CharacterConversionError, ConfigError, FieldValidationError, InputRejection, ProtocolError,
    Result, StreamDecodeError, Tn5250Error,
};
pub use keyboard::{KeyToken, KeyboardInputProcessor, Mnemonic};
pub use lib5250::{
    InputReport, OiaSnapshot, ProcessReport, ProtocolSession, ScreenEvent, ScreenListener,
};
pub use protocol_common::{converter_for, CodePageConverter, Transport};
