//! Trait seams between the protocol engine and its environment
//!
//! The engine never opens sockets and never hard-codes a code page. Both are
//! injected through the traits in this module.

use std::io;

use crate::error::CharacterConversionError;

/// Byte transport carrying the telnet stream
///
/// Implementations wrap a socket, a TLS stream or a test double. The engine
/// calls [`receive`](Transport::receive) for the next chunk of host bytes
/// and [`send`](Transport::send) for framed replies.
pub trait Transport {
    /// Receive the next chunk of bytes from the host
    ///
    /// # Returns
    ///
    /// The bytes read. An empty vector means the host closed the stream.
    fn receive(&mut self) -> io::Result<Vec<u8>>;

    /// Send bytes to the host
    ///
    /// # Arguments
    ///
    /// * `data` - Fully framed telnet bytes (IAC doubled, records terminated)
    fn send(&mut self, data: &[u8]) -> io::Result<()>;
}

/// EBCDIC <-> Unicode conversion for one code page
///
/// A session holds exactly one converter for its lifetime. Both directions
/// fail with [`CharacterConversionError`] rather than substituting a
/// placeholder character.
pub trait CodePageConverter: Send + Sync {
    /// Code page identifier, e.g. "37"
    fn name(&self) -> &'static str;

    /// Convert one EBCDIC byte to a Unicode character
    fn to_unicode(&self, byte: u8) -> Result<char, CharacterConversionError>;

    /// Convert one Unicode character to an EBCDIC byte
    fn to_ebcdic(&self, ch: char) -> Result<u8, CharacterConversionError>;
}
