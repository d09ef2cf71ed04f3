//! 5250 protocol engine
//!
//! Layered the way lib5250 layers it: telnet framing, the record and order
//! decoder, the screen and format table, the OIA and the session that ties
//! them together.

pub mod codes;
pub mod display;
pub mod field;
pub mod notifier;
pub mod oia;
pub mod protocol;
pub mod session;
pub mod stream;
pub mod telnet;

pub use display::{DirtyRect, ScreenBuffer, ScreenCell};
pub use field::{FieldAdjust, FieldFormat, FieldShift, FieldTable, ScreenField};
pub use notifier::{ListenerId, ScreenChangeNotifier, ScreenEvent, ScreenListener};
pub use oia::{KeyboardState, LockReason, Oia, OiaSnapshot};
pub use protocol::{
    build_record, DecodedOrder, DecodedRecord, FieldSelection, OrderDecoder, RecordHeader,
    ScreenState,
};
pub use session::{InputReport, ProcessReport, ProtocolSession};
pub use stream::StreamCursor;
pub use telnet::{
    escape, frame_record, NegotiationState, OptionState, StreamStatus, TelnetNegotiator,
    TelnetOption, TelnetOutput,
};
