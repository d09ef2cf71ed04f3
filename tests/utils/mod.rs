//! Shared helpers for the integration tests: record builders, a scripted
//! transport and a listener that records every event.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use tn5250e::lib5250::codes::{CMD_WRITE_TO_DISPLAY, ESC, OPCODE_PUT_GET, SBA, SF};
use tn5250e::lib5250::{build_record, frame_record, ScreenEvent, ScreenListener};
use tn5250e::protocol_common::{encode_text, Cp037Converter};
use tn5250e::Transport;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Text as code page 37 bytes.
pub fn ebcdic(text: &str) -> Vec<u8> {
    encode_text(&Cp037Converter, text).expect("test text must be encodable")
}

/// `ESC WTD cc1 cc2` followed by `orders`.
pub fn wtd(cc1: u8, cc2: u8, orders: &[u8]) -> Vec<u8> {
    let mut data = vec![ESC, CMD_WRITE_TO_DISPLAY, cc1, cc2];
    data.extend_from_slice(orders);
    data
}

/// Set Buffer Address to a 1-based position.
pub fn sba(row: u8, col: u8) -> Vec<u8> {
    vec![SBA, row, col]
}

/// Start of Field with format words, attribute and length.
pub fn sf(ffw1: u8, ffw2: u8, attribute: u8, length: u16) -> Vec<u8> {
    let mut order = vec![SF, ffw1, ffw2, attribute];
    order.extend_from_slice(&length.to_be_bytes());
    order
}

/// Record data as a complete GDS record.
pub fn record(data: &[u8]) -> Vec<u8> {
    build_record(0, OPCODE_PUT_GET, data)
}

/// Record data as it arrives on the wire: header, IAC doubling and `IAC EOR`.
pub fn wire(data: &[u8]) -> Vec<u8> {
    frame_record(&record(data))
}

/// Transport that replays scripted host chunks and keeps everything sent.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self { inbound: chunks.into_iter().collect(), sent: Vec::new() }
    }
}

impl Transport for ScriptedTransport {
    fn receive(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.inbound.pop_front().unwrap_or_default())
    }

    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.sent.push(data.to_vec());
        Ok(())
    }
}

/// Listener that stores every event it sees.
pub fn recorder() -> (Arc<Mutex<Vec<ScreenEvent>>>, Arc<dyn ScreenListener>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn ScreenListener> =
        Arc::new(move |event: &ScreenEvent| sink.lock().unwrap().push(event.clone()));
    (seen, listener)
}
