//! TN5250E protocol session
//!
//! [`ProtocolSession`] composes the telnet negotiator, the order decoder,
//! the screen model and the keyboard processor. Host bytes go in through
//! [`ProtocolSession::receive`]; keyboard text through
//! [`ProtocolSession::submit`]. Both return the framed bytes to send back.
//! Listener notifications are collected while the session lock is held and
//! dispatched after it has been released, so listeners may call back into
//! the session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::{CharacterConversionError, ConfigError, InputRejection, ProtocolError, Result};
use crate::keyboard::{KeyboardInputProcessor, SubmitReport};
use crate::lib5250::field::ScreenField;
use crate::lib5250::notifier::{ListenerId, ScreenChangeNotifier, ScreenEvent, ScreenListener};
use crate::lib5250::oia::OiaSnapshot;
use crate::lib5250::protocol::{OrderDecoder, ScreenState};
use crate::lib5250::telnet::{frame_record, OptionState, StreamStatus, TelnetNegotiator};
use crate::protocol_common::ebcdic::converter_for;
use crate::protocol_common::traits::{CodePageConverter, Transport};

/// Outcome of feeding host bytes to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    /// Framed bytes to send to the host
    pub outbound: Vec<u8>,
    pub status: StreamStatus,
    pub records_applied: usize,
    /// Data characters the code page could not map; their cells were skipped
    pub conversion_errors: Vec<CharacterConversionError>,
}

impl Default for ProcessReport {
    fn default() -> Self {
        Self {
            outbound: Vec::new(),
            status: StreamStatus::Complete,
            records_applied: 0,
            conversion_errors: Vec::new(),
        }
    }
}

/// Outcome of a keyboard submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputReport {
    /// Framed bytes to send to the host
    pub outbound: Vec<u8>,
    pub buffered: usize,
    pub rejection: Option<InputRejection>,
}

impl From<SubmitReport> for InputReport {
    fn from(report: SubmitReport) -> Self {
        Self {
            outbound: report.outbound.iter().flat_map(|record| frame_record(record)).collect(),
            buffered: report.buffered,
            rejection: report.rejection,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    screen: ScreenState,
    telnet: TelnetNegotiator,
    decoder: OrderDecoder,
    /// Record bytes received since the last `IAC EOR`
    record: Vec<u8>,
    /// Framed replies from a chunk that failed part way
    unsent: Vec<u8>,
    last_cursor: (usize, usize),
}

impl SessionState {
    fn receive(
        &mut self,
        input: &[u8],
        keyboard: &mut KeyboardInputProcessor,
        max_record_len: usize,
        report: &mut ProcessReport,
    ) -> Result<()> {
        report.outbound.append(&mut self.unsent);
        let output = match self.telnet.process(input) {
            Ok(output) => output,
            Err(err) => {
                report.outbound.extend(self.telnet.take_held_replies());
                return Err(err.into());
            }
        };
        report.outbound.extend_from_slice(&output.replies);
        report.status = output.status;

        let mut start = 0;
        for &end in &output.record_ends {
            self.record.extend_from_slice(&output.data[start..end]);
            start = end;
            self.check_record_len(max_record_len)?;
            let record = std::mem::take(&mut self.record);
            if record.is_empty() {
                continue;
            }

            let decoded = self.decoder.decode_record(&record, &mut self.screen);
            report.conversion_errors.extend(self.decoder.take_faults());
            let decoded = decoded.map_err(|err| {
                warn!("discarding rest of chunk: {err}");
                err
            })?;
            report.records_applied += 1;
            for reply in decoded.replies() {
                report.outbound.extend(frame_record(reply));
            }
        }
        self.record.extend_from_slice(&output.data[start..]);
        self.check_record_len(max_record_len)?;

        if self.screen.oia.is_unlocked() && keyboard.pending() > 0 {
            let replayed = keyboard.replay_pending(&mut self.screen);
            if let Some(rejection) = &replayed.rejection {
                debug!("buffered input rejected on replay: {rejection}");
            }
            for record in &replayed.outbound {
                report.outbound.extend(frame_record(record));
            }
        }
        Ok(())
    }

    fn check_record_len(&mut self, limit: usize) -> std::result::Result<(), ProtocolError> {
        if self.record.len() > limit {
            let length = self.record.len();
            self.record.clear();
            return Err(ProtocolError::OversizedRecord { length, limit });
        }
        Ok(())
    }

    /// Drain pending changes into listener events: size, region, cursor, OIA.
    fn collect_events(&mut self) -> Vec<ScreenEvent> {
        let mut events = Vec::new();
        if let Some((rows, cols)) = self.screen.buffer.take_size_changed() {
            events.push(ScreenEvent::SizeChanged { rows, cols });
        }
        if let Some(rect) = self.screen.buffer.consume_dirty() {
            events.push(ScreenEvent::RegionChanged(rect));
        }
        let cursor = self.screen.buffer.cursor();
        if cursor != self.last_cursor {
            self.last_cursor = cursor;
            events.push(ScreenEvent::CursorMoved { row: cursor.0, col: cursor.1 });
        }
        if self.screen.oia.take_changed() {
            let snapshot = self.screen.oia.snapshot();
            self.screen.oia.take_bell();
            events.push(ScreenEvent::OiaChanged(snapshot));
        }
        events
    }
}

/// One TN5250E session
pub struct ProtocolSession {
    config: SessionConfig,
    converter: Arc<dyn CodePageConverter>,
    state: RwLock<SessionState>,
    keyboard: Mutex<KeyboardInputProcessor>,
    notifier: ScreenChangeNotifier,
}

impl std::fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("terminal_type", &self.config.terminal_type)
            .field("code_page", &self.converter.name())
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl ProtocolSession {
    /// Validate `config` and build a session with the converter it names.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let converter = converter_for(&config.code_page).ok_or_else(|| ConfigError::InvalidValue {
            field: "code_page",
            reason: format!("unsupported code page {:?}", config.code_page),
        })?;
        Self::with_converter(config, converter)
    }

    /// Build a session around an injected converter. The code page named in
    /// `config` is ignored; everything else is validated.
    pub fn with_converter(config: SessionConfig, converter: Arc<dyn CodePageConverter>) -> Result<Self> {
        config.validate_terminal()?;
        let state = SessionState {
            screen: ScreenState::new(config.rows, config.cols),
            telnet: TelnetNegotiator::new(&config),
            decoder: OrderDecoder::new(Arc::clone(&converter), config.terminal_type.clone()),
            record: Vec::new(),
            unsent: Vec::new(),
            last_cursor: (0, 0),
        };
        debug!(
            "session created: {} {}x{}, code page {}",
            config.terminal_type,
            config.rows,
            config.cols,
            converter.name()
        );
        Ok(Self {
            keyboard: Mutex::new(KeyboardInputProcessor::new(Arc::clone(&converter))),
            state: RwLock::new(state),
            notifier: ScreenChangeNotifier::new(),
            converter,
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_keyboard(&self) -> MutexGuard<'_, KeyboardInputProcessor> {
        self.keyboard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one chunk of host bytes.
    ///
    /// On an error the rest of the chunk is discarded; changes applied
    /// before the error are still reported to listeners. Replies produced
    /// before the error are kept: they lead the next report's `outbound`, or
    /// can be collected at once with [`take_unsent`](Self::take_unsent).
    pub fn receive(&self, input: &[u8]) -> Result<ProcessReport> {
        trace!("received {} bytes", input.len());
        let mut report = ProcessReport::default();
        let (result, events) = {
            let mut keyboard = self.lock_keyboard();
            let mut state = self.write_state();
            let result =
                state.receive(input, &mut keyboard, self.config.max_record_len, &mut report);
            if result.is_err() && !report.outbound.is_empty() {
                debug!("holding {} reply bytes from the failed chunk", report.outbound.len());
                state.unsent.append(&mut report.outbound);
            }
            (result, state.collect_events())
        };
        self.notifier.dispatch_all(&events);
        result.map(|()| report)
    }

    /// Apply keyboard text. See [`KeyboardInputProcessor::submit`].
    pub fn submit(&self, text: &str) -> InputReport {
        let (report, events) = {
            let mut keyboard = self.lock_keyboard();
            let mut state = self.write_state();
            let report = keyboard.submit(text, &mut state.screen);
            (report, state.collect_events())
        };
        self.notifier.dispatch_all(&events);
        InputReport::from(report)
    }

    /// Apply keyboard text and send the result.
    pub fn submit_to(&self, text: &str, transport: &mut dyn Transport) -> Result<InputReport> {
        let report = self.submit(text);
        if !report.outbound.is_empty() {
            transport.send(&report.outbound)?;
        }
        Ok(report)
    }

    /// Replies owed to the host from a chunk that failed part way.
    pub fn take_unsent(&self) -> Vec<u8> {
        std::mem::take(&mut self.write_state().unsent)
    }

    /// One receive, process and reply round. An empty read is end of stream.
    /// When the chunk fails, replies produced before the failure are still sent.
    pub fn pump(&self, transport: &mut dyn Transport) -> Result<ProcessReport> {
        let input = transport.receive()?;
        if input.is_empty() {
            self.end_of_stream()?;
            return Ok(ProcessReport::default());
        }
        let report = match self.receive(&input) {
            Ok(report) => report,
            Err(err) => {
                let unsent = self.take_unsent();
                if !unsent.is_empty() {
                    transport.send(&unsent)?;
                }
                return Err(err);
            }
        };
        if !report.outbound.is_empty() {
            transport.send(&report.outbound)?;
        }
        Ok(report)
    }

    /// The host closed the stream. Fails if it stopped inside a subnegotiation.
    pub fn end_of_stream(&self) -> Result<()> {
        let mut state = self.write_state();
        if !state.record.is_empty() {
            warn!("stream ended with {} bytes of an unterminated record", state.record.len());
            state.record.clear();
        }
        state.telnet.end_of_stream()?;
        Ok(())
    }

    pub fn subscribe(&self, listener: Arc<dyn ScreenListener>) -> ListenerId {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Run `f` against the current screen under the read lock.
    pub fn with_screen<R>(&self, f: impl FnOnce(&ScreenState) -> R) -> R {
        f(&self.read_state().screen)
    }

    pub fn screen_text(&self) -> String {
        self.with_screen(|screen| screen.buffer.to_string())
    }

    pub fn row_text(&self, row: usize) -> Option<String> {
        self.with_screen(|screen| screen.buffer.row_text(row))
    }

    pub fn size(&self) -> (usize, usize) {
        self.with_screen(|screen| (screen.buffer.rows(), screen.buffer.cols()))
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.with_screen(|screen| screen.buffer.cursor())
    }

    pub fn oia(&self) -> OiaSnapshot {
        self.with_screen(|screen| screen.oia.snapshot())
    }

    pub fn fields(&self) -> Vec<ScreenField> {
        self.with_screen(|screen| screen.fields.fields_in_order().cloned().collect())
    }

    pub fn field_at(&self, row: usize, col: usize) -> Option<ScreenField> {
        self.with_screen(|screen| screen.fields.field_at(row, col).cloned())
    }

    pub fn option_state(&self, option: u8) -> OptionState {
        self.read_state().telnet.option_state(option)
    }

    pub fn is_negotiation_complete(&self) -> bool {
        self.read_state().telnet.is_negotiation_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib5250::codes::{CC2_UNLOCK, CMD_CLEAR_UNIT, CMD_WRITE_TO_DISPLAY, ESC, OPCODE_PUT_GET, SBA};
    use crate::lib5250::oia::{KeyboardState, LockReason};
    use crate::lib5250::protocol::build_record;
    use crate::lib5250::telnet::{DO, IAC, WILL};

    fn session() -> ProtocolSession {
        ProtocolSession::new(SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_negotiation_reply_in_report() {
        let report = session().receive(&[IAC, DO, 24]).unwrap();
        assert_eq!(report.outbound, vec![IAC, WILL, 24]);
        assert_eq!(report.records_applied, 0);
    }

    #[test]
    fn test_record_applied_to_screen() {
        let session = session();
        let record = build_record(0, OPCODE_PUT_GET, &[ESC, CMD_WRITE_TO_DISPLAY, 0, 0, SBA, 1, 1, 0xC8, 0xC9]);
        let report = session.receive(&frame_record(&record)).unwrap();
        assert_eq!(report.records_applied, 1);
        assert_eq!(session.row_text(0).unwrap().trim_end(), "HI");
    }

    #[test]
    fn test_record_split_across_chunks() {
        let session = session();
        let framed = frame_record(&build_record(0, OPCODE_PUT_GET, &[ESC, CMD_CLEAR_UNIT]));
        let (first, second) = framed.split_at(5);
        assert_eq!(session.receive(first).unwrap().records_applied, 0);
        assert_eq!(session.receive(second).unwrap().records_applied, 1);
        assert_eq!(session.oia().state, KeyboardState::Locked(LockReason::HostOutput));
    }

    #[test]
    fn test_oversized_record_rejected() {
        let config = SessionConfig { max_record_len: 16, ..SessionConfig::default() };
        let session = ProtocolSession::new(config).unwrap();
        let err = session.receive(&[0x40; 32]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Tn5250Error::Protocol(ProtocolError::OversizedRecord { limit: 16, .. })
        ));
    }

    #[test]
    fn test_buffered_keys_replay_after_unlock() {
        let session = session();
        session.receive(&frame_record(&build_record(0, OPCODE_PUT_GET, &[ESC, CMD_CLEAR_UNIT]))).unwrap();
        let report = session.submit("[enter]");
        assert_eq!(report.buffered, 1);
        let unlock = build_record(0, OPCODE_PUT_GET, &[ESC, CMD_WRITE_TO_DISPLAY, 0, CC2_UNLOCK]);
        let report = session.receive(&frame_record(&unlock)).unwrap();
        // The replayed Enter is framed after the unlock is applied.
        assert!(report.outbound.ends_with(&[IAC, crate::lib5250::telnet::EOR]));
        assert_eq!(session.oia().state, KeyboardState::Locked(LockReason::HostOutput));
        assert!(!session.oia().keys_buffered);
    }
}
