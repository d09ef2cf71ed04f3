//! Telnet negotiation for TN5250E
//!
//! Splits the raw host stream into 5250 record bytes and telnet commands,
//! answers option requests against a whitelist and reports where records
//! end (`IAC EOR`). Parsing is a byte-at-a-time state machine, so commands
//! and subnegotiations may straddle chunk boundaries.
use std::collections::HashMap;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::ProtocolError;

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const GA: u8 = 249;
pub const NOP: u8 = 241;
pub const SE: u8 = 240;
pub const EOR: u8 = 239;

/// TERMINAL-TYPE subcommands (RFC 1091)
pub const TTYPE_IS: u8 = 0;
pub const TTYPE_SEND: u8 = 1;

/// NEW-ENVIRON subcommands and item types (RFC 1572)
pub const ENV_IS: u8 = 0;
pub const ENV_SEND: u8 = 1;
pub const ENV_VAR: u8 = 0;
pub const ENV_VALUE: u8 = 1;
pub const ENV_ESC: u8 = 2;
pub const ENV_USERVAR: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelnetOption {
    Binary = 0,
    Echo = 1,
    SuppressGoAhead = 3,
    TerminalType = 24,
    EndOfRecord = 25,
    NewEnviron = 39,
    Tn5250e = 40,
}

impl TelnetOption {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TelnetOption::Binary),
            1 => Some(TelnetOption::Echo),
            3 => Some(TelnetOption::SuppressGoAhead),
            24 => Some(TelnetOption::TerminalType),
            25 => Some(TelnetOption::EndOfRecord),
            39 => Some(TelnetOption::NewEnviron),
            40 => Some(TelnetOption::Tn5250e),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Options accepted unless the configuration says otherwise.
    pub fn default_whitelist() -> &'static [TelnetOption] {
        &[
            TelnetOption::Binary,
            TelnetOption::Echo,
            TelnetOption::SuppressGoAhead,
            TelnetOption::TerminalType,
            TelnetOption::EndOfRecord,
            TelnetOption::Tn5250e,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    NotNegotiated,
    Enabled,
    Disabled,
}

/// Negotiated state of one option on each side of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionState {
    /// Whether we perform the option (answers to DO/DONT)
    pub local: NegotiationState,
    /// Whether the host performs the option (answers to WILL/WONT)
    pub remote: NegotiationState,
}

/// Whether the last chunk ended on a clean boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Complete,
    /// The chunk ended inside a telnet command; feed more bytes to finish it
    NeedMoreData,
}

/// Result of feeding one chunk to the negotiator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelnetOutput {
    /// Record bytes with telnet commands removed and `IAC IAC` collapsed
    pub data: Vec<u8>,
    /// Offsets into `data` at which an `IAC EOR` closed a record
    pub record_ends: Vec<usize>,
    /// Bytes to send back to the host
    pub replies: Vec<u8>,
    pub status: StreamStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Data,
    Iac,
    Option(u8),
    SubOption,
    SubData(u8),
    SubIac(u8),
}

/// Telnet negotiation state tracker
#[derive(Debug)]
pub struct TelnetNegotiator {
    options: HashMap<u8, OptionState>,
    whitelist: Vec<TelnetOption>,
    terminal_type: String,
    device_name: Option<String>,
    environment: Vec<(String, String)>,
    max_subnegotiation_len: usize,
    state: ParseState,
    subnegotiation: Vec<u8>,
    /// Replies owed to the host from a chunk that failed part way
    held_replies: Vec<u8>,
}

impl Default for TelnetNegotiator {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

impl TelnetNegotiator {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            options: HashMap::new(),
            whitelist: config.enabled_options.clone(),
            terminal_type: config.terminal_type.clone(),
            device_name: config.device_name.clone(),
            environment: config.environment.clone(),
            max_subnegotiation_len: config.max_subnegotiation_len,
            state: ParseState::Data,
            subnegotiation: Vec::new(),
            held_replies: Vec::new(),
        }
    }

    /// Feed one chunk of host bytes.
    ///
    /// On error the parser is reset to plain data and the partial
    /// subnegotiation is discarded; the rest of the chunk is not processed.
    /// Option changes made before the error stand, so their replies are held
    /// and lead the next chunk's output (or see [`take_held_replies`](Self::take_held_replies)).
    pub fn process(&mut self, input: &[u8]) -> Result<TelnetOutput, ProtocolError> {
        let mut output = TelnetOutput {
            data: Vec::with_capacity(input.len()),
            record_ends: Vec::new(),
            replies: std::mem::take(&mut self.held_replies),
            status: StreamStatus::Complete,
        };

        for &byte in input {
            if let Err(err) = self.step(byte, &mut output) {
                warn!("telnet: {err}; resetting parser");
                self.state = ParseState::Data;
                self.subnegotiation.clear();
                self.held_replies = output.replies;
                return Err(err);
            }
        }

        if self.state != ParseState::Data {
            trace!("telnet: chunk ended mid-command in state {:?}", self.state);
            output.status = StreamStatus::NeedMoreData;
        }
        Ok(output)
    }

    /// Replies produced by a chunk that later failed.
    pub fn take_held_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.held_replies)
    }

    /// Signal that the host closed the stream.
    pub fn end_of_stream(&mut self) -> Result<(), ProtocolError> {
        let state = std::mem::replace(&mut self.state, ParseState::Data);
        self.subnegotiation.clear();
        match state {
            ParseState::SubOption => {
                Err(ProtocolError::UnterminatedSubnegotiation { option: 0, interrupted_by: None })
            }
            ParseState::SubData(option) | ParseState::SubIac(option) => {
                Err(ProtocolError::UnterminatedSubnegotiation { option, interrupted_by: None })
            }
            _ => Ok(()),
        }
    }

    fn step(&mut self, byte: u8, output: &mut TelnetOutput) -> Result<(), ProtocolError> {
        let state = self.state;
        self.state = match state {
            ParseState::Data if byte == IAC => ParseState::Iac,
            ParseState::Data => {
                output.data.push(byte);
                ParseState::Data
            }
            ParseState::Iac => match byte {
                IAC => {
                    output.data.push(IAC);
                    ParseState::Data
                }
                WILL | WONT | DO | DONT => ParseState::Option(byte),
                SB => ParseState::SubOption,
                EOR => {
                    output.record_ends.push(output.data.len());
                    ParseState::Data
                }
                SE => {
                    warn!("telnet: SE outside subnegotiation ignored");
                    ParseState::Data
                }
                NOP..=GA => {
                    trace!("telnet: ignoring command {byte}");
                    ParseState::Data
                }
                _ => return Err(ProtocolError::UnknownCommand(byte)),
            },
            ParseState::Option(command) => {
                if let Some(reply) = self.process_command(command, byte) {
                    output.replies.extend_from_slice(&reply);
                }
                ParseState::Data
            }
            ParseState::SubOption => {
                self.subnegotiation.clear();
                ParseState::SubData(byte)
            }
            ParseState::SubData(option) if byte == IAC => ParseState::SubIac(option),
            ParseState::SubData(option) => {
                self.push_subnegotiation(option, byte)?;
                ParseState::SubData(option)
            }
            ParseState::SubIac(option) => match byte {
                SE => {
                    let payload = std::mem::take(&mut self.subnegotiation);
                    if let Some(reply) = self.process_subnegotiation(option, &payload)? {
                        output.replies.extend_from_slice(&reply);
                    }
                    ParseState::Data
                }
                IAC if option == TelnetOption::TerminalType as u8 => {
                    return Err(ProtocolError::IacInTerminalType);
                }
                IAC => {
                    self.push_subnegotiation(option, IAC)?;
                    ParseState::SubData(option)
                }
                other => {
                    return Err(ProtocolError::UnterminatedSubnegotiation {
                        option,
                        interrupted_by: Some(other),
                    })
                }
            },
        };
        Ok(())
    }

    fn push_subnegotiation(&mut self, option: u8, byte: u8) -> Result<(), ProtocolError> {
        if self.subnegotiation.len() >= self.max_subnegotiation_len {
            return Err(ProtocolError::OversizedSubnegotiation {
                option,
                limit: self.max_subnegotiation_len,
            });
        }
        self.subnegotiation.push(byte);
        Ok(())
    }

    fn is_whitelisted(&self, option: u8) -> bool {
        TelnetOption::from_u8(option).is_some_and(|opt| self.whitelist.contains(&opt))
    }

    /// Answer one WILL/WONT/DO/DONT. Returns the full reply including IAC.
    pub fn process_command(&mut self, command: u8, option: u8) -> Option<Vec<u8>> {
        let accepted = self.is_whitelisted(option);
        let entry = self.options.entry(option).or_default();

        let (side, wanted, answer) = match command {
            DO if accepted => (&mut entry.local, NegotiationState::Enabled, WILL),
            DO | DONT => (&mut entry.local, NegotiationState::Disabled, WONT),
            WILL if accepted => (&mut entry.remote, NegotiationState::Enabled, DO),
            WILL | WONT => (&mut entry.remote, NegotiationState::Disabled, DONT),
            _ => return None,
        };

        if *side == wanted {
            trace!("telnet: option {option} already {wanted:?}, no reply");
            return None;
        }
        *side = wanted;
        debug!("telnet: command {command} option {option} -> reply {answer}");
        Some(vec![IAC, answer, option])
    }

    /// Handle a complete subnegotiation payload (between `IAC SB opt` and `IAC SE`).
    pub fn process_subnegotiation(
        &mut self,
        option: u8,
        payload: &[u8],
    ) -> Result<Option<Vec<u8>>, ProtocolError> {
        match TelnetOption::from_u8(option) {
            Some(TelnetOption::TerminalType) if payload.first() == Some(&TTYPE_SEND) => {
                if !self.is_whitelisted(option) {
                    debug!("telnet: TERMINAL-TYPE SEND for refused option ignored");
                    return Ok(None);
                }
                Ok(Some(self.terminal_type_reply()?))
            }
            Some(TelnetOption::NewEnviron) if payload.first() == Some(&ENV_SEND) => {
                if !self.is_whitelisted(option) {
                    debug!("telnet: NEW-ENVIRON SEND for refused option ignored");
                    return Ok(None);
                }
                Ok(Some(self.environment_reply()))
            }
            _ => {
                debug!("telnet: ignoring subnegotiation for option {option} ({} bytes)", payload.len());
                Ok(None)
            }
        }
    }

    fn terminal_type_reply(&self) -> Result<Vec<u8>, ProtocolError> {
        let name = self.terminal_type.as_bytes();
        if name.contains(&IAC) {
            return Err(ProtocolError::IacInTerminalType);
        }
        let mut reply = vec![IAC, SB, TelnetOption::TerminalType as u8, TTYPE_IS];
        reply.extend_from_slice(name);
        reply.extend_from_slice(&[IAC, SE]);
        debug!("telnet: sending terminal type {}", self.terminal_type);
        Ok(reply)
    }

    fn environment_reply(&self) -> Vec<u8> {
        let mut reply = vec![IAC, SB, TelnetOption::NewEnviron as u8, ENV_IS];
        if let Some(device) = &self.device_name {
            reply.push(ENV_VAR);
            push_environment_text(&mut reply, "DEVNAME");
            reply.push(ENV_VALUE);
            push_environment_text(&mut reply, device);
        }
        for (name, value) in &self.environment {
            reply.push(ENV_USERVAR);
            push_environment_text(&mut reply, name);
            reply.push(ENV_VALUE);
            push_environment_text(&mut reply, value);
        }
        reply.extend_from_slice(&[IAC, SE]);
        reply
    }

    pub fn option_state(&self, option: u8) -> OptionState {
        self.options.get(&option).copied().unwrap_or_default()
    }

    /// Binary, end-of-record and suppress-go-ahead are all on for us.
    pub fn is_negotiation_complete(&self) -> bool {
        [TelnetOption::Binary, TelnetOption::EndOfRecord, TelnetOption::SuppressGoAhead]
            .iter()
            .all(|opt| self.option_state(*opt as u8).local == NegotiationState::Enabled)
    }

    /// True when the parser sits between commands.
    pub fn is_idle(&self) -> bool {
        self.state == ParseState::Data
    }
}

fn push_environment_text(out: &mut Vec<u8>, text: &str) {
    for byte in text.bytes() {
        match byte {
            ENV_VAR | ENV_VALUE | ENV_ESC | ENV_USERVAR => out.extend_from_slice(&[ENV_ESC, byte]),
            IAC => out.extend_from_slice(&[IAC, IAC]),
            _ => out.push(byte),
        }
    }
}

/// Double every IAC so the bytes survive telnet framing.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 2);
    for &byte in data {
        if byte == IAC {
            out.push(IAC);
        }
        out.push(byte);
    }
    out
}

/// Escape a 5250 record and terminate it with `IAC EOR`.
pub fn frame_record(record: &[u8]) -> Vec<u8> {
    let mut out = escape(record);
    out.extend_from_slice(&[IAC, EOR]);
    out
}
