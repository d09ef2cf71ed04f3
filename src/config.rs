//! Session configuration
//!
//! A typed, serde-backed description of one TN5250E session: what terminal
//! type to announce, which telnet options to accept, the code page and the
//! screen geometry. Stored as JSON.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lib5250::telnet::TelnetOption;
use crate::protocol_common::ebcdic::converter_for;

pub const DEFAULT_TERMINAL_TYPE: &str = "IBM-3179-2";
pub const DEFAULT_CODE_PAGE: &str = "37";
pub const DEFAULT_ROWS: usize = 24;
pub const DEFAULT_COLS: usize = 80;
pub const DEFAULT_MAX_SUBNEGOTIATION_LEN: usize = 512;
pub const DEFAULT_MAX_RECORD_LEN: usize = 65_535;

/// Settings for one protocol session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sent in reply to TERMINAL-TYPE SEND
    pub terminal_type: String,
    /// Sent as DEVNAME when NEW-ENVIRON is enabled
    pub device_name: Option<String>,
    /// Extra NEW-ENVIRON user variables (name, value)
    pub environment: Vec<(String, String)>,
    pub code_page: String,
    pub rows: usize,
    pub cols: usize,
    /// Options the negotiator accepts; everything else is refused
    pub enabled_options: Vec<TelnetOption>,
    pub max_subnegotiation_len: usize,
    pub max_record_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            terminal_type: DEFAULT_TERMINAL_TYPE.to_string(),
            device_name: None,
            environment: Vec::new(),
            code_page: DEFAULT_CODE_PAGE.to_string(),
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            enabled_options: TelnetOption::default_whitelist().to_vec(),
            max_subnegotiation_len: DEFAULT_MAX_SUBNEGOTIATION_LEN,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }
}

impl SessionConfig {
    pub fn with_terminal_type(mut self, terminal_type: impl Into<String>) -> Self {
        self.terminal_type = terminal_type.into();
        self
    }

    pub fn with_device_name(mut self, device_name: impl Into<String>) -> Self {
        self.device_name = Some(device_name.into());
        self
    }

    pub fn with_screen_size(mut self, rows: usize, cols: usize) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    pub fn with_options(mut self, options: &[TelnetOption]) -> Self {
        self.enabled_options = options.to_vec();
        self
    }

    /// Check every field for values the engine cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_terminal()?;
        if converter_for(&self.code_page).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "code_page",
                reason: format!("unsupported code page {:?}", self.code_page),
            });
        }
        Ok(())
    }

    /// Everything [`validate`](Self::validate) checks except the code page,
    /// for sessions built around an injected converter.
    pub fn validate_terminal(&self) -> Result<(), ConfigError> {
        if self.terminal_type.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "terminal_type",
                reason: "must not be empty".to_string(),
            });
        }
        // The terminal type travels inside a subnegotiation; IAC there would break framing.
        if !self.terminal_type.bytes().all(|b| (0x21..0x7F).contains(&b)) {
            return Err(ConfigError::InvalidValue {
                field: "terminal_type",
                reason: format!("{:?} must be printable ASCII", self.terminal_type),
            });
        }
        if let Some(name) = &self.device_name {
            if name.is_empty() || name.len() > 10 || !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(ConfigError::InvalidValue {
                    field: "device_name",
                    reason: format!("{name:?} must be 1-10 ASCII letters or digits"),
                });
            }
        }
        for (name, value) in &self.environment {
            if !name.is_ascii() || !value.is_ascii() {
                return Err(ConfigError::InvalidValue {
                    field: "environment",
                    reason: format!("{name:?}={value:?} must be ASCII"),
                });
            }
        }
        if self.rows == 0 || self.cols == 0 || self.rows > 255 || self.cols > 255 {
            return Err(ConfigError::InvalidValue {
                field: "rows/cols",
                reason: format!("{}x{} is not addressable", self.rows, self.cols),
            });
        }
        if self.max_subnegotiation_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_subnegotiation_len",
                reason: "must be positive".to_string(),
            });
        }
        if self.max_record_len < 10 {
            return Err(ConfigError::InvalidValue {
                field: "max_record_len",
                reason: "must hold at least a record header".to_string(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::Io { path: parent.to_path_buf(), source })?;
        }
        fs::write(path, json).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = SessionConfig::default();
        assert_eq!(config.terminal_type, "IBM-3179-2");
        assert_eq!((config.rows, config.cols), (24, 80));
        assert!(config.enabled_options.contains(&TelnetOption::EndOfRecord));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SessionConfig::from_json(r#"{"terminal_type": "IBM-3477-FC"}"#).unwrap();
        assert_eq!(config.terminal_type, "IBM-3477-FC");
        assert_eq!(config.code_page, "37");
        assert_eq!(config.max_subnegotiation_len, DEFAULT_MAX_SUBNEGOTIATION_LEN);
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = SessionConfig::default()
            .with_device_name("QPADEV0001")
            .with_options(&[TelnetOption::Binary, TelnetOption::EndOfRecord]);
        let json = config.to_json().unwrap();
        assert_eq!(SessionConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_terminal_type_must_be_plain_ascii() {
        let config = SessionConfig::default().with_terminal_type("IBM\u{FF}3179");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "terminal_type", .. })
        ));
    }

    #[test]
    fn test_unknown_code_page_rejected() {
        let result = SessionConfig::from_json(r#"{"code_page": "1140"}"#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { field: "code_page", .. })));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(SessionConfig::from_json("{"), Err(ConfigError::Json(_))));
    }
}
