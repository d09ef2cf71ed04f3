//! Operator information area
//!
//! Tracks whether the keyboard accepts input, why it is locked, the insert
//! mode and message-waiting indicators and a pending audible alarm.

use crate::lib5250::codes::{get_error_message, ERR_HOST_MESSAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockReason {
    /// Host output in progress or awaiting the host after an AID
    HostOutput,
    /// System request pressed; a one-digit option is awaited
    SystemRequest,
    /// Operator error; cleared by RESET
    ErrorCode(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyboardState {
    #[default]
    Unlocked,
    Locked(LockReason),
    Inhibited,
}

/// Immutable copy of the OIA handed to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OiaSnapshot {
    pub state: KeyboardState,
    pub insert_mode: bool,
    pub message: Option<String>,
    pub message_waiting: bool,
    pub keys_buffered: bool,
    /// An alarm sounded since the previous snapshot
    pub bell: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Oia {
    state: KeyboardState,
    insert_mode: bool,
    message: Option<String>,
    message_waiting: bool,
    keys_buffered: bool,
    bell: bool,
    changed: bool,
}

impl Oia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> KeyboardState {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == KeyboardState::Unlocked
    }

    fn set_state(&mut self, state: KeyboardState) {
        if self.state != state {
            log::debug!("oia: {:?} -> {:?}", self.state, state);
            self.state = state;
            self.changed = true;
        }
    }

    fn set_message(&mut self, message: Option<String>) {
        if self.message != message {
            self.message = message;
            self.changed = true;
        }
    }

    pub fn lock(&mut self, reason: LockReason) {
        self.set_state(KeyboardState::Locked(reason));
    }

    pub fn unlock(&mut self) {
        self.set_state(KeyboardState::Unlocked);
        self.set_message(None);
    }

    pub fn inhibit(&mut self, message: impl Into<String>) {
        self.set_state(KeyboardState::Inhibited);
        self.set_message(Some(message.into()));
    }

    /// Operator error: lock with `code`, show its message and sound the alarm.
    pub fn set_error(&mut self, code: u8) {
        self.set_state(KeyboardState::Locked(LockReason::ErrorCode(code)));
        self.set_message(get_error_message(code).map(str::to_string));
        self.sound_bell();
    }

    /// Error text written to the message line by the host.
    pub fn host_error(&mut self, message: impl Into<String>) {
        self.set_state(KeyboardState::Locked(LockReason::ErrorCode(ERR_HOST_MESSAGE)));
        self.set_message(Some(message.into()));
    }

    /// RESET key. Clears operator errors, system request and inhibit states.
    /// Returns true if the keyboard became unlocked.
    pub fn reset(&mut self) -> bool {
        match self.state {
            KeyboardState::Locked(LockReason::ErrorCode(_))
            | KeyboardState::Locked(LockReason::SystemRequest)
            | KeyboardState::Inhibited => {
                self.unlock();
                true
            }
            KeyboardState::Unlocked => {
                self.set_insert_mode(false);
                false
            }
            KeyboardState::Locked(LockReason::HostOutput) => false,
        }
    }

    pub fn sound_bell(&mut self) {
        self.bell = true;
        self.changed = true;
    }

    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.bell)
    }

    pub fn insert_mode(&self) -> bool {
        self.insert_mode
    }

    pub fn set_insert_mode(&mut self, on: bool) {
        if self.insert_mode != on {
            self.insert_mode = on;
            self.changed = true;
        }
    }

    pub fn toggle_insert_mode(&mut self) {
        self.set_insert_mode(!self.insert_mode);
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn message_waiting(&self) -> bool {
        self.message_waiting
    }

    pub fn set_message_waiting(&mut self, on: bool) {
        if self.message_waiting != on {
            self.message_waiting = on;
            self.changed = true;
        }
    }

    pub fn keys_buffered(&self) -> bool {
        self.keys_buffered
    }

    pub fn set_keys_buffered(&mut self, on: bool) {
        if self.keys_buffered != on {
            self.keys_buffered = on;
            self.changed = true;
        }
    }

    /// True if anything changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    pub fn snapshot(&self) -> OiaSnapshot {
        OiaSnapshot {
            state: self.state,
            insert_mode: self.insert_mode,
            message: self.message.clone(),
            message_waiting: self.message_waiting,
            keys_buffered: self.keys_buffered,
            bell: self.bell,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib5250::codes::{ERR_NUMERIC_ONLY, MSG_NUMERIC_ONLY};

    #[test]
    fn test_error_locks_and_rings() {
        let mut oia = Oia::new();
        oia.set_error(ERR_NUMERIC_ONLY);
        assert_eq!(oia.state(), KeyboardState::Locked(LockReason::ErrorCode(ERR_NUMERIC_ONLY)));
        assert_eq!(oia.message(), Some(MSG_NUMERIC_ONLY));
        assert!(oia.take_bell());
        assert!(!oia.take_bell());
    }

    #[test]
    fn test_reset_clears_error_but_not_host_lock() {
        let mut oia = Oia::new();
        oia.set_error(ERR_NUMERIC_ONLY);
        assert!(oia.reset());
        assert!(oia.is_unlocked());
        assert_eq!(oia.message(), None);

        oia.lock(LockReason::HostOutput);
        assert!(!oia.reset());
        assert_eq!(oia.state(), KeyboardState::Locked(LockReason::HostOutput));
    }

    #[test]
    fn test_changes_are_reported_once() {
        let mut oia = Oia::new();
        assert!(!oia.take_changed());
        oia.lock(LockReason::HostOutput);
        oia.lock(LockReason::HostOutput);
        assert!(oia.take_changed());
        assert!(!oia.take_changed());
        oia.set_insert_mode(false);
        assert!(!oia.take_changed());
    }

    #[test]
    fn test_snapshot_copies_indicators() {
        let mut oia = Oia::new();
        oia.set_message_waiting(true);
        oia.toggle_insert_mode();
        let snapshot = oia.snapshot();
        assert!(snapshot.message_waiting);
        assert!(snapshot.insert_mode);
        assert_eq!(snapshot.state, KeyboardState::Unlocked);
    }
}
