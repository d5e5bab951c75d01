use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serproto_frame::DecoderStats;

/// Lifecycle of a connection's communication loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Constructed, never opened.
    Idle = 0,
    /// Loop spawned, link being opened.
    Connecting = 1,
    /// Link open, loop running.
    Connected = 2,
    /// Close requested, loop not yet exited.
    Disconnecting = 3,
    /// Loop exited; the connection may be opened again.
    Stopped = 4,
}

impl ConnectionState {
    /// Whether sends are accepted in this state.
    pub fn accepts_sends(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// States `open` may start a new loop from.
    pub(crate) const OPENABLE: [ConnectionState; 2] =
        [ConnectionState::Idle, ConnectionState::Stopped];

    /// Whether `open` may start a new loop from this state.
    pub fn can_open(self) -> bool {
        Self::OPENABLE.contains(&self)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => ConnectionState::Stopped,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Atomic holder for a [`ConnectionState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move to `to` if the current state is one of `from`.
    ///
    /// Returns the state that was replaced, or the current state on refusal.
    pub(crate) fn transition(
        &self,
        from: &[ConnectionState],
        to: ConnectionState,
    ) -> Result<ConnectionState, ConnectionState> {
        let mut current = self.load();
        loop {
            if !from.contains(&current) {
                return Err(current);
            }
            match self.0.compare_exchange(
                current as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(current),
                Err(raw) => current = ConnectionState::from_u8(raw),
            }
        }
    }
}

/// Traffic counters for the current or most recent open/close cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStats {
    /// Decoder counters (frames decoded, checksum errors, discarded bytes).
    pub decoder: DecoderStats,
    /// Frames written to the link.
    pub frames_sent: u64,
    /// Queued sends dropped because the loop stopped first.
    pub sends_abandoned: u64,
}
