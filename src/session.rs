//! Session lifecycle.
//!
//! A session is one connection attempt with one peripheral, from the moment
//! a candidate is picked until the link is released.  The state machine is
//! pure: it only validates transitions, the supervisor performs the side
//! effects that go with them.
//!
//! ```text
//! Idle -> Scanning -> Connecting -> Securing -> Discovering -> Bridging
//!   ^        |            |            |             |            |
//!   |        |            +---- Fault -+----- Error -+            |
//!   +--------+-- Released <- Disconnecting <--- LinkDown ---------+
//! ```

use crate::ble::metadata::DeviceMetadata;
use crate::ble::{ConnParams, PeripheralHandle};
use crate::error::TransitionError;
use crate::hid::ReportSchema;

/// Lifecycle state of the (single) session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    Securing,
    Discovering,
    Bridging,
    Disconnecting,
    Error,
}

/// Inputs to the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// A scan window was opened.
    StartScan,
    /// The scan window ended with a HID candidate.
    CandidateReady,
    /// The scan window ended with nothing usable.
    ScanWindowEmpty,
    /// The link is up.
    LinkUp,
    /// Pairing finished, successfully or not.
    SecurityResolved,
    /// Metadata and report map have been read.
    DiscoveryComplete,
    /// Connection attempt failed, or the link vanished mid-setup.
    Fault,
    /// The peer or the stack dropped the link.
    LinkDown,
    /// Session resources were released.
    Released,
}

/// Validates session transitions.
#[derive(Debug)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub const fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Target state for `trigger` in `from`, if the pair is legal.
    pub fn next(from: SessionState, trigger: Trigger) -> Option<SessionState> {
        use SessionState as S;
        use Trigger as T;

        let to = match (from, trigger) {
            (S::Idle, T::StartScan) => S::Scanning,
            (S::Scanning, T::CandidateReady) => S::Connecting,
            (S::Scanning, T::ScanWindowEmpty) => S::Idle,
            (S::Connecting, T::LinkUp) => S::Securing,
            (S::Securing, T::SecurityResolved) => S::Discovering,
            (S::Discovering, T::DiscoveryComplete) => S::Bridging,
            (S::Connecting | S::Securing | S::Discovering, T::Fault) => S::Error,
            (S::Idle, T::LinkDown) => return None,
            (_, T::LinkDown) => S::Disconnecting,
            (S::Disconnecting | S::Error, T::Released) => S::Idle,
            _ => return None,
        };
        Some(to)
    }

    /// Apply a trigger.  Illegal triggers leave the state unchanged.
    pub fn apply(&mut self, trigger: Trigger) -> Result<SessionState, TransitionError> {
        let from = self.state;
        match Self::next(from, trigger) {
            Some(to) => {
                debug!("session: {} --{}--> {}", from, trigger, to);
                self.state = to;
                Ok(to)
            }
            None => Err(TransitionError { from, trigger }),
        }
    }
}

/// The one live connection and everything learned about the peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub peer: PeripheralHandle,
    /// `None` until security resolves.
    pub encrypted: Option<bool>,
    pub conn_params: ConnParams,
    pub metadata: DeviceMetadata,
    /// Read once during discovery, then immutable.
    pub schema: Option<ReportSchema>,
}

impl Session {
    pub fn new(peer: PeripheralHandle, conn_params: ConnParams) -> Self {
        Self {
            peer,
            encrypted: None,
            conn_params,
            metadata: DeviceMetadata::default(),
            schema: None,
        }
    }

    /// No report map was obtained, so nothing is forwarded.
    pub fn is_monitor_only(&self) -> bool {
        self.schema.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SessionState; 8] = [
        SessionState::Idle,
        SessionState::Scanning,
        SessionState::Connecting,
        SessionState::Securing,
        SessionState::Discovering,
        SessionState::Bridging,
        SessionState::Disconnecting,
        SessionState::Error,
    ];

    const ALL_TRIGGERS: [Trigger; 9] = [
        Trigger::StartScan,
        Trigger::CandidateReady,
        Trigger::ScanWindowEmpty,
        Trigger::LinkUp,
        Trigger::SecurityResolved,
        Trigger::DiscoveryComplete,
        Trigger::Fault,
        Trigger::LinkDown,
        Trigger::Released,
    ];

    fn machine_in(state: SessionState) -> SessionStateMachine {
        SessionStateMachine { state }
    }

    #[test]
    fn idle_only_leaves_through_scanning() {
        for trigger in ALL_TRIGGERS {
            let to = SessionStateMachine::next(SessionState::Idle, trigger);
            if trigger == Trigger::StartScan {
                assert_eq!(to, Some(SessionState::Scanning));
            } else {
                assert_eq!(to, None, "{:?}", trigger);
            }
        }
    }

    #[test]
    fn happy_path_reaches_bridging() {
        let mut m = SessionStateMachine::new();
        for (trigger, expected) in [
            (Trigger::StartScan, SessionState::Scanning),
            (Trigger::CandidateReady, SessionState::Connecting),
            (Trigger::LinkUp, SessionState::Securing),
            (Trigger::SecurityResolved, SessionState::Discovering),
            (Trigger::DiscoveryComplete, SessionState::Bridging),
        ] {
            assert_eq!(m.apply(trigger), Ok(expected));
        }
    }

    #[test]
    fn bridging_is_only_entered_from_discovering() {
        for from in ALL_STATES {
            for trigger in ALL_TRIGGERS {
                if SessionStateMachine::next(from, trigger) == Some(SessionState::Bridging) {
                    assert_eq!(from, SessionState::Discovering);
                }
            }
        }
        // Securing cannot skip discovery.
        assert_eq!(
            SessionStateMachine::next(SessionState::Securing, Trigger::DiscoveryComplete),
            None
        );
    }

    #[test]
    fn disconnect_from_any_active_state_ends_idle() {
        for from in ALL_STATES.into_iter().filter(|s| *s != SessionState::Idle) {
            let mut m = machine_in(from);
            assert_eq!(m.apply(Trigger::LinkDown), Ok(SessionState::Disconnecting));
            assert_eq!(m.apply(Trigger::Released), Ok(SessionState::Idle));
        }
    }

    #[test]
    fn faults_go_through_error_to_idle() {
        for from in [
            SessionState::Connecting,
            SessionState::Securing,
            SessionState::Discovering,
        ] {
            let mut m = machine_in(from);
            assert_eq!(m.apply(Trigger::Fault), Ok(SessionState::Error));
            assert_eq!(m.apply(Trigger::Released), Ok(SessionState::Idle));
        }
        assert!(machine_in(SessionState::Bridging).apply(Trigger::Fault).is_err());
    }

    #[test]
    fn illegal_trigger_leaves_state_unchanged() {
        let mut m = machine_in(SessionState::Bridging);
        let err = m.apply(Trigger::LinkUp).unwrap_err();
        assert_eq!(err.from, SessionState::Bridging);
        assert_eq!(err.trigger, Trigger::LinkUp);
        assert_eq!(m.state(), SessionState::Bridging);

        let mut m = SessionStateMachine::new();
        assert!(m.apply(Trigger::LinkDown).is_err());
        assert_eq!(m.state(), SessionState::Idle);
    }

    #[test]
    fn empty_scan_window_returns_to_idle() {
        let mut m = SessionStateMachine::new();
        m.apply(Trigger::StartScan).unwrap();
        assert_eq!(m.apply(Trigger::ScanWindowEmpty), Ok(SessionState::Idle));
    }
}
