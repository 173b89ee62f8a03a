//! Acquisition state machine.
//!
//! | Current      | Command | Action                              | Next       |
//! |--------------|---------|-------------------------------------|------------|
//! | Idle         | go      | start instrument, reset time anchor | Running    |
//! | Running      | stop    | stop instrument, flush input        | Idle       |
//! | Idle/Running | quit    | stop instrument, flush input        | Terminated |
//!
//! Every other combination is ignored. `Terminated` is final.

use std::fmt;

/// Where the acquisition is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Configured, instrument not streaming.
    #[default]
    Idle,
    /// Instrument streaming, records being emitted.
    Running,
    /// Operator quit; no further transitions.
    Terminated,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Operator key commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperatorCommand {
    /// `g`: start acquiring
    Go,
    /// `s`: stop acquiring
    Stop,
    /// `q`: stop and exit
    Quit,
    /// `r`: advertised by the rig's prompt; has no effect
    Reset,
}

impl OperatorCommand {
    /// All commands with their keys.
    pub const KEYS: [(char, OperatorCommand); 4] = [
        ('g', OperatorCommand::Go),
        ('s', OperatorCommand::Stop),
        ('q', OperatorCommand::Quit),
        ('r', OperatorCommand::Reset),
    ];

    /// Maps a key to a command, ignoring case.
    pub fn from_key(key: char) -> Option<Self> {
        let key = key.to_ascii_lowercase();
        Self::KEYS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, command)| *command)
    }
}

/// What the controller must do for a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionAction {
    /// Send `start` and reset the elapsed-time anchor.
    StartInstrument,
    /// Send `stop` and flush pending input.
    StopInstrument,
    /// Nothing to do.
    Ignore,
}

impl AcquisitionState {
    /// Applies the transition table.
    pub fn on_command(self, command: OperatorCommand) -> (AcquisitionState, TransitionAction) {
        use AcquisitionState::*;
        use OperatorCommand::*;

        match (self, command) {
            (Idle, Go) => (Running, TransitionAction::StartInstrument),
            (Running, Stop) => (Idle, TransitionAction::StopInstrument),
            (Idle | Running, Quit) => (Terminated, TransitionAction::StopInstrument),
            (state, _) => (state, TransitionAction::Ignore),
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        self == AcquisitionState::Terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        assert_eq!(OperatorCommand::from_key('g'), Some(OperatorCommand::Go));
        assert_eq!(OperatorCommand::from_key('G'), Some(OperatorCommand::Go));
        assert_eq!(OperatorCommand::from_key('S'), Some(OperatorCommand::Stop));
        assert_eq!(OperatorCommand::from_key('q'), Some(OperatorCommand::Quit));
        assert_eq!(OperatorCommand::from_key('R'), Some(OperatorCommand::Reset));
        assert_eq!(OperatorCommand::from_key('x'), None);
    }

    #[test]
    fn test_transition_table() {
        use AcquisitionState::*;
        use OperatorCommand::*;
        use TransitionAction::*;

        let cases = [
            (Idle, Go, Running, StartInstrument),
            (Idle, Stop, Idle, Ignore),
            (Idle, Quit, Terminated, StopInstrument),
            (Idle, Reset, Idle, Ignore),
            (Running, Go, Running, Ignore),
            (Running, Stop, Idle, StopInstrument),
            (Running, Quit, Terminated, StopInstrument),
            (Running, Reset, Running, Ignore),
            (Terminated, Go, Terminated, Ignore),
            (Terminated, Stop, Terminated, Ignore),
            (Terminated, Quit, Terminated, Ignore),
        ];
        for (from, command, to, action) in cases {
            assert_eq!(from.on_command(command), (to, action), "{} + {:?}", from, command);
        }
    }

    #[test]
    fn test_go_stop_is_repeatable() {
        let mut state = AcquisitionState::default();
        for _ in 0..3 {
            state = state.on_command(OperatorCommand::Go).0;
            assert_eq!(state, AcquisitionState::Running);
            state = state.on_command(OperatorCommand::Stop).0;
            assert_eq!(state, AcquisitionState::Idle);
        }
        assert!(state.on_command(OperatorCommand::Quit).0.is_terminal());
    }
}
