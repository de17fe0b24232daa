use super::error::ReplayError;

/// Transport lifecycle.
///
/// ```text
/// idle → opening → active → closing → closed
///           │                           ↑
///           └──────── (failure) ────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Opening,
    Active,
    Closing,
    Closed,
}

impl TransportState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Capture recorder lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Ready,
    Recording,
    Error(String),
}

impl RecorderState {
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }
}

/// Capture replay lifecycle.
///
/// ```text
/// idle → loading → ready → playing → completed
///           ↓                 ↓
///         error             error
/// ```
/// `stop()` returns to idle from any state.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayState {
    Idle,
    Loading,
    Ready,
    Playing,
    Completed,
    Error(ReplayError),
}

impl ReplayState {
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Playback may (re)start from these states.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Ready | Self::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_start_states() {
        assert!(ReplayState::Ready.can_start());
        assert!(ReplayState::Completed.can_start());
        assert!(!ReplayState::Playing.can_start());
        assert!(!ReplayState::Idle.can_start());
        assert!(!ReplayState::Error(ReplayError::Io("x".into())).can_start());
    }

    #[test]
    fn transport_predicates() {
        assert!(TransportState::Active.is_active());
        assert!(TransportState::Closed.is_closed());
        assert!(!TransportState::Closing.is_active());
    }
}
