use crate::models::error::TransportError;
use crate::models::state::TransportState;

/// Event delegate for transport lifecycle notifications.
///
/// Called from the thread that caused the change, including the read loop.
pub trait TransportDelegate: Send + Sync {
    fn on_state_changed(&self, state: &TransportState);

    /// A fatal session error. The transport stops reading; the owner decides
    /// whether to reconnect.
    fn on_error(&self, error: &TransportError);
}
