use crate::models::capture_models::CaptureSession;

/// Receives a replayed capture, on the replay thread.
pub trait ReplayCallback: Send + Sync {
    fn on_session_start(&self, session: &CaptureSession);

    /// One raw packet (header + payload, as recorded).
    fn on_packet(&self, type_id: u32, type_name: &str, data: &[u8]);

    fn on_progress(&self, current_ms: u64, total_ms: u64);

    fn on_complete(&self);

    fn on_error(&self, message: &str);
}
