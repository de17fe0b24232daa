use crate::models::capture_models::Direction;

/// Side channel that receives every raw frame crossing the transport.
///
/// `data` is the 16-byte header followed by the payload, exactly as it went
/// over the wire. Must not be called from the audio consumer thread.
pub trait PacketRecorder: Send + Sync {
    fn record_packet(&self, direction: Direction, type_id: u32, data: &[u8]);

    /// Whether packets are currently being kept. Lets the read loop skip
    /// the capture copy when nothing would be stored.
    fn is_recording(&self) -> bool;
}
