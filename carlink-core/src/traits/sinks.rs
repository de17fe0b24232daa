use crate::models::audio_format::AudioFormat;
use crate::models::message::Message;
use crate::protocol::parser::VIDEO_SUBHEADER_SIZE;

/// Destination for H.264 video.
///
/// Called from the read loop (or the replay thread). Keep work minimal.
pub trait VideoSink: Send + Sync {
    /// H.264 Annex-B bytes with the 20-byte video sub-header removed.
    fn accept_h264(&self, data: &[u8], pts_ms: u64);

    /// Zero-copy path: receive a VIDEO_DATA payload of `length` bytes
    /// (sub-header included) by calling `fill` with the destination buffer.
    ///
    /// `fill` reads from the device into the slice and returns how many bytes
    /// it wrote; fewer than `length` means the read was cut short. Returns
    /// the number of bytes filled.
    ///
    /// The default allocates a buffer and forwards to [`accept_h264`].
    /// Sinks that own a frame buffer override this to read straight into it.
    ///
    /// [`accept_h264`]: VideoSink::accept_h264
    fn process_video_direct(
        &self,
        length: usize,
        pts_ms: u64,
        fill: &mut dyn FnMut(&mut [u8]) -> usize,
    ) -> usize {
        let mut buf = vec![0u8; length];
        let filled = fill(&mut buf);
        if filled == length && filled > VIDEO_SUBHEADER_SIZE {
            self.accept_h264(&buf[VIDEO_SUBHEADER_SIZE..], pts_ms);
        }
        filled
    }
}

/// Destination for decoded-format PCM (16-bit interleaved).
pub trait AudioSink: Send + Sync {
    fn enqueue_pcm(&self, pcm: &[u8], format: AudioFormat, audio_type: u32);
}

/// Receives every dispatched message, in arrival order.
pub trait MessageObserver: Send + Sync {
    fn on_message(&self, message: &Message);
}
