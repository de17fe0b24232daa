use std::time::Duration;

/// Configuration for the USB transport read loop and write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Bulk IN timeout for a header read. A timeout only means no data yet.
    pub read_timeout: Duration,

    /// Bulk OUT timeout (default: 1s).
    pub write_timeout: Duration,

    /// How long to wait for the host to grant device access.
    pub permission_timeout: Duration,

    /// Sub-read size for payloads (default: 16 KiB).
    pub chunk_size: usize,

    /// Largest payload accepted from a header. Larger values are treated as
    /// corrupt framing.
    pub max_payload_len: u32,

    /// Initial size of the scratch buffer used to capture video before it is
    /// handed to the sink (default: 512 KiB, grows on demand).
    pub video_scratch_size: usize,
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.read_timeout.is_zero() {
            return Err("read timeout must be positive".into());
        }
        if self.write_timeout.is_zero() {
            return Err("write timeout must be positive".into());
        }
        if self.chunk_size == 0 {
            return Err("chunk size must be positive".into());
        }
        if self.max_payload_len == 0 {
            return Err("max payload length must be positive".into());
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(30_000),
            write_timeout: Duration::from_millis(1_000),
            permission_timeout: Duration::from_secs(10),
            chunk_size: 16 * 1024,
            max_payload_len: 4 * 1024 * 1024,
            video_scratch_size: 512 * 1024,
        }
    }
}

/// Configuration for the capture recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Record VIDEO_DATA and NAVI_VIDEO_DATA packets (default: true).
    pub include_video_data: bool,

    /// Record AUDIO_DATA packets (default: true).
    pub include_audio_data: bool,

    /// Record outbound AUDIO_DATA, i.e. microphone uplink (default: true).
    pub include_mic_data: bool,

    /// Record inbound AUDIO_DATA, i.e. speaker output (default: true).
    pub include_speaker_data: bool,

    /// Prefix for the `.bin`/`.json` pair (default: `carlink_capture`).
    pub file_prefix: String,

    /// Buffered writer capacity for the binary log (default: 64 KiB).
    pub write_buffer_size: usize,
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.file_prefix.is_empty() {
            return Err("file prefix must not be empty".into());
        }
        if self
            .file_prefix
            .contains(|c: char| c == '/' || c == '\\')
        {
            return Err(format!("file prefix contains a path separator: {}", self.file_prefix));
        }
        if self.write_buffer_size == 0 {
            return Err("write buffer size must be positive".into());
        }
        Ok(())
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            include_video_data: true,
            include_audio_data: true,
            include_mic_data: true,
            include_speaker_data: true,
            file_prefix: "carlink_capture".into(),
            write_buffer_size: 64 * 1024,
        }
    }
}

/// Configuration for capture replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    /// Reproduce recorded inter-packet timing (default: true).
    pub paced: bool,

    /// Playback speed multiplier when paced (default: 1.0).
    pub speed: f64,

    /// Deliver packets the host sent to the adapter (default: false).
    pub include_outbound: bool,
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(format!("speed must be a positive number: {}", self.speed));
        }
        Ok(())
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            paced: true,
            speed: 1.0,
            include_outbound: false,
        }
    }
}
