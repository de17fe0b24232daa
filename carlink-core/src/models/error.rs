use thiserror::Error;

/// Errors produced while validating a 16-byte message header.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid header size: {0} bytes (expected 16)")]
    InvalidSize(usize),

    #[error("invalid magic: {0:#010x}")]
    InvalidMagic(u32),

    #[error("invalid type check for type {type_id:#04x}: {check:#010x}")]
    InvalidTypeCheck { type_id: u32, check: u32 },

    #[error("declared payload length {length} exceeds limit {limit}")]
    PayloadTooLarge { length: u32, limit: u32 },
}

/// Errors reported by a host-provided bulk device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("transfer timed out")]
    Timeout,

    #[error("operation not supported by host")]
    Unsupported,

    #[error("permission denied")]
    PermissionDenied,

    #[error("device disconnected")]
    Disconnected,

    #[error("device I/O error: {0}")]
    Io(String),
}

impl DeviceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Errors that end a transport session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("failed to spawn read loop: {0}")]
    Spawn(String),
}

/// Errors raised by the capture recorder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("output directory not configured")]
    NotConfigured,

    #[error("output directory not writable: {0}")]
    DirectoryNotWritable(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Errors raised while loading or playing back a capture.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("failed to read index: {0}")]
    IndexRead(String),

    #[error("failed to parse index: {0}")]
    IndexParse(String),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("failed to open binary log: {0}")]
    BinaryOpen(String),

    #[error("packet {seq} out of range: offset {offset} + length {length} > {file_len}")]
    OffsetOutOfRange {
        seq: u64,
        offset: u64,
        length: u64,
        file_len: u64,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}
