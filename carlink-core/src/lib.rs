//! # carlink-core
//!
//! Host-side transport core for CPC200-CCPA CarPlay / Android Auto adapters.
//!
//! Frames the adapter's USB bulk stream, parses messages, routes video and
//! audio to host sinks with minimal copying, and records or replays raw
//! traffic for offline debugging. USB access itself is host-provided through
//! the `BulkDevice` trait.
//!
//! ## Architecture
//!
//! ```text
//! carlink-core (this crate)
//! ├── traits/       ← BulkDevice, VideoSink, AudioSink, MessageObserver, TransportDelegate,
//! │                   PacketRecorder, ReplayCallback
//! ├── models/       ← MessageType, Message, AudioFormat, errors, states, configs, capture index
//! ├── protocol/     ← header validation, payload parsing, frame encoding
//! ├── processing/   ← AudioRingBuffer, captured-packet helpers
//! ├── transport/    ← UsbTransport read loop, MessageDispatcher
//! └── capture/      ← CaptureRecorder, CaptureReplay, ReplayInjector, index I/O
//! ```

pub mod capture;
pub mod models;
pub mod processing;
pub mod protocol;
pub mod traits;
pub mod transport;

// Re-export key types at crate root for convenience.
pub use capture::injector::{InjectorStats, ReplayInjector};
pub use capture::recorder::CaptureRecorder;
pub use capture::replay::CaptureReplay;
pub use models::audio_format::AudioFormat;
pub use models::capture_models::{
    CaptureIndex, CaptureIndexConfig, CapturePacketRecord, CaptureResult, CaptureSession, CaptureStats, Direction,
};
pub use models::config::{RecorderConfig, ReplayConfig, TransportConfig};
pub use models::device::{is_known_adapter, UsbId, KNOWN_ADAPTERS};
pub use models::error::{CaptureError, DeviceError, HeaderError, ReplayError, TransportError};
pub use models::message::{AudioPayload, MediaPayload, Message};
pub use models::message_type::{AudioCommand, CommandMapping, MediaType, MessageType, PhoneType};
pub use models::state::{RecorderState, ReplayState, TransportState};
pub use processing::ring_buffer::{AudioRingBuffer, RingBufferStats};
pub use protocol::encode::{encode_command, encode_frame, encode_heartbeat, encode_mic_audio};
pub use protocol::header::{parse_header, MessageHeader, HEADER_SIZE, PROTOCOL_MAGIC};
pub use protocol::parser::parse_message;
pub use traits::bulk_device::BulkDevice;
pub use traits::packet_recorder::PacketRecorder;
pub use traits::replay_callback::ReplayCallback;
pub use traits::sinks::{AudioSink, MessageObserver, VideoSink};
pub use traits::transport_delegate::TransportDelegate;
pub use transport::dispatcher::{MessageDispatcher, RingBufferSink};
pub use transport::reader::{TransportStats, UsbTransport};
