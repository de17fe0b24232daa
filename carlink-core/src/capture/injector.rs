use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::capture_models::CaptureSession;
use crate::models::message::{AudioPayload, Message};
use crate::models::message_type::MessageType;
use crate::processing::capture_format::{
    detect_capture_prefix, extract_audio, extract_h264, find_nal_type,
};
use crate::protocol::header::{parse_header, HEADER_SIZE};
use crate::protocol::parser::{parse_message, VIDEO_SUBHEADER_SIZE};
use crate::traits::replay_callback::ReplayCallback;
use crate::transport::dispatcher::MessageDispatcher;

/// Counters for packets injected during replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectorStats {
    pub video_packets: u64,
    pub audio_packets: u64,
    pub other_packets: u64,
    pub dropped_packets: u64,
}

/// Feeds replayed packets into the same dispatcher the live transport uses.
///
/// Video goes straight to the video sink, PCM straight to the audio sink,
/// everything else is parsed and dispatched. Lifecycle callbacks are
/// forwarded to an optional listener.
pub struct ReplayInjector {
    dispatcher: Arc<MessageDispatcher>,
    listener: Option<Arc<dyn ReplayCallback>>,
    video_packets: AtomicU64,
    audio_packets: AtomicU64,
    other_packets: AtomicU64,
    dropped_packets: AtomicU64,
    progress_ms: AtomicU64,
    completed: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl ReplayInjector {
    pub fn new(dispatcher: Arc<MessageDispatcher>) -> Self {
        Self {
            dispatcher,
            listener: None,
            video_packets: AtomicU64::new(0),
            audio_packets: AtomicU64::new(0),
            other_packets: AtomicU64::new(0),
            dropped_packets: AtomicU64::new(0),
            progress_ms: AtomicU64::new(0),
            completed: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ReplayCallback>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn stats(&self) -> InjectorStats {
        InjectorStats {
            video_packets: self.video_packets.load(Ordering::Relaxed),
            audio_packets: self.audio_packets.load(Ordering::Relaxed),
            other_packets: self.other_packets.load(Ordering::Relaxed),
            dropped_packets: self.dropped_packets.load(Ordering::Relaxed),
        }
    }

    pub fn progress_ms(&self) -> u64 {
        self.progress_ms.load(Ordering::Relaxed)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn drop_packet(&self) {
        self.dropped_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Parse the frame inside a captured packet.
    fn parse(&self, data: &[u8]) -> Option<Message> {
        let frame = &data[detect_capture_prefix(data)..];
        if frame.len() < HEADER_SIZE {
            log::debug!("Replayed packet shorter than a header: {} bytes", frame.len());
            return None;
        }
        let header = match parse_header(&frame[..HEADER_SIZE]) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("Replayed packet has invalid header: {}", e);
                return None;
            }
        };
        let body = &frame[HEADER_SIZE..];
        let payload = (!body.is_empty()).then(|| body[..body.len().min(header.length as usize)].to_vec());
        Some(parse_message(&header, payload))
    }

    fn inject_video(&self, data: &[u8]) {
        let Some(sink) = self.dispatcher.video_sink() else {
            match self.parse(data) {
                Some(message) => self.dispatcher.dispatch(message),
                None => self.drop_packet(),
            }
            return;
        };
        let Some(h264) = extract_h264(data) else {
            self.drop_packet();
            return;
        };

        let count = self.video_packets.fetch_add(1, Ordering::Relaxed) + 1;
        if count <= 5 || count % 100 == 0 {
            log::debug!(
                "Replay video #{}: {} bytes, NAL type {:?}",
                count,
                h264.len(),
                find_nal_type(h264)
            );
        }
        sink.accept_h264(h264, self.dispatcher.pts_ms());
        self.dispatcher.notify(&Message::VideoStreamed {
            length: (h264.len() + VIDEO_SUBHEADER_SIZE) as u32,
        });
    }

    fn inject_audio(&self, data: &[u8]) {
        let Some(message) = self.parse(data) else {
            self.drop_packet();
            return;
        };

        match (&message, extract_audio(data)) {
            (_, Some(audio)) => {
                let count = self.audio_packets.fetch_add(1, Ordering::Relaxed) + 1;
                if count <= 5 || count % 500 == 0 {
                    log::debug!(
                        "Replay audio #{}: {} bytes, type={} decode={}",
                        count,
                        audio.pcm.len(),
                        audio.audio_type,
                        audio.decode_type
                    );
                }
                // Route through the dispatcher so observers see it as live.
                self.dispatcher.dispatch(message);
            }
            // PCM below MIN_AUDIO_PAYLOAD_SIZE.
            (Message::AudioData { payload: AudioPayload::Pcm(_), .. }, None) => self.drop_packet(),
            _ => {
                self.other_packets.fetch_add(1, Ordering::Relaxed);
                self.dispatcher.dispatch(message);
            }
        }
    }
}

impl ReplayCallback for ReplayInjector {
    fn on_session_start(&self, session: &CaptureSession) {
        self.completed.store(false, Ordering::SeqCst);
        log::info!("Replaying capture {} ({} ms)", session.id, session.duration_ms);
        if let Some(listener) = &self.listener {
            listener.on_session_start(session);
        }
    }

    fn on_packet(&self, type_id: u32, type_name: &str, data: &[u8]) {
        match MessageType::from_id(type_id) {
            Some(t) if t.is_video() => self.inject_video(data),
            Some(MessageType::AudioData) => self.inject_audio(data),
            _ => match self.parse(data) {
                Some(message) => {
                    self.other_packets.fetch_add(1, Ordering::Relaxed);
                    self.dispatcher.dispatch(message);
                }
                None => {
                    log::debug!("Dropping replayed {} packet", type_name);
                    self.drop_packet();
                }
            },
        }
        if let Some(listener) = &self.listener {
            listener.on_packet(type_id, type_name, data);
        }
    }

    fn on_progress(&self, current_ms: u64, total_ms: u64) {
        self.progress_ms.store(current_ms, Ordering::Relaxed);
        if let Some(listener) = &self.listener {
            listener.on_progress(current_ms, total_ms);
        }
    }

    fn on_complete(&self) {
        self.completed.store(true, Ordering::SeqCst);
        log::info!("Replay finished: {:?}", self.stats());
        if let Some(listener) = &self.listener {
            listener.on_complete();
        }
    }

    fn on_error(&self, message: &str) {
        log::error!("Replay error: {}", message);
        *self.last_error.lock() = Some(message.to_string());
        if let Some(listener) = &self.listener {
            listener.on_error(message);
        }
    }
}
