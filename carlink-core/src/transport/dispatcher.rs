use std::sync::Arc;
use std::time::Instant;

use crate::models::audio_format::AudioFormat;
use crate::models::message::{AudioPayload, Message};
use crate::processing::ring_buffer::AudioRingBuffer;
use crate::protocol::header::MessageHeader;
use crate::protocol::parser::parse_message;
use crate::traits::sinks::{AudioSink, MessageObserver, VideoSink};

/// Routes parsed messages to their consumers.
///
/// ```text
///                    ┌→ AudioSink      (AUDIO_DATA PCM)
/// frame → parse → ───┼→ VideoSink      (VIDEO_DATA H.264)
///                    └→ observers      (every message)
/// ```
///
/// Driven by the USB read loop and, during replay, by `ReplayInjector`.
pub struct MessageDispatcher {
    video_sink: Option<Arc<dyn VideoSink>>,
    audio_sink: Option<Arc<dyn AudioSink>>,
    observers: Vec<Arc<dyn MessageObserver>>,
    epoch: Instant,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self {
            video_sink: None,
            audio_sink: None,
            observers: Vec::new(),
            epoch: Instant::now(),
        }
    }

    pub fn with_video_sink(mut self, sink: Arc<dyn VideoSink>) -> Self {
        self.video_sink = Some(sink);
        self
    }

    pub fn with_audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.audio_sink = Some(sink);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn MessageObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn video_sink(&self) -> Option<&Arc<dyn VideoSink>> {
        self.video_sink.as_ref()
    }

    pub fn audio_sink(&self) -> Option<&Arc<dyn AudioSink>> {
        self.audio_sink.as_ref()
    }

    /// Milliseconds since this dispatcher was created; used as video PTS.
    pub fn pts_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Parse a frame and dispatch the resulting message.
    pub fn dispatch_frame(&self, header: &MessageHeader, payload: Option<Vec<u8>>) {
        self.dispatch(parse_message(header, payload));
    }

    pub fn dispatch(&self, message: Message) {
        match &message {
            Message::AudioData {
                decode_type,
                audio_type,
                payload: AudioPayload::Pcm(pcm),
                ..
            } => {
                if let Some(sink) = &self.audio_sink {
                    sink.enqueue_pcm(pcm, AudioFormat::from_decode_type(*decode_type), *audio_type);
                }
            }
            Message::VideoData { data: Some(data), .. } => {
                if let Some(sink) = &self.video_sink {
                    sink.accept_h264(data, self.pts_ms());
                }
            }
            _ => {}
        }

        self.notify(&message);
    }

    /// Deliver to observers only, bypassing the sinks.
    pub fn notify(&self, message: &Message) {
        for observer in &self.observers {
            observer.on_message(message);
        }
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio sink that feeds a jitter buffer drained by the host's audio thread.
///
/// PCM in a format other than the ring's is still written; the mismatch is
/// logged once per change so the host can rebuild its output.
pub struct RingBufferSink {
    ring: Arc<AudioRingBuffer>,
    format: AudioFormat,
    last_mismatch: parking_lot::Mutex<Option<AudioFormat>>,
}

impl RingBufferSink {
    pub fn new(ring: Arc<AudioRingBuffer>, format: AudioFormat) -> Self {
        Self {
            ring,
            format,
            last_mismatch: parking_lot::Mutex::new(None),
        }
    }

    pub fn ring(&self) -> &Arc<AudioRingBuffer> {
        &self.ring
    }
}

impl AudioSink for RingBufferSink {
    fn enqueue_pcm(&self, pcm: &[u8], format: AudioFormat, _audio_type: u32) {
        if format != self.format {
            let mut last = self.last_mismatch.lock();
            if *last != Some(format) {
                log::warn!(
                    "PCM format {}Hz/{}ch differs from ring format {}Hz/{}ch",
                    format.sample_rate,
                    format.channels,
                    self.format.sample_rate,
                    self.format.channels
                );
                *last = Some(format);
            }
        }
        self.ring.write(pcm);
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::models::message_type::MessageType;

    #[derive(Default)]
    struct Collector {
        messages: Mutex<Vec<Message>>,
        h264: Mutex<Vec<Vec<u8>>>,
        pcm: Mutex<Vec<(Vec<u8>, AudioFormat)>>,
    }

    impl MessageObserver for Collector {
        fn on_message(&self, message: &Message) {
            self.messages.lock().push(message.clone());
        }
    }

    impl VideoSink for Collector {
        fn accept_h264(&self, data: &[u8], _pts_ms: u64) {
            self.h264.lock().push(data.to_vec());
        }
    }

    impl AudioSink for Collector {
        fn enqueue_pcm(&self, pcm: &[u8], format: AudioFormat, _audio_type: u32) {
            self.pcm.lock().push((pcm.to_vec(), format));
        }
    }

    fn dispatcher(c: &Arc<Collector>) -> MessageDispatcher {
        MessageDispatcher::new()
            .with_video_sink(c.clone())
            .with_audio_sink(c.clone())
            .with_observer(c.clone())
    }

    #[test]
    fn routes_pcm_and_notifies_observers() {
        let c = Arc::new(Collector::default());
        let d = dispatcher(&c);

        let mut payload = 3u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&1.0f32.to_le_bytes());
        payload.extend_from_slice(&2u32.to_le_bytes());
        payload.extend_from_slice(&[9u8; 32]);
        d.dispatch_frame(&MessageHeader::new(MessageType::AudioData, 44), Some(payload));

        let pcm = c.pcm.lock();
        assert_eq!(pcm.len(), 1);
        assert_eq!(pcm[0].0, vec![9u8; 32]);
        assert_eq!(pcm[0].1, AudioFormat::new(8000, 1));
        assert_eq!(c.messages.lock().len(), 1);
    }

    #[test]
    fn routes_materialized_video() {
        let c = Arc::new(Collector::default());
        let d = dispatcher(&c);

        let mut payload = vec![0u8; 20];
        payload.extend_from_slice(&[0, 0, 0, 1, 0x65]);
        d.dispatch_frame(&MessageHeader::new(MessageType::VideoData, 25), Some(payload));
        assert_eq!(*c.h264.lock(), vec![vec![0, 0, 0, 1, 0x65]]);

        d.dispatch(Message::VideoStreamed { length: 25 });
        assert_eq!(c.h264.lock().len(), 1);
        assert_eq!(c.messages.lock().len(), 2);
    }

    #[test]
    fn ring_sink_writes_pcm() {
        let ring = Arc::new(AudioRingBuffer::new(10, 8000, 1));
        let sink = RingBufferSink::new(ring.clone(), AudioFormat::new(8000, 1));
        sink.enqueue_pcm(&[1; 40], AudioFormat::new(8000, 1), 1);
        sink.enqueue_pcm(&[2; 8], AudioFormat::new(48000, 2), 1);
        assert_eq!(ring.available_for_read(), 48);
        assert_eq!(sink.ring().total_bytes_written(), 48);
    }
}
