use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, RwLock};

use crate::models::capture_models::Direction;
use crate::models::config::TransportConfig;
use crate::models::error::{DeviceError, HeaderError, TransportError};
use crate::models::message::Message;
use crate::models::message_type::{CommandMapping, MessageType};
use crate::models::state::TransportState;
use crate::protocol::encode::{encode_command, encode_frame, encode_heartbeat};
use crate::protocol::header::{parse_header, u32_at, MessageHeader, HEADER_SIZE};
use crate::traits::bulk_device::BulkDevice;
use crate::traits::packet_recorder::PacketRecorder;
use crate::traits::transport_delegate::TransportDelegate;

use super::dispatcher::MessageDispatcher;

/// Snapshot of transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub frames_in: u64,
    pub frames_out: u64,
    pub video_frames_streamed: u64,
    pub header_errors: u64,
    pub incomplete_reads: u64,
    pub write_errors: u64,
}

#[derive(Default)]
struct Counters {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    video_frames_streamed: AtomicU64,
    header_errors: AtomicU64,
    incomplete_reads: AtomicU64,
    write_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransportStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        TransportStats {
            bytes_in: get(&self.bytes_in),
            bytes_out: get(&self.bytes_out),
            frames_in: get(&self.frames_in),
            frames_out: get(&self.frames_out),
            video_frames_streamed: get(&self.video_frames_streamed),
            header_errors: get(&self.header_errors),
            incomplete_reads: get(&self.incomplete_reads),
            write_errors: get(&self.write_errors),
        }
    }
}

/// State shared between the owner, writers and the read loop thread.
struct Shared {
    state: Mutex<TransportState>,
    delegate: RwLock<Option<Arc<dyn TransportDelegate>>>,
    recorder: RwLock<Option<Arc<dyn PacketRecorder>>>,
    counters: Counters,
    running: AtomicBool,
    /// Set when `close()` ran on the read loop thread; the loop releases the
    /// device once it has exited.
    close_on_exit: AtomicBool,
}

impl Shared {
    fn set_state(&self, new_state: TransportState) {
        {
            let mut state = self.state.lock();
            if *state == new_state {
                return;
            }
            log::debug!("Transport state {:?} -> {:?}", *state, new_state);
            *state = new_state.clone();
        }
        if let Some(delegate) = self.delegate.read().as_ref() {
            delegate.on_state_changed(&new_state);
        }
    }

    fn recorder(&self) -> Option<Arc<dyn PacketRecorder>> {
        self.recorder
            .read()
            .as_ref()
            .filter(|r| r.is_recording())
            .cloned()
    }

    fn record(&self, direction: Direction, type_id: u32, data: &[u8]) {
        if let Some(recorder) = self.recorder() {
            recorder.record_packet(direction, type_id, data);
        }
    }

    fn report_error(&self, error: TransportError) {
        log::error!("Transport error: {}", error);
        if let Some(delegate) = self.delegate.read().as_ref() {
            delegate.on_error(&error);
        }
    }
}

/// Bulk-USB transport for a CPC200-CCPA adapter.
///
/// Owns the device and a dedicated `usb-read-loop` thread that frames the
/// inbound stream, feeds video straight into the video sink, and dispatches
/// everything else through a [`MessageDispatcher`]. Writes may come from any
/// thread. Every frame crossing the wire is offered to the attached
/// [`PacketRecorder`].
///
/// State transitions:
/// ```text
/// idle → opening → active → closing → closed
/// ```
/// A device I/O failure moves the transport to `closing` and is reported to
/// the delegate; the owner calls [`close`](Self::close) to finish teardown.
pub struct UsbTransport<D: BulkDevice> {
    device: Arc<D>,
    config: TransportConfig,
    shared: Arc<Shared>,
    read_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<D: BulkDevice> UsbTransport<D> {
    pub fn new(device: D, config: TransportConfig) -> Self {
        Self {
            device: Arc::new(device),
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(TransportState::Idle),
                delegate: RwLock::new(None),
                recorder: RwLock::new(None),
                counters: Counters::default(),
                running: AtomicBool::new(false),
                close_on_exit: AtomicBool::new(false),
            }),
            read_handle: Mutex::new(None),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn TransportDelegate>) {
        *self.shared.delegate.write() = Some(delegate);
    }

    /// Attach or detach the capture side channel. Takes effect on the next frame.
    pub fn set_recorder(&self, recorder: Option<Arc<dyn PacketRecorder>>) {
        *self.shared.recorder.write() = recorder;
    }

    pub fn state(&self) -> TransportState {
        self.shared.state.lock().clone()
    }

    pub fn stats(&self) -> TransportStats {
        self.shared.counters.snapshot()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Open the device and start the read loop. Transitions: idle → opening → active.
    pub fn start(&self, dispatcher: Arc<MessageDispatcher>) -> Result<(), TransportError> {
        self.config
            .validate()
            .map_err(TransportError::ConfigurationFailed)?;

        {
            let state = self.shared.state.lock();
            if !matches!(*state, TransportState::Idle | TransportState::Closed) {
                return Err(TransportError::InvalidState(format!(
                    "cannot start from {:?}",
                    *state
                )));
            }
        }

        // A loop that closed itself leaves its handle behind; it has exited.
        if let Some(previous) = self.read_handle.lock().take() {
            if previous.join().is_err() {
                log::error!("USB read loop panicked");
            }
        }

        self.shared.set_state(TransportState::Opening);

        if !self.device.request_permission(self.config.permission_timeout) {
            self.shared.set_state(TransportState::Closed);
            return Err(DeviceError::PermissionDenied.into());
        }

        if let Err(e) = self.device.open() {
            log::error!("Failed to open device: {}", e);
            self.shared.set_state(TransportState::Closed);
            return Err(e.into());
        }

        self.shared.close_on_exit.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(TransportState::Active);

        let read_loop = ReadLoop {
            device: Arc::clone(&self.device),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            dispatcher,
        };

        // Held until the handle is stored so a loop that fails immediately
        // still sees its own handle in close().
        let mut slot = self.read_handle.lock();
        let spawned = thread::Builder::new()
            .name("usb-read-loop".into())
            .spawn(move || read_loop.run());

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                log::info!("USB transport started");
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.device.close();
                self.shared.set_state(TransportState::Closed);
                Err(TransportError::Spawn(e.to_string()))
            }
        }
    }

    /// Stop the read loop, release the device. Idempotent.
    ///
    /// The device is released only after the read loop has exited. When
    /// called from the loop itself (e.g. from a delegate callback) the
    /// release happens as the loop returns.
    pub fn close(&self) {
        if matches!(
            self.state(),
            TransportState::Idle | TransportState::Closed
        ) {
            return;
        }

        self.shared.set_state(TransportState::Closing);
        self.shared.running.store(false, Ordering::SeqCst);

        let handle = {
            let mut slot = self.read_handle.lock();
            match slot.take() {
                Some(handle) if handle.thread().id() == thread::current().id() => {
                    self.shared.close_on_exit.store(true, Ordering::SeqCst);
                    *slot = Some(handle);
                    return;
                }
                other => other,
            }
        };

        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("USB read loop panicked");
            }
        }

        // The loop may have finished a deferred close while we joined it.
        if self.state().is_closed() {
            return;
        }

        self.device.close();
        self.shared.set_state(TransportState::Closed);
        log::info!("USB transport closed");
    }

    /// Write raw bytes to the OUT endpoint.
    ///
    /// Complete frames are offered to the recorder as outbound packets.
    pub fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.state().is_active() {
            return Err(TransportError::InvalidState("transport not active".into()));
        }

        let written = match self.device.bulk_write(data, self.config.write_timeout) {
            Ok(n) => n,
            Err(e) => {
                Counters::bump(&self.shared.counters.write_errors, 1);
                log::error!("Bulk write of {} bytes failed: {}", data.len(), e);
                return Err(e.into());
            }
        };

        Counters::bump(&self.shared.counters.bytes_out, written as u64);
        Counters::bump(&self.shared.counters.frames_out, 1);

        if data.len() >= HEADER_SIZE {
            if let Some(type_id) = u32_at(data, 8) {
                self.shared.record(Direction::Out, type_id, data);
            }
        }
        Ok(written)
    }

    /// Frame and send a message.
    pub fn send(&self, message_type: MessageType, payload: &[u8]) -> Result<usize, TransportError> {
        self.write(&encode_frame(message_type, payload))
    }

    pub fn send_command(&self, command: CommandMapping) -> Result<usize, TransportError> {
        self.write(&encode_command(command))
    }

    pub fn send_heartbeat(&self) -> Result<usize, TransportError> {
        self.write(&encode_heartbeat())
    }

    /// USB port reset, if the host supports it.
    pub fn reset(&self) -> Result<(), TransportError> {
        self.device.reset().map_err(TransportError::from)
    }
}

impl<D: BulkDevice> Drop for UsbTransport<D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything the read loop thread owns.
struct ReadLoop<D: BulkDevice> {
    device: Arc<D>,
    config: TransportConfig,
    shared: Arc<Shared>,
    dispatcher: Arc<MessageDispatcher>,
}

impl<D: BulkDevice> ReadLoop<D> {
    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn run(self) {
        let mut header_bytes = [0u8; HEADER_SIZE];
        let mut scratch = Vec::with_capacity(self.config.video_scratch_size);

        while self.is_running() {
            match self.read_header(&mut header_bytes) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    self.fail(e);
                    break;
                }
            }

            let header = match parse_header(&header_bytes) {
                Ok(h) => h,
                Err(e) => {
                    log::warn!("Dropping frame: {}", e);
                    Counters::bump(&self.shared.counters.header_errors, 1);
                    continue;
                }
            };

            if header.length > self.config.max_payload_len {
                let error = HeaderError::PayloadTooLarge {
                    length: header.length,
                    limit: self.config.max_payload_len,
                };
                log::warn!("Dropping frame type {:#04x}: {}", header.type_id, error);
                Counters::bump(&self.shared.counters.header_errors, 1);
                continue;
            }

            let streams_video = header.type_id == MessageType::VideoData.id()
                && header.length > 0
                && self.dispatcher.video_sink().is_some();

            let result = if streams_video {
                self.stream_video(&header, &header_bytes, &mut scratch)
            } else {
                self.read_and_dispatch(&header, &header_bytes)
            };

            if let Err(e) = result {
                self.fail(e);
                break;
            }
        }

        log::debug!("USB read loop exiting");

        if self.shared.close_on_exit.swap(false, Ordering::SeqCst) {
            self.device.close();
            self.shared.set_state(TransportState::Closed);
            log::info!("USB transport closed");
        }
    }

    /// `Ok(false)` when no complete header arrived.
    fn read_header(&self, buf: &mut [u8; HEADER_SIZE]) -> Result<bool, DeviceError> {
        match self.device.bulk_read(buf, self.config.read_timeout) {
            Ok(HEADER_SIZE) => {
                Counters::bump(&self.shared.counters.bytes_in, HEADER_SIZE as u64);
                Ok(true)
            }
            Ok(0) => Ok(false),
            Ok(n) => {
                log::warn!("Incomplete header: {} of {} bytes", n, HEADER_SIZE);
                Counters::bump(&self.shared.counters.bytes_in, n as u64);
                Counters::bump(&self.shared.counters.incomplete_reads, 1);
                Ok(false)
            }
            Err(DeviceError::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fill `buf` with chunked bulk reads. Returns bytes read; less than
    /// `buf.len()` when a sub-read timed out or the loop was stopped.
    fn read_fully(&self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let mut filled = 0;
        while filled < buf.len() && self.is_running() {
            let end = (filled + self.config.chunk_size).min(buf.len());
            match self.device.bulk_read(&mut buf[filled..end], self.config.read_timeout) {
                Ok(0) | Err(DeviceError::Timeout) => break,
                Ok(n) => filled += n,
                Err(e) => return Err(e),
            }
        }
        Counters::bump(&self.shared.counters.bytes_in, filled as u64);
        Ok(filled)
    }

    fn stream_video(
        &self,
        header: &MessageHeader,
        header_bytes: &[u8; HEADER_SIZE],
        scratch: &mut Vec<u8>,
    ) -> Result<(), DeviceError> {
        let Some(sink) = self.dispatcher.video_sink() else {
            return self.read_and_dispatch(header, header_bytes);
        };
        let length = header.length as usize;
        let pts = self.dispatcher.pts_ms();

        if let Some(recorder) = self.shared.recorder() {
            // Capture before the sink consumes the payload.
            scratch.clear();
            scratch.resize(HEADER_SIZE + length, 0);
            scratch[..HEADER_SIZE].copy_from_slice(header_bytes);
            let read = self.read_fully(&mut scratch[HEADER_SIZE..])?;
            if read < length {
                self.incomplete(header, read);
                return Ok(());
            }
            recorder.record_packet(Direction::In, header.type_id, &scratch[..]);

            let payload = &scratch[HEADER_SIZE..];
            sink.process_video_direct(length, pts, &mut |dst: &mut [u8]| {
                let n = dst.len().min(payload.len());
                dst[..n].copy_from_slice(&payload[..n]);
                n
            });
        } else {
            let mut io_error = None;
            let filled = sink.process_video_direct(length, pts, &mut |dst: &mut [u8]| {
                match self.read_fully(dst) {
                    Ok(n) => n,
                    Err(e) => {
                        io_error = Some(e);
                        0
                    }
                }
            });
            if let Some(e) = io_error {
                return Err(e);
            }
            if filled < length {
                self.incomplete(header, filled);
                return Ok(());
            }
        }

        Counters::bump(&self.shared.counters.frames_in, 1);
        Counters::bump(&self.shared.counters.video_frames_streamed, 1);
        self.dispatcher.dispatch(Message::VideoStreamed {
            length: header.length,
        });
        Ok(())
    }

    fn read_and_dispatch(
        &self,
        header: &MessageHeader,
        header_bytes: &[u8; HEADER_SIZE],
    ) -> Result<(), DeviceError> {
        let length = header.length as usize;

        let payload = if length == 0 {
            self.shared.record(Direction::In, header.type_id, header_bytes);
            None
        } else {
            let mut frame = vec![0u8; HEADER_SIZE + length];
            frame[..HEADER_SIZE].copy_from_slice(header_bytes);
            let read = self.read_fully(&mut frame[HEADER_SIZE..])?;
            if read < length {
                self.incomplete(header, read);
                None
            } else {
                self.shared.record(Direction::In, header.type_id, &frame);
                frame.drain(..HEADER_SIZE);
                Some(frame)
            }
        };

        Counters::bump(&self.shared.counters.frames_in, 1);
        self.dispatcher.dispatch_frame(header, payload);
        Ok(())
    }

    fn incomplete(&self, header: &MessageHeader, read: usize) {
        log::warn!(
            "Incomplete payload for type {:#04x}: {} of {} bytes",
            header.type_id,
            read,
            header.length
        );
        Counters::bump(&self.shared.counters.incomplete_reads, 1);
    }

    fn fail(&self, error: DeviceError) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.set_state(TransportState::Closing);
        self.shared.report_error(TransportError::Device(error));
    }
}
