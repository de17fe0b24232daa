use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::capture_models::{
    CaptureIndex, CaptureIndexConfig, CapturePacketRecord, CaptureResult, CaptureSession, CaptureStats,
    Direction,
};
use crate::models::config::RecorderConfig;
use crate::models::error::CaptureError;
use crate::models::message_type::{type_name, MessageType};
use crate::models::state::RecorderState;
use crate::traits::packet_recorder::PacketRecorder;

use super::index::{sha256_file, write_index};

/// Storage behind the binary log.
trait LogFile: Write + Seek + Send {
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    fn sync_all(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        File::sync_all(self)
    }
}

/// One recording in progress.
struct ActiveCapture {
    session_id: String,
    started_at: DateTime<Utc>,
    start_instant: Instant,
    binary_path: PathBuf,
    index_path: PathBuf,
    writer: BufWriter<Box<dyn LogFile>>,
    offset: u64,
    next_seq: u64,
    packets: Vec<CapturePacketRecord>,
    stats: CaptureStats,
    failed_packets: u64,
    /// The log could not be rewound after a failed append; later packets
    /// are refused so indexed offsets stay valid.
    broken: bool,
}

impl ActiveCapture {
    fn new(
        session_id: String,
        started_at: DateTime<Utc>,
        binary_path: PathBuf,
        index_path: PathBuf,
        writer: BufWriter<Box<dyn LogFile>>,
    ) -> Self {
        Self {
            session_id,
            started_at,
            start_instant: Instant::now(),
            binary_path,
            index_path,
            writer,
            offset: 0,
            next_seq: 0,
            packets: Vec::new(),
            stats: CaptureStats::default(),
            failed_packets: 0,
            broken: false,
        }
    }

    /// Append one packet. Sequence number, offset and log append happen
    /// together under the recorder lock.
    fn append(&mut self, direction: Direction, type_id: u32, data: &[u8]) {
        let timestamp_ms = self.start_instant.elapsed().as_millis() as u64;

        if self.broken {
            self.failed_packets += 1;
            return;
        }

        if let Err(e) = self.writer.write_all(data) {
            self.failed_packets += 1;
            log::error!(
                "Capture append failed for {} packet type {:#04x} ({} bytes): {}",
                direction,
                type_id,
                data.len(),
                e
            );
            self.rewind();
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.packets.push(CapturePacketRecord {
            seq,
            dir: direction,
            type_id,
            type_name: type_name(type_id).to_string(),
            timestamp_ms,
            offset: self.offset,
            length: data.len() as u64,
        });
        self.offset += data.len() as u64;
        self.stats.add(direction, data.len() as u64);

        let count = self.stats.total_packets();
        if count <= 10 || count % 500 == 0 {
            log::debug!(
                "Captured packet #{}: {} type={} len={} offset={}",
                count,
                direction,
                type_name(type_id),
                data.len(),
                self.offset - data.len() as u64
            );
        }
    }

    /// Drop any part of a failed packet that reached the log, so the next
    /// packet starts at the end of the last indexed one.
    fn rewind(&mut self) {
        let offset = self.offset;
        let result = self
            .writer
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.writer.get_mut().set_len(offset));
        if let Err(e) = result {
            log::error!("Capture log cannot be rewound to {}: {}; refusing further packets", offset, e);
            self.broken = true;
        }
    }
}

struct RecorderInner {
    state: RecorderState,
    output_dir: Option<PathBuf>,
    active: Option<ActiveCapture>,
}

/// Lossless recorder for the raw adapter byte stream.
///
/// Attach to a transport with `UsbTransport::set_recorder`. Each session
/// produces `<prefix>-<id>.bin`, the concatenation of every recorded
/// header+payload, and `<prefix>-<id>.json`, the packet index written on
/// [`stop`](Self::stop).
///
/// State transitions:
/// ```text
/// idle → ready → recording → ready
///                    ↓
///                  error
/// ```
pub struct CaptureRecorder {
    config: RecorderConfig,
    inner: Mutex<RecorderInner>,
    recording: AtomicBool,
}

impl CaptureRecorder {
    pub fn new(config: RecorderConfig) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(Self {
            config,
            inner: Mutex::new(RecorderInner {
                state: RecorderState::Idle,
                output_dir: None,
                active: None,
            }),
            recording: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> RecorderState {
        self.inner.lock().state.clone()
    }

    /// Id of the session being recorded.
    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().active.as_ref().map(|a| a.session_id.clone())
    }

    pub fn current_stats(&self) -> CaptureStats {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|a| a.stats)
            .unwrap_or_default()
    }

    /// Choose where captures are written. The directory must exist and be
    /// writable. Transitions: idle → ready.
    pub fn set_output_directory(&self, dir: impl Into<PathBuf>) -> Result<(), CaptureError> {
        let dir = dir.into();
        let mut inner = self.inner.lock();
        if inner.active.is_some() {
            return Err(CaptureError::InvalidState(
                "cannot change output directory while recording".into(),
            ));
        }

        check_writable(&dir)?;
        log::info!("Capture output directory: {}", dir.display());
        inner.output_dir = Some(dir);
        inner.state = RecorderState::Ready;
        Ok(())
    }

    /// Start a new session. Returns the session id; a no-op returning the
    /// current id when already recording.
    pub fn start(&self) -> Result<String, CaptureError> {
        let mut inner = self.inner.lock();
        if let Some(active) = &inner.active {
            return Ok(active.session_id.clone());
        }

        let dir = inner.output_dir.clone().ok_or(CaptureError::NotConfigured)?;

        let started_at = Utc::now();
        let session_id = started_at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
        let base = format!("{}-{}", self.config.file_prefix, session_id);
        let binary_path = dir.join(format!("{}.bin", base));
        let index_path = dir.join(format!("{}.json", base));

        let file = match create_pair(&binary_path, &index_path) {
            Ok(file) => file,
            Err(e) => {
                inner.state = RecorderState::Error(e.to_string());
                return Err(e);
            }
        };

        let writer: BufWriter<Box<dyn LogFile>> =
            BufWriter::with_capacity(self.config.write_buffer_size, Box::new(file));
        inner.active = Some(ActiveCapture::new(
            session_id.clone(),
            started_at,
            binary_path,
            index_path,
            writer,
        ));
        inner.state = RecorderState::Recording;
        self.recording.store(true, Ordering::SeqCst);

        log::info!("Capture started: {}", session_id);
        Ok(session_id)
    }

    /// Finish the session: flush the log, write the index, checksum the log.
    ///
    /// Returns `Ok(None)` when not recording.
    pub fn stop(&self) -> Result<Option<CaptureResult>, CaptureError> {
        let mut inner = self.inner.lock();
        let Some(mut active) = inner.active.take() else {
            return Ok(None);
        };
        self.recording.store(false, Ordering::SeqCst);

        match finalize(&mut active, &self.config) {
            Ok(result) => {
                inner.state = RecorderState::Ready;
                log::info!(
                    "Capture stopped: {} packets in / {} out, {} bytes, {} ms{}",
                    result.stats.packets_in,
                    result.stats.packets_out,
                    result.stats.total_bytes(),
                    result.session.duration_ms,
                    if result.is_degraded() { " (degraded)" } else { "" }
                );
                Ok(Some(result))
            }
            Err(e) => {
                log::error!("Failed to finalize capture {}: {}", active.session_id, e);
                inner.state = RecorderState::Error(e.to_string());
                Err(e)
            }
        }
    }

    fn should_record(&self, direction: Direction, type_id: u32) -> bool {
        match MessageType::from_id(type_id) {
            Some(t) if t.is_video() => self.config.include_video_data,
            Some(MessageType::AudioData) => {
                self.config.include_audio_data
                    && match direction {
                        Direction::In => self.config.include_speaker_data,
                        Direction::Out => self.config.include_mic_data,
                    }
            }
            _ => true,
        }
    }
}

impl PacketRecorder for CaptureRecorder {
    fn record_packet(&self, direction: Direction, type_id: u32, data: &[u8]) {
        if !self.recording.load(Ordering::SeqCst) || !self.should_record(direction, type_id) {
            return;
        }
        if let Some(active) = self.inner.lock().active.as_mut() {
            active.append(direction, type_id, data);
        }
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Capture not finalized on drop: {}", e);
        }
    }
}

fn check_writable(dir: &Path) -> Result<(), CaptureError> {
    if !dir.is_dir() {
        return Err(CaptureError::DirectoryNotWritable(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let marker = dir.join(".carlink_write_check");
    fs::write(&marker, b"")
        .map_err(|e| CaptureError::DirectoryNotWritable(format!("{}: {}", dir.display(), e)))?;
    let _ = fs::remove_file(&marker);
    Ok(())
}

fn create_pair(binary_path: &Path, index_path: &Path) -> Result<File, CaptureError> {
    let file = File::create(binary_path)
        .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", binary_path.display(), e)))?;
    File::create(index_path)
        .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", index_path.display(), e)))?;
    Ok(file)
}

fn finalize(active: &mut ActiveCapture, config: &RecorderConfig) -> Result<CaptureResult, CaptureError> {
    active
        .writer
        .flush()
        .map_err(|e| CaptureError::StorageError(format!("failed to flush capture log: {}", e)))?;
    let end = active.offset;
    let log = active.writer.get_mut();
    // Trailing bytes of a failed final append are not indexed.
    log.set_len(end)
        .and_then(|_| log.sync_all())
        .map_err(|e| CaptureError::StorageError(format!("failed to sync capture log: {}", e)))?;

    let ended_at = Utc::now();
    let session = CaptureSession {
        id: active.session_id.clone(),
        started: iso_millis(&active.started_at),
        ended: iso_millis(&ended_at),
        duration_ms: active.start_instant.elapsed().as_millis() as u64,
    };

    let index = CaptureIndex {
        version: CaptureIndex::VERSION.into(),
        session: session.clone(),
        config: CaptureIndexConfig {
            include_video_data: config.include_video_data,
            include_audio_data: config.include_audio_data,
            include_mic_data: config.include_mic_data,
            include_speaker_data: config.include_speaker_data,
        },
        packets: std::mem::take(&mut active.packets),
        stats: active.stats,
    };
    write_index(&index, &active.index_path)?;

    Ok(CaptureResult {
        binary_path: active.binary_path.clone(),
        index_path: active.index_path.clone(),
        session,
        stats: active.stats,
        checksum: sha256_file(&active.binary_path)?,
        failed_packets: active.failed_packets,
    })
}

fn iso_millis(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::capture::index::{read_index, tiling_gaps};
    use crate::protocol::encode::{encode_command, encode_frame, encode_heartbeat};
    use crate::models::message_type::CommandMapping;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("carlink_recorder_test_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn recorder_in(dir: &Path) -> CaptureRecorder {
        let recorder = CaptureRecorder::new(RecorderConfig::default()).unwrap();
        recorder.set_output_directory(dir).unwrap();
        recorder
    }

    #[test]
    fn start_requires_output_directory() {
        let recorder = CaptureRecorder::new(RecorderConfig::default()).unwrap();
        assert_eq!(recorder.start(), Err(CaptureError::NotConfigured));
        assert!(matches!(
            recorder.set_output_directory("/nonexistent/carlink/dir"),
            Err(CaptureError::DirectoryNotWritable(_))
        ));
        assert_eq!(recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn records_packets_and_writes_index() {
        let dir = temp_dir("basic");
        let recorder = recorder_in(&dir);
        assert_eq!(recorder.state(), RecorderState::Ready);

        // Ignored before start.
        recorder.record_packet(Direction::In, 0xAA, &encode_heartbeat());

        let id = recorder.start().unwrap();
        assert_eq!(recorder.start().unwrap(), id);
        assert!(recorder.state().is_recording());

        let phase = encode_frame(MessageType::Phase, &8u32.to_le_bytes());
        let command = encode_command(CommandMapping::Frame);
        recorder.record_packet(Direction::In, 0x03, &phase);
        recorder.record_packet(Direction::Out, 0x08, &command);
        assert_eq!(recorder.current_stats().total_packets(), 2);

        let result = recorder.stop().unwrap().unwrap();
        assert_eq!(recorder.state(), RecorderState::Ready);
        assert!(!result.is_degraded());
        assert_eq!(result.session.id, id);
        assert!(result.binary_path.ends_with(format!("carlink_capture-{}.bin", id)));

        let log = fs::read(&result.binary_path).unwrap();
        assert_eq!(log, [phase.clone(), command.clone()].concat());
        assert_eq!(result.checksum, sha256_file(&result.binary_path).unwrap());

        let index = read_index(&result.index_path).unwrap();
        assert_eq!(index.version, "1.0");
        assert_eq!(index.packets.len(), 2);
        assert_eq!(index.packets[0].dir, Direction::In);
        assert_eq!(index.packets[0].type_name, "PHASE");
        assert_eq!(index.packets[1].offset, phase.len() as u64);
        assert_eq!(index.packets[1].type_name, "COMMAND");
        assert_eq!(index.stats.packets_in, 1);
        assert_eq!(index.stats.bytes_out, command.len() as u64);
        assert!(tiling_gaps(&index.packets, log.len() as u64).is_empty());

        assert_eq!(recorder.stop(), Ok(None));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn session_id_format() {
        let dir = temp_dir("id");
        let recorder = recorder_in(&dir);
        let id = recorder.start().unwrap();
        // yyyy-MM-ddTHH-mm-ss-SSSZ
        assert_eq!(id.len(), 24);
        assert_eq!(&id[10..11], "T");
        assert!(id.ends_with('Z'));
        assert!(!id.contains(':'));
        let result = recorder.stop().unwrap().unwrap();
        assert!(result.session.started.contains(':'));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn include_flags_filter_before_sequencing() {
        let dir = temp_dir("filter");
        let config = RecorderConfig {
            include_video_data: false,
            include_mic_data: false,
            ..Default::default()
        };
        let recorder = CaptureRecorder::new(config).unwrap();
        recorder.set_output_directory(&dir).unwrap();
        recorder.start().unwrap();

        let video = encode_frame(MessageType::VideoData, &[0u8; 40]);
        let audio = encode_frame(MessageType::AudioData, &[0u8; 76]);
        recorder.record_packet(Direction::In, 0x06, &video);
        recorder.record_packet(Direction::In, 0x2C, &video);
        recorder.record_packet(Direction::Out, 0x07, &audio);
        recorder.record_packet(Direction::In, 0x07, &audio);

        let result = recorder.stop().unwrap().unwrap();
        let index = read_index(&result.index_path).unwrap();
        assert_eq!(index.packets.len(), 1);
        assert_eq!(index.packets[0].seq, 0);
        assert_eq!(index.packets[0].type_id, 0x07);
        assert_eq!(index.packets[0].dir, Direction::In);
        assert!(!index.config.include_video_data);
        let _ = fs::remove_dir_all(&dir);
    }

    /// In-memory log that fails writes once its byte budget runs out.
    #[derive(Clone, Default)]
    struct FlakyLog {
        data: Arc<Mutex<io::Cursor<Vec<u8>>>>,
        budget: Arc<Mutex<Option<usize>>>,
    }

    impl Write for FlakyLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut budget = self.budget.lock();
            let n = match *budget {
                Some(0) => return Err(io::Error::new(io::ErrorKind::Other, "no space left on device")),
                Some(left) => {
                    let n = left.min(buf.len());
                    *budget = Some(left - n);
                    n
                }
                None => buf.len(),
            };
            self.data.lock().write(&buf[..n])
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FlakyLog {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.data.lock().seek(pos)
        }
    }

    impl LogFile for FlakyLog {
        fn set_len(&mut self, len: u64) -> io::Result<()> {
            self.data.lock().get_mut().truncate(len as usize);
            Ok(())
        }

        fn sync_all(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_append_keeps_log_tiled() {
        let dir = temp_dir("degraded");
        let binary_path = dir.join("degraded.bin");
        let index_path = dir.join("degraded.json");
        fs::write(&binary_path, b"").unwrap();

        let log = FlakyLog::default();
        let writer: BufWriter<Box<dyn LogFile>> = BufWriter::with_capacity(8, Box::new(log.clone()));
        let mut active = ActiveCapture::new("degraded".into(), Utc::now(), binary_path, index_path.clone(), writer);

        let first = encode_frame(MessageType::Phase, &1u32.to_le_bytes());
        let lost = encode_frame(MessageType::Phase, &2u32.to_le_bytes());
        let last = encode_command(CommandMapping::Frame);

        active.append(Direction::In, 0x03, &first);
        // Part of the packet lands before the write fails.
        *log.budget.lock() = Some(5);
        active.append(Direction::In, 0x03, &lost);
        *log.budget.lock() = None;
        active.append(Direction::Out, 0x08, &last);

        let result = finalize(&mut active, &RecorderConfig::default()).unwrap();
        assert!(result.is_degraded());
        assert_eq!(result.failed_packets, 1);
        assert_eq!(result.stats.total_packets(), 2);

        let bytes = log.data.lock().get_ref().clone();
        assert_eq!(bytes, [first.clone(), last].concat());

        let index = read_index(&index_path).unwrap();
        assert_eq!(index.packets.len(), 2);
        assert_eq!(index.packets[1].seq, 1);
        assert_eq!(index.packets[1].offset, first.len() as u64);
        assert!(tiling_gaps(&index.packets, bytes.len() as u64).is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn concurrent_writers_tile_the_log() {
        let dir = temp_dir("concurrent");
        let recorder = Arc::new(recorder_in(&dir));
        recorder.start().unwrap();

        let writers: Vec<_> = [Direction::In, Direction::Out]
            .into_iter()
            .map(|direction| {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    for i in 0..200u32 {
                        let payload = vec![i as u8; (i % 37) as usize];
                        let frame = encode_frame(MessageType::Phase, &payload);
                        recorder.record_packet(direction, 0x03, &frame);
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let result = recorder.stop().unwrap().unwrap();
        let log = fs::read(&result.binary_path).unwrap();
        let index = read_index(&result.index_path).unwrap();

        assert_eq!(index.packets.len(), 400);
        assert!(tiling_gaps(&index.packets, log.len() as u64).is_empty());
        for (i, p) in index.packets.iter().enumerate() {
            assert_eq!(p.seq, i as u64);
            let bytes = &log[p.offset as usize..p.end() as usize];
            assert_eq!(&bytes[..4], &[0xAAu8, 0x55, 0xAA, 0x55][..]);
        }
        // Sequence order matches offset order.
        assert!(index.packets.windows(2).all(|w| w[0].offset < w[1].offset));
        assert_eq!(result.stats.packets_in, 200);
        assert_eq!(result.stats.packets_out, 200);
        let _ = fs::remove_dir_all(&dir);
    }
}
