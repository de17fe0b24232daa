use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::capture_models::{CaptureIndex, CapturePacketRecord, CaptureSession, Direction};
use crate::models::config::ReplayConfig;
use crate::models::error::ReplayError;
use crate::models::state::ReplayState;
use crate::traits::replay_callback::ReplayCallback;

use super::index::{check_bounds, read_index};

/// Longest single sleep while pacing, so `stop()` stays responsive.
const MAX_PACING_SLEEP: Duration = Duration::from_millis(100);

struct LoadedCapture {
    index: CaptureIndex,
    binary_path: PathBuf,
    file: File,
    duration_ms: u64,
}

/// Plays a recorded capture back into a [`ReplayCallback`], reproducing the
/// original packet bytes and inter-packet timing.
///
/// Pair with `ReplayInjector` to drive the same sinks and observers the live
/// transport feeds.
pub struct CaptureReplay {
    config: ReplayConfig,
    state: Arc<Mutex<ReplayState>>,
    loaded: Mutex<Option<LoadedCapture>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CaptureReplay {
    pub fn new(config: ReplayConfig) -> Result<Self, ReplayError> {
        config.validate().map_err(ReplayError::ConfigurationFailed)?;
        Ok(Self {
            config,
            state: Arc::new(Mutex::new(ReplayState::Idle)),
            loaded: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ReplayState {
        self.state.lock().clone()
    }

    pub fn session(&self) -> Option<CaptureSession> {
        self.loaded.lock().as_ref().map(|l| l.index.session.clone())
    }

    /// Total playback length in capture time.
    pub fn duration_ms(&self) -> u64 {
        self.loaded.lock().as_ref().map_or(0, |l| l.duration_ms)
    }

    pub fn packet_count(&self) -> usize {
        self.loaded.lock().as_ref().map_or(0, |l| l.index.packets.len())
    }

    pub fn binary_path(&self) -> Option<PathBuf> {
        self.loaded.lock().as_ref().map(|l| l.binary_path.clone())
    }

    /// Load and validate a capture. Transitions: idle → loading → ready | error.
    pub fn load(&self, index_path: &Path, binary_path: &Path) -> Result<(), ReplayError> {
        if self.state().is_playing() {
            return Err(ReplayError::InvalidState("cannot load while playing".into()));
        }
        self.join_finished();
        self.set_state(ReplayState::Loading);

        match open_capture(index_path, binary_path) {
            Ok(loaded) => {
                log::info!(
                    "Loaded capture {}: {} packets, {} ms",
                    loaded.index.session.id,
                    loaded.index.packets.len(),
                    loaded.duration_ms
                );
                *self.loaded.lock() = Some(loaded);
                self.set_state(ReplayState::Ready);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load capture: {}", e);
                *self.loaded.lock() = None;
                self.set_state(ReplayState::Error(e.clone()));
                Err(e)
            }
        }
    }

    /// Start playback on the `capture-replay` thread. Allowed from ready or
    /// completed.
    pub fn start(&self, callback: Arc<dyn ReplayCallback>) -> Result<(), ReplayError> {
        {
            let state = self.state.lock();
            if !state.can_start() {
                return Err(ReplayError::InvalidState(format!("cannot start from {:?}", *state)));
            }
        }
        self.join_finished();

        let playback = {
            let loaded = self.loaded.lock();
            let loaded = loaded
                .as_ref()
                .ok_or_else(|| ReplayError::InvalidState("no capture loaded".into()))?;
            let file = loaded
                .file
                .try_clone()
                .map_err(|e| ReplayError::Io(e.to_string()))?;

            let mut packets: Vec<CapturePacketRecord> = loaded
                .index
                .packets
                .iter()
                .filter(|p| self.config.include_outbound || p.dir == Direction::In)
                .cloned()
                .collect();
            packets.sort_by_key(|p| p.seq);

            Playback {
                session: loaded.index.session.clone(),
                packets,
                file,
                total_ms: loaded.duration_ms,
                config: self.config.clone(),
                callback,
                state: Arc::clone(&self.state),
                running: Arc::clone(&self.running),
            }
        };

        self.running.store(true, Ordering::SeqCst);
        self.set_state(ReplayState::Playing);

        let spawned = thread::Builder::new()
            .name("capture-replay".into())
            .spawn(move || playback.run());

        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                let error = ReplayError::Io(format!("failed to spawn replay thread: {}", e));
                self.set_state(ReplayState::Error(error.clone()));
                Err(error)
            }
        }
    }

    /// Stop playback and return to idle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_finished();
        self.set_state(ReplayState::Idle);
    }

    fn join_finished(&self) {
        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("Replay thread panicked");
            }
        }
    }

    fn set_state(&self, new_state: ReplayState) {
        *self.state.lock() = new_state;
    }
}

impl Drop for CaptureReplay {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_finished();
    }
}

fn open_capture(index_path: &Path, binary_path: &Path) -> Result<LoadedCapture, ReplayError> {
    let index = read_index(index_path)?;
    if index.version != CaptureIndex::VERSION {
        log::warn!("Capture index version {} (expected {})", index.version, CaptureIndex::VERSION);
    }
    if index.packets.is_empty() {
        return Err(ReplayError::InvalidIndex("capture contains no packets".into()));
    }

    let file = File::open(binary_path)
        .map_err(|e| ReplayError::BinaryOpen(format!("{}: {}", binary_path.display(), e)))?;
    let file_len = file
        .metadata()
        .map_err(|e| ReplayError::BinaryOpen(e.to_string()))?
        .len();
    check_bounds(&index.packets, file_len)?;

    let last_ts = index.packets.iter().map(|p| p.timestamp_ms).max().unwrap_or(0);
    let duration_ms = index.session.duration_ms.max(last_ts);

    Ok(LoadedCapture {
        index,
        binary_path: binary_path.to_path_buf(),
        file,
        duration_ms,
    })
}

/// Offset from playback start at which a packet is due. Saturates at
/// `Duration::MAX` when the scaled timestamp is not representable.
fn pacing_target(timestamp_ms: u64, speed: f64) -> Duration {
    Duration::try_from_secs_f64(timestamp_ms as f64 / 1000.0 / speed).unwrap_or(Duration::MAX)
}

/// Everything the replay thread owns.
struct Playback {
    session: CaptureSession,
    packets: Vec<CapturePacketRecord>,
    file: File,
    total_ms: u64,
    config: ReplayConfig,
    callback: Arc<dyn ReplayCallback>,
    state: Arc<Mutex<ReplayState>>,
    running: Arc<AtomicBool>,
}

impl Playback {
    fn run(mut self) {
        self.callback.on_session_start(&self.session);
        let start = Instant::now();
        let mut buf = Vec::new();
        let packets = std::mem::take(&mut self.packets);

        for (i, packet) in packets.iter().enumerate() {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            if self.config.paced && !self.wait_for(start, packet.timestamp_ms) {
                return;
            }

            if let Err(e) = self.read_packet(packet, &mut buf) {
                log::error!("Replay failed at packet {}: {}", packet.seq, e);
                self.running.store(false, Ordering::SeqCst);
                *self.state.lock() = ReplayState::Error(e.clone());
                self.callback.on_error(&e.to_string());
                return;
            }

            if i < 10 || i % 500 == 0 {
                log::debug!(
                    "Replay packet #{}: {} {} ({} bytes) at {} ms",
                    packet.seq,
                    packet.dir,
                    packet.type_name,
                    buf.len(),
                    packet.timestamp_ms
                );
            }

            self.callback.on_packet(packet.type_id, &packet.type_name, &buf);
            self.callback.on_progress(packet.timestamp_ms, self.total_ms);
        }

        if self.running.swap(false, Ordering::SeqCst) {
            *self.state.lock() = ReplayState::Completed;
            log::info!("Replay complete: {} packets", packets.len());
            self.callback.on_complete();
        }
    }

    /// Sleep until `timestamp_ms / speed` after `start`. Returns false if
    /// stopped while waiting.
    fn wait_for(&self, start: Instant, timestamp_ms: u64) -> bool {
        let target = pacing_target(timestamp_ms, self.config.speed);
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return false;
            }
            let elapsed = start.elapsed();
            if elapsed >= target {
                return true;
            }
            thread::sleep((target - elapsed).min(MAX_PACING_SLEEP));
        }
    }

    fn read_packet(&mut self, packet: &CapturePacketRecord, buf: &mut Vec<u8>) -> Result<(), ReplayError> {
        buf.resize(packet.length as usize, 0);
        self.file
            .seek(SeekFrom::Start(packet.offset))
            .map_err(|e| ReplayError::Io(format!("seek to {}: {}", packet.offset, e)))?;
        self.file
            .read_exact(buf)
            .map_err(|e| ReplayError::Io(format!("read {} bytes at {}: {}", packet.length, packet.offset, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::capture::index::write_index;
    use crate::capture::recorder::CaptureRecorder;
    use crate::models::capture_models::{CaptureIndexConfig, CaptureStats};
    use crate::models::config::RecorderConfig;
    use crate::models::message_type::{type_name, CommandMapping, MessageType};
    use crate::protocol::encode::{encode_command, encode_frame};
    use crate::traits::packet_recorder::PacketRecorder;

    #[derive(Default)]
    struct Collector {
        sessions: Mutex<Vec<String>>,
        packets: Mutex<Vec<(u32, String, Vec<u8>)>>,
        progress: Mutex<Vec<(u64, u64)>>,
        completed: AtomicBool,
        errors: Mutex<Vec<String>>,
    }

    impl ReplayCallback for Collector {
        fn on_session_start(&self, session: &CaptureSession) {
            self.sessions.lock().push(session.id.clone());
        }

        fn on_packet(&self, type_id: u32, type_name: &str, data: &[u8]) {
            self.packets.lock().push((type_id, type_name.to_string(), data.to_vec()));
        }

        fn on_progress(&self, current_ms: u64, total_ms: u64) {
            self.progress.lock().push((current_ms, total_ms));
        }

        fn on_complete(&self) {
            self.completed.store(true, Ordering::SeqCst);
        }

        fn on_error(&self, message: &str) {
            self.errors.lock().push(message.to_string());
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("carlink_replay_test_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Write a capture directly: (direction, timestamp, frame).
    fn write_capture(dir: &Path, frames: &[(Direction, u64, Vec<u8>)]) -> (PathBuf, PathBuf) {
        let bin = dir.join("capture.bin");
        let json = dir.join("capture.json");
        let mut log = Vec::new();
        let mut packets = Vec::new();
        let mut stats = CaptureStats::default();
        for (seq, (direction, ts, frame)) in frames.iter().enumerate() {
            let type_id = u32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]]);
            packets.push(CapturePacketRecord {
                seq: seq as u64,
                dir: *direction,
                type_id,
                type_name: type_name(type_id).into(),
                timestamp_ms: *ts,
                offset: log.len() as u64,
                length: frame.len() as u64,
            });
            stats.add(*direction, frame.len() as u64);
            log.extend_from_slice(frame);
        }
        fs::write(&bin, &log).unwrap();
        let index = CaptureIndex {
            version: CaptureIndex::VERSION.into(),
            session: CaptureSession {
                id: "test".into(),
                started: String::new(),
                ended: String::new(),
                duration_ms: frames.last().map_or(0, |f| f.1),
            },
            config: CaptureIndexConfig::default(),
            packets,
            stats,
        };
        write_index(&index, &json).unwrap();
        (json, bin)
    }

    fn unpaced(include_outbound: bool) -> CaptureReplay {
        CaptureReplay::new(ReplayConfig {
            paced: false,
            include_outbound,
            ..Default::default()
        })
        .unwrap()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn record_then_replay_round_trip() {
        let dir = temp_dir("round_trip");
        let recorder = Arc::new(CaptureRecorder::new(RecorderConfig::default()).unwrap());
        recorder.set_output_directory(&dir).unwrap();
        recorder.start().unwrap();

        let writers: Vec<_> = [(Direction::In, MessageType::Phase), (Direction::Out, MessageType::Command)]
            .into_iter()
            .map(|(direction, message_type)| {
                let recorder = Arc::clone(&recorder);
                thread::spawn(move || {
                    for i in 0..50u32 {
                        let frame = encode_frame(message_type, &i.to_le_bytes());
                        recorder.record_packet(direction, message_type.id(), &frame);
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        let result = recorder.stop().unwrap().unwrap();
        let log = fs::read(&result.binary_path).unwrap();

        let replay = unpaced(true);
        replay.load(&result.index_path, &result.binary_path).unwrap();
        assert_eq!(replay.state(), ReplayState::Ready);
        assert_eq!(replay.packet_count(), 100);

        let collector = Arc::new(Collector::default());
        replay.start(collector.clone()).unwrap();
        wait_until(|| collector.completed.load(Ordering::SeqCst));
        assert_eq!(replay.state(), ReplayState::Completed);

        let packets = collector.packets.lock();
        assert_eq!(packets.len(), 100);
        // Replayed bytes concatenated in sequence order reproduce the log.
        let replayed: Vec<u8> = packets.iter().flat_map(|p| p.2.clone()).collect();
        assert_eq!(replayed, log);
        let phases = packets.iter().filter(|p| p.1 == "PHASE").count();
        assert_eq!(phases, 50);
        assert_eq!(*collector.sessions.lock(), vec![result.session.id.clone()]);
        drop(packets);

        // Restart from completed.
        collector.completed.store(false, Ordering::SeqCst);
        replay.start(collector.clone()).unwrap();
        wait_until(|| collector.completed.load(Ordering::SeqCst));
        assert_eq!(collector.packets.lock().len(), 200);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn outbound_packets_excluded_by_default() {
        let dir = temp_dir("outbound");
        let (json, bin) = write_capture(
            &dir,
            &[
                (Direction::In, 0, encode_frame(MessageType::Phase, &1u32.to_le_bytes())),
                (Direction::Out, 1, encode_command(CommandMapping::Frame)),
                (Direction::In, 2, encode_frame(MessageType::Phase, &2u32.to_le_bytes())),
            ],
        );
        let replay = unpaced(false);
        replay.load(&json, &bin).unwrap();
        let collector = Arc::new(Collector::default());
        replay.start(collector.clone()).unwrap();
        wait_until(|| collector.completed.load(Ordering::SeqCst));

        let packets = collector.packets.lock();
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| p.0 == 0x03));
        assert_eq!(*collector.progress.lock(), vec![(0, 2), (2, 2)]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn paced_playback_follows_timestamps() {
        let dir = temp_dir("paced");
        let frame = encode_frame(MessageType::Phase, &0u32.to_le_bytes());
        let (json, bin) = write_capture(
            &dir,
            &[(Direction::In, 0, frame.clone()), (Direction::In, 150, frame.clone())],
        );

        let replay = CaptureReplay::new(ReplayConfig::default()).unwrap();
        replay.load(&json, &bin).unwrap();
        let collector = Arc::new(Collector::default());
        let started = Instant::now();
        replay.start(collector.clone()).unwrap();
        wait_until(|| collector.completed.load(Ordering::SeqCst));
        assert!(started.elapsed() >= Duration::from_millis(150));

        let fast = CaptureReplay::new(ReplayConfig {
            speed: 3.0,
            ..Default::default()
        })
        .unwrap();
        fast.load(&json, &bin).unwrap();
        let collector = Arc::new(Collector::default());
        let started = Instant::now();
        fast.start(collector.clone()).unwrap();
        wait_until(|| collector.completed.load(Ordering::SeqCst));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn stop_interrupts_pacing() {
        let dir = temp_dir("stop");
        let frame = encode_frame(MessageType::Phase, &0u32.to_le_bytes());
        let (json, bin) = write_capture(
            &dir,
            &[(Direction::In, 0, frame.clone()), (Direction::In, 60_000, frame)],
        );

        let replay = CaptureReplay::new(ReplayConfig::default()).unwrap();
        replay.load(&json, &bin).unwrap();
        assert_eq!(replay.duration_ms(), 60_000);
        let collector = Arc::new(Collector::default());
        replay.start(collector.clone()).unwrap();
        wait_until(|| collector.packets.lock().len() == 1);
        assert!(replay.state().is_playing());
        assert!(matches!(
            replay.load(&json, &bin),
            Err(ReplayError::InvalidState(_))
        ));

        let stopping = Instant::now();
        replay.stop();
        assert!(stopping.elapsed() < Duration::from_secs(1));
        assert_eq!(replay.state(), ReplayState::Idle);
        assert!(!collector.completed.load(Ordering::SeqCst));
        assert!(matches!(
            replay.start(collector.clone()),
            Err(ReplayError::InvalidState(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn read_error_mid_playback_ends_in_error() {
        let dir = temp_dir("mid_error");
        let first = encode_frame(MessageType::Phase, &1u32.to_le_bytes());
        let second = encode_frame(MessageType::Phase, &2u32.to_le_bytes());
        let (json, bin) = write_capture(
            &dir,
            &[(Direction::In, 0, first.clone()), (Direction::In, 1, second)],
        );

        let replay = unpaced(false);
        replay.load(&json, &bin).unwrap();
        // Shrink the log underneath the loaded capture.
        fs::write(&bin, &first).unwrap();

        let collector = Arc::new(Collector::default());
        replay.start(collector.clone()).unwrap();
        wait_until(|| !collector.errors.lock().is_empty());

        assert!(matches!(replay.state(), ReplayState::Error(ReplayError::Io(_))));
        assert_eq!(collector.packets.lock().len(), 1);
        let errors = collector.errors.lock();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("I/O error: read 20 bytes at 20"));
        assert!(!collector.completed.load(Ordering::SeqCst));
        assert!(!replay.state().can_start());
        drop(errors);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn pacing_target_saturates() {
        assert_eq!(pacing_target(1500, 1.0), Duration::from_millis(1500));
        assert_eq!(pacing_target(1500, 2.0), Duration::from_millis(750));
        assert_eq!(pacing_target(u64::MAX, 1e-300), Duration::MAX);
        assert_eq!(pacing_target(0, 1e-300), Duration::ZERO);
    }

    #[test]
    fn load_failures() {
        let dir = temp_dir("load_failures");
        let replay = unpaced(true);

        let missing = dir.join("missing.json");
        assert!(matches!(
            replay.load(&missing, &dir.join("missing.bin")),
            Err(ReplayError::IndexRead(_))
        ));
        assert!(matches!(replay.state(), ReplayState::Error(ReplayError::IndexRead(_))));

        let (json, bin) = write_capture(&dir, &[]);
        assert!(matches!(replay.load(&json, &bin), Err(ReplayError::InvalidIndex(_))));

        let frame = encode_frame(MessageType::Phase, &0u32.to_le_bytes());
        let (json, bin) = write_capture(&dir, &[(Direction::In, 0, frame)]);
        assert!(matches!(
            replay.load(&json, &dir.join("nope.bin")),
            Err(ReplayError::BinaryOpen(_))
        ));

        fs::write(&bin, [0u8; 10]).unwrap();
        assert_eq!(
            replay.load(&json, &bin),
            Err(ReplayError::OffsetOutOfRange {
                seq: 0,
                offset: 0,
                length: 20,
                file_len: 10
            })
        );
        assert!(matches!(
            replay.start(Arc::new(Collector::default())),
            Err(ReplayError::InvalidState(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
