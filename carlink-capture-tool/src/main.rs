//! `carlink-capture`: inspect, verify and replay adapter capture files.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{bail, Context};
use carlink_core::capture::index::{check_bounds, read_index, sha256_file, tiling_gaps};
use carlink_core::processing::capture_format::detect_capture_prefix;
use carlink_core::{
    parse_header, AudioFormat, AudioSink, CaptureReplay, CaptureSession, Direction, Message, MessageDispatcher,
    MessageObserver, MessageType, ReplayCallback, ReplayConfig, ReplayInjector, VideoSink, HEADER_SIZE,
};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print session details and packet counts of a capture index
    Info {
        /// Capture index (.json)
        index: PathBuf,

        /// Also print every packet record
        #[arg(long, default_value_t = false)]
        packets: bool,
    },

    /// Check that an index and its binary log agree
    Verify {
        /// Capture index (.json)
        index: PathBuf,

        /// Binary log (.bin)
        bin: PathBuf,

        /// Expected SHA-256 of the binary log
        #[arg(long)]
        checksum: Option<String>,
    },

    /// Play a capture back through the message dispatcher
    Replay {
        /// Capture index (.json)
        index: PathBuf,

        /// Binary log (.bin)
        bin: PathBuf,

        /// Deliver packets as fast as possible instead of in recorded time
        #[arg(long, default_value_t = false)]
        fast: bool,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Include packets the host sent to the adapter
        #[arg(long, default_value_t = false)]
        include_outbound: bool,

        /// Write the replayed H.264 elementary stream here
        #[arg(long)]
        h264: Option<PathBuf>,

        /// Write replayed PCM here
        #[arg(long)]
        pcm: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    match cli.command {
        Command::Info { index, packets } => info(&index, packets),
        Command::Verify { index, bin, checksum } => verify(&index, &bin, checksum.as_deref()),
        Command::Replay {
            index,
            bin,
            fast,
            speed,
            include_outbound,
            h264,
            pcm,
        } => {
            let config = ReplayConfig {
                paced: !fast,
                speed,
                include_outbound,
            };
            replay(&index, &bin, config, h264.as_deref(), pcm.as_deref())
        }
    }
}

fn info(index_path: &Path, list_packets: bool) -> anyhow::Result<()> {
    let index = read_index(index_path)?;

    println!("Session:   {}", index.session.id);
    println!("Started:   {}", index.session.started);
    println!("Ended:     {}", index.session.ended);
    println!("Duration:  {} ms", index.session.duration_ms);
    println!("Version:   {}", index.version);
    println!(
        "Packets:   {} in / {} out ({} / {} bytes)",
        index.stats.packets_in, index.stats.packets_out, index.stats.bytes_in, index.stats.bytes_out
    );
    println!("Includes:  {}", serde_json::to_string(&index.config)?);

    let mut by_type: BTreeMap<(String, Direction), (u64, u64)> = BTreeMap::new();
    for p in &index.packets {
        let entry = by_type.entry((p.type_name.clone(), p.dir)).or_default();
        entry.0 += 1;
        entry.1 += p.length;
    }
    println!();
    for ((name, dir), (count, bytes)) in &by_type {
        println!("  {:<3} {:<24} {:>8} packets {:>12} bytes", dir, name, count, bytes);
    }

    if list_packets {
        println!();
        for p in &index.packets {
            println!(
                "  #{:<6} {:<3} {:>8} ms  {:<24} offset {:>10} len {:>8}",
                p.seq, p.dir, p.timestamp_ms, p.type_name, p.offset, p.length
            );
        }
    }
    Ok(())
}

fn verify(index_path: &Path, bin_path: &Path, expected_checksum: Option<&str>) -> anyhow::Result<()> {
    let index = read_index(index_path)?;
    let file_len = fs::metadata(bin_path)
        .with_context(|| format!("failed to stat {}", bin_path.display()))?
        .len();

    check_bounds(&index.packets, file_len)?;

    let mut problems = 0usize;
    for (start, end) in tiling_gaps(&index.packets, file_len) {
        if end > start {
            log::warn!("Unindexed bytes {}..{} in binary log", start, end);
        } else {
            log::warn!("Overlapping packets at offset {}", end);
        }
        problems += 1;
    }

    let mut file = File::open(bin_path).with_context(|| format!("failed to open {}", bin_path.display()))?;
    for p in &index.packets {
        let mut data = vec![0u8; p.length as usize];
        file.seek(SeekFrom::Start(p.offset))?;
        file.read_exact(&mut data)?;

        let frame = &data[detect_capture_prefix(&data)..];
        if frame.len() < HEADER_SIZE {
            log::warn!("Packet #{} shorter than a header: {} bytes", p.seq, frame.len());
            problems += 1;
            continue;
        }
        match parse_header(&frame[..HEADER_SIZE]) {
            Ok(header) if header.type_id != p.type_id => {
                log::warn!(
                    "Packet #{}: indexed as {:#04x}, header says {:#04x}",
                    p.seq,
                    p.type_id,
                    header.type_id
                );
                problems += 1;
            }
            Ok(header) if header.length as usize != frame.len() - HEADER_SIZE => {
                log::warn!(
                    "Packet #{}: header length {} but {} payload bytes recorded",
                    p.seq,
                    header.length,
                    frame.len() - HEADER_SIZE
                );
                problems += 1;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Packet #{}: {}", p.seq, e);
                problems += 1;
            }
        }
    }

    let checksum = sha256_file(bin_path)?;
    println!("SHA-256:   {}", checksum);
    if let Some(expected) = expected_checksum {
        if !expected.eq_ignore_ascii_case(&checksum) {
            bail!("checksum mismatch: expected {}", expected);
        }
    }

    if problems > 0 {
        bail!("{} problem(s) found in {} packets", problems, index.packets.len());
    }
    println!("OK: {} packets, {} bytes", index.packets.len(), file_len);
    Ok(())
}

/// Writes replayed media to files and counts everything else.
struct FileSinks {
    h264: Option<Mutex<BufWriter<File>>>,
    pcm: Option<Mutex<BufWriter<File>>>,
    messages: AtomicU64,
    last_format: Mutex<Option<AudioFormat>>,
}

impl FileSinks {
    fn create(h264: Option<&Path>, pcm: Option<&Path>) -> anyhow::Result<Self> {
        let open = |path: Option<&Path>| -> anyhow::Result<Option<Mutex<BufWriter<File>>>> {
            path.map(|p| {
                File::create(p)
                    .map(|f| Mutex::new(BufWriter::new(f)))
                    .with_context(|| format!("failed to create {}", p.display()))
            })
            .transpose()
        };
        Ok(Self {
            h264: open(h264)?,
            pcm: open(pcm)?,
            messages: AtomicU64::new(0),
            last_format: Mutex::new(None),
        })
    }

    fn flush(&self) -> anyhow::Result<()> {
        for writer in [&self.h264, &self.pcm].into_iter().flatten() {
            writer.lock().flush()?;
        }
        Ok(())
    }
}

impl VideoSink for FileSinks {
    fn accept_h264(&self, data: &[u8], _pts_ms: u64) {
        if let Some(writer) = &self.h264 {
            if let Err(e) = writer.lock().write_all(data) {
                log::error!("Failed to write H.264: {}", e);
            }
        }
    }
}

impl AudioSink for FileSinks {
    fn enqueue_pcm(&self, pcm: &[u8], format: AudioFormat, _audio_type: u32) {
        let mut last = self.last_format.lock();
        if *last != Some(format) {
            log::info!("PCM format: {} Hz, {} ch", format.sample_rate, format.channels);
            *last = Some(format);
        }
        if let Some(writer) = &self.pcm {
            if let Err(e) = writer.lock().write_all(pcm) {
                log::error!("Failed to write PCM: {}", e);
            }
        }
    }
}

impl MessageObserver for FileSinks {
    fn on_message(&self, message: &Message) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        if !matches!(
            message,
            Message::AudioData { .. } | Message::VideoData { .. } | Message::VideoStreamed { .. }
        ) {
            log::debug!("{:?}", message);
        }
    }
}

enum Outcome {
    Complete,
    Failed(String),
}

/// Reports progress and signals the main thread when playback ends.
struct Progress {
    done: mpsc::Sender<Outcome>,
    last_second: AtomicU64,
}

impl ReplayCallback for Progress {
    fn on_session_start(&self, session: &CaptureSession) {
        log::info!("Session {} started {}", session.id, session.started);
    }

    fn on_packet(&self, type_id: u32, type_name: &str, data: &[u8]) {
        if MessageType::from_id(type_id).is_none() {
            log::debug!("Replayed {} ({} bytes)", type_name, data.len());
        }
    }

    fn on_progress(&self, current_ms: u64, total_ms: u64) {
        let second = current_ms / 1000;
        if self.last_second.swap(second, Ordering::Relaxed) != second {
            log::info!("{:>6} / {} ms", current_ms, total_ms);
        }
    }

    fn on_complete(&self) {
        let _ = self.done.send(Outcome::Complete);
    }

    fn on_error(&self, message: &str) {
        let _ = self.done.send(Outcome::Failed(message.to_string()));
    }
}

fn replay(
    index_path: &Path,
    bin_path: &Path,
    config: ReplayConfig,
    h264: Option<&Path>,
    pcm: Option<&Path>,
) -> anyhow::Result<()> {
    let sinks = Arc::new(FileSinks::create(h264, pcm)?);
    let dispatcher = MessageDispatcher::new()
        .with_video_sink(sinks.clone())
        .with_audio_sink(sinks.clone())
        .with_observer(sinks.clone());

    let (done_tx, done_rx) = mpsc::channel();
    let progress = Arc::new(Progress {
        done: done_tx,
        last_second: AtomicU64::new(0),
    });
    let injector = Arc::new(ReplayInjector::new(Arc::new(dispatcher)).with_listener(progress));

    let replay = CaptureReplay::new(config)?;
    replay.load(index_path, bin_path)?;
    log::info!(
        "Replaying {} packets over {} ms",
        replay.packet_count(),
        replay.duration_ms()
    );
    replay.start(injector.clone())?;

    let outcome = done_rx.recv().context("replay thread ended without reporting")?;
    replay.stop();
    sinks.flush()?;

    let stats = injector.stats();
    println!(
        "Video: {}  Audio: {}  Other: {}  Dropped: {}  Observed: {}",
        stats.video_packets,
        stats.audio_packets,
        stats.other_packets,
        stats.dropped_packets,
        sinks.messages.load(Ordering::Relaxed)
    );

    match outcome {
        Outcome::Complete => Ok(()),
        Outcome::Failed(message) => bail!("replay failed: {}", message),
    }
}
