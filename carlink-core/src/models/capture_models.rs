use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Direction of a recorded packet relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Adapter to host.
    #[serde(rename = "IN")]
    In,
    /// Host to adapter.
    #[serde(rename = "OUT")]
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "IN",
            Self::Out => "OUT",
        })
    }
}

/// One packet entry in the capture index.
///
/// `offset`/`length` locate the raw header+payload bytes in the binary log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePacketRecord {
    pub seq: u64,
    pub dir: Direction,
    #[serde(rename = "type")]
    pub type_id: u32,
    pub type_name: String,
    pub timestamp_ms: u64,
    pub offset: u64,
    pub length: u64,
}

impl CapturePacketRecord {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    pub id: String,
    pub started: String,
    pub ended: String,
    pub duration_ms: u64,
}

/// Include flags as written to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureIndexConfig {
    pub include_video_data: bool,
    pub include_audio_data: bool,
    pub include_mic_data: bool,
    pub include_speaker_data: bool,
}

impl Default for CaptureIndexConfig {
    fn default() -> Self {
        Self {
            include_video_data: true,
            include_audio_data: true,
            include_mic_data: true,
            include_speaker_data: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl CaptureStats {
    pub fn total_packets(&self) -> u64 {
        self.packets_in + self.packets_out
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_in + self.bytes_out
    }

    pub(crate) fn add(&mut self, dir: Direction, bytes: u64) {
        match dir {
            Direction::In => {
                self.packets_in += 1;
                self.bytes_in += bytes;
            }
            Direction::Out => {
                self.packets_out += 1;
                self.bytes_out += bytes;
            }
        }
    }
}

/// The `.json` companion of a binary capture log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureIndex {
    pub version: String,
    pub session: CaptureSession,
    #[serde(default)]
    pub config: CaptureIndexConfig,
    pub packets: Vec<CapturePacketRecord>,
    #[serde(default)]
    pub stats: CaptureStats,
}

impl CaptureIndex {
    pub const VERSION: &'static str = "1.0";
}

/// Result returned when a recording session stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub binary_path: PathBuf,
    pub index_path: PathBuf,
    pub session: CaptureSession,
    pub stats: CaptureStats,
    /// Hex SHA-256 of the binary log.
    pub checksum: String,
    /// Packets that failed to append to the log.
    pub failed_packets: u64,
}

impl CaptureResult {
    /// At least one packet could not be written; the log is still
    /// self-consistent but incomplete.
    pub fn is_degraded(&self) -> bool {
        self.failed_packets > 0
    }
}
