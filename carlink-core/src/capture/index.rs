use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::models::capture_models::{CaptureIndex, CapturePacketRecord};
use crate::models::error::{CaptureError, ReplayError};

/// Write a capture index as pretty JSON.
pub fn write_index(index: &CaptureIndex, path: &Path) -> Result<(), CaptureError> {
    let json = serde_json::to_string_pretty(index)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize index: {}", e)))?;
    fs::write(path, json)
        .map_err(|e| CaptureError::StorageError(format!("failed to write index: {}", e)))?;
    Ok(())
}

/// Read a capture index.
pub fn read_index(path: &Path) -> Result<CaptureIndex, ReplayError> {
    let json = fs::read_to_string(path)
        .map_err(|e| ReplayError::IndexRead(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&json).map_err(|e| ReplayError::IndexParse(e.to_string()))
}

/// Check that every packet lies inside a binary log of `file_len` bytes.
pub fn check_bounds(packets: &[CapturePacketRecord], file_len: u64) -> Result<(), ReplayError> {
    for p in packets {
        if p.offset.checked_add(p.length).map_or(true, |end| end > file_len) {
            return Err(ReplayError::OffsetOutOfRange {
                seq: p.seq,
                offset: p.offset,
                length: p.length,
                file_len,
            });
        }
    }
    Ok(())
}

/// Gaps or overlaps between packets, in offset order.
///
/// A log written by the recorder tiles exactly: each packet starts where
/// the previous one ended and the last one ends at `file_len`.
pub fn tiling_gaps(packets: &[CapturePacketRecord], file_len: u64) -> Vec<(u64, u64)> {
    let mut sorted: Vec<&CapturePacketRecord> = packets.iter().collect();
    sorted.sort_by_key(|p| p.offset);

    let mut gaps = Vec::new();
    let mut cursor = 0u64;
    for p in sorted {
        if p.offset != cursor {
            gaps.push((cursor, p.offset));
        }
        cursor = p.end();
    }
    if cursor != file_len {
        gaps.push((cursor, file_len));
    }
    gaps
}

/// SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data = fs::read(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&Sha256::digest(&data)))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::capture_models::{CaptureIndexConfig, CaptureSession, CaptureStats, Direction};

    fn record(seq: u64, offset: u64, length: u64) -> CapturePacketRecord {
        CapturePacketRecord {
            seq,
            dir: Direction::In,
            type_id: 3,
            type_name: "PHASE".into(),
            timestamp_ms: seq * 10,
            offset,
            length,
        }
    }

    #[test]
    fn bounds_check() {
        let packets = vec![record(0, 0, 20), record(1, 20, 16)];
        assert!(check_bounds(&packets, 36).is_ok());
        assert_eq!(
            check_bounds(&packets, 35),
            Err(ReplayError::OffsetOutOfRange {
                seq: 1,
                offset: 20,
                length: 16,
                file_len: 35
            })
        );
        assert!(check_bounds(&[record(0, u64::MAX, 2)], 10).is_err());
    }

    #[test]
    fn tiling() {
        let packets = vec![record(1, 20, 16), record(0, 0, 20)];
        assert!(tiling_gaps(&packets, 36).is_empty());
        assert_eq!(tiling_gaps(&packets, 40), vec![(36, 40)]);
        let gapped = vec![record(0, 0, 16), record(1, 20, 16)];
        assert_eq!(tiling_gaps(&gapped, 36), vec![(16, 20)]);
    }

    #[test]
    fn index_file_round_trip() {
        let path = std::env::temp_dir().join(format!("carlink_index_test_{}.json", std::process::id()));
        let index = CaptureIndex {
            version: CaptureIndex::VERSION.into(),
            session: CaptureSession {
                id: "2024-05-01T10-00-00-000Z".into(),
                started: "2024-05-01T10:00:00.000Z".into(),
                ended: "2024-05-01T10:00:01.000Z".into(),
                duration_ms: 1000,
            },
            config: CaptureIndexConfig::default(),
            packets: vec![record(0, 0, 16)],
            stats: CaptureStats {
                packets_in: 1,
                bytes_in: 16,
                ..Default::default()
            },
        };
        write_index(&index, &path).unwrap();
        assert_eq!(read_index(&path).unwrap(), index);

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(read_index(&path), Err(ReplayError::IndexParse(_))));
        let _ = std::fs::remove_file(&path);
        assert!(matches!(read_index(&path), Err(ReplayError::IndexRead(_))));
    }

    #[test]
    fn checksum_of_known_content() {
        let path = std::env::temp_dir().join(format!("carlink_sha_test_{}.bin", std::process::id()));
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let _ = std::fs::remove_file(&path);
    }
}
