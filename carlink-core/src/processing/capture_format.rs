//! Helpers for unwrapping raw captured packets.
//!
//! A captured packet is the 16-byte frame header followed by its payload.
//! Some older captures carry an extra 12-byte prefix in front of the header;
//! it is detected by where the frame magic sits.

use crate::protocol::header::{starts_with_magic, u32_at, HEADER_SIZE};
use crate::protocol::parser::{AUDIO_SUBHEADER_SIZE, VIDEO_SUBHEADER_SIZE};

/// Length of the legacy capture prefix.
pub const LEGACY_PREFIX_SIZE: usize = 12;

/// PCM payloads smaller than this are dropped during replay; they would
/// break sample alignment of the output stream.
pub const MIN_AUDIO_PAYLOAD_SIZE: usize = 64;

/// PCM extracted from a captured AUDIO_DATA packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedAudio<'a> {
    pub decode_type: u32,
    pub audio_type: u32,
    pub pcm: &'a [u8],
}

/// Offset of the frame header within a captured packet: 0 or 12.
pub fn detect_capture_prefix(data: &[u8]) -> usize {
    if data.len() < HEADER_SIZE || starts_with_magic(data) {
        return 0;
    }
    if data.len() >= HEADER_SIZE + LEGACY_PREFIX_SIZE && starts_with_magic(&data[LEGACY_PREFIX_SIZE..]) {
        return LEGACY_PREFIX_SIZE;
    }
    0
}

/// H.264 bytes of a captured VIDEO_DATA / NAVI_VIDEO_DATA packet.
pub fn extract_h264(data: &[u8]) -> Option<&[u8]> {
    let start = detect_capture_prefix(data) + HEADER_SIZE + VIDEO_SUBHEADER_SIZE;
    if data.len() <= start {
        log::debug!("Video packet too small: {} (expected > {})", data.len(), start);
        return None;
    }
    Some(&data[start..])
}

/// PCM and sub-header fields of a captured AUDIO_DATA packet.
///
/// Returns `None` for command/volume packets and for PCM shorter than
/// [`MIN_AUDIO_PAYLOAD_SIZE`].
pub fn extract_audio(data: &[u8]) -> Option<CapturedAudio<'_>> {
    let sub_header = detect_capture_prefix(data) + HEADER_SIZE;
    let start = sub_header + AUDIO_SUBHEADER_SIZE;
    if data.len() <= start {
        return None;
    }

    let pcm = &data[start..];
    if pcm.len() < MIN_AUDIO_PAYLOAD_SIZE {
        log::debug!("Skipping tiny audio packet: {} bytes", pcm.len());
        return None;
    }

    Some(CapturedAudio {
        decode_type: u32_at(data, sub_header)?,
        audio_type: u32_at(data, sub_header + 8)?,
        pcm,
    })
}

/// NAL unit type of the first Annex-B start code within the first 16 bytes.
pub fn find_nal_type(data: &[u8]) -> Option<u8> {
    if data.len() < 4 {
        return None;
    }
    let limit = (data.len() - 1).min(16);
    for i in 0..limit {
        if data[i] != 0 || data[i + 1] != 0 {
            continue;
        }
        match data.get(i + 2) {
            Some(1) => {
                if let Some(b) = data.get(i + 3) {
                    return Some(b & 0x1F);
                }
            }
            Some(0) if data.get(i + 3) == Some(&1) => {
                if let Some(b) = data.get(i + 4) {
                    return Some(b & 0x1F);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message_type::MessageType;
    use crate::protocol::encode::{encode_frame, encode_mic_audio};

    fn video_packet(h264: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8; VIDEO_SUBHEADER_SIZE];
        payload.extend_from_slice(h264);
        encode_frame(MessageType::VideoData, &payload)
    }

    #[test]
    fn prefix_at_zero() {
        let packet = video_packet(&[0, 0, 0, 1, 0x65]);
        assert_eq!(detect_capture_prefix(&packet), 0);
        assert_eq!(extract_h264(&packet), Some(&[0, 0, 0, 1, 0x65][..]));
    }

    #[test]
    fn prefix_at_twelve() {
        let mut packet = vec![0x11u8; LEGACY_PREFIX_SIZE];
        packet.extend_from_slice(&video_packet(&[0, 0, 1, 0x67, 0x42]));
        assert_eq!(detect_capture_prefix(&packet), 12);
        assert_eq!(extract_h264(&packet), Some(&[0, 0, 1, 0x67, 0x42][..]));
    }

    #[test]
    fn prefix_defaults_to_zero() {
        assert_eq!(detect_capture_prefix(&[0u8; 15]), 0);
        assert_eq!(detect_capture_prefix(&[0u8; 40]), 0);
        // Magic at 12 but too short to hold a header after it.
        let mut short = vec![0u8; 27];
        short[12..16].copy_from_slice(&[0xAA, 0x55, 0xAA, 0x55]);
        assert_eq!(detect_capture_prefix(&short), 0);
    }

    #[test]
    fn h264_requires_data_past_headers() {
        let packet = video_packet(&[]);
        assert_eq!(extract_h264(&packet), None);
    }

    #[test]
    fn audio_extraction() {
        let pcm = vec![3u8; 128];
        let packet = encode_mic_audio(2, 1, &pcm);
        let audio = extract_audio(&packet).unwrap();
        assert_eq!(audio.decode_type, 2);
        assert_eq!(audio.audio_type, 1);
        assert_eq!(audio.pcm, &pcm[..]);
    }

    #[test]
    fn audio_drops_tiny_payloads() {
        assert_eq!(extract_audio(&encode_mic_audio(2, 1, &[1; 63])), None);
        assert_eq!(extract_audio(&encode_mic_audio(2, 1, &[1])), None);
        assert!(extract_audio(&encode_mic_audio(2, 1, &[1; 64])).is_some());
    }

    #[test]
    fn nal_types() {
        assert_eq!(find_nal_type(&[0, 0, 0, 1, 0x67, 0x42]), Some(7));
        assert_eq!(find_nal_type(&[0, 0, 1, 0x65, 0x88]), Some(5));
        assert_eq!(find_nal_type(&[0xFF, 0, 0, 1, 0x41, 0]), Some(1));
        assert_eq!(find_nal_type(&[1, 2, 3, 4, 5, 6]), None);
        assert_eq!(find_nal_type(&[0, 0, 1]), None);
    }
}
