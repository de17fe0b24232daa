//! Payload decoding. Malformed or short payloads never fail: each type has
//! a default shape that is produced instead.

use crate::models::message::{AudioPayload, JsonMap, MediaPayload, Message, OpenParams};
use crate::models::message_type::{CommandMapping, MediaType, MessageType, PhoneType};

use super::header::{u32_at, MessageHeader};

/// Size of the AUDIO_DATA sub-header: decode type, volume, audio type.
pub const AUDIO_SUBHEADER_SIZE: usize = 12;

/// Size of the VIDEO_DATA sub-header: width, height, flags, length, unknown.
pub const VIDEO_SUBHEADER_SIZE: usize = 20;

fn i32_at(bytes: &[u8], offset: usize) -> Option<i32> {
    u32_at(bytes, offset).map(|v| v as i32)
}

fn f32_at(bytes: &[u8], offset: usize) -> Option<f32> {
    u32_at(bytes, offset).map(f32::from_bits)
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b != 0).map_or(start, |i| i + 1);
    &bytes[start..end]
}

fn parse_string(payload: Option<&[u8]>) -> String {
    payload
        .map(|p| String::from_utf8_lossy(trim_nul(p)).into_owned())
        .unwrap_or_default()
}

fn parse_json_object(bytes: &[u8]) -> JsonMap {
    match serde_json::from_slice::<serde_json::Value>(trim_nul(bytes)) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => JsonMap::new(),
        Err(e) => {
            log::debug!("Discarding malformed JSON payload: {}", e);
            JsonMap::new()
        }
    }
}

/// Decode a payload according to its header.
pub fn parse_message(header: &MessageHeader, payload: Option<Vec<u8>>) -> Message {
    let Some(message_type) = header.message_type() else {
        return Message::Unknown {
            type_id: header.type_id,
            data: payload,
        };
    };
    let bytes = payload.as_deref();

    match message_type {
        MessageType::AudioData => parse_audio(bytes.unwrap_or_default()),
        MessageType::VideoData => parse_video(payload),
        MessageType::MediaData => parse_media(bytes.unwrap_or_default()),
        MessageType::Open => parse_open(bytes.unwrap_or_default()),
        MessageType::Plugged => parse_plugged(bytes.unwrap_or_default()),
        MessageType::Unplugged => Message::Unplugged,
        MessageType::Phase => Message::Phase(bytes.and_then(|b| u32_at(b, 0)).unwrap_or(0)),
        MessageType::Command => {
            let id = bytes.and_then(|b| u32_at(b, 0)).unwrap_or(0);
            Message::Command {
                id,
                command: CommandMapping::from_id(id),
            }
        }
        MessageType::ManufacturerInfo => {
            let b = bytes.unwrap_or_default();
            match (u32_at(b, 0), u32_at(b, 4)) {
                (Some(a), Some(b)) => Message::ManufacturerInfo { a, b },
                _ => Message::ManufacturerInfo { a: 0, b: 0 },
            }
        }
        MessageType::BoxSettings => {
            Message::BoxSettings(bytes.map(parse_json_object).unwrap_or_default())
        }
        MessageType::SoftwareVersion => Message::SoftwareVersion(parse_string(bytes)),
        MessageType::BluetoothAddress => Message::BluetoothAddress(parse_string(bytes)),
        MessageType::BluetoothDeviceName => Message::BluetoothDeviceName(parse_string(bytes)),
        MessageType::BluetoothPin => Message::BluetoothPin(parse_string(bytes)),
        MessageType::WifiDeviceName => Message::WifiDeviceName(parse_string(bytes)),
        MessageType::HiCarLink => Message::HiCarLink(parse_string(bytes)),
        MessageType::BluetoothPairedList => Message::BluetoothPairedList(parse_string(bytes)),
        MessageType::NetworkMacAddress => Message::NetworkMacAddress(parse_string(bytes)),
        MessageType::NetworkMacAddressAlt => Message::NetworkMacAddressAlt(parse_string(bytes)),
        MessageType::Touch
        | MessageType::LogoType
        | MessageType::DisconnectPhone
        | MessageType::CloseDongle
        | MessageType::MultiTouch
        | MessageType::NaviVideoData
        | MessageType::SendFile
        | MessageType::HeartBeat => Message::Unknown {
            type_id: header.type_id,
            data: payload,
        },
    }
}

fn parse_audio(bytes: &[u8]) -> Message {
    if bytes.len() < AUDIO_SUBHEADER_SIZE {
        return Message::AudioData {
            decode_type: 0,
            volume: 0.0,
            audio_type: 0,
            payload: AudioPayload::None,
        };
    }

    let decode_type = u32_at(bytes, 0).unwrap_or(0);
    let volume = f32_at(bytes, 4).unwrap_or(0.0);
    let audio_type = u32_at(bytes, 8).unwrap_or(0);
    let rest = &bytes[AUDIO_SUBHEADER_SIZE..];

    let payload = match rest.len() {
        0 => AudioPayload::None,
        1 => AudioPayload::Command(rest[0]),
        4 => AudioPayload::VolumeDuration(f32_at(rest, 0).unwrap_or(0.0)),
        _ => AudioPayload::Pcm(rest.to_vec()),
    };

    Message::AudioData {
        decode_type,
        volume,
        audio_type,
        payload,
    }
}

fn parse_video(payload: Option<Vec<u8>>) -> Message {
    let Some(mut bytes) = payload.filter(|b| b.len() > VIDEO_SUBHEADER_SIZE) else {
        return Message::VideoData {
            width: -1,
            height: -1,
            flags: -1,
            length: -1,
            unknown: -1,
            data: None,
        };
    };

    let field = |i: usize| i32_at(&bytes, i * 4).unwrap_or(-1);
    let (width, height, flags, length, unknown) =
        (field(0), field(1), field(2), field(3), field(4));
    bytes.drain(..VIDEO_SUBHEADER_SIZE);

    Message::VideoData {
        width,
        height,
        flags,
        length,
        unknown,
        data: Some(bytes),
    }
}

fn parse_media(bytes: &[u8]) -> Message {
    let Some(type_id) = u32_at(bytes, 0) else {
        return Message::MediaData {
            media_type: MediaType::Unknown,
            payload: MediaPayload::Empty,
        };
    };

    let media_type = MediaType::from_id(type_id);
    let payload = match media_type {
        MediaType::AlbumCover => MediaPayload::AlbumCover(bytes[4..].to_vec()),
        // Metadata is NUL-terminated; the terminator is not part of the JSON.
        MediaType::Data if bytes.len() > 4 => {
            MediaPayload::Metadata(parse_json_object(&bytes[4..bytes.len() - 1]))
        }
        MediaType::Data => MediaPayload::Metadata(JsonMap::new()),
        MediaType::Unknown => MediaPayload::Empty,
    };

    Message::MediaData {
        media_type,
        payload,
    }
}

fn parse_open(bytes: &[u8]) -> Message {
    let mut fields = [0u32; 7];
    if bytes.len() >= fields.len() * 4 {
        for (i, f) in fields.iter_mut().enumerate() {
            *f = u32_at(bytes, i * 4).unwrap_or(0);
        }
    }
    let [width, height, fps, format, packet_max, i_box, phone_mode] = fields;
    Message::Open(OpenParams {
        width,
        height,
        fps,
        format,
        packet_max,
        i_box,
        phone_mode,
    })
}

fn parse_plugged(bytes: &[u8]) -> Message {
    let phone_type = u32_at(bytes, 0).map_or(PhoneType::Unknown, PhoneType::from_id);
    Message::Plugged {
        phone_type,
        wifi: u32_at(bytes, 4),
    }
}
