use serde_json::{Map, Value};

use super::message_type::{CommandMapping, MediaType, MessageType, PhoneType};

/// JSON object carried by BOX_SETTINGS and MEDIA_DATA metadata.
pub type JsonMap = Map<String, Value>;

/// Display parameters from an OPEN message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: u32,
    pub packet_max: u32,
    pub i_box: u32,
    pub phone_mode: u32,
}

/// What follows the 12-byte AUDIO_DATA sub-header.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioPayload {
    None,
    Command(u8),
    VolumeDuration(f32),
    Pcm(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaPayload {
    Empty,
    AlbumCover(Vec<u8>),
    Metadata(JsonMap),
}

/// A parsed protocol message.
///
/// Constructed once per frame and handed to consumers by value.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Open(OpenParams),
    Plugged {
        phone_type: PhoneType,
        wifi: Option<u32>,
    },
    Unplugged,
    Phase(u32),
    Command {
        id: u32,
        command: CommandMapping,
    },
    AudioData {
        decode_type: u32,
        volume: f32,
        audio_type: u32,
        payload: AudioPayload,
    },
    VideoData {
        width: i32,
        height: i32,
        flags: i32,
        length: i32,
        unknown: i32,
        data: Option<Vec<u8>>,
    },
    MediaData {
        media_type: MediaType,
        payload: MediaPayload,
    },
    SoftwareVersion(String),
    BluetoothAddress(String),
    BluetoothDeviceName(String),
    BluetoothPin(String),
    WifiDeviceName(String),
    HiCarLink(String),
    BluetoothPairedList(String),
    NetworkMacAddress(String),
    NetworkMacAddressAlt(String),
    ManufacturerInfo {
        a: u32,
        b: u32,
    },
    BoxSettings(JsonMap),
    /// A video payload was delivered straight to the video sink.
    VideoStreamed {
        length: u32,
    },
    Unknown {
        type_id: u32,
        data: Option<Vec<u8>>,
    },
}

impl Message {
    /// Wire type id this message was parsed from.
    pub fn type_id(&self) -> u32 {
        let t = match self {
            Self::Open(_) => MessageType::Open,
            Self::Plugged { .. } => MessageType::Plugged,
            Self::Unplugged => MessageType::Unplugged,
            Self::Phase(_) => MessageType::Phase,
            Self::Command { .. } => MessageType::Command,
            Self::AudioData { .. } => MessageType::AudioData,
            Self::VideoData { .. } | Self::VideoStreamed { .. } => MessageType::VideoData,
            Self::MediaData { .. } => MessageType::MediaData,
            Self::SoftwareVersion(_) => MessageType::SoftwareVersion,
            Self::BluetoothAddress(_) => MessageType::BluetoothAddress,
            Self::BluetoothDeviceName(_) => MessageType::BluetoothDeviceName,
            Self::BluetoothPin(_) => MessageType::BluetoothPin,
            Self::WifiDeviceName(_) => MessageType::WifiDeviceName,
            Self::HiCarLink(_) => MessageType::HiCarLink,
            Self::BluetoothPairedList(_) => MessageType::BluetoothPairedList,
            Self::NetworkMacAddress(_) => MessageType::NetworkMacAddress,
            Self::NetworkMacAddressAlt(_) => MessageType::NetworkMacAddressAlt,
            Self::ManufacturerInfo { .. } => MessageType::ManufacturerInfo,
            Self::BoxSettings(_) => MessageType::BoxSettings,
            Self::Unknown { type_id, .. } => return *type_id,
        };
        t.id()
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }
}
